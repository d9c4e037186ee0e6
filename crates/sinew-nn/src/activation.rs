// ReLU — rectified linear unit kernel
//
//   forward:  out = max(0, x)                     (any shape)
//   backward: dx  = dout  where x >= 0, else 0
//
// The kink at exactly 0 is treated as part of the pass-through branch.

use sinew_core::{Result, Tensor, WithDType};

/// Values saved by [`relu_forward`]: the input.
#[derive(Debug, Clone)]
pub struct ReluCache<T: WithDType> {
    x: Tensor<T>,
}

impl<T: WithDType> ReluCache<T> {
    pub fn input(&self) -> &Tensor<T> {
        &self.x
    }
}

/// ReLU forward pass. Never fails.
pub fn relu_forward<T: WithDType>(x: &Tensor<T>) -> (Tensor<T>, ReluCache<T>) {
    let out = x.map(|v| v.max(T::zero()));
    (out, ReluCache { x: x.clone() })
}

/// ReLU backward pass. `dout` must have the input's shape.
pub fn relu_backward<T: WithDType>(dout: &Tensor<T>, cache: &ReluCache<T>) -> Result<Tensor<T>> {
    cache
        .x
        .zip_map(dout, |x, g| if x >= T::zero() { g } else { T::zero() })
}
