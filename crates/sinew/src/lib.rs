//! # Sinew
//!
//! Forward/backward layer kernels for training feed-forward and
//! convolutional networks by hand.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use sinew::prelude::*;
//!
//! let x = Tensor::<f64>::full((2, 3), 0.1);
//! let w = Tensor::<f64>::full((3, 4), 0.1);
//! let b = Tensor::<f64>::zeros(4);
//!
//! let (h, affine_cache) = affine_forward(&x, &w, &b)?;
//! let (scores, relu_cache) = relu_forward(&h);
//! let (loss, dscores) = softmax_loss(&scores, &[0, 3])?;
//! assert!(loss > 0.0);
//!
//! let dh = relu_backward(&dscores, &relu_cache)?;
//! let grads = affine_backward(&dh, &affine_cache)?;
//! assert_eq!(grads.dw.dims(), &[3, 4]);
//! # Ok::<(), sinew::Error>(())
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `sinew-core` | Tensor, Shape, DType, Error, GEMM helpers |
//! | `sinew-nn` | Layer kernels (affine, relu, batch norm, dropout, conv, max pool, losses) |

/// Re-export core types.
pub use sinew_core::{ops, DType, Error, Result, Shape, Tensor, WithDType};

/// Re-export the layer kernels.
pub mod nn {
    pub use sinew_nn::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::nn::{
        affine_backward, affine_forward, batchnorm_backward, batchnorm_backward_alt,
        batchnorm_forward, conv_backward, conv_forward, dropout_backward, dropout_forward,
        dropout_forward_with_rng, margin_loss, max_pool_backward, max_pool_forward, relu_backward,
        relu_forward, softmax_loss, spatial_batchnorm_backward, spatial_batchnorm_forward,
    };
    pub use crate::nn::{
        BatchNormConfig, ConvConfig, DropoutConfig, Mode, PoolConfig, RunningStats,
    };
    pub use crate::{DType, Error, Result, Shape, Tensor, WithDType};
}
