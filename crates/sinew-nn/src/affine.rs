// Affine — fully-connected (dense) layer kernel
//
// FORWARD:
//
//   Each example x[i] of shape [d1, ..., dk] is flattened into a row of
//   length D = d1*...*dk, then
//
//     out = x_flat @ w + b        x_flat: [N, D]  w: [D, M]  b: [M]
//
//   The bias is broadcast over the batch rows.
//
// BACKWARD:
//
//   dx = dout @ wᵀ          reshaped back to the original [N, d1, ..., dk]
//   dw = x_flatᵀ @ dout
//   db = Σ_rows dout        (broadcast forward ⇒ sum backward)

use sinew_core::{Error, Result, Shape, Tensor, WithDType};

/// Values saved by [`affine_forward`] for [`affine_backward`].
#[derive(Debug, Clone)]
pub struct AffineCache<T: WithDType> {
    /// Original (unflattened) input.
    x: Tensor<T>,
    w: Tensor<T>,
    b: Tensor<T>,
}

impl<T: WithDType> AffineCache<T> {
    pub fn input(&self) -> &Tensor<T> {
        &self.x
    }

    pub fn weight(&self) -> &Tensor<T> {
        &self.w
    }

    pub fn bias(&self) -> &Tensor<T> {
        &self.b
    }
}

/// Gradients returned by [`affine_backward`].
#[derive(Debug, Clone)]
pub struct AffineGrads<T: WithDType> {
    /// Same shape as the forward input.
    pub dx: Tensor<T>,
    /// `[D, M]`
    pub dw: Tensor<T>,
    /// `[M]`
    pub db: Tensor<T>,
}

/// Affine forward pass.
///
/// - `x`: `[N, d1, ..., dk]`
/// - `w`: `[D, M]` with `D = d1 * ... * dk`
/// - `b`: `[M]`
///
/// Returns the `[N, M]` output and the cache for the backward pass.
///
/// # Example
/// ```
/// use sinew_core::Tensor;
/// use sinew_nn::affine_forward;
///
/// let x = Tensor::<f64>::full((2, 3), 0.1);
/// let w = Tensor::<f64>::full((3, 4), 0.1);
/// let b = Tensor::<f64>::zeros(4);
/// let (out, _cache) = affine_forward(&x, &w, &b)?;
/// assert!(out.as_slice().iter().all(|&v| (v - 0.03).abs() < 1e-12));
/// # Ok::<(), sinew_core::Error>(())
/// ```
pub fn affine_forward<T: WithDType>(
    x: &Tensor<T>,
    w: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<(Tensor<T>, AffineCache<T>)> {
    let (n, d) = x.shape().flatten_batch()?;
    w.shape().expect_rank(2)?;
    let (wd, m) = (w.dims()[0], w.dims()[1]);
    if wd != d {
        return Err(Error::MatmulShapeMismatch {
            m: n,
            k1: d,
            k2: wd,
            n: m,
        });
    }
    b.expect_shape(&Shape::from(m))?;

    let mut out = x.reshape((n, d))?.matmul(w)?;
    add_bias_rows(&mut out, b, m);

    let cache = AffineCache {
        x: x.clone(),
        w: w.clone(),
        b: b.clone(),
    };
    Ok((out, cache))
}

/// Affine backward pass.
///
/// `dout` must be `[N, M]`. `dx` comes back in the original input shape.
pub fn affine_backward<T: WithDType>(
    dout: &Tensor<T>,
    cache: &AffineCache<T>,
) -> Result<AffineGrads<T>> {
    let (n, d) = cache.x.shape().flatten_batch()?;
    let m = cache.w.dims()[1];
    dout.expect_shape(&Shape::from((n, m)))?;

    let dx = dout.matmul_t(&cache.w)?.into_reshape(cache.x.shape())?;
    let dw = cache.x.reshape((n, d))?.t_matmul(dout)?;
    let db = dout.sum_rows()?;

    Ok(AffineGrads { dx, dw, db })
}

fn add_bias_rows<T: WithDType>(out: &mut Tensor<T>, b: &Tensor<T>, m: usize) {
    if m == 0 {
        return;
    }
    let bias = b.as_slice();
    for row in out.as_mut_slice().chunks_mut(m) {
        for (v, &bj) in row.iter_mut().zip(bias) {
            *v += bj;
        }
    }
}
