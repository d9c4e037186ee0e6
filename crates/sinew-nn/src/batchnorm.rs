// BatchNorm — per-feature batch normalization kernel
//
// Input x is [N, D]: N examples, D features. Statistics are taken over the
// batch axis, one mean/variance per feature.
//
// FORMULA (train mode):
//
//   mean = (1/N) Σ_i x[i]
//   var  = (1/N) Σ_i (x[i] - mean)²        (uncorrected: divide by N)
//   xc   = x - mean
//   std  = sqrt(var + ε)
//   xn   = xc / std
//   out  = γ ⊙ xn + β
//
// RUNNING STATISTICS (train mode only):
//
//   running = momentum * running + (1 - momentum) * batch_stat
//
//   The running mean/var are owned by the caller and passed in as
//   `&mut RunningStats`; they are written only after every batch statistic
//   has been computed. Test mode normalizes with them and leaves them alone.
//
// BACKWARD:
//
//   Two interchangeable variants over the same cache:
//
//   batchnorm_backward: walks the forward graph in reverse, one node at
//                             a time (scale/shift → normalize → var → mean).
//   batchnorm_backward_alt: the closed form obtained by simplifying that
//                             chain on paper:
//
//     dx = γ / (N·std) ⊙ ( N·dout − Σ_i dout − xc ⊙ Σ_i(dout ⊙ xc) / (var + ε) )
//
//   Both give dγ = Σ_i dout ⊙ xn and dβ = Σ_i dout.

use sinew_core::{bail, Error, Result, Shape, Tensor, WithDType};

use crate::mode::Mode;

/// Configuration for [`batchnorm_forward`] / [`crate::spatial_batchnorm_forward`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNormConfig {
    /// Train (batch statistics) or test (running statistics). Required.
    pub mode: Mode,
    /// Added to the variance before the square root. Default `1e-5`.
    pub eps: f64,
    /// Decay of the running averages, in `[0, 1]`. Default `0.9`.
    pub momentum: f64,
}

impl BatchNormConfig {
    pub const DEFAULT_EPS: f64 = 1e-5;
    pub const DEFAULT_MOMENTUM: f64 = 0.9;

    /// Config with the default `eps` and `momentum`.
    pub fn new(mode: Mode) -> Self {
        BatchNormConfig {
            mode,
            eps: Self::DEFAULT_EPS,
            momentum: Self::DEFAULT_MOMENTUM,
        }
    }

    /// Build from a `"train"` / `"test"` string.
    pub fn from_mode_str(mode: &str) -> Result<Self> {
        Ok(Self::new(Mode::parse("batchnorm", mode)?))
    }

    pub fn with_eps(mut self, eps: f64) -> Result<Self> {
        self.eps = eps;
        self.validate()?;
        Ok(self)
    }

    pub fn with_momentum(mut self, momentum: f64) -> Result<Self> {
        self.momentum = momentum;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.eps >= 0.0 && self.eps.is_finite()) {
            return Err(Error::config(
                "batchnorm",
                format!("eps must be finite and >= 0, got {}", self.eps),
            ));
        }
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(Error::config(
                "batchnorm",
                format!("momentum must be in [0, 1], got {}", self.momentum),
            ));
        }
        Ok(())
    }
}

/// Caller-owned running mean and variance, one entry per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats<T: WithDType> {
    pub mean: Tensor<T>,
    pub var: Tensor<T>,
}

impl<T: WithDType> RunningStats<T> {
    /// Zero mean and zero variance for `features` features.
    pub fn zeros(features: usize) -> Self {
        RunningStats {
            mean: Tensor::zeros(features),
            var: Tensor::zeros(features),
        }
    }

    /// Wrap existing statistics; both must be `[D]`.
    pub fn new(mean: Tensor<T>, var: Tensor<T>) -> Result<Self> {
        mean.shape().expect_rank(1)?;
        var.expect_shape(mean.shape())?;
        Ok(RunningStats { mean, var })
    }

    pub fn features(&self) -> usize {
        self.mean.elem_count()
    }
}

/// Intermediates saved by a train-mode [`batchnorm_forward`].
///
/// Both backward variants read from the same cache.
#[derive(Debug, Clone)]
pub struct BatchNormCache<T: WithDType> {
    pub(crate) gamma: Tensor<T>,
    pub(crate) beta: Tensor<T>,
    pub(crate) eps: T,
    /// `[N, D]` raw input.
    pub(crate) x: Tensor<T>,
    /// `[N, D]` normalized input.
    pub(crate) xn: Tensor<T>,
    /// `[D]` batch mean.
    pub(crate) mean: Tensor<T>,
    /// `[D]` batch variance (uncorrected).
    pub(crate) var: Tensor<T>,
    /// `[N, D]` centered input `x - mean`.
    pub(crate) xc: Tensor<T>,
    /// `[D]` `sqrt(var + eps)`.
    pub(crate) std: Tensor<T>,
}

impl<T: WithDType> BatchNormCache<T> {
    pub fn normalized(&self) -> &Tensor<T> {
        &self.xn
    }

    pub fn batch_mean(&self) -> &Tensor<T> {
        &self.mean
    }

    pub fn batch_var(&self) -> &Tensor<T> {
        &self.var
    }

    pub fn gamma(&self) -> &Tensor<T> {
        &self.gamma
    }

    pub fn beta(&self) -> &Tensor<T> {
        &self.beta
    }

    pub fn eps(&self) -> T {
        self.eps
    }

    fn input_dims(&self) -> (usize, usize) {
        (self.x.dims()[0], self.x.dims()[1])
    }
}

/// Gradients returned by both batch-norm backward variants.
#[derive(Debug, Clone)]
pub struct BatchNormGrads<T: WithDType> {
    pub dx: Tensor<T>,
    pub dgamma: Tensor<T>,
    pub dbeta: Tensor<T>,
}

/// Batch normalization forward pass.
///
/// - `x`: `[N, D]`, `gamma`/`beta`: `[D]`
/// - `running`: `[D]` running statistics, updated in place in train mode
///
/// Returns the `[N, D]` output and, in train mode, the cache for backward.
/// Test mode returns `None`: it is inference only.
pub fn batchnorm_forward<T: WithDType>(
    x: &Tensor<T>,
    gamma: &Tensor<T>,
    beta: &Tensor<T>,
    config: &BatchNormConfig,
    running: &mut RunningStats<T>,
) -> Result<(Tensor<T>, Option<BatchNormCache<T>>)> {
    config.validate()?;
    x.shape().expect_rank(2)?;
    let (n, d) = (x.dims()[0], x.dims()[1]);
    let feature_shape = Shape::from(d);
    gamma.expect_shape(&feature_shape)?;
    beta.expect_shape(&feature_shape)?;
    running.mean.expect_shape(&feature_shape)?;
    running.var.expect_shape(&feature_shape)?;

    let eps = T::from_f64(config.eps);

    match config.mode {
        Mode::Train => {
            if n == 0 {
                bail!("batchnorm: train mode needs a non-empty batch");
            }
            let inv_n = T::one() / T::from_usize(n);

            let mean = x.sum_rows()?.scale(inv_n);
            let xc = broadcast_rows(x, &mean, |v, m| v - m);
            let var = xc.map(|v| v * v).sum_rows()?.scale(inv_n);
            let std = var.map(|v| (v + eps).sqrt());
            let xn = broadcast_rows(&xc, &std, |v, s| v / s);
            let out = scale_shift(&xn, gamma, beta);

            let momentum = T::from_f64(config.momentum);
            let blend = |running: &Tensor<T>, batch: &Tensor<T>| {
                running.zip_map(batch, |r, b| momentum * r + (T::one() - momentum) * b)
            };
            let new_mean = blend(&running.mean, &mean)?;
            let new_var = blend(&running.var, &var)?;
            running.mean = new_mean;
            running.var = new_var;
            tracing::debug!(
                batch = n,
                features = d,
                momentum = config.momentum,
                "batchnorm running statistics updated"
            );

            let cache = BatchNormCache {
                gamma: gamma.clone(),
                beta: beta.clone(),
                eps,
                x: x.clone(),
                xn,
                mean,
                var,
                xc,
                std,
            };
            Ok((out, Some(cache)))
        }
        Mode::Test => {
            let std = running.var.map(|v| (v + eps).sqrt());
            let xc = broadcast_rows(x, &running.mean, |v, m| v - m);
            let xn = broadcast_rows(&xc, &std, |v, s| v / s);
            Ok((scale_shift(&xn, gamma, beta), None))
        }
    }
}

/// Batch-norm backward by reversing the forward graph node by node.
pub fn batchnorm_backward<T: WithDType>(
    dout: &Tensor<T>,
    cache: &BatchNormCache<T>,
) -> Result<BatchNormGrads<T>> {
    let (n, _) = cache.input_dims();
    dout.expect_shape(cache.x.shape())?;
    let inv_n = T::one() / T::from_usize(n);
    let two = T::from_f64(2.0);

    // out = γ·xn + β
    let dgamma = dout.mul(&cache.xn)?.sum_rows()?;
    let dbeta = dout.sum_rows()?;
    let dxn = broadcast_rows(dout, &cache.gamma, |g, gm| g * gm);

    // xn = xc · (1/std): two inputs, xc [N, D] and inv_std [D] broadcast over rows
    let inv_std = cache.std.map(|s| T::one() / s);
    let dxc = broadcast_rows(&dxn, &inv_std, |g, is| g * is);
    let dinv_std = dxn.mul(&cache.xc)?.sum_rows()?;

    // inv_std = 1/std
    let dstd = dinv_std.zip_map(&cache.std, |g, s| -g / (s * s))?;
    // std = sqrt(var + ε)
    let dvar = dstd.zip_map(&cache.std, |g, s| g * T::from_f64(0.5) / s)?;

    // xc = x - mean: direct path into x, negated sum into mean
    let mut dx = dxc.clone();
    let mut dmean = dxc.sum_rows()?.scale(-T::one());

    // var = (1/N) Σ (x - mean)²: reaches both x and mean
    let mean_xc = cache.xc.sum_rows()?.scale(inv_n);
    dmean = dmean.add(&dvar.zip_map(&mean_xc, |g, m| -two * g * m)?)?;
    let dx_var = broadcast_rows(&cache.xc, &dvar, |xc, g| two * g * xc * inv_n);
    dx = dx.add(&dx_var)?;

    // mean = (1/N) Σ x
    let dx_mean = broadcast_rows(dout, &dmean, |_, g| g * inv_n);
    dx = dx.add(&dx_mean)?;

    Ok(BatchNormGrads { dx, dgamma, dbeta })
}

/// Batch-norm backward via the simplified closed form.
pub fn batchnorm_backward_alt<T: WithDType>(
    dout: &Tensor<T>,
    cache: &BatchNormCache<T>,
) -> Result<BatchNormGrads<T>> {
    let (n, d) = cache.input_dims();
    dout.expect_shape(cache.x.shape())?;
    let nf = T::from_usize(n);

    let dbeta = dout.sum_rows()?;
    let dgamma = dout.mul(&cache.xn)?.sum_rows()?;
    let dout_xc = dout.mul(&cache.xc)?.sum_rows()?;

    let mut dx = Tensor::zeros((n, d));
    {
        let g = dout.as_slice();
        let xc = cache.xc.as_slice();
        let sum_g = dbeta.as_slice();
        let sum_gxc = dout_xc.as_slice();
        let gamma = cache.gamma.as_slice();
        let var = cache.var.as_slice();
        let std = cache.std.as_slice();
        let eps = cache.eps;
        for (i, v) in dx.as_mut_slice().iter_mut().enumerate() {
            let j = i % d;
            let inner = nf * g[i] - sum_g[j] - xc[i] * sum_gxc[j] / (var[j] + eps);
            *v = gamma[j] / (nf * std[j]) * inner;
        }
    }

    Ok(BatchNormGrads { dx, dgamma, dbeta })
}

// Broadcast helpers over [N, D] × [D]

/// `f(m[i, j], v[j])` for every element of an `[N, D]` matrix.
fn broadcast_rows<T: WithDType>(m: &Tensor<T>, v: &Tensor<T>, f: impl Fn(T, T) -> T) -> Tensor<T> {
    let d = v.elem_count();
    let vs = v.as_slice();
    let mut out = m.clone();
    if d > 0 {
        for row in out.as_mut_slice().chunks_mut(d) {
            for (x, &vj) in row.iter_mut().zip(vs) {
                *x = f(*x, vj);
            }
        }
    }
    out
}

fn scale_shift<T: WithDType>(xn: &Tensor<T>, gamma: &Tensor<T>, beta: &Tensor<T>) -> Tensor<T> {
    let scaled = broadcast_rows(xn, gamma, |v, g| v * g);
    broadcast_rows(&scaled, beta, |v, b| v + b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn column(t: &Tensor<f64>, j: usize) -> Vec<f64> {
        let d = t.dims()[1];
        t.as_slice().iter().skip(j).step_by(d).copied().collect()
    }

    #[test]
    fn test_train_updates_running_stats() {
        // N=4, D=1: mean 2.5, var 1.25
        let x = Tensor::<f64>::from_vec(vec![1.0, 2.0, 3.0, 4.0], (4, 1)).unwrap();
        let gamma = Tensor::ones(1);
        let beta = Tensor::zeros(1);
        let mut running = RunningStats::zeros(1);
        let cfg = BatchNormConfig::new(Mode::Train);

        let (_, cache) = batchnorm_forward(&x, &gamma, &beta, &cfg, &mut running).unwrap();
        let cache = cache.unwrap();
        assert!((cache.batch_mean().as_slice()[0] - 2.5).abs() < 1e-12);
        assert!((cache.batch_var().as_slice()[0] - 1.25).abs() < 1e-12);
        // running = 0.9 * 0 + 0.1 * stat
        assert!((running.mean.as_slice()[0] - 0.25).abs() < 1e-12);
        assert!((running.var.as_slice()[0] - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_test_mode_uses_running_stats_untouched() {
        let x = Tensor::<f64>::from_vec(vec![1.0, 2.0, 3.0, 4.0], (4, 1)).unwrap();
        let gamma = Tensor::ones(1);
        let beta = Tensor::zeros(1);
        let mut running = RunningStats::new(
            Tensor::from_vec(vec![10.0], 1).unwrap(),
            Tensor::from_vec(vec![4.0], 1).unwrap(),
        )
        .unwrap();
        let cfg = BatchNormConfig::new(Mode::Test).with_eps(0.0).unwrap();

        let (out, cache) = batchnorm_forward(&x, &gamma, &beta, &cfg, &mut running).unwrap();
        assert!(cache.is_none());
        let expected: Vec<f64> = [1.0, 2.0, 3.0, 4.0].iter().map(|v| (v - 10.0) / 2.0).collect();
        assert_eq!(out.as_slice(), expected.as_slice());
        assert_eq!(running.mean.as_slice(), &[10.0]);
        assert_eq!(running.var.as_slice(), &[4.0]);
    }

    #[test]
    fn test_scale_and_shift_applied() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = Tensor::<f64>::randn((50, 3), &mut rng).scale(4.0);
        let gamma = Tensor::from_vec(vec![1.0, 2.0, 3.0], 3).unwrap();
        let beta = Tensor::from_vec(vec![0.0, -1.0, 5.0], 3).unwrap();
        let mut running = RunningStats::zeros(3);
        let cfg = BatchNormConfig::new(Mode::Train);

        let (out, _) = batchnorm_forward(&x, &gamma, &beta, &cfg, &mut running).unwrap();
        for j in 0..3 {
            let col = column(&out, j);
            let mean = col.iter().sum::<f64>() / col.len() as f64;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / col.len() as f64;
            assert!((mean - beta.as_slice()[j]).abs() < 1e-9);
            assert!((var.sqrt() - gamma.as_slice()[j]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_rejects_bad_shapes_before_touching_state() {
        let x = Tensor::<f64>::ones((4, 3));
        let gamma = Tensor::ones(2);
        let beta = Tensor::zeros(3);
        let mut running = RunningStats::new(Tensor::full(3, 7.0), Tensor::full(3, 7.0)).unwrap();
        let before = running.clone();
        let cfg = BatchNormConfig::new(Mode::Train);
        assert!(batchnorm_forward(&x, &gamma, &beta, &cfg, &mut running).is_err());
        assert_eq!(running, before);
    }

    #[test]
    fn test_config_validation() {
        assert!(BatchNormConfig::from_mode_str("train").is_ok());
        assert!(matches!(
            BatchNormConfig::from_mode_str("validate"),
            Err(Error::InvalidMode { kernel: "batchnorm", .. })
        ));
        assert!(BatchNormConfig::new(Mode::Train).with_momentum(1.5).is_err());
        assert!(BatchNormConfig::new(Mode::Train).with_eps(-1.0).is_err());
    }

    #[test]
    fn test_empty_batch_rejected() {
        let x = Tensor::<f64>::zeros((0, 3));
        let mut running = RunningStats::zeros(3);
        let cfg = BatchNormConfig::new(Mode::Train);
        let res = batchnorm_forward(&x, &Tensor::ones(3), &Tensor::zeros(3), &cfg, &mut running);
        assert!(res.is_err());
    }

    #[test]
    fn test_backward_variants_agree() {
        let mut rng = StdRng::seed_from_u64(11);
        let x = Tensor::<f64>::randn((8, 5), &mut rng).scale(3.0).map(|v| v + 2.0);
        let gamma = Tensor::randn(5, &mut rng);
        let beta = Tensor::randn(5, &mut rng);
        let dout = Tensor::randn((8, 5), &mut rng);
        let mut running = RunningStats::zeros(5);
        let cfg = BatchNormConfig::new(Mode::Train);

        let (_, cache) = batchnorm_forward(&x, &gamma, &beta, &cfg, &mut running).unwrap();
        let cache = cache.unwrap();
        let a = batchnorm_backward(&dout, &cache).unwrap();
        let b = batchnorm_backward_alt(&dout, &cache).unwrap();
        assert!(a.dx.rel_error(&b.dx).unwrap() < 1e-9);
        assert!(a.dgamma.rel_error(&b.dgamma).unwrap() < 1e-12);
        assert!(a.dbeta.rel_error(&b.dbeta).unwrap() < 1e-12);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_train_output_is_standardized(
            seed in any::<u64>(),
            n in 4usize..32,
            d in 1usize..6,
            spread in 0.5f64..20.0,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let x = Tensor::<f64>::randn((n, d), &mut rng).scale(spread);
            let mut running = RunningStats::zeros(d);
            let cfg = BatchNormConfig::new(Mode::Train).with_eps(0.0).unwrap();
            let (out, _) = batchnorm_forward(
                &x, &Tensor::ones(d), &Tensor::zeros(d), &cfg, &mut running,
            ).unwrap();
            for j in 0..d {
                let col = column(&out, j);
                let mean = col.iter().sum::<f64>() / n as f64;
                let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
                prop_assert!(mean.abs() < 1e-9);
                prop_assert!((var - 1.0).abs() < 1e-9);
            }
        }
    }
}
