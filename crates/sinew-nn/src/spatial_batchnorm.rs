// Spatial BatchNorm — per-channel batch normalization of [N, C, H, W] maps
//
// Every spatial position of every example is treated as one more sample of
// its channel:
//
//   [N, C, H, W] → permute(0, 2, 3, 1) → [N, H, W, C] → reshape [N*H*W, C]
//                → batchnorm → reshape [N, H, W, C] → permute(0, 3, 1, 2)
//
// Backward applies the same layout change to dout, runs the closed-form
// batch-norm backward, and undoes it on dx.

use sinew_core::{Result, Shape, Tensor, WithDType};

use crate::batchnorm::{
    batchnorm_backward_alt, batchnorm_forward, BatchNormCache, BatchNormConfig, BatchNormGrads,
    RunningStats,
};

const TO_CHANNELS_LAST: [usize; 4] = [0, 2, 3, 1];
const TO_CHANNELS_FIRST: [usize; 4] = [0, 3, 1, 2];

/// Batch-norm cache plus the `[N, C, H, W]` input shape.
#[derive(Debug, Clone)]
pub struct SpatialBatchNormCache<T: WithDType> {
    inner: BatchNormCache<T>,
    input_shape: Shape,
}

impl<T: WithDType> SpatialBatchNormCache<T> {
    pub fn batchnorm(&self) -> &BatchNormCache<T> {
        &self.inner
    }

    pub fn input_shape(&self) -> &Shape {
        &self.input_shape
    }
}

/// `[N, C, H, W]` → `[N*H*W, C]`
fn flatten_channels_last<T: WithDType>(x: &Tensor<T>) -> Result<Tensor<T>> {
    x.shape().expect_rank(4)?;
    let c = x.dims()[1];
    let rows = x.elem_count().checked_div(c).unwrap_or(0);
    x.permute(&TO_CHANNELS_LAST)?.into_reshape((rows, c))
}

/// `[N*H*W, C]` → `[N, C, H, W]`
fn unflatten_channels_first<T: WithDType>(m: Tensor<T>, shape: &Shape) -> Result<Tensor<T>> {
    let d = shape.dims();
    m.into_reshape((d[0], d[2], d[3], d[1]))?
        .permute(&TO_CHANNELS_FIRST)
}

/// Spatial batch-normalization forward pass.
///
/// - `x`: `[N, C, H, W]`, `gamma`/`beta`/`running`: `[C]`
///
/// Mode handling and the running-statistics update are those of
/// [`batchnorm_forward`].
pub fn spatial_batchnorm_forward<T: WithDType>(
    x: &Tensor<T>,
    gamma: &Tensor<T>,
    beta: &Tensor<T>,
    config: &BatchNormConfig,
    running: &mut RunningStats<T>,
) -> Result<(Tensor<T>, Option<SpatialBatchNormCache<T>>)> {
    let flat = flatten_channels_last(x)?;
    let (out, cache) = batchnorm_forward(&flat, gamma, beta, config, running)?;
    let out = unflatten_channels_first(out, x.shape())?;
    let cache = cache.map(|inner| SpatialBatchNormCache {
        inner,
        input_shape: x.shape().clone(),
    });
    Ok((out, cache))
}

/// Spatial batch-normalization backward pass. `dx` comes back as `[N, C, H, W]`.
pub fn spatial_batchnorm_backward<T: WithDType>(
    dout: &Tensor<T>,
    cache: &SpatialBatchNormCache<T>,
) -> Result<BatchNormGrads<T>> {
    dout.expect_shape(&cache.input_shape)?;
    let flat = flatten_channels_last(dout)?;
    let grads = batchnorm_backward_alt(&flat, &cache.inner)?;
    Ok(BatchNormGrads {
        dx: unflatten_channels_first(grads.dx, &cache.input_shape)?,
        dgamma: grads.dgamma,
        dbeta: grads.dbeta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_per_channel_standardization() {
        let mut rng = StdRng::seed_from_u64(4);
        let (n, c, h, w) = (3, 2, 4, 5);
        let x = Tensor::<f64>::randn((n, c, h, w), &mut rng).scale(3.0);
        let mut running = RunningStats::zeros(c);
        let cfg = BatchNormConfig::new(Mode::Train).with_eps(0.0).unwrap();
        let (out, cache) =
            spatial_batchnorm_forward(&x, &Tensor::ones(c), &Tensor::zeros(c), &cfg, &mut running)
                .unwrap();
        assert_eq!(out.dims(), &[n, c, h, w]);
        assert_eq!(cache.unwrap().input_shape(), x.shape());

        for ci in 0..c {
            let mut vals = Vec::new();
            for ni in 0..n {
                for hi in 0..h {
                    for wi in 0..w {
                        vals.push(out.get(&[ni, ci, hi, wi]).unwrap());
                    }
                }
            }
            let mean = vals.iter().sum::<f64>() / vals.len() as f64;
            let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / vals.len() as f64;
            assert!(mean.abs() < 1e-10);
            assert!((var - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_test_mode_uses_running_stats_per_channel() {
        let mut rng = StdRng::seed_from_u64(5);
        let (n, c, h, w) = (2, 2, 3, 3);
        let x = Tensor::<f64>::randn((n, c, h, w), &mut rng);
        let mut running =
            RunningStats::new(Tensor::from_vec(vec![1.0, -2.0], 2).unwrap(), Tensor::full(2, 4.0))
                .unwrap();
        let before = running.clone();
        let gamma = Tensor::from_vec(vec![2.0, 0.5], 2).unwrap();
        let beta = Tensor::from_vec(vec![0.0, 1.0], 2).unwrap();
        let cfg = BatchNormConfig::new(Mode::Test).with_eps(0.0).unwrap();

        let (out, cache) = spatial_batchnorm_forward(&x, &gamma, &beta, &cfg, &mut running).unwrap();
        assert!(cache.is_none());
        assert_eq!(running, before);
        assert_eq!(out.dims(), &[n, c, h, w]);

        // y = gamma[c] * (x - mean[c]) / sqrt(var[c]) + beta[c]
        let (mean, g, b) = ([1.0, -2.0], [2.0, 0.5], [0.0, 1.0]);
        for ni in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        let idx = [ni, ci, hi, wi];
                        let expected = g[ci] * (x.get(&idx).unwrap() - mean[ci]) / 2.0 + b[ci];
                        assert!((out.get(&idx).unwrap() - expected).abs() < 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn test_backward_shapes() {
        let mut rng = StdRng::seed_from_u64(8);
        let x = Tensor::<f64>::randn((2, 3, 2, 2), &mut rng);
        let mut running = RunningStats::zeros(3);
        let cfg = BatchNormConfig::new(Mode::Train);
        let (_, cache) =
            spatial_batchnorm_forward(&x, &Tensor::ones(3), &Tensor::zeros(3), &cfg, &mut running)
                .unwrap();
        let dout = Tensor::<f64>::randn((2, 3, 2, 2), &mut rng);
        let grads = spatial_batchnorm_backward(&dout, &cache.unwrap()).unwrap();
        assert_eq!(grads.dx.dims(), &[2, 3, 2, 2]);
        assert_eq!(grads.dgamma.dims(), &[3]);
        assert_eq!(grads.dbeta.dims(), &[3]);
    }

    #[test]
    fn test_rejects_non_4d_input() {
        let x = Tensor::<f64>::zeros((4, 3));
        let mut running = RunningStats::zeros(3);
        let cfg = BatchNormConfig::new(Mode::Train);
        assert!(spatial_batchnorm_forward(
            &x,
            &Tensor::ones(3),
            &Tensor::zeros(3),
            &cfg,
            &mut running
        )
        .is_err());
    }
}
