// MaxPool — 2D max-pooling kernel
//
//   x:   [N, C, H, W]
//   out: [N, C, H', W'],   H' = (H - HH) / stride + 1   (no padding, exact)
//
// Each (n, c) plane is pooled independently, so planes are spread across the
// rayon pool.
//
// BACKWARD:
//
//   Every input position in a window whose value equals that window's max
//   receives the window's full upstream gradient. Ties are not split, and
//   positions shared by overlapping windows accumulate.

use rayon::prelude::*;
use sinew_core::{Error, Result, Shape, Tensor, WithDType};

use crate::window::output_extent;

/// Window size and stride for [`max_pool_forward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolConfig {
    pub pool_height: usize,
    pub pool_width: usize,
    pub stride: usize,
}

impl Default for PoolConfig {
    /// 2x2 windows, stride 2.
    fn default() -> Self {
        PoolConfig {
            pool_height: 2,
            pool_width: 2,
            stride: 2,
        }
    }
}

impl PoolConfig {
    pub fn new(pool_height: usize, pool_width: usize, stride: usize) -> Result<Self> {
        let config = PoolConfig {
            pool_height,
            pool_width,
            stride,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_height == 0 || self.pool_width == 0 || self.stride == 0 {
            return Err(Error::config(
                "max_pool",
                format!(
                    "pool_height, pool_width and stride must be positive, got {}x{} stride {}",
                    self.pool_height, self.pool_width, self.stride
                ),
            ));
        }
        Ok(())
    }
}

/// Input, output and config saved by [`max_pool_forward`].
#[derive(Debug, Clone)]
pub struct PoolCache<T: WithDType> {
    x: Tensor<T>,
    out: Tensor<T>,
    config: PoolConfig,
}

impl<T: WithDType> PoolCache<T> {
    pub fn input(&self) -> &Tensor<T> {
        &self.x
    }

    pub fn output(&self) -> &Tensor<T> {
        &self.out
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

/// Max-pooling forward pass.
pub fn max_pool_forward<T: WithDType>(
    x: &Tensor<T>,
    config: &PoolConfig,
) -> Result<(Tensor<T>, PoolCache<T>)> {
    config.validate()?;
    x.shape().expect_rank(4)?;
    let (n, c, h, w) = (x.dims()[0], x.dims()[1], x.dims()[2], x.dims()[3]);
    let (ph, pw, s) = (config.pool_height, config.pool_width, config.stride);
    let h_out = output_extent("max_pool", "height", h, 0, ph, s)?;
    let w_out = output_extent("max_pool", "width", w, 0, pw, s)?;
    tracing::trace!(input = %x.shape(), h_out, w_out, "max_pool forward");

    let plane_in = h * w;
    let plane_out = h_out * w_out;
    let xs = x.as_slice();
    let mut out = vec![T::zero(); n * c * plane_out];

    out.par_chunks_mut(plane_out)
        .enumerate()
        .for_each(|(p, out_plane)| {
            let plane = &xs[p * plane_in..(p + 1) * plane_in];
            for oh in 0..h_out {
                for ow in 0..w_out {
                    let mut best = T::neg_infinity();
                    for ki in 0..ph {
                        let row = (oh * s + ki) * w;
                        for kj in 0..pw {
                            let v = plane[row + ow * s + kj];
                            if v > best {
                                best = v;
                            }
                        }
                    }
                    out_plane[oh * w_out + ow] = best;
                }
            }
        });

    let out = Tensor::from_vec(out, (n, c, h_out, w_out))?;
    let cache = PoolCache {
        x: x.clone(),
        out: out.clone(),
        config: *config,
    };
    Ok((out, cache))
}

/// Max-pooling backward pass. `dout` must match the forward output's shape.
pub fn max_pool_backward<T: WithDType>(dout: &Tensor<T>, cache: &PoolCache<T>) -> Result<Tensor<T>> {
    dout.expect_shape(cache.out.shape())?;
    let dims = cache.x.dims();
    let (h, w) = (dims[2], dims[3]);
    let (h_out, w_out) = (cache.out.dims()[2], cache.out.dims()[3]);
    let (ph, pw, s) = (
        cache.config.pool_height,
        cache.config.pool_width,
        cache.config.stride,
    );

    let plane_in = h * w;
    let plane_out = h_out * w_out;
    let xs = cache.x.as_slice();
    let maxes = cache.out.as_slice();
    let gs = dout.as_slice();
    let mut dx = vec![T::zero(); xs.len()];

    dx.par_chunks_mut(plane_in)
        .enumerate()
        .for_each(|(p, dx_plane)| {
            let plane = &xs[p * plane_in..(p + 1) * plane_in];
            let base = p * plane_out;
            for oh in 0..h_out {
                for ow in 0..w_out {
                    let best = maxes[base + oh * w_out + ow];
                    let g = gs[base + oh * w_out + ow];
                    for ki in 0..ph {
                        let row = (oh * s + ki) * w;
                        for kj in 0..pw {
                            let idx = row + ow * s + kj;
                            if plane[idx] == best {
                                dx_plane[idx] += g;
                            }
                        }
                    }
                }
            }
        });

    Tensor::from_vec(dx, cache.x.shape())
}

/// Expected pooled shape for an input shape, without running the kernel.
pub fn max_pool_output_shape(input: &Shape, config: &PoolConfig) -> Result<Shape> {
    config.validate()?;
    input.expect_rank(4)?;
    let d = input.dims();
    let h_out = output_extent("max_pool", "height", d[2], 0, config.pool_height, config.stride)?;
    let w_out = output_extent("max_pool", "width", d[3], 0, config.pool_width, config.stride)?;
    Ok(Shape::from((d[0], d[1], h_out, w_out)))
}
