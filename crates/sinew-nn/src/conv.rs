// Conv — 2D convolution kernel (cross-correlation)
//
// PARAMETER SHAPES:
//
//   x:   [N, C, H, W]
//   w:   [F, C, HH, WW]
//   b:   [F]
//   out: [N, F, H', W']
//
// OUTPUT SIZE:
//
//   H' = (H + 2*pad - HH) / stride + 1      (must divide exactly)
//   W' = (W + 2*pad - WW) / stride + 1
//
// ALGORITHM (per sample, samples in parallel):
//
//   cols  = im2col(x[n])            [C*HH*WW, H'*W']   zero padding folded in
//   out_n = w_flat @ cols + b       [F, H'*W']
//
// BACKWARD (per sample, then reduced over the batch in sample order):
//
//   dw_n  = dout_n @ colsᵀ          [F, C*HH*WW]
//   dcols = w_flatᵀ @ dout_n        [C*HH*WW, H'*W']
//   dx_n  = col2im(dcols)           overlapping windows accumulate, padding dropped
//   db_n  = Σ_positions dout_n

use rayon::prelude::*;
use sinew_core::ops::{gemm, gemm_a_bt, gemm_at_b};
use sinew_core::{Error, Result, Shape, Tensor, WithDType};

use crate::window::output_extent;

/// Stride and zero padding for [`conv_forward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvConfig {
    /// Step between receptive fields along both axes. Default `1`.
    pub stride: usize,
    /// Zeros added on every spatial border. Default `0`.
    pub pad: usize,
}

impl Default for ConvConfig {
    fn default() -> Self {
        ConvConfig { stride: 1, pad: 0 }
    }
}

impl ConvConfig {
    pub fn new(stride: usize, pad: usize) -> Result<Self> {
        let config = ConvConfig { stride, pad };
        config.validate()?;
        Ok(config)
    }

    pub fn with_stride(mut self, stride: usize) -> Result<Self> {
        self.stride = stride;
        self.validate()?;
        Ok(self)
    }

    pub fn with_pad(mut self, pad: usize) -> Self {
        self.pad = pad;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(Error::config("conv", "stride must be positive"));
        }
        Ok(())
    }
}

/// Everything im2col/col2im need to know about one sample.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    channels: usize,
    height: usize,
    width: usize,
    kernel_h: usize,
    kernel_w: usize,
    stride: usize,
    pad: usize,
    out_h: usize,
    out_w: usize,
}

impl Geometry {
    fn sample_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    fn col_rows(&self) -> usize {
        self.channels * self.kernel_h * self.kernel_w
    }

    fn col_cols(&self) -> usize {
        self.out_h * self.out_w
    }

    /// Input coordinate hit by kernel offset `(ki, kj)` at output `(oh, ow)`,
    /// or `None` when it falls in the zero padding.
    #[inline]
    fn source(&self, oh: usize, ow: usize, ki: usize, kj: usize) -> Option<(usize, usize)> {
        let ih = (oh * self.stride + ki).checked_sub(self.pad)?;
        let iw = (ow * self.stride + kj).checked_sub(self.pad)?;
        (ih < self.height && iw < self.width).then_some((ih, iw))
    }
}

/// Unroll every receptive field of one sample into a column.
fn im2col<T: WithDType>(input: &[T], g: &Geometry, columns: &mut [T]) {
    let col_cols = g.col_cols();
    for ci in 0..g.channels {
        for ki in 0..g.kernel_h {
            for kj in 0..g.kernel_w {
                let row = (ci * g.kernel_h + ki) * g.kernel_w + kj;
                let dst = &mut columns[row * col_cols..(row + 1) * col_cols];
                for oh in 0..g.out_h {
                    for ow in 0..g.out_w {
                        dst[oh * g.out_w + ow] = match g.source(oh, ow, ki, kj) {
                            Some((ih, iw)) => input[(ci * g.height + ih) * g.width + iw],
                            None => T::zero(),
                        };
                    }
                }
            }
        }
    }
}

/// Scatter-add columns back into an image. `output` must start zeroed.
fn col2im<T: WithDType>(columns: &[T], g: &Geometry, output: &mut [T]) {
    let col_cols = g.col_cols();
    for ci in 0..g.channels {
        for ki in 0..g.kernel_h {
            for kj in 0..g.kernel_w {
                let row = (ci * g.kernel_h + ki) * g.kernel_w + kj;
                let src = &columns[row * col_cols..(row + 1) * col_cols];
                for oh in 0..g.out_h {
                    for ow in 0..g.out_w {
                        if let Some((ih, iw)) = g.source(oh, ow, ki, kj) {
                            output[(ci * g.height + ih) * g.width + iw] += src[oh * g.out_w + ow];
                        }
                    }
                }
            }
        }
    }
}

/// Values saved by [`conv_forward`] for [`conv_backward`].
#[derive(Debug, Clone)]
pub struct ConvCache<T: WithDType> {
    x: Tensor<T>,
    w: Tensor<T>,
    b: Tensor<T>,
    config: ConvConfig,
    geometry: Geometry,
}

impl<T: WithDType> ConvCache<T> {
    pub fn input(&self) -> &Tensor<T> {
        &self.x
    }

    pub fn filters(&self) -> &Tensor<T> {
        &self.w
    }

    pub fn bias(&self) -> &Tensor<T> {
        &self.b
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    /// `(H', W')`
    pub fn output_hw(&self) -> (usize, usize) {
        (self.geometry.out_h, self.geometry.out_w)
    }
}

/// Gradients returned by [`conv_backward`].
#[derive(Debug, Clone)]
pub struct ConvGrads<T: WithDType> {
    /// `[N, C, H, W]`
    pub dx: Tensor<T>,
    /// `[F, C, HH, WW]`
    pub dw: Tensor<T>,
    /// `[F]`
    pub db: Tensor<T>,
}

/// Convolution forward pass.
///
/// Fails with [`Error::NonIntegralOutput`] when the filters do not tile the
/// padded input exactly under `config.stride`.
pub fn conv_forward<T: WithDType>(
    x: &Tensor<T>,
    w: &Tensor<T>,
    b: &Tensor<T>,
    config: &ConvConfig,
) -> Result<(Tensor<T>, ConvCache<T>)> {
    config.validate()?;
    x.shape().expect_rank(4)?;
    w.shape().expect_rank(4)?;
    let (n, c, h, wd) = (x.dims()[0], x.dims()[1], x.dims()[2], x.dims()[3]);
    let (f, hh, ww) = (w.dims()[0], w.dims()[2], w.dims()[3]);
    w.expect_shape(&Shape::from((f, c, hh, ww)))?;
    b.expect_shape(&Shape::from(f))?;

    let geometry = Geometry {
        channels: c,
        height: h,
        width: wd,
        kernel_h: hh,
        kernel_w: ww,
        stride: config.stride,
        pad: config.pad,
        out_h: output_extent("conv", "height", h, config.pad, hh, config.stride)?,
        out_w: output_extent("conv", "width", wd, config.pad, ww, config.stride)?,
    };
    tracing::trace!(
        input = %x.shape(),
        filters = %w.shape(),
        stride = config.stride,
        pad = config.pad,
        out_h = geometry.out_h,
        out_w = geometry.out_w,
        "conv forward"
    );

    let (rows, cols_n, sample_len) = (geometry.col_rows(), geometry.col_cols(), geometry.sample_len());
    let out_len = f * cols_n;
    let mut out = vec![T::zero(); n * out_len];
    let xs = x.as_slice();
    let ws = w.as_slice();
    let bias = b.as_slice();

    if out_len > 0 {
        out.par_chunks_mut(out_len)
            .enumerate()
            .for_each(|(i, out_s)| {
                let mut columns = vec![T::zero(); rows * cols_n];
                im2col(&xs[i * sample_len..(i + 1) * sample_len], &geometry, &mut columns);
                gemm(ws, &columns, out_s, f, cols_n, rows);
                for (row, &bf) in out_s.chunks_mut(cols_n).zip(bias) {
                    for v in row {
                        *v += bf;
                    }
                }
            });
    }

    let out = Tensor::from_vec(out, (n, f, geometry.out_h, geometry.out_w))?;
    let cache = ConvCache {
        x: x.clone(),
        w: w.clone(),
        b: b.clone(),
        config: *config,
        geometry,
    };
    Ok((out, cache))
}

/// Convolution backward pass. `dout` must be `[N, F, H', W']`.
pub fn conv_backward<T: WithDType>(dout: &Tensor<T>, cache: &ConvCache<T>) -> Result<ConvGrads<T>> {
    let g = cache.geometry;
    let n = cache.x.dims()[0];
    let f = cache.w.dims()[0];
    dout.expect_shape(&Shape::from((n, f, g.out_h, g.out_w)))?;

    let (rows, cols_n, sample_len) = (g.col_rows(), g.col_cols(), g.sample_len());
    let xs = cache.x.as_slice();
    let ws = cache.w.as_slice();
    let gs = dout.as_slice();
    let out_len = f * cols_n;

    let per_sample: Vec<(Vec<T>, Vec<T>, Vec<T>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let g_s = &gs[i * out_len..(i + 1) * out_len];

            let mut columns = vec![T::zero(); rows * cols_n];
            im2col(&xs[i * sample_len..(i + 1) * sample_len], &g, &mut columns);

            let mut dw_s = vec![T::zero(); f * rows];
            gemm_a_bt(g_s, &columns, &mut dw_s, f, rows, cols_n);

            let mut dcols = vec![T::zero(); rows * cols_n];
            gemm_at_b(ws, g_s, &mut dcols, rows, cols_n, f);
            let mut dx_s = vec![T::zero(); sample_len];
            col2im(&dcols, &g, &mut dx_s);

            let db_s = (0..f)
                .map(|fi| g_s[fi * cols_n..(fi + 1) * cols_n].iter().copied().sum())
                .collect();
            (dx_s, dw_s, db_s)
        })
        .collect();

    let mut dx = Vec::with_capacity(n * sample_len);
    let mut dw = vec![T::zero(); f * rows];
    let mut db = vec![T::zero(); f];
    for (dx_s, dw_s, db_s) in per_sample {
        dx.extend(dx_s);
        for (acc, v) in dw.iter_mut().zip(dw_s) {
            *acc += v;
        }
        for (acc, v) in db.iter_mut().zip(db_s) {
            *acc += v;
        }
    }

    Ok(ConvGrads {
        dx: Tensor::from_vec(dx, cache.x.shape())?,
        dw: Tensor::from_vec(dw, cache.w.shape())?,
        db: Tensor::from_vec(db, f)?,
    })
}
