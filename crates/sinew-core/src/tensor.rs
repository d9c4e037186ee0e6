use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::ops;
use crate::shape::Shape;

// Tensor: dense, owned, row-major n-dimensional array
//
// Kernels are pure functions over values, so the tensor carries no graph,
// no device and no shared storage: it is a Vec<T> plus a Shape. Cloning
// copies the data, which is exactly what the cache semantics want (a cache
// owns what it saved, nobody else can mutate it afterwards).
//
// LAYOUT:
//
//   Element [i0, i1, ..., ik] lives at  sum(i_d * stride_d)  where the
//   strides are Shape::stride_contiguous(). Permutes materialize a new
//   contiguous buffer instead of producing strided views.

/// An n-dimensional array of `f32` or `f64`.
///
/// # Example
/// ```
/// use sinew_core::Tensor;
///
/// let a = Tensor::<f64>::from_vec(vec![1.0, 2.0, 3.0, 4.0], (2, 2))?;
/// let b = Tensor::<f64>::ones((2, 2));
/// let c = a.matmul(&b)?;
/// assert_eq!(c.as_slice(), &[3.0, 3.0, 7.0, 7.0]);
/// # Ok::<(), sinew_core::Error>(())
/// ```
#[derive(Clone, PartialEq)]
pub struct Tensor<T: WithDType> {
    data: Vec<T>,
    shape: Shape,
}

impl<T: WithDType> std::fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tensor(shape={}, dtype={}", self.shape, T::DTYPE)?;
        if self.data.len() <= 16 {
            write!(f, ", data={:?}", self.data)?;
        }
        write!(f, ")")
    }
}

impl<T: WithDType> Tensor<T> {
    // Constructors

    /// Wrap a flat row-major buffer. Fails if the length does not match the shape.
    pub fn from_vec(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        Ok(Tensor { data, shape })
    }

    /// Tensor filled with a single value.
    pub fn full(shape: impl Into<Shape>, value: T) -> Self {
        let shape = shape.into();
        Tensor {
            data: vec![value; shape.elem_count()],
            shape,
        }
    }

    pub fn zeros(shape: impl Into<Shape>) -> Self {
        Self::full(shape, T::zero())
    }

    pub fn ones(shape: impl Into<Shape>) -> Self {
        Self::full(shape, T::one())
    }

    /// Samples from U[0, 1) drawn from the given generator.
    pub fn rand<R: Rng + ?Sized>(shape: impl Into<Shape>, rng: &mut R) -> Self {
        let shape = shape.into();
        let data = (0..shape.elem_count())
            .map(|_| T::from_f64(rng.gen::<f64>()))
            .collect();
        Tensor { data, shape }
    }

    /// Samples from N(0, 1) drawn from the given generator.
    pub fn randn<R: Rng + ?Sized>(shape: impl Into<Shape>, rng: &mut R) -> Self {
        let shape = shape.into();
        let data = (0..shape.elem_count())
            .map(|_| {
                let v: f64 = StandardNormal.sample(rng);
                T::from_f64(v)
            })
            .collect();
        Tensor { data, shape }
    }

    /// Evenly spaced values in `[start, stop]`, reshaped to `shape`.
    pub fn linspace(start: f64, stop: f64, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let n = shape.elem_count();
        let step = if n > 1 {
            (stop - start) / (n - 1) as f64
        } else {
            0.0
        };
        let data = (0..n)
            .map(|i| T::from_f64(start + step * i as f64))
            .collect();
        Tensor { data, shape }
    }

    // Accessors

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.data.len()
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.iter().map(|v| v.as_f64()).collect()
    }

    /// Element at a multi-dimensional index.
    pub fn get(&self, index: &[usize]) -> Result<T> {
        let offset = self.offset_of(index)?;
        Ok(self.data[offset])
    }

    /// Overwrite the element at a multi-dimensional index.
    pub fn set(&mut self, index: &[usize], value: T) -> Result<()> {
        let offset = self.offset_of(index)?;
        self.data[offset] = value;
        Ok(())
    }

    fn offset_of(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.rank() {
            return Err(Error::RankMismatch {
                expected: self.rank(),
                got: index.len(),
            });
        }
        let strides = self.shape.stride_contiguous();
        let mut offset = 0;
        for (d, (&i, &size)) in index.iter().zip(self.dims()).enumerate() {
            if i >= size {
                return Err(Error::msg(format!(
                    "index {} out of bounds for dim {} of size {}",
                    i, d, size
                )));
            }
            offset += i * strides[d];
        }
        Ok(offset)
    }

    /// Fail with [`Error::ShapeMismatch`] unless this tensor has exactly `expected` shape.
    pub fn expect_shape(&self, expected: &Shape) -> Result<()> {
        if &self.shape != expected {
            return Err(Error::ShapeMismatch {
                expected: expected.clone(),
                got: self.shape.clone(),
            });
        }
        Ok(())
    }

    // Shape manipulation

    /// Same data, new shape. Element count must be preserved.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Self> {
        self.clone().into_reshape(shape)
    }

    /// Consuming reshape; reuses the buffer.
    pub fn into_reshape(self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if shape.elem_count() != self.data.len() {
            return Err(Error::ReshapeElementMismatch {
                src: self.data.len(),
                dst: shape.elem_count(),
                dst_shape: shape,
            });
        }
        Ok(Tensor {
            data: self.data,
            shape,
        })
    }

    /// Reorder dimensions: output dim `i` is input dim `perm[i]`.
    ///
    /// The result is materialized contiguously.
    /// Example: `[N, C, H, W].permute(&[0, 2, 3, 1])` → `[N, H, W, C]`.
    pub fn permute(&self, perm: &[usize]) -> Result<Self> {
        let out_shape = self.shape.permuted(perm)?;
        let in_strides = self.shape.stride_contiguous();
        // Stride in the source buffer for each output dimension.
        let src_strides: Vec<usize> = perm.iter().map(|&p| in_strides[p]).collect();
        let out_dims = out_shape.dims();
        let rank = out_dims.len();

        let mut data = Vec::with_capacity(self.data.len());
        let mut index = vec![0usize; rank];
        for _ in 0..self.data.len() {
            let src: usize = index.iter().zip(&src_strides).map(|(i, s)| i * s).sum();
            data.push(self.data[src]);
            // advance rightmost dimension first
            for d in (0..rank).rev() {
                index[d] += 1;
                if index[d] < out_dims[d] {
                    break;
                }
                index[d] = 0;
            }
        }
        Ok(Tensor {
            data,
            shape: out_shape,
        })
    }

    fn matrix_dims(&self) -> Result<(usize, usize)> {
        self.shape.expect_rank(2)?;
        Ok((self.dims()[0], self.dims()[1]))
    }

    /// 2-D transpose.
    pub fn transpose(&self) -> Result<Self> {
        let (m, n) = self.matrix_dims()?;
        let mut data = vec![T::zero(); m * n];
        for i in 0..m {
            for j in 0..n {
                data[j * m + i] = self.data[i * n + j];
            }
        }
        Ok(Tensor {
            data,
            shape: Shape::from((n, m)),
        })
    }

    // Arithmetic

    /// 2-D matrix product: `[m, k] @ [k, n]` → `[m, n]`.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        let (m, k1) = self.matrix_dims()?;
        let (k2, n) = rhs.matrix_dims()?;
        if k1 != k2 {
            return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
        }
        let mut data = vec![T::zero(); m * n];
        ops::gemm(&self.data, &rhs.data, &mut data, m, n, k1);
        Ok(Tensor {
            data,
            shape: Shape::from((m, n)),
        })
    }

    /// `selfᵀ @ rhs` without materializing the transpose: `[k, m]ᵀ @ [k, n]` → `[m, n]`.
    pub fn t_matmul(&self, rhs: &Self) -> Result<Self> {
        let (k1, m) = self.matrix_dims()?;
        let (k2, n) = rhs.matrix_dims()?;
        if k1 != k2 {
            return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
        }
        let mut data = vec![T::zero(); m * n];
        ops::gemm_at_b(&self.data, &rhs.data, &mut data, m, n, k1);
        Ok(Tensor {
            data,
            shape: Shape::from((m, n)),
        })
    }

    /// `self @ rhsᵀ` without materializing the transpose: `[m, k] @ [n, k]ᵀ` → `[m, n]`.
    pub fn matmul_t(&self, rhs: &Self) -> Result<Self> {
        let (m, k1) = self.matrix_dims()?;
        let (n, k2) = rhs.matrix_dims()?;
        if k1 != k2 {
            return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
        }
        let mut data = vec![T::zero(); m * n];
        ops::gemm_a_bt(&self.data, &rhs.data, &mut data, m, n, k1);
        Ok(Tensor {
            data,
            shape: Shape::from((m, n)),
        })
    }

    /// Sum a 2-D tensor over its first axis: `[n, d]` → `[d]`.
    ///
    /// This is the backward of broadcasting a `[d]` vector across `n` rows.
    pub fn sum_rows(&self) -> Result<Self> {
        let (_, d) = self.matrix_dims()?;
        let mut out = vec![T::zero(); d];
        if d > 0 {
            for row in self.data.chunks(d) {
                for (acc, &v) in out.iter_mut().zip(row) {
                    *acc += v;
                }
            }
        }
        Ok(Tensor {
            data: out,
            shape: Shape::from(d),
        })
    }

    /// Sum of every element.
    pub fn sum_all(&self) -> T {
        self.data.iter().copied().sum()
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(T) -> T) -> Self {
        Tensor {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Combine two same-shaped tensors elementwise.
    pub fn zip_map(&self, rhs: &Self, f: impl Fn(T, T) -> T) -> Result<Self> {
        rhs.expect_shape(&self.shape)?;
        Ok(Tensor {
            data: self
                .data
                .iter()
                .zip(&rhs.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
            shape: self.shape.clone(),
        })
    }

    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.zip_map(rhs, |a, b| a + b)
    }

    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.zip_map(rhs, |a, b| a - b)
    }

    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.zip_map(rhs, |a, b| a * b)
    }

    /// Multiply every element by a scalar.
    pub fn scale(&self, factor: T) -> Self {
        self.map(|v| v * factor)
    }

    // Comparison

    /// Largest absolute elementwise difference.
    pub fn max_abs_diff(&self, rhs: &Self) -> Result<f64> {
        rhs.expect_shape(&self.shape)?;
        Ok(self
            .data
            .iter()
            .zip(&rhs.data)
            .map(|(&a, &b)| (a.as_f64() - b.as_f64()).abs())
            .fold(0.0, f64::max))
    }

    /// Maximum relative error `|a - b| / max(1e-8, |a| + |b|)` over all elements.
    pub fn rel_error(&self, rhs: &Self) -> Result<f64> {
        rhs.expect_shape(&self.shape)?;
        Ok(self
            .data
            .iter()
            .zip(&rhs.data)
            .map(|(&a, &b)| {
                let (a, b) = (a.as_f64(), b.as_f64());
                (a - b).abs() / (a.abs() + b.abs()).max(1e-8)
            })
            .fold(0.0, f64::max))
    }

    /// `|a - b| <= atol + rtol * |b|` for every element; false on shape mismatch.
    pub fn allclose(&self, rhs: &Self, rtol: f64, atol: f64) -> bool {
        self.shape == rhs.shape
            && self.data.iter().zip(&rhs.data).all(|(&a, &b)| {
                let (a, b) = (a.as_f64(), b.as_f64());
                (a - b).abs() <= atol + rtol * b.abs()
            })
    }
}
