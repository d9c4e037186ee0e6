use std::fmt;

// Shape — N-dimensional shape of a dense tensor
//
//   - Vector: Shape([5]): 1 dimension, 5 elements
//   - Matrix: Shape([N, D]): batch of feature vectors
//   - Image:  Shape([N, C, H, W]): batch of multi-channel images
//
// Every kernel checks shapes up front: a backward gradient must have exactly
// the shape of the forward value it belongs to.

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Contiguous (row-major) strides.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> crate::Result<usize> {
        self.0.get(d).copied().ok_or(crate::Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }

    /// Fail with [`crate::Error::RankMismatch`] unless this shape has `rank` dims.
    pub fn expect_rank(&self, rank: usize) -> crate::Result<()> {
        if self.rank() != rank {
            return Err(crate::Error::RankMismatch {
                expected: rank,
                got: self.rank(),
            });
        }
        Ok(())
    }

    /// Collapse every dimension after the first: `[N, d1, .., dk]` → `(N, d1*..*dk)`.
    pub fn flatten_batch(&self) -> crate::Result<(usize, usize)> {
        let n = self.dim(0)?;
        let d = self.0[1..].iter().product::<usize>();
        Ok((n, d))
    }

    /// Apply a dimension permutation: `out[i] = self[perm[i]]`.
    pub fn permuted(&self, perm: &[usize]) -> crate::Result<Shape> {
        if perm.len() != self.rank() {
            return Err(crate::Error::RankMismatch {
                expected: self.rank(),
                got: perm.len(),
            });
        }
        let mut seen = vec![false; perm.len()];
        for &p in perm {
            if p >= self.rank() || seen[p] {
                return Err(crate::Error::msg(format!(
                    "invalid permutation {:?} for shape {}",
                    perm, self
                )));
            }
            seen[p] = true;
        }
        Ok(Shape(perm.iter().map(|&p| self.0[p]).collect()))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// These let you write: Shape::from((3, 4)) instead of Shape::new(vec![3, 4])

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize,)> for Shape {
    fn from((d0,): (usize,)) -> Self {
        Shape(vec![d0])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}
