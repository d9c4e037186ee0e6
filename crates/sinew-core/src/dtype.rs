use std::fmt;

// DType — Supported element types
//
// Kernels are written once, generically over the element type, and run in
// either precision:
//
//   F32: 32-bit float, the default workhorse
//   F64: 64-bit float, used for gradient checking where finite differences
//          need the extra precision

/// Enum of the supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

// WithDType — Trait that connects Rust types to DType enum
//
// Bridges the type system and the runtime DType so generic code like
//
//   fn relu_forward<T: WithDType>(x: &Tensor<T>) -> ...
//
// can do float arithmetic (via num_traits::Float) and still report which
// precision it ran in.

/// Trait implemented by element types that can be stored in a tensor.
pub trait WithDType:
    num_traits::Float
    + num_traits::NumAssign
    + std::iter::Sum
    + Default
    + Send
    + Sync
    + 'static
    + fmt::Debug
    + fmt::Display
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn as_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;

    /// Create a value from a count, e.g. a batch size used as a divisor.
    fn from_usize(v: usize) -> Self {
        Self::from_f64(v as f64)
    }
}

impl WithDType for f32 {
    const DTYPE: DType = DType::F32;
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl WithDType for f64 {
    const DTYPE: DType = DType::F64;
    fn as_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}
