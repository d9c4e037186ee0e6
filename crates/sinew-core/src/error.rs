use crate::shape::Shape;

/// All errors that can occur within sinew.
///
/// Every kernel either fully succeeds or returns one of these before it
/// touches caller-owned state. None of them is recoverable inside the
/// library: they all describe a caller contract violation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between two tensors (e.g. a gradient and the value it belongs to).
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Operation requires a specific rank (number of dimensions).
    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// Dimension index out of range for the tensor's rank.
    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Element count mismatch when creating from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Matrix multiplication dimension mismatch.
    #[error("matmul shape mismatch: [{m}x{k1}] @ [{k2}x{n}], inner dims must match")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error(
        "cannot reshape: source has {src} elements, target shape {dst_shape} has {dst} elements"
    )]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// Mode string other than `"train"` / `"test"`.
    #[error("invalid {kernel} mode \"{mode}\" (expected \"train\" or \"test\")")]
    InvalidMode { kernel: &'static str, mode: String },

    /// A sliding-window geometry whose output size is not a whole number.
    #[error(
        "{kernel}: non-integral output size along {axis}: ({extent} - {window}) is not divisible by stride {stride}"
    )]
    NonIntegralOutput {
        kernel: &'static str,
        axis: &'static str,
        extent: usize,
        window: usize,
        stride: usize,
    },

    /// Configuration value outside its valid range.
    #[error("invalid {kernel} config: {reason}")]
    InvalidConfig { kernel: &'static str, reason: String },

    /// Class label outside `[0, num_classes)`.
    #[error("label {label} at row {row} is out of range for {num_classes} classes")]
    LabelOutOfRange {
        row: usize,
        label: usize,
        num_classes: usize,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Create an [`Error::InvalidConfig`] for the named kernel.
    pub fn config(kernel: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            kernel,
            reason: reason.into(),
        }
    }
}

/// Convenience Result type used throughout sinew.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
