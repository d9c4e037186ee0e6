// Mode — train/test switch passed explicitly on every call
//
// Batch normalization and dropout behave differently during training and
// inference. The mode is not stored in any layer object: each call carries
// it inside its config struct.

use std::fmt;
use std::str::FromStr;

use sinew_core::{Error, Result};

/// Whether a kernel runs with training or inference semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Batch statistics / random masking.
    Train,
    /// Running statistics / identity.
    Test,
}

impl Mode {
    /// Parse `"train"` or `"test"`, naming `kernel` in the error otherwise.
    pub fn parse(kernel: &'static str, s: &str) -> Result<Mode> {
        match s {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            other => Err(Error::InvalidMode {
                kernel,
                mode: other.to_string(),
            }),
        }
    }

    pub fn is_train(&self) -> bool {
        matches!(self, Mode::Train)
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Mode> {
        Mode::parse("layer", s)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Test => write!(f, "test"),
        }
    }
}
