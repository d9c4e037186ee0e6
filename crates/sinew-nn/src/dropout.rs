// Dropout — random zeroing of activations during training
//
// Train mode draws u ~ U[0, 1) per element:
//
//   mask = 0                  if u < p
//        = 1                  otherwise               (default)
//        = 1 / (1 - p)        otherwise, `inverted`   (expected value preserved)
//
//   out = x ⊙ mask,  dx = dout ⊙ mask
//
// Test mode is the identity in both directions and draws nothing.
//
// There is no global RNG. Callers either hand in their own generator
// (`dropout_forward_with_rng`) or let the kernel build a StdRng from the
// config's seed, falling back to OS entropy when no seed is set.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sinew_core::{Error, Result, Tensor, WithDType};

use crate::mode::Mode;

/// Configuration for [`dropout_forward`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropoutConfig {
    /// Probability of dropping an element, in `[0, 1)`. Default `0.5`.
    pub p: f64,
    pub mode: Mode,
    /// Seed for the per-call generator. `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Scale survivors by `1 / (1 - p)`. Default `false`.
    pub inverted: bool,
}

impl DropoutConfig {
    pub const DEFAULT_P: f64 = 0.5;

    pub fn new(p: f64, mode: Mode) -> Result<Self> {
        let config = DropoutConfig {
            p,
            mode,
            seed: None,
            inverted: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// `p = 0.5`, built from a `"train"` / `"test"` string.
    pub fn from_mode_str(mode: &str) -> Result<Self> {
        Self::new(Self::DEFAULT_P, Mode::parse("dropout", mode)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.p) {
            return Err(Error::config(
                "dropout",
                format!("p must be in [0, 1), got {}", self.p),
            ));
        }
        Ok(())
    }

    fn keep_value(&self) -> f64 {
        if self.inverted {
            1.0 / (1.0 - self.p)
        } else {
            1.0
        }
    }
}

/// Config and realized mask saved by the dropout forward pass.
#[derive(Debug, Clone)]
pub struct DropoutCache<T: WithDType> {
    config: DropoutConfig,
    /// `None` in test mode.
    mask: Option<Tensor<T>>,
}

impl<T: WithDType> DropoutCache<T> {
    pub fn config(&self) -> &DropoutConfig {
        &self.config
    }

    pub fn mask(&self) -> Option<&Tensor<T>> {
        self.mask.as_ref()
    }
}

/// Dropout forward pass with a generator built from `config.seed`.
///
/// Two calls with the same seed and input shape produce the same mask.
pub fn dropout_forward<T: WithDType>(
    x: &Tensor<T>,
    config: &DropoutConfig,
) -> Result<(Tensor<T>, DropoutCache<T>)> {
    config.validate()?;
    if !config.mode.is_train() {
        return Ok(passthrough(x, config));
    }
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    dropout_forward_with_rng(x, config, &mut rng)
}

/// Dropout forward pass drawing from a caller-supplied generator.
///
/// `config.seed` is ignored. Test mode leaves `rng` untouched.
pub fn dropout_forward_with_rng<T: WithDType, R: Rng + ?Sized>(
    x: &Tensor<T>,
    config: &DropoutConfig,
    rng: &mut R,
) -> Result<(Tensor<T>, DropoutCache<T>)> {
    config.validate()?;
    match config.mode {
        Mode::Test => Ok(passthrough(x, config)),
        Mode::Train => {
            let keep = T::from_f64(config.keep_value());
            let mask = Tensor::<T>::rand(x.shape(), rng).map(|u| {
                if u.as_f64() < config.p {
                    T::zero()
                } else {
                    keep
                }
            });
            let out = x.mul(&mask)?;
            let kept = mask.as_slice().iter().filter(|&&m| m != T::zero()).count();
            tracing::debug!(
                p = config.p,
                inverted = config.inverted,
                kept,
                total = mask.elem_count(),
                "dropout mask realized"
            );
            Ok((
                out,
                DropoutCache {
                    config: *config,
                    mask: Some(mask),
                },
            ))
        }
    }
}

fn passthrough<T: WithDType>(x: &Tensor<T>, config: &DropoutConfig) -> (Tensor<T>, DropoutCache<T>) {
    let cache = DropoutCache {
        config: *config,
        mask: None,
    };
    (x.clone(), cache)
}

/// Dropout backward pass: `dout ⊙ mask` in train mode, `dout` in test mode.
pub fn dropout_backward<T: WithDType>(
    dout: &Tensor<T>,
    cache: &DropoutCache<T>,
) -> Result<Tensor<T>> {
    match &cache.mask {
        Some(mask) => dout.mul(mask),
        None => Ok(dout.clone()),
    }
}
