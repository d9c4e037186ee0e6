// Shared helpers for the integration tests: approximate comparison and
// centered-difference numerical gradients.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::SeedableRng;
use sinew::{Result, Tensor};

pub const STEP: f64 = 1e-5;

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

pub fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

/// Largest `|a - b| / max(1e-8, |a| + |b|)` over all elements.
pub fn grad_error(analytic: &Tensor<f64>, numeric: &Tensor<f64>) -> f64 {
    assert_eq!(analytic.dims(), numeric.dims(), "gradient shape mismatch");
    analytic
        .rel_error(numeric)
        .expect("shapes already checked")
}

pub fn assert_grad_close(name: &str, analytic: &Tensor<f64>, numeric: &Tensor<f64>, tol: f64) {
    let err = grad_error(analytic, numeric);
    assert!(err < tol, "{name}: gradient error {err:e} exceeds {tol:e}");
}

/// Numerical gradient of `Σ f(x) ⊙ dout` with respect to `x`.
pub fn numeric_grad_array<F>(mut f: F, x: &Tensor<f64>, dout: &Tensor<f64>) -> Result<Tensor<f64>>
where
    F: FnMut(&Tensor<f64>) -> Result<Tensor<f64>>,
{
    let mut probe = x.clone();
    let mut grad = Tensor::zeros(x.shape());
    for i in 0..x.elem_count() {
        let orig = probe.as_slice()[i];

        probe.as_mut_slice()[i] = orig + STEP;
        let plus = f(&probe)?;
        probe.as_mut_slice()[i] = orig - STEP;
        let minus = f(&probe)?;
        probe.as_mut_slice()[i] = orig;

        let diff = plus.sub(&minus)?.mul(dout)?.sum_all();
        grad.as_mut_slice()[i] = diff / (2.0 * STEP);
    }
    Ok(grad)
}

/// Numerical gradient of a scalar function with respect to `x`.
pub fn numeric_grad_scalar<F>(mut f: F, x: &Tensor<f64>) -> Result<Tensor<f64>>
where
    F: FnMut(&Tensor<f64>) -> Result<f64>,
{
    let mut probe = x.clone();
    let mut grad = Tensor::zeros(x.shape());
    for i in 0..x.elem_count() {
        let orig = probe.as_slice()[i];

        probe.as_mut_slice()[i] = orig + STEP;
        let plus = f(&probe)?;
        probe.as_mut_slice()[i] = orig - STEP;
        let minus = f(&probe)?;
        probe.as_mut_slice()[i] = orig;

        grad.as_mut_slice()[i] = (plus - minus) / (2.0 * STEP);
    }
    Ok(grad)
}
