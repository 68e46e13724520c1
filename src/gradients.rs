//! Finite-difference gradients for the inner solver.
//!
//! The merit function is cheap (one 2×2 factorisation per call), so a
//! central difference per coordinate is affordable:
//!
//! ```text
//! ∂f/∂x_i  ≈  [ f(x + h eᵢ) − f(x − h eᵢ) ] / 2h
//! ```

use crate::types::{Error, Result};

/// Central-difference gradient of `f` at `x`, written into `grad`.
pub fn central_difference<F>(f: F, x: &[f64], step: f64, grad: &mut [f64]) -> Result<()>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    if grad.len() != x.len() {
        return Err(Error::Shape(format!(
            "gradient buffer has {} entries, expected {}",
            grad.len(),
            x.len()
        )));
    }
    if !(step > 0.0 && step.is_finite()) {
        return Err(Error::InvalidArgument(format!("finite-difference step must be positive, got {step}")));
    }

    let mut probe = x.to_vec();
    for i in 0..x.len() {
        probe[i] = x[i] + step;
        let f_plus = f(&probe)?;
        probe[i] = x[i] - step;
        let f_minus = f(&probe)?;
        probe[i] = x[i];
        grad[i] = (f_plus - f_minus) / (2.0 * step);
    }
    Ok(())
}

/// Allocating variant of [`central_difference`].
pub fn gradient<F>(f: F, x: &[f64], step: f64) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> Result<f64>,
{
    let mut grad = vec![0.0; x.len()];
    central_difference(f, x, step, &mut grad)?;
    Ok(grad)
}
