//! Scalar terms of the inner problem: structural weight, box residuals and
//! the augmented Lagrangian penalty on the inequality residuals.

use crate::truss::{self, compute_weight};
use crate::types::{Catalog, Choice, ElementProperties, Result};

// ─────────────────────────────────────────────────────────────
//  Weight objective
// ─────────────────────────────────────────────────────────────

/// Weight of the truss for a fixed categorical vector.
#[derive(Debug, Clone)]
pub struct WeightObjective {
    props: ElementProperties,
}

impl WeightObjective {
    pub fn new(catalog: &Catalog, choices: &[Choice]) -> Result<Self> {
        truss::check_choices(choices)?;
        Ok(Self {
            props: catalog.properties(choices)?,
        })
    }

    pub fn evaluate(&self, areas: &[f64]) -> Result<f64> {
        truss::check_areas(areas)?;
        Ok(compute_weight(areas, &self.props))
    }
}

// ─────────────────────────────────────────────────────────────
//  Box residuals  (on normalised variables, box = [0, 1]ⁿ)
// ─────────────────────────────────────────────────────────────

/// `[x_1, …, x_n, 1 − x_1, …, 1 − x_n]`, all ≥ 0 inside the box.
pub fn box_residuals(x: &[f64]) -> Vec<f64> {
    x.iter().copied().chain(x.iter().map(|&xi| 1.0 - xi)).collect()
}

// ─────────────────────────────────────────────────────────────
//  Augmented Lagrangian terms  (constraints r_k ≥ 0)
// ─────────────────────────────────────────────────────────────

/// Σ_k (μ/2)·[max(0, λ_k/μ − r_k)]² − λ_k²/(2μ)
pub fn al_penalty(residuals: &[f64], lambdas: &[f64], mu: f64) -> f64 {
    residuals
        .iter()
        .zip(lambdas)
        .map(|(&r, &lam)| {
            let shifted = (lam / mu - r).max(0.0);
            0.5 * mu * shifted * shifted - lam * lam / (2.0 * mu)
        })
        .sum()
}

/// Multiplier update  λ_k ← max(0, λ_k − μ r_k).
pub fn update_multipliers(lambdas: &mut [f64], residuals: &[f64], mu: f64) {
    for (lam, &r) in lambdas.iter_mut().zip(residuals) {
        *lam = (*lam - mu * r).max(0.0);
    }
}

/// Worst violation max(0, −r_k).  Zero for an empty slice; NaN counts as
/// an infinite violation.
pub fn max_violation(residuals: &[f64]) -> f64 {
    residuals
        .iter()
        .fold(0.0_f64, |m, &r| m.max(if r.is_nan() { f64::INFINITY } else { -r }))
}

/// r_k / scale_k − margin.
pub fn normalise(residuals: &[f64], scales: &[f64], margin: f64) -> Vec<f64> {
    residuals
        .iter()
        .zip(scales)
        .map(|(&r, &s)| r / s - margin)
        .collect()
}
