//! Inequality constraints on the truss, all in `r ≥ 0` form.
//!
//! Layout of the residual vector (length 3·4 + 1 = 13):
//!
//!   [ tens_1, comp_1, euler_1, local_1,  tens_2, ...,  local_3,  disp ]
//!
//! The per-element block is built in "violation" form (`≤ 0` is feasible)
//! and negated once at the end, so every consumer sees a single sign
//! convention.

use crate::truss::{self, element_lengths, DISPLACEMENT_DOF};
use crate::types::{Catalog, Choice, ElementProperties, Error, Result, Stiffener, NUM_ELEMENTS};
use ndarray::Array2;
use std::f64::consts::PI;

/// Constraints per element: tension, compression, Euler and local buckling.
pub const CONSTRAINTS_PER_ELEMENT: usize = 4;

/// Total residual count.
pub const NUM_CONSTRAINTS: usize = NUM_ELEMENTS * CONSTRAINTS_PER_ELEMENT + 1;

// ─────────────────────────────────────────────────────────────
//  Buckling limit stresses
// ─────────────────────────────────────────────────────────────

/// Local (plate) buckling stress of the stiffener web.
///
///   σ_L = 4π²E / (12(1 − ν²)) · (t/h)²
pub fn local_buckling_stress(stiffener: &Stiffener, young_modulus: f64, poisson: f64) -> Result<f64> {
    match *stiffener {
        Stiffener::I { thickness, height, .. } => Ok(4.0 * PI.powi(2) * young_modulus
            / (12.0 * (1.0 - poisson.powi(2)))
            * (thickness / height).powi(2)),
        other => Err(Error::UnsupportedStiffener(other.name())),
    }
}

/// Euler buckling stress of a bar whose I section is the reference section
/// scaled to area `area`.
///
///   I0 = b(h + 2t)³/12 − (b − t)h³/12,   A_ref = t·h + 2t·b
///   I  = I0 (a / A_ref)²,                σ_E = π² E I / (a l²)
pub fn euler_buckling_stress(stiffener: &Stiffener, young_modulus: f64, area: f64, length: f64) -> Result<f64> {
    match *stiffener {
        Stiffener::I { thickness: t, height: h, width: b } => {
            let quad_moment_0 = b * (h + 2.0 * t).powi(3) / 12.0 - (b - t) * h.powi(3) / 12.0;
            let area_ref = t * h + 2.0 * t * b;
            let quad_moment = quad_moment_0 * (area / area_ref).powi(2);
            Ok(PI.powi(2) * young_modulus * quad_moment / (area * length.powi(2)))
        }
        other => Err(Error::UnsupportedStiffener(other.name())),
    }
}

// ─────────────────────────────────────────────────────────────
//  Residual blocks
// ─────────────────────────────────────────────────────────────

/// Stress residuals, one row per element:
/// `[σ_t − σ, σ_c + σ, σ_E + σ, σ_L + σ]`.
pub fn stress_constraints(stresses: &[f64], areas: &[f64], props: &ElementProperties) -> Result<Array2<f64>> {
    let l = element_lengths();
    let mut s = Array2::zeros((NUM_ELEMENTS, CONSTRAINTS_PER_ELEMENT));
    for i in 0..NUM_ELEMENTS {
        let e_i = props.young_moduli[i];
        let nu_i = props.poisson_coeffs[i];
        let stiffener = &props.stiffeners[i];
        let euler = euler_buckling_stress(stiffener, e_i, areas[i], l[i])?;
        let local = local_buckling_stress(stiffener, e_i, nu_i)?;

        s[[i, 0]] = stresses[i] - props.allow_tens[i];
        s[[i, 1]] = -stresses[i] - props.allow_comp[i];
        s[[i, 2]] = -stresses[i] - euler;
        s[[i, 3]] = -stresses[i] - local;
    }
    Ok(-s)
}

/// `δ − u[DISPLACEMENT_DOF]`.
pub fn displacement_constraint(displacements: &[f64; 2], disp_bound: f64) -> f64 {
    disp_bound - displacements[DISPLACEMENT_DOF]
}

// ─────────────────────────────────────────────────────────────
//  Builder bound to a categorical vector
// ─────────────────────────────────────────────────────────────

/// Evaluates every constraint residual for a fixed categorical vector.
///
/// Holds its inputs by value so it can be called any number of times with
/// identical results.
#[derive(Debug, Clone)]
pub struct ConstraintBuilder {
    props: ElementProperties,
    loads: [f64; 2],
    disp_bound: f64,
}

impl ConstraintBuilder {
    pub fn new(catalog: &Catalog, choices: &[Choice], loads: [f64; 2], disp_bound: f64) -> Result<Self> {
        truss::check_choices(choices)?;
        let props = catalog.properties(choices)?;
        // Unsupported sections fail here, before any solve starts.
        for (i, stiffener) in props.stiffeners.iter().enumerate() {
            local_buckling_stress(stiffener, props.young_moduli[i], props.poisson_coeffs[i])?;
        }
        Ok(Self {
            props,
            loads,
            disp_bound,
        })
    }

    pub fn properties(&self) -> &ElementProperties {
        &self.props
    }

    /// Flat residual vector, every entry feasible when ≥ 0.
    pub fn evaluate(&self, areas: &[f64]) -> Result<Vec<f64>> {
        let response = truss::analyze(areas, &self.props, &self.loads)?;
        let s = stress_constraints(&response.stresses, areas, &self.props)?;
        let mut residuals: Vec<f64> = s.iter().copied().collect();
        residuals.push(displacement_constraint(&response.displacements, self.disp_bound));
        Ok(residuals)
    }

    /// Positive magnitude per residual, used to normalise them: the
    /// allowable for stress rows and the bound for the displacement row.
    pub fn scales(&self) -> Vec<f64> {
        let mut scales = Vec::with_capacity(NUM_CONSTRAINTS);
        for i in 0..NUM_ELEMENTS {
            let tens = self.props.allow_tens[i];
            let comp = self.props.allow_comp[i];
            scales.extend_from_slice(&[tens, comp, comp, comp]);
        }
        scales.push(if self.disp_bound.abs() > 0.0 { self.disp_bound.abs() } else { 1.0 });
        scales
    }
}
