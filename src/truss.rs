//! Closed-form analysis of the three-bar truss.
//!
//! Three bars meet at one free node; the other ends are clamped.  Bar 2 is
//! vertical (length L), bars 1 and 3 sit at ±45° (length √2·L).  The reduced
//! 2×2 stiffness system is assembled as a sparse matrix and factorised with
//! LDLᵀ, the same way larger systems would be.

use crate::types::{Catalog, Choice, ElementProperties, Error, Result, NUM_ELEMENTS};
use ndarray::Array1;
use sprs::{CsMat, FillInReduction, SymmetryCheck, TriMat};
use sprs_ldl::Ldl;
use std::f64::consts::FRAC_1_SQRT_2;

/// Unitary length (mm).
pub const UNIT_LENGTH: f64 = 1000.0;

/// Index of the vertical displacement of the free node.
pub const DISPLACEMENT_DOF: usize = 1;

/// Bar lengths (mm).
pub fn element_lengths() -> Array1<f64> {
    let diag = std::f64::consts::SQRT_2 * UNIT_LENGTH;
    Array1::from(vec![diag, UNIT_LENGTH, diag])
}

/// Displacements and stresses after one forward solve.
#[derive(Debug, Clone, PartialEq)]
pub struct TrussResponse {
    /// Free-node displacement `(u_x, u_y)` (mm).
    pub displacements: [f64; 2],
    /// Axial stress per bar, tension positive (MPa).
    pub stresses: [f64; NUM_ELEMENTS],
}

// ─────────────────────────────────────────────────────────────
//  Input validation
// ─────────────────────────────────────────────────────────────

pub(crate) fn check_areas(areas: &[f64]) -> Result<()> {
    if areas.len() != NUM_ELEMENTS {
        return Err(Error::Shape(format!(
            "expected {NUM_ELEMENTS} areas, got {}",
            areas.len()
        )));
    }
    if let Some((i, a)) = areas.iter().enumerate().find(|(_, a)| !(a.is_finite() && **a > 0.0)) {
        return Err(Error::InvalidArgument(format!("area of element {i} must be positive, got {a}")));
    }
    Ok(())
}

pub(crate) fn check_choices(choices: &[Choice]) -> Result<()> {
    if choices.len() != NUM_ELEMENTS {
        return Err(Error::Shape(format!(
            "expected {NUM_ELEMENTS} choices, got {}",
            choices.len()
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────
//  Weight
// ─────────────────────────────────────────────────────────────

/// w = Σ ρ_i · a_i · l_i  (kg).
pub fn compute_weight(areas: &[f64], props: &ElementProperties) -> f64 {
    let l = element_lengths();
    props
        .densities
        .iter()
        .zip(areas)
        .zip(l.iter())
        .map(|((rho, a), li)| rho * a * li)
        .sum()
}

// ─────────────────────────────────────────────────────────────
//  Stiffness assembly and solve
// ─────────────────────────────────────────────────────────────

/// Reduced global stiffness K (clamped nodes removed), as CSC.
pub fn assemble_stiffness(areas: &[f64], props: &ElementProperties) -> CsMat<f64> {
    let l = element_lengths();
    let e = &props.young_moduli;
    let k1 = e[0] * areas[0] / (2.0 * l[0]);
    let k2 = e[1] * areas[1] / l[1];
    let k3 = e[2] * areas[2] / (2.0 * l[2]);

    let mut tri = TriMat::new((2, 2));
    tri.add_triplet(0, 0, k1 + k3);
    tri.add_triplet(0, 1, k1 - k3);
    tri.add_triplet(1, 0, k1 - k3);
    tri.add_triplet(1, 1, k1 + k2 + k3);
    tri.to_csc()
}

/// Solve K u = f.  K must be symmetric positive definite; a non-positive
/// pivot is reported as a singular matrix.
pub fn solve_displacements(stiffness: &CsMat<f64>, loads: &[f64; 2]) -> Result<[f64; 2]> {
    let ldl = Ldl::new()
        .fill_in_reduction(FillInReduction::NoReduction)
        .check_symmetry(SymmetryCheck::DontCheckSymmetry)
        .numeric(stiffness.view())?;
    for (i, &di) in ldl.d().iter().enumerate() {
        if !(di > 0.0) {
            return Err(Error::Linalg(sprs::errors::LinalgError::SingularMatrix(
                sprs::errors::SingularMatrixInfo {
                    index: i,
                    reason: "D <= 0 in stiffness factorization (not SPD)",
                },
            )));
        }
    }
    let u = ldl.solve(&loads[..]);
    Ok([u[0], u[1]])
}

/// Stress recovery from free-node displacements.
pub fn recover_stresses(displacements: &[f64; 2], props: &ElementProperties) -> [f64; NUM_ELEMENTS] {
    let l = element_lengths();
    let e = &props.young_moduli;
    let [ux, uy] = *displacements;
    [
        e[0] / l[0] * FRAC_1_SQRT_2 * (ux + uy),
        e[1] / l[1] * uy,
        e[2] / l[2] * FRAC_1_SQRT_2 * (uy - ux),
    ]
}

/// Full forward analysis: assemble, solve, recover stresses.
pub fn analyze(areas: &[f64], props: &ElementProperties, loads: &[f64; 2]) -> Result<TrussResponse> {
    check_areas(areas)?;
    let k = assemble_stiffness(areas, props);
    let displacements = solve_displacements(&k, loads)?;
    let stresses = recover_stresses(&displacements, props);
    Ok(TrussResponse {
        displacements,
        stresses,
    })
}

// ─────────────────────────────────────────────────────────────
//  Evaluator bound to a catalog and load case
// ─────────────────────────────────────────────────────────────

/// Pure structural evaluator: `(a, c) → (u, σ, w)`.
#[derive(Debug, Clone, Copy)]
pub struct StructuralEvaluator<'a> {
    pub catalog: &'a Catalog,
    pub loads: [f64; 2],
}

impl<'a> StructuralEvaluator<'a> {
    pub fn new(catalog: &'a Catalog, loads: [f64; 2]) -> Self {
        Self { catalog, loads }
    }

    pub fn properties(&self, choices: &[Choice]) -> Result<ElementProperties> {
        check_choices(choices)?;
        self.catalog.properties(choices)
    }

    pub fn weight(&self, areas: &[f64], choices: &[Choice]) -> Result<f64> {
        check_areas(areas)?;
        Ok(compute_weight(areas, &self.properties(choices)?))
    }

    pub fn response(&self, areas: &[f64], choices: &[Choice]) -> Result<TrussResponse> {
        analyze(areas, &self.properties(choices)?, &self.loads)
    }
}
