use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────
//  Error type
// ─────────────────────────────────────────────────────────────

/// Unified error type for all fallible operations in the crate.
///
/// Every function in the public API returns `Result<T, Error>` instead of
/// panicking.  Local solver non-convergence is *not* an error; it is
/// reported through the flags on [`InnerSolution`].
#[derive(Debug, Error)]
pub enum Error {
    /// Linear algebra failure (singular / not-SPD stiffness matrix).
    #[error("linear algebra error: {0}")]
    Linalg(#[from] sprs::errors::LinalgError),
    /// The catalog entry uses a stiffener without buckling formulas.
    #[error("no buckling limit stress implementation for stiffener {0}")]
    UnsupportedStiffener(&'static str),
    /// A categorical value that is not a key of the catalog.
    #[error("unknown catalog choice {0}")]
    UnknownChoice(Choice),
    /// Argmin solver returned an error.
    #[error("solver error: {0}")]
    Solver(String),
    /// Shape mismatch in input data.
    #[error("shape error: {0}")]
    Shape(String),
    /// Out-of-domain numeric input (non-positive area, inverted bounds, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Optimal weight went up between two outer iterations.
    #[error("weight increased at iteration {iteration}: {previous} -> {candidate}")]
    WeightIncrease {
        iteration: usize,
        previous: f64,
        candidate: f64,
    },
    /// Malformed run configuration.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<argmin::core::Error> for Error {
    fn from(e: argmin::core::Error) -> Self {
        Self::Solver(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ─────────────────────────────────────────────────────────────
//  Constants
// ─────────────────────────────────────────────────────────────

/// Number of bars in the truss.  Fixed for the lifetime of a run.
pub const NUM_ELEMENTS: usize = 3;

/// Catalog key.  Keys are ordered; "lowest index" means smallest key.
pub type Choice = usize;

// ─────────────────────────────────────────────────────────────
//  Categorical catalog
// ─────────────────────────────────────────────────────────────

/// Cross-section reinforcing a bar.  Dimensions in mm.
///
/// Only the `I` profile has buckling formulas; `T` is representable so that
/// catalogs can carry it, but evaluating it is an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Stiffener {
    I {
        thickness: f64,
        height: f64,
        width: f64,
    },
    T {
        thickness: f64,
        height: f64,
        width: f64,
    },
}

impl Stiffener {
    pub fn name(&self) -> &'static str {
        match self {
            Self::I { .. } => "I",
            Self::T { .. } => "T",
        }
    }
}

/// Material + stiffener record behind one catalog key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    /// kg/mm³
    pub density: f64,
    /// MPa
    pub young_modulus: f64,
    /// MPa
    pub allow_comp: f64,
    /// MPa
    pub allow_tens: f64,
    pub poisson_coeff: f64,
    pub stiffener: Stiffener,
}

/// Immutable mapping choice → [`CatalogEntry`], built once and passed by
/// reference into every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    pub(crate) entries: BTreeMap<Choice, CatalogEntry>,
}

/// Per-element properties gathered from the catalog for one categorical
/// vector.  Arrays are indexed by element.
#[derive(Debug, Clone)]
pub struct ElementProperties {
    pub densities: ndarray::Array1<f64>,
    pub young_moduli: ndarray::Array1<f64>,
    pub allow_comp: ndarray::Array1<f64>,
    pub allow_tens: ndarray::Array1<f64>,
    pub poisson_coeffs: ndarray::Array1<f64>,
    pub stiffeners: Vec<Stiffener>,
}

// ─────────────────────────────────────────────────────────────
//  Bounds
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn uniform(lower: f64, upper: f64) -> Self {
        Self {
            lower: vec![lower; NUM_ELEMENTS],
            upper: vec![upper; NUM_ELEMENTS],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lower.len() != NUM_ELEMENTS || self.upper.len() != NUM_ELEMENTS {
            return Err(Error::Shape(format!(
                "bounds must have {NUM_ELEMENTS} entries, got lower={} upper={}",
                self.lower.len(),
                self.upper.len()
            )));
        }
        for (i, (&lb, &ub)) in self.lower.iter().zip(&self.upper).enumerate() {
            if !(lb > 0.0 && lb.is_finite() && ub.is_finite() && lb < ub) {
                return Err(Error::InvalidArgument(format!(
                    "bounds of element {i} must satisfy 0 < lower < upper < inf, got [{lb}, {ub}]"
                )));
            }
        }
        Ok(())
    }

    pub fn clamp(&self, areas: &[f64]) -> Vec<f64> {
        areas
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(&a, (&lb, &ub))| a.clamp(lb, ub))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────
//  Problem parameters  (immutable after construction)
// ─────────────────────────────────────────────────────────────

/// Process-wide problem data: loads, displacement bound, sizing box,
/// initial guesses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemParams {
    /// External load on the free node (N), `(F_x, F_y)`.
    pub loads: [f64; 2],
    /// Bound on the vertical displacement of the free node (mm).
    pub disp_bound: f64,
    /// Area bounds (mm²).
    pub bounds: Bounds,
    /// Initial guess of areas for every inner solve (mm²).
    pub initial_areas: Vec<f64>,
    /// Initial categorical vector.
    pub initial_choices: Vec<Choice>,
}

impl Default for ProblemParams {
    fn default() -> Self {
        Self {
            loads: [0.0, 200e3],
            disp_bound: 1.0,
            bounds: Bounds::uniform(100.0, 2000.0),
            initial_areas: vec![1999.0; NUM_ELEMENTS],
            initial_choices: vec![1, 2, 3],
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Solver options
// ─────────────────────────────────────────────────────────────

/// Settings for the augmented Lagrangian loop of the inner solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ALSettings {
    /// Initial penalty parameter μ.
    pub mu_init: f64,
    /// Multiplicative growth factor for μ each outer iteration.
    pub mu_factor: f64,
    /// Maximum value of μ (prevents ill-conditioning).
    pub mu_max: f64,
    /// Maximum number of outer AL iterations.
    pub max_outer_iters: usize,
    /// Feasibility tolerance on normalised residuals: stop when
    /// max(−r_k) < tol.
    pub constraint_tol: f64,
    /// Amount by which every normalised structural residual is tightened
    /// during the solve.  Larger than `constraint_tol`, so a converged point is
    /// feasible for the untightened constraints.
    pub constraint_margin: f64,
}

impl Default for ALSettings {
    fn default() -> Self {
        Self {
            mu_init: 10.0,
            mu_factor: 5.0,
            mu_max: 1e8,
            max_outer_iters: 30,
            constraint_tol: 1e-5,
            constraint_margin: 1e-4,
        }
    }
}

/// Options recognised by the inner solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Tolerance on the change of the (normalised) merit value between two
    /// L-BFGS iterations.
    pub ftol: f64,
    /// Finite-difference step on normalised sizing variables.
    pub fd_step: f64,
    /// Log every AL iteration at `info` instead of `debug`.
    pub disp: bool,
    /// L-BFGS iteration cap per AL pass.
    pub max_iterations: usize,
    /// L-BFGS correction pairs.
    pub lbfgs_memory: usize,
    pub al: ALSettings,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-6,
            fd_step: 1e-5,
            disp: false,
            max_iterations: 200,
            lbfgs_memory: 10,
            al: ALSettings::default(),
        }
    }
}

/// What to do when the accepted weight goes up between outer iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecreasePolicy {
    /// Keep the incumbent and stop with [`Status::Stalled`].
    #[default]
    Reject,
    /// Accept the heavier design, log a warning and keep iterating.
    AcceptWithWarning,
    /// Abort with [`Error::WeightIncrease`].
    Fail,
}

/// Outer coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilevelOptions {
    /// Stationarity tolerance on the weight history (kg).
    pub eps: f64,
    /// Cap on outer iterations.
    pub max_iterations: usize,
    pub decrease_policy: DecreasePolicy,
}

impl Default for BilevelOptions {
    fn default() -> Self {
        Self {
            eps: 1e-3,
            max_iterations: 50,
            decrease_policy: DecreasePolicy::Reject,
        }
    }
}

// ─────────────────────────────────────────────────────────────
//  Results
// ─────────────────────────────────────────────────────────────

/// Output of one inner solve `Psi(c)`.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerSolution {
    /// Optimal areas, always inside the box.
    pub areas: Vec<f64>,
    /// Weight evaluated at `areas` (kg).
    pub weight: f64,
    /// The AL loop reached `constraint_tol` on the tightened constraints.
    pub converged: bool,
    /// Every residual at `areas` is ≥ −`constraint_tol` once normalised.
    pub feasible: bool,
    /// max(−r_k / scale_k, 0) at `areas`.
    pub max_violation: f64,
    /// Total L-BFGS iterations over all AL passes.
    pub iterations: usize,
}

/// Terminal state of the outer coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Weight history became stationary within `eps`.
    Converged,
    /// Stopped on the iteration cap or a rejected weight increase.
    Stalled,
    /// The final accepted sizing violates the constraints.
    Infeasible,
}

/// Trace of one completed outer iteration.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Inner-optimal weight per (element, choice position).  `+∞` marks
    /// candidates whose evaluation failed.
    pub candidate_weights: Array2<f64>,
    pub choices: Vec<Choice>,
    pub areas: Vec<f64>,
    pub weight: f64,
}

/// Result of the bi-level solve.
#[derive(Debug, Clone)]
pub struct BilevelOutcome {
    pub areas: Vec<f64>,
    pub choices: Vec<Choice>,
    pub weight: f64,
    pub status: Status,
    /// Flags of the final accepted inner solve.
    pub final_solution: InnerSolution,
    /// Accepted weights, seeded with `Psi(c0)`.  Append-only.
    pub weight_history: Vec<f64>,
    /// Accepted categorical vectors, seeded with `c0`.  Append-only.
    pub choice_history: Vec<Vec<Choice>>,
    pub iterations: Vec<IterationRecord>,
}
