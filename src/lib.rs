//! **bilevel-truss** — mixed categorical/continuous sizing of a three-bar truss.
//!
//! The crate solves a bi-level problem:
//!
//! 1. **Structural evaluator** (`truss`): closed-form weight, stiffness,
//!    displacements and stresses.
//! 2. **Constraints** (`constraints`): stress allowables, Euler and local
//!    buckling, displacement bound, all as residuals `r ≥ 0`.
//! 3. **Inner solver** (`optimizer`): minimum weight over the areas for a
//!    fixed material/stiffener vector (augmented Lagrangian + L-BFGS via
//!    `argmin`).
//! 4. **Outer coordinator** (`bilevel`): coordinate descent over the
//!    categorical vector, with memoisation of the incumbent.
//! 5. **Configuration** (`config`): JSON-loadable run settings.

pub mod types;
pub mod catalog;
pub mod truss;
pub mod constraints;
pub mod objectives;
pub mod gradients;
pub mod optimizer;
pub mod bilevel;
pub mod config;

pub use bilevel::{bilevel_solver, LowerLevel};
pub use config::RunConfig;
pub use optimizer::InnerSolver;
pub use types::{BilevelOutcome, Catalog, Error, InnerSolution, Result, Status};

/// Build the inner solver from `config` and run the bi-level optimisation
/// from `config.problem.initial_choices`.
pub fn run(config: &RunConfig) -> Result<BilevelOutcome> {
    let psi = InnerSolver::new(&config.catalog, &config.problem, config.solver.clone())?;
    bilevel_solver(&psi, &config.problem.initial_choices, &config.bilevel)
}
