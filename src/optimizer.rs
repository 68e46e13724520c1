//! Inner solver Psi: minimum-weight sizing for a fixed categorical vector.
//!
//! Augmented Lagrangian outer loop around argmin's L-BFGS, with the
//! gradient of the merit function taken by central differences.
//!
//! Uses `Vec<f64>` as the argmin parameter type (argmin-math `vec` backend),
//! keeping argmin's math backend independent of our ndarray version.

use crate::bilevel::LowerLevel;
use crate::constraints::ConstraintBuilder;
use crate::gradients::central_difference;
use crate::objectives::{al_penalty, box_residuals, max_violation, normalise, update_multipliers, WeightObjective};
use crate::types::{
    Bounds, Catalog, Choice, Error, InnerSolution, ProblemParams, Result, SolverOptions, NUM_ELEMENTS,
};
use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use std::cell::RefCell;
use tracing::{debug, info};

// ─────────────────────────────────────────────────────────────
//  Parameter packing / unpacking
// ─────────────────────────────────────────────────────────────

/// Map areas into the unit box:  x = (a − lb)/(ub − lb).
pub fn pack_parameters(bounds: &Bounds, areas: &[f64]) -> Vec<f64> {
    areas
        .iter()
        .zip(bounds.lower.iter().zip(&bounds.upper))
        .map(|(&a, (&lb, &ub))| (a - lb) / (ub - lb))
        .collect()
}

/// Inverse of [`pack_parameters`], clamping x to the unit box first so the
/// areas always lie inside the bounds.
pub fn unpack_parameters(bounds: &Bounds, x: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(bounds.lower.iter().zip(&bounds.upper))
        .map(|(&xi, (&lb, &ub))| (lb + xi.clamp(0.0, 1.0) * (ub - lb)).clamp(lb, ub))
        .collect()
}

/// Smallest trial area, as a fraction of the lower bound.
const MIN_TRIAL_AREA: f64 = 1e-3;

/// Areas at a trial point.  The box is enforced through the AL residuals,
/// so x may leave [0, 1] slightly; areas are only kept positive.
fn trial_areas(bounds: &Bounds, x: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(bounds.lower.iter().zip(&bounds.upper))
        .map(|(&xi, (&lb, &ub))| (lb + xi * (ub - lb)).max(MIN_TRIAL_AREA * lb))
        .collect()
}

/// Normalised structural residuals (tightened by `margin`) followed by the
/// box residuals on x.
fn al_residuals(
    constraints: &ConstraintBuilder,
    scales: &[f64],
    margin: f64,
    areas: &[f64],
    x: &[f64],
) -> Result<Vec<f64>> {
    let mut g = normalise(&constraints.evaluate(areas)?, scales, margin);
    g.extend(box_residuals(x));
    Ok(g)
}

// ─────────────────────────────────────────────────────────────
//  argmin problem wrapper
// ─────────────────────────────────────────────────────────────

/// One AL subproblem with frozen multipliers and penalty.
///
/// argmin calls `cost(x)` and `gradient(x)` separately at the same x, so the
/// last `(x, merit, gradient)` triple is cached.  Evaluation errors are
/// parked in `failure` because argmin only carries them as strings.
struct SizingProblem<'a> {
    objective: &'a WeightObjective,
    constraints: &'a ConstraintBuilder,
    bounds: &'a Bounds,
    scales: &'a [f64],
    weight_ref: f64,
    margin: f64,
    fd_step: f64,
    lambdas: Vec<f64>,
    mu: f64,
    failure: &'a RefCell<Option<Error>>,
    last_eval: RefCell<Option<(Vec<f64>, f64, Vec<f64>)>>,
}

impl<'a> SizingProblem<'a> {
    fn merit(&self, x: &[f64]) -> Result<f64> {
        let areas = trial_areas(self.bounds, x);
        let weight = self.objective.evaluate(&areas)? / self.weight_ref;
        let g = al_residuals(self.constraints, self.scales, self.margin, &areas, x)?;
        Ok(weight + al_penalty(&g, &self.lambdas, self.mu))
    }

    fn ensure_evaluated(&self, x: &[f64]) -> std::result::Result<(), argmin::core::Error> {
        {
            let cached = self.last_eval.borrow();
            if let Some((ref t, _, _)) = *cached {
                if t == x {
                    return Ok(());
                }
            }
        }
        let mut grad = vec![0.0; x.len()];
        let evaluated = self
            .merit(x)
            .and_then(|val| central_difference(|p| self.merit(p), x, self.fd_step, &mut grad).map(|_| val));
        match evaluated {
            Ok(val) => {
                *self.last_eval.borrow_mut() = Some((x.to_vec(), val, grad));
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                let mut slot = self.failure.borrow_mut();
                if slot.is_none() {
                    *slot = Some(e);
                }
                Err(argmin::core::Error::msg(msg))
            }
        }
    }

    fn cached(&self) -> std::result::Result<(f64, Vec<f64>), argmin::core::Error> {
        self.last_eval
            .borrow()
            .as_ref()
            .map(|(_, val, grad)| (*val, grad.clone()))
            .ok_or_else(|| argmin::core::Error::msg("merit function was not evaluated"))
    }
}

impl<'a> CostFunction for SizingProblem<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.ensure_evaluated(x)?;
        Ok(self.cached()?.0)
    }
}

impl<'a> Gradient for SizingProblem<'a> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.ensure_evaluated(x)?;
        Ok(self.cached()?.1)
    }
}

// ─────────────────────────────────────────────────────────────
//  Inner solver
// ─────────────────────────────────────────────────────────────

/// `Psi(c) → (a*, w*)`.
///
/// Stateless between calls: every solve starts from the same initial areas
/// with zero multipliers.
#[derive(Debug, Clone)]
pub struct InnerSolver<'a> {
    catalog: &'a Catalog,
    loads: [f64; 2],
    disp_bound: f64,
    bounds: Bounds,
    initial_areas: Vec<f64>,
    options: SolverOptions,
}

impl<'a> InnerSolver<'a> {
    pub fn new(catalog: &'a Catalog, params: &ProblemParams, options: SolverOptions) -> Result<Self> {
        params.bounds.validate()?;
        if params.initial_areas.len() != NUM_ELEMENTS {
            return Err(Error::Shape(format!(
                "expected {NUM_ELEMENTS} initial areas, got {}",
                params.initial_areas.len()
            )));
        }
        if !params.disp_bound.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "displacement bound must be finite, got {}",
                params.disp_bound
            )));
        }
        let al = &options.al;
        if !(options.fd_step > 0.0 && options.ftol >= 0.0 && al.mu_init > 0.0 && al.mu_factor >= 1.0) {
            return Err(Error::InvalidArgument(
                "solver options need fd_step > 0, ftol >= 0, mu_init > 0 and mu_factor >= 1".into(),
            ));
        }
        Ok(Self {
            catalog,
            loads: params.loads,
            disp_bound: params.disp_bound,
            initial_areas: params.bounds.clamp(&params.initial_areas),
            bounds: params.bounds.clone(),
            options,
        })
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Objective and constraint evaluators for `choices`.
    pub fn build(&self, choices: &[Choice]) -> Result<(WeightObjective, ConstraintBuilder)> {
        Ok((
            WeightObjective::new(self.catalog, choices)?,
            ConstraintBuilder::new(self.catalog, choices, self.loads, self.disp_bound)?,
        ))
    }

    /// Minimise weight over the box subject to every residual ≥ 0.
    ///
    /// Non-convergence is not an error: the last AL iterate is returned with
    /// `converged` / `feasible` flags set accordingly.
    pub fn solve(&self, choices: &[Choice]) -> Result<InnerSolution> {
        let (objective, constraints) = self.build(choices)?;
        let scales = constraints.scales();
        let al = &self.options.al;

        let weight_ref = objective.evaluate(&self.initial_areas)?;
        let mut x = pack_parameters(&self.bounds, &self.initial_areas);
        let mut lambdas = vec![0.0; scales.len() + 2 * x.len()];
        let mut mu = al.mu_init;
        let mut iterations = 0usize;
        let mut converged = false;

        for outer in 0..al.max_outer_iters {
            let failure = RefCell::new(None);
            let problem = SizingProblem {
                objective: &objective,
                constraints: &constraints,
                bounds: &self.bounds,
                scales: &scales,
                weight_ref,
                margin: al.constraint_margin,
                fd_step: self.options.fd_step,
                lambdas: lambdas.clone(),
                mu,
                failure: &failure,
                last_eval: RefCell::new(None),
            };

            match self.inner_lbfgs(problem, x.clone()) {
                Ok((best, iters)) => {
                    x = best;
                    iterations += iters;
                }
                Err(e) => {
                    if let Some(err) = failure.into_inner() {
                        return Err(err);
                    }
                    // Line-search breakdown: keep the last accepted iterate.
                    debug!(?choices, outer = outer + 1, "L-BFGS stopped early: {e}");
                    break;
                }
            }

            let g = al_residuals(
                &constraints,
                &scales,
                al.constraint_margin,
                &trial_areas(&self.bounds, &x),
                &x,
            )?;
            let viol = max_violation(&g);
            if self.options.disp {
                info!(?choices, outer = outer + 1, mu, max_violation = viol, "AL iteration");
            } else {
                debug!(?choices, outer = outer + 1, mu, max_violation = viol, "AL iteration");
            }

            if viol < al.constraint_tol {
                converged = true;
                break;
            }

            update_multipliers(&mut lambdas, &g, mu);
            mu = (mu * al.mu_factor).min(al.mu_max);
        }

        let areas = unpack_parameters(&self.bounds, &x);
        let weight = objective.evaluate(&areas)?;
        let residuals = normalise(&constraints.evaluate(&areas)?, &scales, 0.0);
        let violation = max_violation(&residuals);

        Ok(InnerSolution {
            areas,
            weight,
            converged,
            feasible: violation <= al.constraint_tol,
            max_violation: violation,
            iterations,
        })
    }

    /// One L-BFGS run on a frozen AL subproblem.  Returns the best parameter
    /// vector and the iteration count.
    fn inner_lbfgs(&self, problem: SizingProblem<'_>, init_param: Vec<f64>) -> Result<(Vec<f64>, usize)> {
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.options.lbfgs_memory).with_tolerance_cost(self.options.ftol)?;

        let result = Executor::new(problem, solver)
            .configure(|config| config.param(init_param).max_iters(self.options.max_iterations as u64))
            .run()?;

        let state = result.state();
        if !matches!(
            state.get_termination_reason(),
            Some(TerminationReason::SolverConverged)
        ) {
            debug!(reason = ?state.get_termination_reason(), "L-BFGS did not report convergence");
        }
        let best = state
            .get_best_param()
            .cloned()
            .ok_or_else(|| Error::Solver("L-BFGS returned no best parameters".into()))?;
        Ok((best, state.get_iter() as usize))
    }
}

impl<'a> LowerLevel for InnerSolver<'a> {
    fn num_elements(&self) -> usize {
        NUM_ELEMENTS
    }

    fn choices(&self) -> Vec<Choice> {
        self.catalog.choices()
    }

    fn solve(&self, choices: &[Choice]) -> Result<InnerSolution> {
        InnerSolver::solve(self, choices)
    }
}
