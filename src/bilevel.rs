//! Outer coordinator: coordinate descent over the categorical vector.
//!
//! Each outer iteration scans the elements in order.  For element `e`, every
//! catalog choice is substituted into the incumbent vector and the inner
//! solver gives its optimal weight; the pair equal to the incumbent reuses
//! the last accepted weight instead of solving again.  The row-wise minima
//! of the candidate table form the next categorical vector, which is solved
//! once more and accepted.  Iteration stops when two consecutive accepted
//! weights differ by at most `eps`.

use crate::types::{
    BilevelOptions, BilevelOutcome, Choice, DecreasePolicy, Error, InnerSolution, IterationRecord, Result, Status,
};
use ndarray::Array2;
use tracing::{info, warn};

// ─────────────────────────────────────────────────────────────
//  Lower-level seam
// ─────────────────────────────────────────────────────────────

/// Anything that can play the role of `Psi` for the coordinator.
pub trait LowerLevel {
    /// Length of the categorical vector.
    fn num_elements(&self) -> usize;

    /// Candidate values for every element, ascending.
    fn choices(&self) -> Vec<Choice>;

    /// Optimal sizing and weight for a fixed categorical vector.
    fn solve(&self, choices: &[Choice]) -> Result<InnerSolution>;
}

// ─────────────────────────────────────────────────────────────
//  Termination / selection helpers
// ─────────────────────────────────────────────────────────────

/// `true` while the outer loop should continue.
///
/// A single entry always continues; afterwards stop once the last two
/// accepted weights differ by at most `eps`.
pub fn termination_criterion(w_hist: &[f64], eps: f64) -> bool {
    match w_hist {
        [] | [_] => true,
        [.., prev, last] => (last - prev).abs() > eps,
    }
}

/// Position of the smallest entry in `row`; the first one wins ties.
/// NaN never wins.
pub fn argmin_first(row: impl IntoIterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (j, w) in row.into_iter().enumerate() {
        if w.is_nan() {
            continue;
        }
        match best {
            Some((_, bw)) if w >= bw => {}
            _ => best = Some((j, w)),
        }
    }
    best.map(|(j, _)| j)
}

/// Log the key values of an accepted design.
pub fn display(w: f64, c: &[Choice], a: &[f64], iteration: Option<usize>) {
    let prefix = iteration.map(|k| format!("Iteration ({k}) | ")).unwrap_or_default();
    info!("{prefix}w* = {w:.2} (kg)");
    info!("{prefix}c* = {c:?}");
    info!("{prefix}a* = {a:?} (mm²)");
}

// ─────────────────────────────────────────────────────────────
//  Candidate table
// ─────────────────────────────────────────────────────────────

/// Fill the (element × choice) table of inner-optimal weights around the
/// incumbent.  A candidate whose solve fails is recorded as `+∞`.
pub fn candidate_weights<L: LowerLevel + ?Sized>(
    lower: &L,
    incumbent: &[Choice],
    incumbent_weight: f64,
    choices: &[Choice],
) -> Array2<f64> {
    let mut table = Array2::from_elem((incumbent.len(), choices.len()), f64::INFINITY);
    for elt in 0..incumbent.len() {
        let mut c = incumbent.to_vec();
        for (j, &choice) in choices.iter().enumerate() {
            c[elt] = choice;
            table[[elt, j]] = if c == incumbent {
                incumbent_weight
            } else {
                match lower.solve(&c) {
                    Ok(sol) => sol.weight,
                    Err(e) => {
                        warn!(element = elt, choice, "candidate {c:?} discarded: {e}");
                        f64::INFINITY
                    }
                }
            };
        }
    }
    table
}

/// Row-wise argmin of the candidate table, mapped back to choice values.
pub fn select_choices(table: &Array2<f64>, choices: &[Choice], incumbent: &[Choice]) -> Vec<Choice> {
    table
        .rows()
        .into_iter()
        .zip(incumbent)
        .map(|(row, &current)| argmin_first(row.iter().copied()).map_or(current, |j| choices[j]))
        .collect()
}

// ─────────────────────────────────────────────────────────────
//  Bi-level solver
// ─────────────────────────────────────────────────────────────

/// Run the bi-level optimisation from the categorical vector `c0`.
///
/// Hard evaluation failures of `Psi(c0)` or of an accepted candidate are
/// returned as errors; everything else ends in one of the [`Status`] values.
pub fn bilevel_solver<L: LowerLevel + ?Sized>(
    lower: &L,
    c0: &[Choice],
    options: &BilevelOptions,
) -> Result<BilevelOutcome> {
    let choices = lower.choices();
    if c0.len() != lower.num_elements() {
        return Err(Error::Shape(format!(
            "expected {} initial choices, got {}",
            lower.num_elements(),
            c0.len()
        )));
    }
    if let Some(&bad) = c0.iter().find(|ci| !choices.contains(ci)) {
        return Err(Error::UnknownChoice(bad));
    }

    let mut incumbent = lower.solve(c0)?;
    let mut w_hist = vec![incumbent.weight];
    let mut c_hist = vec![c0.to_vec()];
    let mut iterations = Vec::new();
    let mut status = Status::Converged;
    let mut k = 1usize;

    while termination_criterion(&w_hist, options.eps) {
        if k > options.max_iterations {
            warn!(max_iterations = options.max_iterations, "outer iteration limit reached");
            status = Status::Stalled;
            break;
        }
        info!("Starts iteration {k}");

        let c_prev = c_hist.last().cloned().unwrap_or_default();
        let w_prev = w_hist.last().copied().unwrap_or(f64::INFINITY);
        let table = candidate_weights(lower, &c_prev, w_prev, &choices);
        info!("Iteration ({k}) | \n W = {table}");

        let c_new = select_choices(&table, &choices, &c_prev);
        let solution = lower.solve(&c_new)?;
        let w_new = solution.weight;

        if w_new > w_prev {
            match options.decrease_policy {
                DecreasePolicy::Fail => {
                    return Err(Error::WeightIncrease {
                        iteration: k,
                        previous: w_prev,
                        candidate: w_new,
                    });
                }
                DecreasePolicy::Reject => {
                    warn!(iteration = k, w_prev, w_new, "weight increased; keeping incumbent {c_prev:?}");
                    iterations.push(IterationRecord {
                        iteration: k,
                        candidate_weights: table,
                        choices: c_new,
                        areas: solution.areas,
                        weight: w_new,
                    });
                    status = Status::Stalled;
                    break;
                }
                DecreasePolicy::AcceptWithWarning => {
                    warn!(iteration = k, w_prev, w_new, "weight increased; accepting {c_new:?}");
                }
            }
        }

        display(w_new, &c_new, &solution.areas, Some(k));
        iterations.push(IterationRecord {
            iteration: k,
            candidate_weights: table,
            choices: c_new.clone(),
            areas: solution.areas.clone(),
            weight: w_new,
        });
        c_hist.push(c_new);
        w_hist.push(w_new);
        incumbent = solution;
        k += 1;
    }

    if !incumbent.feasible {
        status = Status::Infeasible;
    }

    let choices = c_hist.last().cloned().unwrap_or_default();
    info!("End of Bi-level ({status:?}):");
    display(incumbent.weight, &choices, &incumbent.areas, None);

    Ok(BilevelOutcome {
        areas: incumbent.areas.clone(),
        choices,
        weight: incumbent.weight,
        status,
        final_solution: incumbent,
        weight_history: w_hist,
        choice_history: c_hist,
        iterations,
    })
}
