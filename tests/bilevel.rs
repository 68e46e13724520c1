//! Coordinator tests against scripted lower levels.
//!
//! The mocks return closed-form weights so the candidate tables, the
//! accepted sequence and the number of inner solves are known exactly.

use bilevel_truss::bilevel::{argmin_first, candidate_weights, select_choices, termination_criterion};
use bilevel_truss::types::*;
use bilevel_truss::{bilevel_solver, LowerLevel};
use ndarray::array;
use std::cell::RefCell;

// ─────────────────────────────────────────────────────────────
//  Mock lower levels
// ─────────────────────────────────────────────────────────────

/// Lower level defined by a weight function; records every call.
struct Scripted<F: Fn(&[Choice]) -> Result<f64>> {
    n: usize,
    choices: Vec<Choice>,
    weight: F,
    feasible: bool,
    calls: RefCell<Vec<Vec<Choice>>>,
}

impl<F: Fn(&[Choice]) -> Result<f64>> Scripted<F> {
    fn new(n: usize, choices: Vec<Choice>, weight: F) -> Self {
        Self {
            n,
            choices,
            weight,
            feasible: true,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Vec<Choice>> {
        self.calls.borrow().clone()
    }
}

impl<F: Fn(&[Choice]) -> Result<f64>> LowerLevel for Scripted<F> {
    fn num_elements(&self) -> usize {
        self.n
    }

    fn choices(&self) -> Vec<Choice> {
        self.choices.clone()
    }

    fn solve(&self, choices: &[Choice]) -> Result<InnerSolution> {
        self.calls.borrow_mut().push(choices.to_vec());
        let weight = (self.weight)(choices)?;
        Ok(InnerSolution {
            areas: choices.iter().map(|&c| 100.0 * c as f64).collect(),
            weight,
            converged: self.feasible,
            feasible: self.feasible,
            max_violation: if self.feasible { 0.0 } else { 1.0 },
            iterations: 1,
        })
    }
}

/// Separable weight: material 2 is best for every element.
fn separable(c: &[Choice]) -> Result<f64> {
    Ok(c.iter().map(|&ci| [0.0, 3.0, 1.0, 2.0][ci]).sum())
}

/// Two elements: each single switch to 2 helps, switching both hurts.
fn coupled(c: &[Choice]) -> Result<f64> {
    Ok(match c {
        [1, 1] => 10.0,
        [2, 1] | [1, 2] => 9.0,
        _ => 12.0,
    })
}

fn options(decrease_policy: DecreasePolicy) -> BilevelOptions {
    BilevelOptions {
        eps: 1e-3,
        max_iterations: 50,
        decrease_policy,
    }
}

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

#[test]
fn termination_needs_two_entries() {
    assert!(termination_criterion(&[], 1e-3));
    assert!(termination_criterion(&[5.0], 1e-3));
    assert!(termination_criterion(&[5.0, 4.0], 1e-3));
    assert!(!termination_criterion(&[5.0, 4.0, 4.0005], 1e-3));
    assert!(!termination_criterion(&[4.0, 4.0], 0.0));
}

#[test]
fn argmin_prefers_the_first_minimum() {
    assert_eq!(argmin_first([3.0, 1.0, 1.0]), Some(1));
    assert_eq!(argmin_first([f64::NAN, 2.0, 2.0]), Some(1));
    assert_eq!(argmin_first([f64::INFINITY, f64::INFINITY]), Some(0));
    assert_eq!(argmin_first([f64::NAN]), None);
    assert_eq!(argmin_first(Vec::<f64>::new()), None);
}

#[test]
fn selection_maps_positions_back_to_choice_keys() {
    let table = array![[4.0, 2.0, 2.0], [1.0, 5.0, 1.0], [f64::NAN, f64::NAN, f64::NAN]];
    let picked = select_choices(&table, &[10, 20, 30], &[30, 20, 20]);
    assert_eq!(picked, vec![20, 10, 20]);
}

#[test]
fn candidate_table_reuses_the_incumbent_weight() {
    let lower = Scripted::new(3, vec![1, 2, 3], separable);
    let table = candidate_weights(&lower, &[1, 3, 2], 42.0, &lower.choices());

    assert_eq!(table.dim(), (3, 3));
    assert_eq!(table[[0, 0]], 42.0);
    assert_eq!(table[[1, 2]], 42.0);
    assert_eq!(table[[2, 1]], 42.0);
    assert_eq!(table[[0, 1]], separable(&[2, 3, 2]).unwrap());
    assert_eq!(lower.calls().len(), 6);
    assert!(!lower.calls().contains(&vec![1, 3, 2]));
}

#[test]
fn failed_candidates_are_recorded_as_infinite() {
    let lower = Scripted::new(2, vec![1, 2, 3], |c: &[Choice]| {
        if c.contains(&3) {
            Err(Error::UnsupportedStiffener("T"))
        } else {
            Ok(c.iter().sum::<usize>() as f64)
        }
    });
    let table = candidate_weights(&lower, &[2, 2], 4.0, &lower.choices());
    assert_eq!(table[[0, 2]], f64::INFINITY);
    assert_eq!(table[[1, 2]], f64::INFINITY);
    assert_eq!(select_choices(&table, &lower.choices(), &[2, 2]), vec![1, 1]);
}

// ─────────────────────────────────────────────────────────────
//  Bi-level solver
// ─────────────────────────────────────────────────────────────

#[test]
fn separable_problem_converges_in_two_iterations() {
    let lower = Scripted::new(3, vec![1, 2, 3], separable);
    let outcome = bilevel_solver(&lower, &[1, 1, 3], &options(DecreasePolicy::Reject)).unwrap();

    assert_eq!(outcome.status, Status::Converged);
    assert_eq!(outcome.choices, vec![2, 2, 2]);
    assert_eq!(outcome.weight, 3.0);
    assert_eq!(outcome.weight_history, vec![8.0, 3.0, 3.0]);
    assert_eq!(outcome.choice_history, vec![vec![1, 1, 3], vec![2, 2, 2], vec![2, 2, 2]]);
    assert_eq!(outcome.iterations.len(), 2);

    // Psi(c0) + 2 × (6 off-incumbent candidates + Psi(c_new))
    let calls = lower.calls();
    assert_eq!(calls.len(), 15);
    assert_eq!(calls[0], vec![1, 1, 3]);
    assert!(!calls[1..7].contains(&vec![1, 1, 3]));
    assert_eq!(calls[7], vec![2, 2, 2]);
    assert!(!calls[8..14].contains(&vec![2, 2, 2]));
    assert_eq!(calls[14], vec![2, 2, 2]);
}

#[test]
fn already_optimal_start_stops_after_one_iteration() {
    let lower = Scripted::new(3, vec![1, 2, 3], separable);
    let outcome = bilevel_solver(&lower, &[2, 2, 2], &options(DecreasePolicy::Reject)).unwrap();
    assert_eq!(outcome.status, Status::Converged);
    assert_eq!(outcome.weight_history, vec![3.0, 3.0]);
    assert_eq!(outcome.iterations.len(), 1);
}

#[test]
fn ties_break_towards_the_lowest_key() {
    let lower = Scripted::new(2, vec![1, 2, 3], |_: &[Choice]| Ok(7.0));
    let outcome = bilevel_solver(&lower, &[3, 2], &options(DecreasePolicy::Reject)).unwrap();
    assert_eq!(outcome.status, Status::Converged);
    assert_eq!(outcome.choices, vec![1, 1]);
}

#[test]
fn rejected_increase_keeps_the_incumbent() {
    let lower = Scripted::new(2, vec![1, 2], coupled);
    let outcome = bilevel_solver(&lower, &[1, 1], &options(DecreasePolicy::Reject)).unwrap();

    assert_eq!(outcome.status, Status::Stalled);
    assert_eq!(outcome.choices, vec![1, 1]);
    assert_eq!(outcome.weight, 10.0);
    assert_eq!(outcome.weight_history, vec![10.0]);
    // the rejected candidate is still traced
    assert_eq!(outcome.iterations.len(), 1);
    assert_eq!(outcome.iterations[0].choices, vec![2, 2]);
    assert_eq!(outcome.iterations[0].weight, 12.0);
}

#[test]
fn failing_policy_reports_the_increase() {
    let lower = Scripted::new(2, vec![1, 2], coupled);
    let err = bilevel_solver(&lower, &[1, 1], &options(DecreasePolicy::Fail)).unwrap_err();
    match err {
        Error::WeightIncrease { iteration, previous, candidate } => {
            assert_eq!(iteration, 1);
            assert_eq!(previous, 10.0);
            assert_eq!(candidate, 12.0);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn accepted_increase_cycles_until_the_cap() {
    let lower = Scripted::new(2, vec![1, 2], coupled);
    let opts = BilevelOptions {
        max_iterations: 5,
        ..options(DecreasePolicy::AcceptWithWarning)
    };
    let outcome = bilevel_solver(&lower, &[1, 1], &opts).unwrap();

    assert_eq!(outcome.status, Status::Stalled);
    assert_eq!(outcome.iterations.len(), 5);
    assert_eq!(outcome.weight_history, vec![10.0, 12.0, 10.0, 12.0, 10.0, 12.0]);
    assert_eq!(outcome.choices, vec![2, 2]);
}

#[test]
fn infeasible_final_design_is_flagged() {
    let mut lower = Scripted::new(3, vec![1, 2, 3], separable);
    lower.feasible = false;
    let outcome = bilevel_solver(&lower, &[2, 2, 2], &options(DecreasePolicy::Reject)).unwrap();
    assert_eq!(outcome.status, Status::Infeasible);
    assert!(!outcome.final_solution.feasible);
}

#[test]
fn initial_vector_is_validated() {
    let lower = Scripted::new(3, vec![1, 2, 3], separable);
    let opts = options(DecreasePolicy::Reject);
    assert!(matches!(bilevel_solver(&lower, &[1, 2], &opts), Err(Error::Shape(_))));
    assert!(matches!(bilevel_solver(&lower, &[1, 4, 2], &opts), Err(Error::UnknownChoice(4))));
    assert!(lower.calls().is_empty());
}

#[test]
fn failure_of_the_initial_solve_is_an_error() {
    let lower = Scripted::new(1, vec![1, 2], |_: &[Choice]| Err(Error::Solver("boom".into())));
    assert!(matches!(
        bilevel_solver(&lower, &[1], &options(DecreasePolicy::Reject)),
        Err(Error::Solver(_))
    ));
}
