//! Flooding schedule for loopy belief propagation.
//!
//! One sweep recomputes every function node from the current variable
//! messages, then every variable node from the fresh function messages. Within
//! a phase all nodes read the same snapshot: new state is computed from
//! `&FactorGraph` and committed once the whole phase succeeded, so the
//! sequential and parallel (`parallel` feature) schedules give identical
//! results.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::errors::BpError;
use crate::engine::function_update::compute_fnode_update;
use crate::engine::graph::{FactorGraph, FnodeId, VnodeId};
use crate::engine::information::{compute_fnode_information, compute_vnode_information};
use crate::engine::variable_update::compute_vnode_update;

/// Configuration for a propagation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeliefPropagationConfig {
    /// Maximum number of sweeps.
    pub max_iterations: usize,
    /// Convergence threshold on the max absolute change of any variable between sweeps.
    pub convergence_tolerance: f64,
    /// Restart from priors and uniform function messages before the first sweep.
    pub reset_messages: bool,
}

impl Default for BeliefPropagationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            convergence_tolerance: 1e-9,
            reset_messages: true,
        }
    }
}

impl BeliefPropagationConfig {
    fn validate(self) -> Result<Self, BpError> {
        if self.max_iterations == 0 {
            return Err(BpError::ValidationError(
                "run_belief_propagation: max_iterations must be > 0".into(),
            ));
        }
        if self.convergence_tolerance <= 0.0 || !self.convergence_tolerance.is_finite() {
            return Err(BpError::ValidationError(
                "run_belief_propagation: convergence_tolerance must be finite and > 0".into(),
            ));
        }
        Ok(self)
    }
}

/// Runtime diagnostics of a propagation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeliefPropagationDiagnostics {
    /// Iteration limit configured for this run.
    pub max_iterations: usize,
    /// Number of sweeps actually executed.
    pub iterations_run: usize,
    /// Whether the tolerance was reached before the iteration limit.
    pub converged: bool,
    /// Max absolute change of a variable posterior (or information metric)
    /// during the last sweep.
    pub final_max_belief_delta: f64,
    pub variable_count: usize,
    pub function_count: usize,
}

/// Runs full belief propagation until convergence or the iteration limit.
///
/// Convergence is measured on the linear form of every variable posterior, so
/// linear and log10 nodes are compared on the same scale.
pub fn run_belief_propagation(
    graph: &mut FactorGraph,
    config: BeliefPropagationConfig,
) -> Result<BeliefPropagationDiagnostics, BpError> {
    run_sweeps(graph, config, "belief propagation", full_sweep, linear_beliefs)
}

/// Runs the information-metric propagation with the same schedule.
///
/// Convergence is measured on the per-variable information metric.
///
/// The metrics overwrite column 0 of the message rows in place, so afterwards
/// the rows hold information scalars, not distributions, and no longer sum to
/// one. Reset the messages before running belief propagation on the same
/// graph; [`run_belief_propagation`] does this unless `reset_messages` is
/// turned off.
pub fn run_information_propagation(
    graph: &mut FactorGraph,
    config: BeliefPropagationConfig,
) -> Result<BeliefPropagationDiagnostics, BpError> {
    run_sweeps(
        graph,
        config,
        "information propagation",
        information_sweep,
        information_values,
    )
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn run_sweeps(
    graph: &mut FactorGraph,
    config: BeliefPropagationConfig,
    label: &'static str,
    sweep: fn(&mut FactorGraph) -> Result<(), BpError>,
    observe: fn(&FactorGraph) -> Result<Vec<Vec<f64>>, BpError>,
) -> Result<BeliefPropagationDiagnostics, BpError> {
    let config = config.validate()?;
    if config.reset_messages {
        graph.reset_messages()?;
    }

    let mut diagnostics = BeliefPropagationDiagnostics {
        max_iterations: config.max_iterations,
        iterations_run: 0,
        converged: false,
        final_max_belief_delta: 0.0,
        variable_count: graph.vnodes().len(),
        function_count: graph.fnodes().len(),
    };

    let mut previous = observe(graph)?;
    for iteration in 0..config.max_iterations {
        sweep(graph)?;
        let current = observe(graph)?;
        let max_delta = max_abs_delta(&previous, &current);
        previous = current;

        diagnostics.iterations_run = iteration + 1;
        diagnostics.final_max_belief_delta = max_delta;
        #[cfg(feature = "tracing")]
        tracing::debug!(iteration, max_delta, "{} sweep", label);

        if max_delta < config.convergence_tolerance {
            diagnostics.converged = true;
            break;
        }
    }

    #[cfg(feature = "tracing")]
    log_outcome(label, &diagnostics, config.convergence_tolerance);
    Ok(diagnostics)
}

#[cfg(feature = "tracing")]
fn log_outcome(label: &str, diagnostics: &BeliefPropagationDiagnostics, tolerance: f64) {
    if diagnostics.converged {
        tracing::debug!(
            iterations = diagnostics.iterations_run,
            "{} converged",
            label
        );
    } else {
        tracing::warn!(
            iterations = diagnostics.iterations_run,
            max_delta = diagnostics.final_max_belief_delta,
            tolerance,
            "{} did not converge",
            label
        );
    }
}

fn full_sweep(graph: &mut FactorGraph) -> Result<(), BpError> {
    let fnode_ids: Vec<FnodeId> = graph.fnode_ids().collect();
    let fnode_updates = {
        let snapshot: &FactorGraph = graph;
        compute_phase(&fnode_ids, |id| compute_fnode_update(snapshot, id))?
    };
    for (id, msg) in fnode_ids.into_iter().zip(fnode_updates) {
        graph.fnode_mut(id)?.commit(msg);
    }

    let vnode_ids: Vec<VnodeId> = graph.vnode_ids().collect();
    let vnode_updates = {
        let snapshot: &FactorGraph = graph;
        compute_phase(&vnode_ids, |id| compute_vnode_update(snapshot, id))?
    };
    for (id, update) in vnode_ids.into_iter().zip(vnode_updates) {
        graph.vnode_mut(id)?.commit(update.belief, update.messages);
    }
    Ok(())
}

fn information_sweep(graph: &mut FactorGraph) -> Result<(), BpError> {
    let fnode_ids: Vec<FnodeId> = graph.fnode_ids().collect();
    let fnode_updates = {
        let snapshot: &FactorGraph = graph;
        compute_phase(&fnode_ids, |id| compute_fnode_information(snapshot, id))?
    };
    for (id, column0) in fnode_ids.into_iter().zip(fnode_updates) {
        graph.fnode_mut(id)?.commit_information(&column0);
    }

    let vnode_ids: Vec<VnodeId> = graph.vnode_ids().collect();
    let vnode_updates = {
        let snapshot: &FactorGraph = graph;
        compute_phase(&vnode_ids, |id| compute_vnode_information(snapshot, id))?
    };
    for (id, info) in vnode_ids.into_iter().zip(vnode_updates) {
        graph
            .vnode_mut(id)?
            .commit_information(info.information, &info.per_edge);
    }
    Ok(())
}

/// Computes one phase of a sweep, node by node or across the rayon pool.
///
/// Results come back in `ids` order either way.
fn compute_phase<I, T, F>(ids: &[I], compute: F) -> Result<Vec<T>, BpError>
where
    I: Copy + Send + Sync,
    T: Send,
    F: Fn(I) -> Result<T, BpError> + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        ids.par_iter().map(|&id| compute(id)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        ids.iter().map(|&id| compute(id)).collect()
    }
}

fn linear_beliefs(graph: &FactorGraph) -> Result<Vec<Vec<f64>>, BpError> {
    graph.vnodes().iter().map(|v| v.belief_linear()).collect()
}

fn information_values(graph: &FactorGraph) -> Result<Vec<Vec<f64>>, BpError> {
    Ok(graph
        .vnodes()
        .iter()
        .map(|v| vec![v.information()])
        .collect())
}

fn max_abs_delta(previous: &[Vec<f64>], current: &[Vec<f64>]) -> f64 {
    previous
        .iter()
        .zip(current)
        .flat_map(|(p, c)| p.iter().zip(c))
        .map(|(p, c)| (p - c).abs())
        .fold(0.0, f64::max)
}
