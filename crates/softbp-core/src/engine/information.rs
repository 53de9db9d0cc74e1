//! Information-metric updates.
//!
//! A cheap proxy for full belief propagation: instead of whole distributions,
//! only the mass at hypothesis 0 of each message is propagated and combined.
//! Variable nodes add contributions and function nodes multiply them; both
//! cap the result at 1. Only column 0 of each message row is written.

use smallvec::SmallVec;

use crate::engine::errors::BpError;
use crate::engine::graph::{FactorGraph, FnodeId, VnodeId};
use crate::engine::variable_update::incoming_messages;

/// Metric values of a variable node.
#[derive(Debug, Clone, PartialEq)]
pub struct VnodeInformation {
    /// Capped total over the prior and every incoming message.
    pub information: f64,
    /// Per edge slot, the capped total without that edge's own contribution.
    pub per_edge: SmallVec<[f64; 5]>,
}

/// Computes the information metric of variable `id` without modifying the graph.
pub fn compute_vnode_information(
    graph: &FactorGraph,
    id: VnodeId,
) -> Result<VnodeInformation, BpError> {
    let vnode = graph.require_vnode(id)?;
    let incoming = incoming_messages(graph, vnode)?;

    let total = vnode.prior()[0] + incoming.iter().map(|msg| msg[0]).sum::<f64>();
    let per_edge = incoming
        .iter()
        .map(|msg| (total - msg[0]).min(1.0))
        .collect();

    Ok(VnodeInformation {
        information: total.min(1.0),
        per_edge,
    })
}

/// Updates the information metric of variable `id` and column 0 of its messages.
pub fn update_vnode_information(graph: &mut FactorGraph, id: VnodeId) -> Result<(), BpError> {
    let info = compute_vnode_information(graph, id)?;
    graph
        .vnode_mut(id)?
        .commit_information(info.information, &info.per_edge);
    Ok(())
}

/// Computes column 0 of every message of function node `id`.
///
/// Row 0 (toward the output) is the product of the input metrics; row `k + 1`
/// is the product of the output metric and every other input metric.
pub fn compute_fnode_information(
    graph: &FactorGraph,
    id: FnodeId,
) -> Result<SmallVec<[f64; 3]>, BpError> {
    let fnode = graph.require_fnode(id)?;
    let output_metric = graph
        .require_vnode(fnode.output())?
        .messages()
        .try_row(0)?[0];
    let input_metrics = fnode
        .inputs()
        .iter()
        .zip(fnode.relative())
        .map(|(&input, &slot)| Ok(graph.require_vnode(input)?.messages().try_row(slot)?[0]))
        .collect::<Result<SmallVec<[f64; 2]>, BpError>>()?;

    let mut column0 = SmallVec::with_capacity(input_metrics.len() + 1);
    column0.push(input_metrics.iter().product::<f64>().min(1.0));
    for k in 0..input_metrics.len() {
        let others: f64 = input_metrics
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != k)
            .map(|(_, m)| *m)
            .product();
        column0.push((output_metric * others).min(1.0));
    }
    Ok(column0)
}

/// Updates column 0 of every message of function node `id`.
pub fn update_fnode_information(graph: &mut FactorGraph, id: FnodeId) -> Result<(), BpError> {
    let column0 = compute_fnode_information(graph, id)?;
    graph.fnode_mut(id)?.commit_information(&column0);
    Ok(())
}
