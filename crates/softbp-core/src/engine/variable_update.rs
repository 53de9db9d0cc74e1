//! Variable node updates.
//!
//! A variable node combines its prior with the messages of every adjacent
//! function node. It sends on each edge the extrinsic combination, i.e. the
//! product of the prior and all incoming messages except the one arriving on
//! that edge, and keeps the product of everything as its posterior.
//!
//! Two numerically equivalent strategies implement the combination:
//! [`LinearDomain`] multiplies probabilities, [`Log10Domain`] adds base-10
//! logarithms and rescales before converting back. Each node picks one through
//! its [`Domain`].

use smallvec::SmallVec;

use crate::engine::errors::BpError;
use crate::engine::graph::{Domain, FactorGraph, Vnode, VnodeId};
use crate::engine::kernels::{
    add_assign, log10_into, log10_to_linear, mul_assign, normalize_to, pow10_in_place,
    shift_max_to_zero, NORMALIZATION_TARGET,
};
use crate::engine::messages::MessageTable;

/// New state of a variable node, computed from a snapshot of its neighbors.
#[derive(Debug, Clone)]
pub struct VnodeUpdate {
    /// Posterior in the node's own representation.
    pub belief: Vec<f64>,
    /// One outgoing message per edge slot.
    pub messages: MessageTable,
}

/// Strategy combining a prior with incoming messages.
pub trait BeliefDomain {
    /// Computes the posterior and the extrinsic message for every edge.
    ///
    /// `incoming[r]` is the message arriving on the edge whose outgoing message
    /// lives in row `r`.
    fn combine(id: VnodeId, prior: &[f64], incoming: &[&[f64]]) -> Result<VnodeUpdate, BpError>;

    /// Converts a posterior stored by this strategy into a normalized
    /// linear distribution.
    fn belief_to_linear(belief: &[f64]) -> Result<Vec<f64>, BpError>;
}

/// Products of probabilities, normalized after every combination.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearDomain;

/// Sums of base-10 logarithms.
///
/// Zero mass is kept as an exact `-inf`. Each outgoing message sums the log
/// prior and every other edge's log message, then is shifted so that its
/// maximum is 0 before `10^x`, which keeps very small probabilities from
/// underflowing. A row whose every entry is `-inf` is degenerate. The posterior
/// stays in log10 form.
#[derive(Debug, Clone, Copy, Default)]
pub struct Log10Domain;

impl BeliefDomain for LinearDomain {
    fn combine(id: VnodeId, prior: &[f64], incoming: &[&[f64]]) -> Result<VnodeUpdate, BpError> {
        let nk = prior.len();
        let mut messages = MessageTable::filled(incoming.len(), nk, 0.0);

        // O(Nf^2 * Nk): degrees are small.
        for (slot, row) in messages.iter_rows_mut().enumerate() {
            row.copy_from_slice(prior);
            for (other, msg) in incoming.iter().enumerate() {
                if other != slot {
                    mul_assign(row, msg);
                }
            }
            normalize_to(
                row,
                NORMALIZATION_TARGET,
                &format!("variable {:?} message slot {}", id, slot),
            )?;
        }

        let mut belief = prior.to_vec();
        for msg in incoming {
            mul_assign(&mut belief, msg);
        }
        normalize_to(
            &mut belief,
            NORMALIZATION_TARGET,
            &format!("variable {:?} posterior", id),
        )?;

        Ok(VnodeUpdate { belief, messages })
    }

    fn belief_to_linear(belief: &[f64]) -> Result<Vec<f64>, BpError> {
        let mut out = belief.to_vec();
        normalize_to(&mut out, NORMALIZATION_TARGET, "linear posterior")?;
        Ok(out)
    }
}

impl BeliefDomain for Log10Domain {
    fn combine(id: VnodeId, prior: &[f64], incoming: &[&[f64]]) -> Result<VnodeUpdate, BpError> {
        let nk = prior.len();

        let mut log_prior = vec![0.0; nk];
        log10_into(&mut log_prior, prior);
        let mut logs = MessageTable::filled(incoming.len(), nk, 0.0);
        for (slot, msg) in incoming.iter().enumerate() {
            log10_into(logs.row_mut(slot), msg);
        }

        // O(Nf^2 * Nk), like the linear product: subtracting an edge from the
        // total is not defined once either contains -inf.
        let mut messages = MessageTable::filled(incoming.len(), nk, 0.0);
        for (slot, row) in messages.iter_rows_mut().enumerate() {
            let context = format!("variable {:?} message slot {}", id, slot);
            row.copy_from_slice(&log_prior);
            for (other, log_msg) in logs.iter_rows().enumerate() {
                if other != slot {
                    add_assign(row, log_msg);
                }
            }
            shift_max_to_zero(row, &context)?;
            pow10_in_place(row);
            normalize_to(row, NORMALIZATION_TARGET, &context)?;
        }

        let mut total = log_prior;
        for log_msg in logs.iter_rows() {
            add_assign(&mut total, log_msg);
        }
        shift_max_to_zero(&mut total, &format!("variable {:?} posterior", id))?;
        Ok(VnodeUpdate {
            belief: total,
            messages,
        })
    }

    fn belief_to_linear(belief: &[f64]) -> Result<Vec<f64>, BpError> {
        log10_to_linear(belief, "log10 posterior")
    }
}

/// Messages arriving at `vnode`, in the order of its own message rows.
///
/// Row 0 pairs with the producer's message toward its output (when the node
/// has a producer); each consumer row pairs with the consumer's message
/// toward this variable.
pub(crate) fn incoming_messages<'g>(
    graph: &'g FactorGraph,
    vnode: &Vnode,
) -> Result<SmallVec<[&'g [f64]; 5]>, BpError> {
    let mut incoming = SmallVec::with_capacity(vnode.ni() + vnode.nf());
    if let Some(producer) = vnode.producer() {
        incoming.push(graph.require_fnode(producer)?.messages().try_row(0)?);
    }
    for (&consumer, &slot) in vnode.consumers().iter().zip(vnode.relative()) {
        incoming.push(graph.require_fnode(consumer)?.messages().try_row(slot)?);
    }
    Ok(incoming)
}

/// Computes the new state of variable `id` without modifying the graph.
pub fn compute_vnode_update(graph: &FactorGraph, id: VnodeId) -> Result<VnodeUpdate, BpError> {
    let vnode = graph.require_vnode(id)?;
    let incoming = incoming_messages(graph, vnode)?;
    #[cfg(feature = "tracing")]
    tracing::trace!(vnode = id.0, edges = incoming.len(), domain = ?vnode.domain(), "variable update");
    match vnode.domain() {
        Domain::Linear => LinearDomain::combine(id, vnode.prior(), &incoming),
        Domain::Log10 => Log10Domain::combine(id, vnode.prior(), &incoming),
    }
}

/// Recomputes the belief and every outgoing message of variable `id`.
///
/// On error the node keeps its previous state.
pub fn update_vnode(graph: &mut FactorGraph, id: VnodeId) -> Result<(), BpError> {
    let update = compute_vnode_update(graph, id)?;
    graph.vnode_mut(id)?.commit(update.belief, update.messages);
    Ok(())
}
