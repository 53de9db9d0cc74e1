//! Error types for belief propagation updates.

use thiserror::Error;

use crate::engine::graph::{FnodeId, Relation, VnodeId};

/// Errors that can occur while wiring a factor graph or running updates on it.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Configuration errors (`InvalidRelation`, `Unknown*`, `MissingTable`) describe a
/// topology that can never be updated correctly. Numerical errors
/// (`DegenerateDistribution`) depend on the data flowing through the graph.
/// Neither is retried by the engine; the caller decides whether to abort, skip the
/// node or log and continue.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BpError {
    /// Relation/arity combination the function-node update cannot marginalize.
    #[error("invalid relation {relation:?} with {arity} input(s) on function node {fnode:?}")]
    InvalidRelation {
        fnode: FnodeId,
        relation: Relation,
        arity: usize,
    },

    /// Variable node identity not present in the graph.
    #[error("unknown variable node {0:?}")]
    UnknownVariable(VnodeId),

    /// Function node identity not present in the graph.
    #[error("unknown function node {0:?}")]
    UnknownFunction(FnodeId),

    /// TABLE relation used on a graph without a substitution table.
    #[error("function node {0:?} uses a table relation but the graph has no substitution table")]
    MissingTable(FnodeId),

    /// Substitution table lookup outside of the table bounds.
    #[error("substitution table has no entry for selector {selector}, input {input}")]
    TableOutOfRange { selector: u32, input: u32 },

    /// A relation produced a hypothesis index outside `[0, nk)`.
    #[error("hypothesis {value} is outside of the hypothesis space of size {nk}")]
    HypothesisOutOfRange { value: u32, nk: usize },

    /// A distribution summed to zero or to a non-finite value during normalization.
    #[error("degenerate distribution: {0}")]
    DegenerateDistribution(String),

    /// Buffer length does not match the hypothesis space.
    #[error("dimension mismatch: expected {expected} entries, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid configuration or topology.
    #[error("validation error: {0}")]
    ValidationError(String),
}
