//! # softbp Core
//!
//! Belief propagation over factor graphs of bitwise relations, as used in
//! soft-analytical side-channel attacks. Variables carry distributions over a
//! `2^n`-hypothesis space; function nodes encode AND, NOT, XOR, rotations and
//! table substitutions between them.

#![forbid(unsafe_code)]

pub mod engine;

// Re-export commonly used types
pub use engine::errors::BpError;
pub use engine::function_update::update_fnode;
pub use engine::graph::{
    Domain, FactorGraph, Fnode, FnodeId, Relation, SubstitutionTable, Vnode, VnodeId,
};
pub use engine::information::{update_fnode_information, update_vnode_information};
pub use engine::schedule::{
    run_belief_propagation, run_information_propagation, BeliefPropagationConfig,
    BeliefPropagationDiagnostics,
};
pub use engine::variable_update::update_vnode;
