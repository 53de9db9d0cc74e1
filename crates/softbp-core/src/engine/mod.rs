//! The belief propagation engine.
//!
//! This module provides:
//! - **errors**: Error types for wiring and update failures
//! - **kernels**: Slice primitives over distribution vectors
//! - **messages**: Per-node tables of per-edge messages
//! - **graph**: Factor graph arena with variable and function nodes
//! - **transforms**: Walsh-Hadamard and zeta/Möbius transforms for binary relations
//! - **variable_update**: Variable node updates in linear and log10 domains
//! - **function_update**: Function node updates for AND, NOT, XOR, ROL and TABLE
//! - **information**: Information-metric variants of both updates
//! - **schedule**: Flooding schedule with convergence diagnostics

pub mod errors;
pub mod function_update;
pub mod graph;
pub mod information;
pub mod kernels;
pub mod messages;
pub mod schedule;
pub mod transforms;
pub mod variable_update;
