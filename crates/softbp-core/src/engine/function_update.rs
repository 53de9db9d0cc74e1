//! Function node updates.
//!
//! A function node marginalizes its relation over the current distributions of
//! all adjacent variables except the recipient. Row 0 of its message table goes
//! to the output, row `k + 1` to input `k`.
//!
//! Supported relations:
//!
//! | arity | relation | method                              |
//! |-------|----------|-------------------------------------|
//! | 2     | `Xor`    | Walsh-Hadamard convolution, tiled   |
//! | 2     | `And`    | zeta/Möbius transforms              |
//! | 1     | `Not`    | complement within the word          |
//! | 1     | `Xor`    | XOR with the node offset            |
//! | 1     | `Rol`    | rotation by the node offset         |
//! | 1     | `Table`  | substitution table row `offset`     |
//!
//! Unary relations are functions of their input, so their marginalization is a
//! single pass over the hypothesis space.

use smallvec::SmallVec;

use crate::engine::errors::BpError;
use crate::engine::graph::{FactorGraph, Fnode, FnodeId, Relation, SubstitutionTable};
use crate::engine::kernels::{normalize_to, tile, NORMALIZATION_TARGET};
use crate::engine::messages::MessageTable;
use crate::engine::transforms::{and_marginals, xor_marginals, BinaryMarginals};

/// A unary relation resolved against its node's parameters.
#[derive(Debug, Clone, Copy)]
enum UnaryMap<'t> {
    Not { mask: u32 },
    Xor { offset: u32 },
    Rol { shift: u32, bits: u32, mask: u32 },
    Table { table: &'t SubstitutionTable, selector: u32 },
}

impl<'t> UnaryMap<'t> {
    fn resolve(graph: &'t FactorGraph, fnode: &Fnode) -> Result<Self, BpError> {
        let bits = graph.word_bits();
        let mask = (graph.nk() - 1) as u32;
        let invalid = || BpError::InvalidRelation {
            fnode: fnode.id(),
            relation: fnode.relation(),
            arity: fnode.arity(),
        };
        match (fnode.relation(), fnode.offset()) {
            (Relation::Not, _) => Ok(UnaryMap::Not { mask }),
            (Relation::Xor, Some(offset)) => Ok(UnaryMap::Xor { offset }),
            (Relation::Rol, Some(offset)) => Ok(UnaryMap::Rol {
                shift: offset % bits,
                bits,
                mask,
            }),
            (Relation::Table, selector) => {
                let table = graph
                    .substitution_table()
                    .ok_or(BpError::MissingTable(fnode.id()))?;
                Ok(UnaryMap::Table {
                    table,
                    selector: selector.unwrap_or(0),
                })
            }
            (Relation::Xor, None) | (Relation::Rol, None) | (Relation::And, _) => Err(invalid()),
        }
    }

    #[inline]
    fn apply(&self, input: u32) -> Result<u32, BpError> {
        match *self {
            UnaryMap::Not { mask } => Ok(!input & mask),
            UnaryMap::Xor { offset } => Ok(input ^ offset),
            UnaryMap::Rol { shift, bits, mask } => {
                if shift == 0 {
                    Ok(input)
                } else {
                    Ok(((input << shift) | (input >> (bits - shift))) & mask)
                }
            }
            UnaryMap::Table { table, selector } => table.lookup(selector, input),
        }
    }
}

/// Computes the message table of function node `id` without modifying the graph.
pub fn compute_fnode_update(graph: &FactorGraph, id: FnodeId) -> Result<MessageTable, BpError> {
    let fnode = graph.require_fnode(id)?;
    let to_output_dist = graph
        .require_vnode(fnode.output())?
        .messages()
        .try_row(0)?;
    let inputs = fnode
        .inputs()
        .iter()
        .zip(fnode.relative())
        .map(|(&input, &slot)| graph.require_vnode(input)?.messages().try_row(slot))
        .collect::<Result<SmallVec<[&[f64]; 2]>, BpError>>()?;

    #[cfg(feature = "tracing")]
    tracing::trace!(
        fnode = id.0,
        relation = ?fnode.relation(),
        arity = fnode.arity(),
        "function update"
    );

    let mut msg = match (inputs.as_slice(), fnode.relation()) {
        ([a, b], Relation::Xor) => binary_xor(graph, a, b, to_output_dist),
        ([a, b], Relation::And) => {
            binary_table(graph.nk(), and_marginals(a, b, to_output_dist))
        }
        ([a], _) => unary(graph, fnode, a, to_output_dist)?,
        _ => {
            return Err(BpError::InvalidRelation {
                fnode: id,
                relation: fnode.relation(),
                arity: fnode.arity(),
            })
        }
    };

    for (slot, row) in msg.iter_rows_mut().enumerate() {
        normalize_to(
            row,
            NORMALIZATION_TARGET,
            &format!("function {:?} message slot {}", id, slot),
        )?;
    }
    Ok(msg)
}

/// Recomputes every outgoing message of function node `id`.
///
/// On error the node keeps its previous messages.
pub fn update_fnode(graph: &mut FactorGraph, id: FnodeId) -> Result<(), BpError> {
    let msg = compute_fnode_update(graph, id)?;
    graph.fnode_mut(id)?.commit(msg);
    Ok(())
}

fn binary_table(nk: usize, marginals: BinaryMarginals) -> MessageTable {
    let mut msg = MessageTable::filled(3, nk, 0.0);
    let width = marginals.to_output.len();
    for (slot, values) in [
        marginals.to_output,
        marginals.to_input0,
        marginals.to_input1,
    ]
    .iter()
    .enumerate()
    {
        let row = msg.row_mut(slot);
        row[..width].copy_from_slice(values);
        tile(row, width);
    }
    msg
}

/// XOR on the first `xor_transform_width` hypotheses, tiled across the row.
fn binary_xor(graph: &FactorGraph, a: &[f64], b: &[f64], o: &[f64]) -> MessageTable {
    let width = graph.xor_transform_width();
    binary_table(
        graph.nk(),
        xor_marginals(&a[..width], &b[..width], &o[..width]),
    )
}

fn unary(
    graph: &FactorGraph,
    fnode: &Fnode,
    input: &[f64],
    output: &[f64],
) -> Result<MessageTable, BpError> {
    let map = UnaryMap::resolve(graph, fnode)?;
    let nk = graph.nk();
    let mut msg = MessageTable::filled(2, nk, 0.0);
    for (i0, &mass) in input.iter().enumerate() {
        let o = map.apply(i0 as u32)?;
        if o as usize >= nk {
            return Err(BpError::HypothesisOutOfRange { value: o, nk });
        }
        msg.accumulate(0, o as usize, mass);
        msg.accumulate(1, i0, output[o as usize]);
    }
    Ok(msg)
}
