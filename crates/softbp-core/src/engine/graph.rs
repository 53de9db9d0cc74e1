//! # Factor Graph Arena
//!
//! This module holds every variable and function node of a factor graph in a
//! single arena. Nodes refer to each other by index (`VnodeId`, `FnodeId`),
//! never by ownership, and the substitution table used by table relations is a
//! read-only resource shared by reference.
//!
//! ## Edge slots
//!
//! A variable node with a producer stores its message toward that producer in
//! row 0 of its message table, followed by one row per consuming function
//! node. A function node stores its message toward the output in row 0,
//! followed by one row per input. Each side records the slot it occupies in the
//! other side's table (`relative`), so a neighbor's message is found without
//! searching.
//!
//! Wiring is append-only. Once the topology is built only beliefs, messages and
//! the information scalar change.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::engine::errors::BpError;
use crate::engine::kernels::{check_len, log10_into, shift_max_to_zero, NORMALIZATION_TARGET};
use crate::engine::messages::MessageTable;
use crate::engine::variable_update::{BeliefDomain, LinearDomain, Log10Domain};

/// Largest supported hypothesis space (16-bit words).
pub const MAX_HYPOTHESES: usize = 1 << 16;

/// Index of a variable node in the arena.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VnodeId(pub u32);

/// Index of a function node in the arena.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FnodeId(pub u32);

/// Relation encoded by a function node.
///
/// Discriminants match the numeric relation codes used by graph descriptions.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Relation {
    /// Bitwise AND of two inputs.
    And = 0,
    /// Bitwise complement of one input.
    Not = 1,
    /// Bitwise XOR of two inputs, or of one input with the node offset.
    Xor = 2,
    /// Left rotation of one input by the node offset.
    Rol = 3,
    /// Substitution through row `offset` of the shared table.
    Table = 4,
}

impl Relation {
    pub fn from_code(code: u8) -> Result<Self, BpError> {
        match code {
            0 => Ok(Relation::And),
            1 => Ok(Relation::Not),
            2 => Ok(Relation::Xor),
            3 => Ok(Relation::Rol),
            4 => Ok(Relation::Table),
            other => Err(BpError::ValidationError(format!(
                "unknown relation code {}",
                other
            ))),
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Representation used by a variable node's update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Domain {
    /// Products of probabilities.
    #[default]
    Linear,
    /// Sums of base-10 logarithms, for priors with a large dynamic range.
    Log10,
}

/// Read-only substitution table addressed by `(selector, input)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "SubstitutionTableParts"))]
pub struct SubstitutionTable {
    nk: usize,
    entries: Vec<u32>,
}

impl SubstitutionTable {
    /// Builds a table from `selectors * nk` row-major entries.
    pub fn new(nk: usize, entries: Vec<u32>) -> Result<Self, BpError> {
        if nk == 0 || entries.is_empty() || entries.len() % nk != 0 {
            return Err(BpError::ValidationError(format!(
                "substitution table: {} entries is not a positive multiple of {}",
                entries.len(),
                nk
            )));
        }
        Ok(Self { nk, entries })
    }

    #[inline]
    pub fn nk(&self) -> usize {
        self.nk
    }

    #[inline]
    pub fn selectors(&self) -> usize {
        self.entries.len() / self.nk
    }

    pub fn lookup(&self, selector: u32, input: u32) -> Result<u32, BpError> {
        let (s, i) = (selector as usize, input as usize);
        if s >= self.selectors() || i >= self.nk {
            return Err(BpError::TableOutOfRange { selector, input });
        }
        Ok(self.entries[s * self.nk + i])
    }
}

/// A variable node: a distribution over the hypothesis space.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vnode {
    id: VnodeId,
    /// Function node producing this variable, if any.
    input: Option<FnodeId>,
    /// Function nodes reading this variable.
    outputs: SmallVec<[FnodeId; 4]>,
    /// Slot of this variable in each consumer's message table.
    relative: SmallVec<[usize; 4]>,
    prior: Vec<f64>,
    belief: Vec<f64>,
    msg: MessageTable,
    domain: Domain,
    information: f64,
}

impl Vnode {
    #[inline]
    pub fn id(&self) -> VnodeId {
        self.id
    }

    #[inline]
    pub fn producer(&self) -> Option<FnodeId> {
        self.input
    }

    #[inline]
    pub fn consumers(&self) -> &[FnodeId] {
        &self.outputs
    }

    #[inline]
    pub fn relative(&self) -> &[usize] {
        &self.relative
    }

    /// Number of producing edges (0 or 1).
    #[inline]
    pub fn ni(&self) -> usize {
        usize::from(self.input.is_some())
    }

    /// Number of consuming edges.
    #[inline]
    pub fn nf(&self) -> usize {
        self.outputs.len()
    }

    /// Row of the message sent to the `position`-th consumer.
    #[inline]
    pub fn consumer_slot(&self, position: usize) -> usize {
        self.ni() + position
    }

    #[inline]
    pub fn prior(&self) -> &[f64] {
        &self.prior
    }

    /// Current posterior in the node's own representation.
    ///
    /// Log10 nodes keep the posterior as base-10 logarithms shifted so that the
    /// maximum is 0. Use [`Vnode::belief_linear`] to compare across domains.
    #[inline]
    pub fn belief(&self) -> &[f64] {
        &self.belief
    }

    /// Current posterior as a normalized linear distribution.
    pub fn belief_linear(&self) -> Result<Vec<f64>, BpError> {
        match self.domain {
            Domain::Linear => LinearDomain::belief_to_linear(&self.belief),
            Domain::Log10 => Log10Domain::belief_to_linear(&self.belief),
        }
    }

    #[inline]
    pub fn messages(&self) -> &MessageTable {
        &self.msg
    }

    #[inline]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Information metric written by the last information update.
    #[inline]
    pub fn information(&self) -> f64 {
        self.information
    }

    pub(crate) fn commit(&mut self, belief: Vec<f64>, msg: MessageTable) {
        self.belief = belief;
        self.msg = msg;
    }

    pub(crate) fn commit_information(&mut self, information: f64, column0: &[f64]) {
        self.information = information;
        for (row, value) in column0.iter().enumerate() {
            self.msg.set(row, 0, *value);
        }
    }

    fn initial_belief(prior: &[f64], domain: Domain) -> Result<Vec<f64>, BpError> {
        match domain {
            Domain::Linear => Ok(prior.to_vec()),
            Domain::Log10 => {
                let mut logs = vec![0.0; prior.len()];
                log10_into(&mut logs, prior);
                shift_max_to_zero(&mut logs, "initial log10 belief")?;
                Ok(logs)
            }
        }
    }

    /// Every outgoing row starts as the prior.
    fn reset(&mut self) -> Result<(), BpError> {
        let rows = self.ni() + self.nf();
        let nk = self.prior.len();
        let mut msg = MessageTable::filled(rows, nk, 0.0);
        for row in msg.iter_rows_mut() {
            row.copy_from_slice(&self.prior);
        }
        self.msg = msg;
        self.belief = Self::initial_belief(&self.prior, self.domain)?;
        self.information = 0.0;
        Ok(())
    }
}

/// A function node: a deterministic relation between inputs and one output.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fnode {
    id: FnodeId,
    relation: Relation,
    inputs: SmallVec<[VnodeId; 2]>,
    output: VnodeId,
    /// Slot of this function node in each input's message table.
    relative: SmallVec<[usize; 2]>,
    offset: Option<u32>,
    msg: MessageTable,
}

impl Fnode {
    #[inline]
    pub fn id(&self) -> FnodeId {
        self.id
    }

    #[inline]
    pub fn relation(&self) -> Relation {
        self.relation
    }

    #[inline]
    pub fn inputs(&self) -> &[VnodeId] {
        &self.inputs
    }

    #[inline]
    pub fn output(&self) -> VnodeId {
        self.output
    }

    #[inline]
    pub fn relative(&self) -> &[usize] {
        &self.relative
    }

    /// Arity (`li`).
    #[inline]
    pub fn arity(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    #[inline]
    pub fn messages(&self) -> &MessageTable {
        &self.msg
    }

    pub(crate) fn commit(&mut self, msg: MessageTable) {
        self.msg = msg;
    }

    pub(crate) fn commit_information(&mut self, column0: &[f64]) {
        for (row, value) in column0.iter().enumerate() {
            self.msg.set(row, 0, *value);
        }
    }

    fn reset(&mut self, nk: usize) {
        self.msg = MessageTable::uniform(self.inputs.len() + 1, nk);
    }
}

/// Arena owning all nodes of a factor graph.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "FactorGraphParts"))]
pub struct FactorGraph {
    nk: usize,
    xor_transform_width: usize,
    table: Option<Arc<SubstitutionTable>>,
    vnodes: Vec<Vnode>,
    fnodes: Vec<Fnode>,
}

impl FactorGraph {
    /// Creates an empty graph over `nk` hypotheses.
    ///
    /// `nk` must be a power of two no larger than [`MAX_HYPOTHESES`] so that
    /// hypotheses are bit patterns of `log2(nk)` bits.
    pub fn new(nk: usize) -> Result<Self, BpError> {
        if nk < 2 || !nk.is_power_of_two() || nk > MAX_HYPOTHESES {
            return Err(BpError::ValidationError(format!(
                "factor graph: hypothesis space size {} must be a power of two in [2, {}]",
                nk, MAX_HYPOTHESES
            )));
        }
        Ok(Self {
            nk,
            xor_transform_width: nk,
            table: None,
            vnodes: Vec::new(),
            fnodes: Vec::new(),
        })
    }

    /// Sets the width of the XOR transform domain.
    ///
    /// Binary XOR nodes convolve the first `width` hypotheses and tile the
    /// result across the full row. `width` must be a power of two dividing `nk`.
    pub fn with_xor_transform_width(mut self, width: usize) -> Result<Self, BpError> {
        if width == 0 || !width.is_power_of_two() || width > self.nk {
            return Err(BpError::ValidationError(format!(
                "factor graph: XOR transform width {} must be a power of two dividing {}",
                width, self.nk
            )));
        }
        self.xor_transform_width = width;
        Ok(self)
    }

    /// Attaches the substitution table used by table relations.
    pub fn with_substitution_table(
        mut self,
        table: Arc<SubstitutionTable>,
    ) -> Result<Self, BpError> {
        if table.nk() != self.nk {
            return Err(BpError::DimensionMismatch {
                expected: self.nk,
                actual: table.nk(),
            });
        }
        self.table = Some(table);
        Ok(self)
    }

    #[inline]
    pub fn nk(&self) -> usize {
        self.nk
    }

    /// Number of bits in a hypothesis.
    #[inline]
    pub fn word_bits(&self) -> u32 {
        self.nk.trailing_zeros()
    }

    #[inline]
    pub fn xor_transform_width(&self) -> usize {
        self.xor_transform_width
    }

    #[inline]
    pub fn substitution_table(&self) -> Option<&SubstitutionTable> {
        self.table.as_deref()
    }

    #[inline]
    pub fn vnodes(&self) -> &[Vnode] {
        &self.vnodes
    }

    #[inline]
    pub fn fnodes(&self) -> &[Fnode] {
        &self.fnodes
    }

    #[inline]
    pub fn vnode(&self, id: VnodeId) -> Option<&Vnode> {
        self.vnodes.get(id.0 as usize)
    }

    #[inline]
    pub fn fnode(&self, id: FnodeId) -> Option<&Fnode> {
        self.fnodes.get(id.0 as usize)
    }

    pub(crate) fn require_vnode(&self, id: VnodeId) -> Result<&Vnode, BpError> {
        self.vnode(id).ok_or(BpError::UnknownVariable(id))
    }

    pub(crate) fn require_fnode(&self, id: FnodeId) -> Result<&Fnode, BpError> {
        self.fnode(id).ok_or(BpError::UnknownFunction(id))
    }

    pub(crate) fn vnode_mut(&mut self, id: VnodeId) -> Result<&mut Vnode, BpError> {
        self.vnodes
            .get_mut(id.0 as usize)
            .ok_or(BpError::UnknownVariable(id))
    }

    pub(crate) fn fnode_mut(&mut self, id: FnodeId) -> Result<&mut Fnode, BpError> {
        self.fnodes
            .get_mut(id.0 as usize)
            .ok_or(BpError::UnknownFunction(id))
    }

    pub fn vnode_ids(&self) -> impl Iterator<Item = VnodeId> + '_ {
        (0..self.vnodes.len() as u32).map(VnodeId)
    }

    pub fn fnode_ids(&self) -> impl Iterator<Item = FnodeId> + '_ {
        (0..self.fnodes.len() as u32).map(FnodeId)
    }

    /// Adds an unconnected variable node with the given prior.
    pub fn add_variable(&mut self, prior: Vec<f64>, domain: Domain) -> Result<VnodeId, BpError> {
        validate_prior(&prior, self.nk)?;
        let id = VnodeId(self.vnodes.len() as u32);
        let belief = Vnode::initial_belief(&prior, domain)?;
        self.vnodes.push(Vnode {
            id,
            input: None,
            outputs: SmallVec::new(),
            relative: SmallVec::new(),
            prior,
            belief,
            msg: MessageTable::filled(0, self.nk, 0.0),
            domain,
            information: 0.0,
        });
        Ok(id)
    }

    /// Adds a function node `output = relation(inputs...)` and wires its edges.
    ///
    /// Relation/arity compatibility is checked at update time, where it is
    /// reported as [`BpError::InvalidRelation`]; wiring only checks topology.
    pub fn add_function(
        &mut self,
        relation: Relation,
        inputs: &[VnodeId],
        output: VnodeId,
        offset: Option<u32>,
    ) -> Result<FnodeId, BpError> {
        if inputs.is_empty() || inputs.len() > 2 {
            return Err(BpError::ValidationError(format!(
                "add_function: arity must be 1 or 2, got {}",
                inputs.len()
            )));
        }
        for &input in inputs {
            self.require_vnode(input)?;
            if input == output {
                return Err(BpError::ValidationError(format!(
                    "add_function: variable {:?} cannot be both input and output",
                    input
                )));
            }
        }
        if inputs.len() == 2 && inputs[0] == inputs[1] {
            return Err(BpError::ValidationError(format!(
                "add_function: variable {:?} used twice as input",
                inputs[0]
            )));
        }
        if let Some(producer) = self.require_vnode(output)?.input {
            return Err(BpError::ValidationError(format!(
                "add_function: variable {:?} already produced by {:?}",
                output, producer
            )));
        }

        let id = FnodeId(self.fnodes.len() as u32);

        // The output gains row 0, pushing every consumer slot down by one.
        let consumers: SmallVec<[FnodeId; 4]> = {
            let out = self.vnode_mut(output)?;
            out.input = Some(id);
            out.outputs.clone()
        };
        for consumer in consumers {
            let fnode = self.fnode_mut(consumer)?;
            for (k, &input) in fnode.inputs.iter().enumerate() {
                if input == output {
                    fnode.relative[k] += 1;
                }
            }
        }
        self.vnode_mut(output)?.reset()?;

        let mut relative = SmallVec::new();
        for (k, &input) in inputs.iter().enumerate() {
            let vnode = self.vnode_mut(input)?;
            relative.push(vnode.ni() + vnode.nf());
            vnode.outputs.push(id);
            vnode.relative.push(k + 1);
            vnode.reset()?;
        }

        self.fnodes.push(Fnode {
            id,
            relation,
            inputs: inputs.iter().copied().collect(),
            output,
            relative,
            offset,
            msg: MessageTable::uniform(inputs.len() + 1, self.nk),
        });
        Ok(id)
    }

    /// Replaces a variable's prior, e.g. with fresh leakage evidence.
    ///
    /// The node's outgoing messages and belief restart from the new prior.
    pub fn set_prior(&mut self, id: VnodeId, prior: Vec<f64>) -> Result<(), BpError> {
        validate_prior(&prior, self.nk)?;
        let vnode = self.vnode_mut(id)?;
        vnode.prior = prior;
        vnode.reset()
    }

    /// Restores the initial message state: variables send their prior on every
    /// edge, function nodes send uniform messages.
    pub fn reset_messages(&mut self) -> Result<(), BpError> {
        let nk = self.nk;
        for vnode in &mut self.vnodes {
            vnode.reset()?;
        }
        for fnode in &mut self.fnodes {
            fnode.reset(nk);
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct SubstitutionTableParts {
    nk: usize,
    entries: Vec<u32>,
}

#[cfg(feature = "serde")]
impl TryFrom<SubstitutionTableParts> for SubstitutionTable {
    type Error = BpError;

    fn try_from(parts: SubstitutionTableParts) -> Result<Self, BpError> {
        SubstitutionTable::new(parts.nk, parts.entries)
    }
}

/// Deserialized fields of a [`FactorGraph`].
///
/// A snapshot is only accepted if it could have been built through
/// [`FactorGraph::new`] and [`FactorGraph::add_function`]: the same size
/// checks, reciprocal `relative` slots and message tables shaped for their
/// edges. Updates index rows by slot without further checks.
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct FactorGraphParts {
    nk: usize,
    xor_transform_width: usize,
    table: Option<Arc<SubstitutionTable>>,
    vnodes: Vec<Vnode>,
    fnodes: Vec<Fnode>,
}

#[cfg(feature = "serde")]
impl TryFrom<FactorGraphParts> for FactorGraph {
    type Error = BpError;

    fn try_from(parts: FactorGraphParts) -> Result<Self, BpError> {
        let mut graph =
            FactorGraph::new(parts.nk)?.with_xor_transform_width(parts.xor_transform_width)?;
        if let Some(table) = parts.table {
            graph = graph.with_substitution_table(table)?;
        }
        graph.vnodes = parts.vnodes;
        graph.fnodes = parts.fnodes;
        graph.check_snapshot()?;
        Ok(graph)
    }
}

#[cfg(feature = "serde")]
fn snapshot_error(message: String) -> BpError {
    BpError::ValidationError(format!("snapshot: {}", message))
}

#[cfg(feature = "serde")]
fn check_table_shape(
    msg: &MessageTable,
    rows: usize,
    nk: usize,
    owner: String,
) -> Result<(), BpError> {
    if msg.rows() != rows || msg.nk() != nk {
        return Err(snapshot_error(format!(
            "{} has a {} x {} message table, expected {} x {}",
            owner,
            msg.rows(),
            msg.nk(),
            rows,
            nk
        )));
    }
    Ok(())
}

#[cfg(feature = "serde")]
impl FactorGraph {
    fn check_snapshot(&self) -> Result<(), BpError> {
        for (index, vnode) in self.vnodes.iter().enumerate() {
            let id = vnode.id;
            if id.0 as usize != index {
                return Err(snapshot_error(format!(
                    "variable at index {} has id {:?}",
                    index, id
                )));
            }
            validate_prior(&vnode.prior, self.nk)?;
            check_len(&vnode.belief, self.nk)?;
            if vnode.belief.iter().any(|b| b.is_nan()) {
                return Err(snapshot_error(format!("belief of {:?} contains NaN", id)));
            }
            if vnode.relative.len() != vnode.outputs.len() {
                return Err(snapshot_error(format!(
                    "{:?} has {} consumers but {} slots",
                    id,
                    vnode.outputs.len(),
                    vnode.relative.len()
                )));
            }
            check_table_shape(
                &vnode.msg,
                vnode.ni() + vnode.nf(),
                self.nk,
                format!("{:?}", id),
            )?;
            if let Some(producer) = vnode.input {
                if self.require_fnode(producer)?.output != id {
                    return Err(snapshot_error(format!(
                        "{:?} names {:?} as producer, which outputs elsewhere",
                        id, producer
                    )));
                }
            }
            for (&consumer, &slot) in vnode.outputs.iter().zip(&vnode.relative) {
                let fnode = self.require_fnode(consumer)?;
                let reads_back = slot
                    .checked_sub(1)
                    .and_then(|k| fnode.inputs.get(k))
                    .is_some_and(|&input| input == id);
                if !reads_back {
                    return Err(snapshot_error(format!(
                        "slot {} of {:?} in {:?} does not lead back to it",
                        slot, id, consumer
                    )));
                }
            }
        }

        for (index, fnode) in self.fnodes.iter().enumerate() {
            let id = fnode.id;
            if id.0 as usize != index {
                return Err(snapshot_error(format!(
                    "function at index {} has id {:?}",
                    index, id
                )));
            }
            let arity = fnode.inputs.len();
            if !(1..=2).contains(&arity) || fnode.relative.len() != arity {
                return Err(snapshot_error(format!(
                    "{:?} has {} inputs and {} slots",
                    id,
                    arity,
                    fnode.relative.len()
                )));
            }
            let repeated = arity == 2 && fnode.inputs[0] == fnode.inputs[1];
            if repeated || fnode.inputs.contains(&fnode.output) {
                return Err(snapshot_error(format!(
                    "{:?} repeats a variable among its edges",
                    id
                )));
            }
            check_table_shape(&fnode.msg, arity + 1, self.nk, format!("{:?}", id))?;
            if self.require_vnode(fnode.output)?.input != Some(id) {
                return Err(snapshot_error(format!(
                    "output {:?} of {:?} does not name it as producer",
                    fnode.output, id
                )));
            }
            for (k, (&input, &slot)) in fnode.inputs.iter().zip(&fnode.relative).enumerate() {
                let vnode = self.require_vnode(input)?;
                let wired = slot.checked_sub(vnode.ni()).is_some_and(|position| {
                    vnode.outputs.get(position) == Some(&id)
                        && vnode.relative.get(position) == Some(&(k + 1))
                });
                if !wired {
                    return Err(snapshot_error(format!(
                        "slot {} of {:?} in {:?} does not lead back to it",
                        slot, id, input
                    )));
                }
            }
        }
        Ok(())
    }
}

fn validate_prior(prior: &[f64], nk: usize) -> Result<(), BpError> {
    check_len(prior, nk)?;
    if prior.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(BpError::ValidationError(
            "prior must contain finite, non-negative masses".into(),
        ));
    }
    let total: f64 = prior.iter().sum();
    if total <= 0.0 {
        return Err(BpError::DegenerateDistribution(format!(
            "prior has total mass {} (expected {})",
            total, NORMALIZATION_TARGET
        )));
    }
    Ok(())
}
