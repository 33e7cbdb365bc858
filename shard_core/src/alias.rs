//! Alias Oracle
//!
//! Indirect operands read their real target from the address register at
//! runtime. The points-to analysis of the surrounding compiler knows the
//! statically possible targets; the scheduler only consumes that result
//! through [`AliasOracle`]. When no information is available the graph
//! builder falls back to treating the whole instruction as a scheduling
//! barrier, which is always safe.

use crate::inst::{Operand, StorageBase};

/// Points-to oracle for indirectly addressed operands.
pub trait AliasOracle {
    /// All storage locations `operand` may touch, or `None` when the
    /// analysis has no answer and the access must be treated as
    /// unresolvable.
    fn possible_targets(&self, operand: &Operand) -> Option<Vec<StorageBase>>;
}

/// Oracle with no points-to information. Every indirect access degrades
/// to a scheduling barrier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAliasInfo;

impl AliasOracle for NoAliasInfo {
    fn possible_targets(&self, _operand: &Operand) -> Option<Vec<StorageBase>> {
        None
    }
}

/// Oracle backed by a precomputed target list, keyed by the operand's
/// anchor byte. Useful for tests and for drivers that run a simple
/// address-register dataflow before scheduling.
#[derive(Debug, Clone, Default)]
pub struct StaticAliasMap {
    entries: Vec<(u32, Vec<StorageBase>)>,
}

impl StaticAliasMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the possible targets of the indirect operand anchored at
    /// `anchor_byte`.
    pub fn insert(&mut self, anchor_byte: u32, targets: Vec<StorageBase>) {
        self.entries.push((anchor_byte, targets));
    }
}

impl AliasOracle for StaticAliasMap {
    fn possible_targets(&self, operand: &Operand) -> Option<Vec<StorageBase>> {
        let StorageBase::Grf { byte_start, .. } = operand.base else {
            return None;
        };
        self.entries
            .iter()
            .find(|(anchor, _)| *anchor == byte_start)
            .map(|(_, targets)| targets.clone())
    }
}
