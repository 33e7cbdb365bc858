//! Dependency Kinds
//!
//! Classification of the ordering constraint between two instructions
//! that touch overlapping storage. The memory variants carry the same
//! ordering semantics as their register counterparts but come from the
//! conservative send-channel analysis rather than byte-precise overlap.

use crate::inst::OperandRole;

/// Kind of a dependency edge between two scheduling nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepKind {
    /// Read-after-write: the consumer waits for the producer's result.
    Raw,
    /// Write-after-read: the write must not clobber a pending read.
    War,
    /// Write-after-write: write order is observable.
    Waw,
    /// Read-after-write through a memory channel.
    RawMemory,
    /// Write-after-read through a memory channel.
    WarMemory,
    /// Write-after-write through a memory channel.
    WawMemory,
    /// Ordering against a control-flow or fence barrier.
    Barrier,
    /// Ordering against the block label.
    Label,
}

impl DepKind {
    /// Whether this kind came from the conservative memory analysis.
    #[inline]
    pub const fn is_memory(self) -> bool {
        matches!(self, DepKind::RawMemory | DepKind::WarMemory | DepKind::WawMemory)
    }

    /// Whether the producer's result value flows along this edge.
    #[inline]
    pub const fn is_data_flow(self) -> bool {
        matches!(self, DepKind::Raw | DepKind::RawMemory)
    }

    /// Whether this kind allows the producer's live range to be killed
    /// by a covering overwrite.
    #[inline]
    pub const fn is_killing(self) -> bool {
        matches!(
            self,
            DepKind::Raw | DepKind::RawMemory | DepKind::Waw | DepKind::WawMemory
        )
    }
}

/// Classify the dependency between an earlier access (`earlier`) and a
/// later access (`later`) to overlapping storage. Returns `None` for
/// read-vs-read, which carries no ordering constraint.
pub fn classify_roles(earlier: OperandRole, later: OperandRole) -> Option<DepKind> {
    match (earlier.is_write(), later.is_write()) {
        (true, true) => Some(DepKind::Waw),
        (true, false) => Some(DepKind::Raw),
        (false, true) => Some(DepKind::War),
        (false, false) => None,
    }
}
