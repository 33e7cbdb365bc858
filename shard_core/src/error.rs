//! Error types and result definitions for the scheduler.
//!
//! Build-time invariant violations indicate a bug in the lowering pass
//! feeding this component; scheduling aborts for the kernel rather than
//! emitting a possibly-corrupt order. Resource-model dead ends are not
//! errors and degrade inside the scheduler.

use thiserror::Error;

/// The unified result type used throughout the scheduler.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors surfaced by graph construction and scheduling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// An operand's byte range falls outside the register file.
    #[error("instruction {inst}: operand has no resolvable storage base")]
    MalformedOperand {
        /// Block-local id of the offending instruction.
        inst: u32,
    },

    /// Pairing two nodes would create a dependency cycle. Fusion
    /// candidates are rejected instead of raising this; it only escapes
    /// when a caller requests an explicit merge.
    #[error("fusing nodes {first} and {second} would create a dependency cycle")]
    FusionCycle {
        /// Earlier node of the rejected pair.
        first: u32,
        /// Later node of the rejected pair.
        second: u32,
    },

    /// The list scheduler finished with an unstamped node. Indicates an
    /// algorithmic bug; callers fall back to the original order.
    #[error("node {node} left unscheduled after list scheduling")]
    UnscheduledNode {
        /// Id of the unstamped node.
        node: u32,
    },
}
