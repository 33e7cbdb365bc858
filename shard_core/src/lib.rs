//! Core instruction model and hardware oracles for the Shard backend.
//!
//! This crate defines everything the local instruction scheduler
//! consumes but does not own: the lowered machine instruction
//! representation, basic blocks, the dependency-kind taxonomy, the
//! latency/occupancy oracle, the points-to oracle for indirect
//! operands, and the kernel geometry description.
//!
//! The scheduler itself lives in `shard_sched`.

pub mod alias;
pub mod block;
pub mod dep;
pub mod error;
pub mod inst;
pub mod latency;
pub mod params;

pub use alias::{AliasOracle, NoAliasInfo, StaticAliasMap};
pub use block::BasicBlock;
pub use dep::{classify_roles, DepKind};
pub use error::{SchedError, SchedResult};
pub use inst::{
    AccessMask, ArchReg, BarrierKind, Instruction, MathFn, Opcode, Operand, OperandRole, Pipe,
    SendDesc, SendOp, SendQueueClass, SendTarget, StorageBase,
};
pub use latency::{LatencyOracle, LatencyTable};
pub use params::KernelParams;
