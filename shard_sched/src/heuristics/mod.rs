//! Candidate Reselection Heuristics
//!
//! The list scheduler's default pick is the highest-priority ready
//! node. That is usually right, but several machine details reward a
//! different choice at specific moments: a full request queue, a
//! fusable dot-product chain, an exploitable register-read suppression,
//! a bank conflict, an overloaded pipe, a subregister-write hazard, or
//! a combinable run of moves.
//!
//! Each concern is a [`SelectionPolicy`]. Policies run in a fixed
//! order; the first one that asks for a change wins the step, and every
//! policy is limited to a small window of the ready queue so scheduling
//! stays near-linear. A policy can never violate readiness: it only
//! chooses among nodes whose dependencies are already satisfied.

pub mod bank_conflict;
pub mod dpas_macro;
pub mod pipe_balance;
pub mod read_suppression;
pub mod send_queue;
pub mod subreg_hazard;
pub mod write_combine;

use shard_core::latency::LatencyOracle;
use shard_core::params::KernelParams;

use crate::config::SchedConfig;
use crate::graph::{DepGraph, NodeId};

pub use bank_conflict::BankConflictPolicy;
pub use dpas_macro::DpasMacroPolicy;
pub use pipe_balance::PipeBalancePolicy;
pub use read_suppression::ReadSuppressionPolicy;
pub use send_queue::SendQueuePolicy;
pub use subreg_hazard::SubregHazardPolicy;
pub use write_combine::WriteCombinePolicy;

// =============================================================================
// Selection Context
// =============================================================================

/// Read-only view of the scheduler state at one selection step.
pub struct SelectCtx<'a> {
    /// The dependency graph being scheduled.
    pub graph: &'a DepGraph,
    /// Timing oracle.
    pub latency: &'a dyn LatencyOracle,
    /// Scheduler configuration.
    pub config: &'a SchedConfig,
    /// Kernel geometry.
    pub params: &'a KernelParams,
    /// Current scheduler clock.
    pub clock: u32,
    /// Most recently scheduled node.
    pub last: Option<NodeId>,
}

// =============================================================================
// Decision
// =============================================================================

/// Outcome of one policy's look at the current candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The default candidate stands.
    Keep,
    /// Schedule this ready node instead of the candidate.
    Replace(NodeId),
    /// Schedule this whole ready group atomically, in the given order.
    /// The group must contain the candidate.
    Group(Vec<NodeId>),
}

// =============================================================================
// Policy Trait
// =============================================================================

/// One candidate-reselection strategy.
pub trait SelectionPolicy {
    /// Name for diagnostics.
    fn name(&self) -> &'static str;

    /// Inspect the default candidate and the ready window (best-first,
    /// candidate excluded) and decide whether to change the pick.
    fn select(&mut self, ctx: &SelectCtx<'_>, candidate: NodeId, window: &[NodeId]) -> Decision;

    /// Observe a node being issued at `ctx.clock`. Returns extra stall
    /// cycles the modeled hardware would insert before the issue.
    fn note_scheduled(&mut self, ctx: &SelectCtx<'_>, node: NodeId) -> u32 {
        let _ = (ctx, node);
        0
    }

    /// Largest ready-queue window this policy inspects.
    fn window(&self, config: &SchedConfig) -> usize;
}

/// Build the enabled policies in their fixed priority order.
pub fn build_policies(config: &SchedConfig) -> Vec<Box<dyn SelectionPolicy>> {
    let mut policies: Vec<Box<dyn SelectionPolicy>> = Vec::new();
    if config.enable_send_queue {
        policies.push(Box::new(SendQueuePolicy::new(config)));
    }
    if config.enable_dpas_affinity {
        policies.push(Box::new(DpasMacroPolicy::new()));
    }
    if config.enable_read_suppression {
        policies.push(Box::new(ReadSuppressionPolicy::new()));
    }
    if config.enable_bank_conflict {
        policies.push(Box::new(BankConflictPolicy::new()));
    }
    if config.enable_pipe_balance {
        policies.push(Box::new(PipeBalancePolicy::new()));
    }
    if config.enable_subreg_hazard {
        policies.push(Box::new(SubregHazardPolicy::new()));
    }
    if config.enable_write_combine {
        policies.push(Box::new(WriteCombinePolicy::new()));
    }
    policies
}
