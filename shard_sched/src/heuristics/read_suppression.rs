//! Operand Read Suppression
//!
//! The register file skips a read port access when an instruction reuses
//! a source register of the immediately preceding instruction of the
//! same multiply-accumulate opcode. Scheduling such a partner right
//! after its mate is free bandwidth; this policy looks a few entries
//! deep into the ready queue for one.

use log::trace;
use shard_core::inst::Instruction;

use super::{Decision, SelectCtx, SelectionPolicy};
use crate::config::SchedConfig;
use crate::graph::NodeId;

/// Prefers candidates that keep register-read suppression alive.
#[derive(Debug, Default)]
pub struct ReadSuppressionPolicy;

impl ReadSuppressionPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        ReadSuppressionPolicy
    }
}

/// Whether `next` reuses one of `prev`'s source registers verbatim,
/// with the same opcode, so the hardware suppresses the repeated read.
fn suppresses(prev: &Instruction, next: &Instruction) -> bool {
    next.opcode() == prev.opcode()
        && next
            .srcs()
            .iter()
            .any(|s| prev.srcs().iter().any(|p| p == s))
}

impl SelectionPolicy for ReadSuppressionPolicy {
    fn name(&self) -> &'static str {
        "read-suppression"
    }

    fn window(&self, config: &SchedConfig) -> usize {
        config.read_suppression_depth
    }

    fn select(&mut self, ctx: &SelectCtx<'_>, candidate: NodeId, window: &[NodeId]) -> Decision {
        let Some(last) = ctx.last else {
            return Decision::Keep;
        };
        let prev = ctx.graph.node(last).first_inst();
        if !prev.opcode().is_mad_like() {
            return Decision::Keep;
        }
        if suppresses(prev, ctx.graph.node(candidate).first_inst()) {
            return Decision::Keep;
        }
        for &alt in window.iter().take(ctx.config.read_suppression_depth) {
            if suppresses(prev, ctx.graph.node(alt).first_inst()) {
                trace!("read suppression: {alt} follows {last}");
                return Decision::Replace(alt);
            }
        }
        Decision::Keep
    }
}

// =============================================================================
// Tests
// =============================================================================
