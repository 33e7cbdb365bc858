//! Execution Pipe Balancing
//!
//! Back-to-back issue onto an already-busy pipe serializes even when
//! the instructions are independent; the extended math pipe is the
//! classic case. This policy tracks the modeled busy horizon of every
//! pipe and, when the candidate targets the most loaded one, looks a
//! couple of entries deep for ready work on an idle pipe that would not
//! start any later.

use log::trace;
use shard_core::inst::Pipe;

use super::{Decision, SelectCtx, SelectionPolicy};
use crate::config::SchedConfig;
use crate::graph::NodeId;

/// Balances issue across the modeled execution pipes.
#[derive(Debug, Default)]
pub struct PipeBalancePolicy {
    busy_until: [u32; Pipe::COUNT],
}

impl PipeBalancePolicy {
    /// Create the policy with all pipes idle.
    pub fn new() -> Self {
        PipeBalancePolicy::default()
    }

    fn busiest(&self) -> Pipe {
        let mut best = Pipe::Alu;
        for pipe in [Pipe::Math, Pipe::Send, Pipe::Ctrl] {
            if self.busy_until[pipe.index()] > self.busy_until[best.index()] {
                best = pipe;
            }
        }
        best
    }
}

impl SelectionPolicy for PipeBalancePolicy {
    fn name(&self) -> &'static str {
        "pipe-balance"
    }

    fn window(&self, config: &SchedConfig) -> usize {
        config.pipe_balance_depth
    }

    fn select(&mut self, ctx: &SelectCtx<'_>, candidate: NodeId, window: &[NodeId]) -> Decision {
        let Some(last) = ctx.last else {
            return Decision::Keep;
        };
        let last_node = ctx.graph.node(last);
        let cand_pipe = ctx.graph.node(candidate).first_inst().pipe();
        // Only intervene on back-to-back issue to the most loaded pipe.
        if last_node.first_inst().pipe() != cand_pipe
            || cand_pipe != self.busiest()
            || self.busy_until[cand_pipe.index()] <= ctx.clock
        {
            return Decision::Keep;
        }

        // An alternative must target an idle pipe and be no further
        // away than the stall we are trying to avoid.
        let horizon = last_node.sched_cycle.saturating_add(last_node.occupancy());
        for &alt in window.iter().take(ctx.config.pipe_balance_depth) {
            let alt_node = ctx.graph.node(alt);
            let alt_pipe = alt_node.first_inst().pipe();
            if alt_pipe != cand_pipe
                && self.busy_until[alt_pipe.index()] <= ctx.clock
                && alt_node.earliest < horizon
            {
                trace!("pipe {cand_pipe:?} loaded, issuing {alt} instead of {candidate}");
                return Decision::Replace(alt);
            }
        }
        Decision::Keep
    }

    fn note_scheduled(&mut self, ctx: &SelectCtx<'_>, node: NodeId) -> u32 {
        let n = ctx.graph.node(node);
        let pipe = n.first_inst().pipe();
        // The math pipe is not pipelined: it holds its instruction for
        // the full result latency. The others free up after issue.
        let busy = match pipe {
            Pipe::Math => n.timing.raw.max(n.occupancy()),
            _ => n.occupancy(),
        };
        let done = ctx.clock + busy;
        let slot = &mut self.busy_until[pipe.index()];
        *slot = (*slot).max(done);
        0
    }
}

// =============================================================================
// Tests
// =============================================================================
