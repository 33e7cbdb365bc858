//! Write Combining
//!
//! Runs of independent moves into adjacent register ranges emit better
//! as one combined burst. When the candidate is a move, this policy
//! greedily grows the largest group of ready, compatible moves, shrinks
//! it from the tail until the destinations form one contiguous span,
//! and schedules the whole group in a single step. Readiness already
//! proves independence: two ready nodes can have no edge between them.

use log::trace;
use shard_core::inst::{Instruction, StorageBase};

use super::{Decision, SelectCtx, SelectionPolicy};
use crate::config::SchedConfig;
use crate::graph::NodeId;

/// Groups combinable moves into one scheduling step.
#[derive(Debug, Default)]
pub struct WriteCombinePolicy;

impl WriteCombinePolicy {
    /// Create the policy.
    pub fn new() -> Self {
        WriteCombinePolicy
    }
}

/// Destination range of a combinable move.
fn combinable_dst(inst: &Instruction, exec_size: u8) -> Option<(u32, u32)> {
    if !inst.opcode().is_mov_like() || inst.exec_size() != exec_size || inst.is_atomic() {
        return None;
    }
    match inst.dst()?.base {
        StorageBase::Grf { byte_start, byte_len } => Some((byte_start, byte_len)),
        _ => None,
    }
}

impl SelectionPolicy for WriteCombinePolicy {
    fn name(&self) -> &'static str {
        "write-combine"
    }

    fn window(&self, config: &SchedConfig) -> usize {
        config.write_combine_max_run
    }

    fn select(&mut self, ctx: &SelectCtx<'_>, candidate: NodeId, window: &[NodeId]) -> Decision {
        let cand_inst = ctx.graph.node(candidate).first_inst();
        let exec_size = cand_inst.exec_size();
        let Some(cand_dst) = combinable_dst(cand_inst, exec_size) else {
            return Decision::Keep;
        };

        // Gather candidate + window moves, keyed by destination start.
        let max = ctx.config.write_combine_max_run;
        let mut group: Vec<(u32, u32, NodeId)> = vec![(cand_dst.0, cand_dst.1, candidate)];
        for &alt in window.iter().take(max.saturating_sub(1)) {
            if let Some((start, len)) =
                combinable_dst(ctx.graph.node(alt).first_inst(), exec_size)
            {
                group.push((start, len, alt));
            }
        }
        if group.len() < ctx.config.write_combine_min_run {
            return Decision::Keep;
        }
        group.sort_by_key(|&(start, _, _)| start);

        // Keep the contiguous run containing the candidate, shrinking
        // from the tail first.
        let pos = group
            .iter()
            .position(|&(_, _, id)| id == candidate)
            .expect("candidate in group");
        let mut end = pos;
        while end + 1 < group.len() && group[end].0 + group[end].1 == group[end + 1].0 {
            end += 1;
        }
        let mut start = pos;
        while start > 0 && group[start - 1].0 + group[start - 1].1 == group[start].0 {
            start -= 1;
        }
        let run = &group[start..=end];
        if run.len() < ctx.config.write_combine_min_run {
            return Decision::Keep;
        }

        trace!("write-combining {} moves starting at byte {}", run.len(), run[0].0);
        Decision::Group(run.iter().map(|&(_, _, id)| id).collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
