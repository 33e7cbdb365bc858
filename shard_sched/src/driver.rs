//! Per-Kernel Scheduling Driver
//!
//! Walks a kernel's basic blocks and reschedules each one in place.
//! Blocks are fully independent: the driver shares only the read-only
//! oracles and configuration between invocations, so callers may
//! parallelize across blocks if they wish.
//!
//! Oversized blocks are split into fixed-size windows that are
//! scheduled independently, bounding the per-block cost; tiny blocks
//! are skipped outright.

use log::{debug, error};
use shard_core::alias::AliasOracle;
use shard_core::block::BasicBlock;
use shard_core::inst::Instruction;
use shard_core::latency::LatencyOracle;
use shard_core::params::KernelParams;
use shard_core::{SchedError, SchedResult};

use crate::config::SchedConfig;
use crate::graph::builder::GraphBuilder;
use crate::graph::fusion::pair_nodes;
use crate::graph::SchedNode;
use crate::nops::insert_hazard_nops;
use crate::scheduler::ListScheduler;
use crate::stats::{BlockStats, KernelStats};

/// Figures produced by scheduling one window.
#[derive(Debug, Clone, Copy, Default)]
struct WindowStats {
    cycles: u32,
    send_stall_cycles: u32,
    sequential_cycles: u32,
    pairs_fused: u32,
}

/// The local instruction scheduler.
pub struct LocalScheduler<'a> {
    latency: &'a dyn LatencyOracle,
    alias: &'a dyn AliasOracle,
    params: &'a KernelParams,
    config: SchedConfig,
}

impl<'a> LocalScheduler<'a> {
    /// Create a scheduler over the given oracles and configuration.
    pub fn new(
        latency: &'a dyn LatencyOracle,
        alias: &'a dyn AliasOracle,
        params: &'a KernelParams,
        config: SchedConfig,
    ) -> Self {
        LocalScheduler { latency, alias, params, config }
    }

    /// Reschedule every block of a kernel in place.
    pub fn schedule_kernel(&self, blocks: &mut [BasicBlock]) -> SchedResult<KernelStats> {
        let mut stats = KernelStats::default();
        for block in blocks.iter_mut() {
            if block.len() < self.config.min_block_size {
                stats.blocks_skipped += 1;
                continue;
            }
            let block_stats = self.schedule_block(block)?;
            stats.add_block(block_stats, self.config.loop_weight);
        }
        debug!(
            "kernel scheduled: {} blocks, {} skipped, {} modeled cycles",
            stats.blocks_scheduled, stats.blocks_skipped, stats.total_cycles
        );
        Ok(stats)
    }

    /// Reschedule one block in place, splitting it into windows when it
    /// exceeds the configured window size.
    pub fn schedule_block(&self, block: &mut BasicBlock) -> SchedResult<BlockStats> {
        let original = std::mem::take(&mut block.insts);
        let window = self.config.window_size;

        let mut scheduled = Vec::with_capacity(original.len());
        let mut totals = WindowStats::default();
        if window > 0 && original.len() > window {
            let mut rest = original;
            while !rest.is_empty() {
                let tail = rest.split_off(window.min(rest.len()));
                let (insts, ws) = self.schedule_window(rest)?;
                scheduled.extend(insts);
                accumulate(&mut totals, ws);
                rest = tail;
            }
        } else {
            let (insts, ws) = self.schedule_window(original)?;
            scheduled = insts;
            totals = ws;
        }

        let mut nops = 0;
        if self.config.insert_hazard_nops {
            nops = insert_hazard_nops(&mut scheduled, self.params, self.config.hazard_nop_gap);
        }
        block.insts = scheduled;

        Ok(BlockStats {
            block_id: block.id,
            insts: block.insts.len(),
            cycles: totals.cycles,
            send_stall_cycles: totals.send_stall_cycles,
            sequential_cycles: totals.sequential_cycles,
            pairs_fused: totals.pairs_fused,
            nops_inserted: nops,
            nest_level: block.nest_level,
        })
    }

    /// Build, fuse, and schedule one window of instructions.
    fn schedule_window(
        &self,
        insts: Vec<Instruction>,
    ) -> SchedResult<(Vec<Instruction>, WindowStats)> {
        let input_len = insts.len();
        let builder = GraphBuilder::new(self.latency, self.alias, self.params, &self.config);
        let mut graph = builder.build(insts)?;
        let pairs_fused = pair_nodes(&mut graph, &self.config);

        let mut scheduler = ListScheduler::new(self.latency, self.params, &self.config);
        let schedule = match scheduler.run(&mut graph) {
            Ok(s) => s,
            Err(SchedError::UnscheduledNode { node }) => {
                // Post-condition failure: keep the original order rather
                // than emit a possibly-corrupt one.
                error!("list scheduling left node {node} unscheduled; keeping input order");
                let insts = graph.into_original_order();
                let stats = WindowStats { pairs_fused, ..Default::default() };
                return Ok((insts, stats));
            }
            Err(e) => return Err(e),
        };

        let (send_stall, sequential) = self.stall_accounting(&graph, &schedule.order);
        let stats = WindowStats {
            cycles: schedule.total_cycles,
            send_stall_cycles: send_stall + schedule.send_stall_cycles,
            sequential_cycles: sequential,
            pairs_fused,
        };

        let out = graph.into_order(&schedule.order);
        debug_assert_eq!(out.len(), input_len, "scheduling changed the instruction count");
        Ok((out, stats))
    }

    /// Derive issue-gap stall figures from the cycle stamps, scaled by
    /// the number of hardware threads sharing the unit: a gap only
    /// stalls the machine once every resident thread has had a chance
    /// to issue into it.
    fn stall_accounting(
        &self,
        graph: &crate::graph::DepGraph,
        order: &[crate::graph::NodeId],
    ) -> (u32, u32) {
        let threads = self.params.hw_threads_per_eu.max(1);
        let mut send_stall = 0u32;
        let mut sequential = 0u32;
        let mut prev: Option<&SchedNode> = None;
        for &id in order {
            let node = graph.node(id);
            for _ in node.insts() {
                if let Some(p) = prev {
                    if !p.is_label() {
                        let gap = node.sched_cycle.saturating_sub(p.sched_cycle);
                        if gap > p.occupancy() * threads {
                            let scaled = gap.div_ceil(threads);
                            send_stall += scaled;
                            sequential += scaled;
                        }
                    }
                }
                sequential += node.occupancy();
                prev = Some(node);
            }
        }
        (send_stall, sequential)
    }
}

fn accumulate(into: &mut WindowStats, ws: WindowStats) {
    into.cycles += ws.cycles;
    into.send_stall_cycles += ws.send_stall_cycles;
    into.sequential_cycles += ws.sequential_cycles;
    into.pairs_fused += ws.pairs_fused;
}

// =============================================================================
// Tests
// =============================================================================
