//! Scheduling Statistics
//!
//! Per-block and kernel-wide cost figures produced by the scheduler and
//! consumed by the surrounding compiler's cost reporting.

/// Statistics for one scheduled block.
#[derive(Debug, Clone, Default)]
pub struct BlockStats {
    /// Block id.
    pub block_id: u32,
    /// Instructions in the block after scheduling.
    pub insts: usize,
    /// Modeled cycles for the block.
    pub cycles: u32,
    /// Stall cycles attributed to full send queues and latency gaps,
    /// scaled by the resident-thread model.
    pub send_stall_cycles: u32,
    /// Issue-cost estimate assuming sequential execution.
    pub sequential_cycles: u32,
    /// Instruction pairs fused into single nodes.
    pub pairs_fused: u32,
    /// Synthetic no-ops inserted for hazards.
    pub nops_inserted: u32,
    /// Loop nesting depth of the block.
    pub nest_level: u8,
}

/// Aggregate statistics for one kernel.
#[derive(Debug, Clone, Default)]
pub struct KernelStats {
    /// Blocks that went through the scheduler.
    pub blocks_scheduled: usize,
    /// Blocks skipped for being under the size threshold.
    pub blocks_skipped: usize,
    /// Sum of modeled block cycles.
    pub total_cycles: u64,
    /// Sum of modeled stall cycles.
    pub total_send_stall_cycles: u64,
    /// Nesting-weighted cost estimate: block cycles scaled by
    /// `loop_weight` per nesting level.
    pub weighted_cycles: f64,
    /// Per-block figures, in block order.
    pub blocks: Vec<BlockStats>,
}

impl KernelStats {
    /// Fold one block's figures into the kernel totals.
    pub fn add_block(&mut self, block: BlockStats, loop_weight: f32) {
        self.blocks_scheduled += 1;
        self.total_cycles += u64::from(block.cycles);
        self.total_send_stall_cycles += u64::from(block.send_stall_cycles);
        self.weighted_cycles +=
            f64::from(block.cycles) * f64::from(loop_weight).powi(i32::from(block.nest_level));
        self.blocks.push(block);
    }
}
