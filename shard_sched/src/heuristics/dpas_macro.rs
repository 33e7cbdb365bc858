//! Dot-Product Macro Affinity
//!
//! Consecutive systolic dot-product instructions that read the same
//! weight operand chain their accumulator forwarding and issue as a
//! macro, skipping the systolic array's drain between them. After a
//! dot-product is scheduled, a chaining partner beats the plain
//! priority order.

use log::trace;
use shard_core::inst::Instruction;

use super::{Decision, SelectCtx, SelectionPolicy};
use crate::config::SchedConfig;
use crate::graph::NodeId;

/// Keeps dot-product macro chains together at selection time.
#[derive(Debug, Default)]
pub struct DpasMacroPolicy;

impl DpasMacroPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        DpasMacroPolicy
    }
}

/// The hardware forwarding rule: both instructions read the same weight
/// source.
fn chains_with(prev: &Instruction, next: &Instruction) -> bool {
    next.is_dpas()
        && prev.srcs().len() >= 2
        && next.srcs().len() >= 2
        && prev.srcs()[1] == next.srcs()[1]
}

impl SelectionPolicy for DpasMacroPolicy {
    fn name(&self) -> &'static str {
        "dpas-macro"
    }

    fn window(&self, config: &SchedConfig) -> usize {
        config.dpas_search_window
    }

    fn select(&mut self, ctx: &SelectCtx<'_>, candidate: NodeId, window: &[NodeId]) -> Decision {
        let Some(last) = ctx.last else {
            return Decision::Keep;
        };
        let prev = ctx.graph.node(last).first_inst();
        if !prev.is_dpas() {
            return Decision::Keep;
        }
        if chains_with(prev, ctx.graph.node(candidate).first_inst()) {
            return Decision::Keep;
        }
        for &alt in window.iter().take(ctx.config.dpas_search_window) {
            if chains_with(prev, ctx.graph.node(alt).first_inst()) {
                trace!("chaining dpas macro: {last} -> {alt}");
                return Decision::Replace(alt);
            }
        }
        Decision::Keep
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::GraphBuilder;
    use shard_core::alias::NoAliasInfo;
    use shard_core::inst::{Opcode, Operand};
    use shard_core::latency::LatencyTable;
    use shard_core::KernelParams;

    fn dpas(dst: u32, weights: u32) -> Instruction {
        Instruction::new(Opcode::Dpas, 8)
            .with_dst(Operand::grf(dst * 32, 64))
            .with_src(Operand::grf(256, 64))
            .with_src(Operand::grf(weights * 32, 64))
    }

    fn add(dst: u32, src: u32) -> Instruction {
        Instruction::new(Opcode::Add, 8)
            .with_dst(Operand::grf(dst * 32, 32))
            .with_src(Operand::grf(src * 32, 32))
    }

    #[test]
    fn test_partner_is_pulled_forward() {
        let params = KernelParams::default();
        let table = LatencyTable::new(&params, false);
        let config = SchedConfig::default();
        // n0/n2 share weights; n1 is unrelated ALU work.
        let g = GraphBuilder::new(&table, &NoAliasInfo, &params, &config)
            .build(vec![dpas(1, 20), add(10, 11), dpas(4, 20)])
            .unwrap();
        let mut policy = DpasMacroPolicy::new();
        let ctx = SelectCtx {
            graph: &g,
            latency: &table,
            config: &config,
            params: &params,
            clock: 0,
            last: Some(NodeId::new(0)),
        };
        let d = policy.select(&ctx, NodeId::new(1), &[NodeId::new(2)]);
        assert_eq!(d, Decision::Replace(NodeId::new(2)));
        // Candidate already chains: no change.
        let d = policy.select(&ctx, NodeId::new(2), &[NodeId::new(1)]);
        assert_eq!(d, Decision::Keep);
        // No dot-product was just scheduled: no change.
        let ctx_alu = SelectCtx { last: Some(NodeId::new(1)), ..ctx };
        assert_eq!(policy.select(&ctx_alu, NodeId::new(0), &[NodeId::new(2)]), Decision::Keep);
    }
}
