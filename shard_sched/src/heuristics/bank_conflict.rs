//! Register Bank Conflict Avoidance
//!
//! The register file is split into banks of two-register bundles; the
//! read stage has three ports but at most one access per bank-bundle
//! per cycle. When the previous instruction and the candidate would
//! read from the same bundle in adjacent cycles, the second read
//! serializes. A conflict-free candidate from the window avoids the
//! stall.

use log::trace;
use shard_core::inst::{Instruction, StorageBase};
use shard_core::params::KernelParams;
use smallvec::SmallVec;

use super::{Decision, SelectCtx, SelectionPolicy};
use crate::config::SchedConfig;
use crate::graph::NodeId;

/// Steers around read-port bank conflicts.
#[derive(Debug, Default)]
pub struct BankConflictPolicy;

impl BankConflictPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        BankConflictPolicy
    }
}

/// Bank-bundle slots read by an instruction's GRF sources.
fn read_bundles(inst: &Instruction, params: &KernelParams) -> SmallVec<[(u32, u32); 3]> {
    let mut out = SmallVec::new();
    for src in inst.srcs() {
        if let StorageBase::Grf { byte_start, .. } = src.base {
            let reg = byte_start / params.grf_byte_size;
            let bank = reg % 2;
            let bundle = (reg / 2) % 8;
            out.push((bank, bundle));
        }
    }
    out
}

/// Whether the two instructions' reads collide on a bank bundle.
fn conflicts(prev: &Instruction, next: &Instruction, params: &KernelParams) -> bool {
    let a = read_bundles(prev, params);
    let b = read_bundles(next, params);
    b.iter().any(|slot| a.contains(slot))
}

impl SelectionPolicy for BankConflictPolicy {
    fn name(&self) -> &'static str {
        "bank-conflict"
    }

    fn window(&self, config: &SchedConfig) -> usize {
        config.bank_conflict_window
    }

    fn select(&mut self, ctx: &SelectCtx<'_>, candidate: NodeId, window: &[NodeId]) -> Decision {
        let Some(last) = ctx.last else {
            return Decision::Keep;
        };
        let prev = ctx.graph.node(last).first_inst();
        let cand = ctx.graph.node(candidate).first_inst();
        if !conflicts(prev, cand, ctx.params) {
            return Decision::Keep;
        }
        for &alt in window.iter().take(ctx.config.bank_conflict_window) {
            if !conflicts(prev, ctx.graph.node(alt).first_inst(), ctx.params) {
                trace!("bank conflict on {candidate}, issuing {alt} instead");
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

    fn add(dst: u32, src: u32) -> Instruction {
        Instruction::new(Opcode::Add, 8)
            .with_dst(Operand::grf(dst * 32, 32))
            .with_src(Operand::grf(src * 32, 32))
    }

    #[test]
    fn test_bundle_mapping() {
        let params = KernelParams::default();
        // r0 and r16 share bank 0, bundle 0; r1 is bank 1.
        let a = add(40, 0);
        let b = add(41, 16);
        let c = add(42, 1);
        assert!(conflicts(&a, &b, &params));
        assert!(!conflicts(&a, &c, &params));
    }

    #[test]
    fn test_conflicting_candidate_is_replaced() {
        let params = KernelParams::default();
        let table = LatencyTable::new(&params, false);
        let config = SchedConfig::default();
        // n1 reads the same bundle as n0 (r16 vs r0); n2 does not (r1).
        let g = GraphBuilder::new(&table, &NoAliasInfo, &params, &config)
            .build(vec![add(40, 0), add(41, 16), add(42, 1)])
            .unwrap();
        let mut policy = BankConflictPolicy::new();
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
        // Without a clean alternative the candidate stands.
        let d = policy.select(&ctx, NodeId::new(1), &[]);
        assert_eq!(d, Decision::Keep);
    }
}
