//! Dependency Graph Construction
//!
//! Builds the scheduling DAG with a single reverse pass over the block.
//! Scanning from the last instruction to the first keeps operand
//! liveness implicit: a bucket holds exactly the accesses that are still
//! observable at the current program point, and a covering write kills
//! them. Every instruction therefore only compares against the live
//! entries of the buckets it touches, never the whole block.
//!
//! Barriers (labels, control transfers, fences, unresolvable indirect
//! accesses) order against everything: they take an edge to every live
//! node that is not already transitively ordered, clear the table, and
//! chain to the previous barrier.

use log::trace;
use shard_core::alias::AliasOracle;
use shard_core::dep::{classify_roles, DepKind};
use shard_core::inst::{
    BarrierKind, Instruction, OperandRole, SendOp, StorageBase,
};
use shard_core::latency::LatencyOracle;
use shard_core::params::KernelParams;
use shard_core::{SchedError, SchedResult};

use super::buckets::{BucketClass, BucketDescr, BucketLayout, LiveBuckets, LiveEntry};
use super::{DepGraph, NodeId, NodeTiming};
use crate::config::SchedConfig;

/// Builds the dependency DAG for one scheduling window.
pub struct GraphBuilder<'a> {
    latency: &'a dyn LatencyOracle,
    alias: &'a dyn AliasOracle,
    config: &'a SchedConfig,
    layout: BucketLayout,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder over the given oracles and geometry.
    pub fn new(
        latency: &'a dyn LatencyOracle,
        alias: &'a dyn AliasOracle,
        params: &'a KernelParams,
        config: &'a SchedConfig,
    ) -> Self {
        GraphBuilder {
            latency,
            alias,
            config,
            layout: BucketLayout::new(params),
        }
    }

    /// Bucket index layout used by this builder.
    #[inline]
    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    /// Consume the instruction list of one window and build its DAG.
    pub fn build(&self, mut insts: Vec<Instruction>) -> SchedResult<DepGraph> {
        for (i, inst) in insts.iter_mut().enumerate() {
            inst.set_local_id(i as u32);
        }

        // Timing, descriptors and barrier classification are sampled up
        // front; the reverse scan below only manipulates graph
        // structure.
        let mut timings = Vec::with_capacity(insts.len());
        let mut descrs = Vec::with_capacity(insts.len());
        let mut barriers = Vec::with_capacity(insts.len());
        for inst in &insts {
            timings.push(self.timing_of(inst));
            let (bd, unresolved) = self.bucket_descrs(inst)?;
            let mut barrier = inst.barrier_kind();
            if barrier == BarrierKind::None && unresolved {
                barrier = BarrierKind::Indirect;
            }
            descrs.push(bd);
            barriers.push(barrier);
        }

        let mut graph = DepGraph::new();
        for ((inst, timing), barrier) in insts.into_iter().zip(timings).zip(barriers.iter()) {
            graph.push_node(inst, timing, *barrier);
        }

        let mut live = LiveBuckets::new(&self.layout);
        let mut last_barrier: Option<NodeId> = None;

        for i in (0..graph.nodes().len()).rev() {
            let cur = NodeId::new(i as u32);
            let barrier = barriers[i];

            if barrier.is_barrier() {
                self.process_barrier(&mut graph, &mut live, cur, barrier, last_barrier);
                last_barrier = Some(cur);
            } else {
                self.process_operands(&mut graph, &mut live, cur, &descrs[i], last_barrier);
            }

            // The instruction's own accesses become live, barriers
            // included.
            for bd in &descrs[i] {
                live.add(bd.bucket, LiveEntry { node: cur, mask: bd.mask, role: bd.role });
                if bd.role == OperandRole::Dst
                    && self.layout.class_of(bd.bucket) == BucketClass::Grf
                {
                    let (start, end) = self.layout.grf_span(bd.bucket);
                    if !bd.mask.covers_span(start, end) {
                        graph.node_mut(cur).subreg_write = Some(bd.bucket as u32);
                    }
                }
            }
        }

        debug_assert!(graph.is_acyclic(), "dependency graph has a cycle");
        trace!(
            "built dependency graph: {} nodes, {} roots",
            graph.nodes().len(),
            graph.roots().len()
        );
        Ok(graph)
    }

    /// Sample the latency oracle for one instruction.
    fn timing_of(&self, inst: &Instruction) -> NodeTiming {
        NodeTiming {
            occupancy: self.latency.occupancy(inst),
            raw: self.latency.latency(inst, DepKind::Raw),
            false_dep: self.latency.latency(inst, DepKind::War),
            barrier: self.latency.latency(inst, DepKind::Barrier),
        }
    }

    /// A barrier orders against every live node that has no other
    /// predecessor yet, empties the table, and chains to the previous
    /// barrier.
    fn process_barrier(
        &self,
        graph: &mut DepGraph,
        live: &mut LiveBuckets,
        cur: NodeId,
        barrier: BarrierKind,
        last_barrier: Option<NodeId>,
    ) {
        let kind = edge_kind_of(barrier);
        let targets: Vec<NodeId> = live
            .iter_all()
            .filter(|e| graph.node(e.node).preds().is_empty())
            .map(|e| e.node)
            .collect();
        for t in targets {
            if t != cur {
                graph.add_edge(cur, t, kind);
            }
        }
        live.clear_all();

        if let Some(lb) = last_barrier {
            let lb_kind = edge_kind_of(graph.node(lb).barrier);
            graph.add_edge(cur, lb, lb_kind);
        }
    }

    /// Classify the instruction's accesses against every live entry of
    /// the buckets it touches, creating or upgrading edges and killing
    /// fully-overwritten entries.
    fn process_operands(
        &self,
        graph: &mut DepGraph,
        live: &mut LiveBuckets,
        cur: NodeId,
        descrs: &[BucketDescr],
        last_barrier: Option<NodeId>,
    ) {
        let mut transitive_to_barrier = false;

        for bd in descrs {
            let class = self.layout.class_of(bd.bucket);
            let kills_bucket = match class {
                BucketClass::Grf => {
                    let (start, end) = self.layout.grf_span(bd.bucket);
                    bd.role.is_write() && bd.mask.covers_span(start, end)
                }
                _ => false,
            };

            let mut j = 0;
            while j < live.len(bd.bucket) {
                let entry = live.entries(bd.bucket)[j];
                let (dep, overlap, kills_live) =
                    self.classify(graph, class, cur, bd, &entry);

                if let Some(kind) = dep {
                    if overlap {
                        graph.add_edge(cur, entry.node, kind);
                        transitive_to_barrier |= graph.node(entry.node).reaches_barrier;
                    }
                    if kind.is_killing() && overlap && (kills_bucket || kills_live) {
                        live.kill(bd.bucket, j);
                        continue;
                    }
                }
                j += 1;
            }
        }

        // Anything not already ordered against the next barrier gets a
        // direct edge, so barriers are never bypassed.
        if !transitive_to_barrier {
            if let Some(lb) = last_barrier {
                let lb_kind = edge_kind_of(graph.node(lb).barrier);
                graph.add_edge(cur, lb, lb_kind);
                graph.node_mut(cur).reaches_barrier = true;
            }
        }
    }

    /// Dependency classification for one (current access, live access)
    /// pair, per bucket class. Returns the kind, whether the accesses
    /// overlap, and whether the current access kills the live entry.
    fn classify(
        &self,
        graph: &DepGraph,
        class: BucketClass,
        cur: NodeId,
        bd: &BucketDescr,
        entry: &LiveEntry,
    ) -> (Option<DepKind>, bool, bool) {
        match class {
            BucketClass::Grf => {
                let dep = classify_roles(bd.role, entry.role);
                let overlap = bd.mask.overlaps(&entry.mask);
                let kills = bd.role.is_write() && bd.mask.kills(&entry.mask);
                (dep, overlap, kills)
            }
            BucketClass::Acc | BucketClass::Flag | BucketClass::Addr => {
                let dep = classify_roles(bd.role, entry.role);
                (dep, dep.is_some(), false)
            }
            BucketClass::OtherArf => {
                let dep = classify_roles(bd.role, entry.role);
                // No byte-precise model for the remaining registers.
                (dep, dep.is_some(), false)
            }
            BucketClass::Send => {
                let dep = self.classify_sends(
                    graph.node(cur).first_inst(),
                    graph.node(entry.node).first_inst(),
                );
                let kills = matches!(dep, Some(DepKind::WawMemory | DepKind::RawMemory));
                (dep, dep.is_some(), kills)
            }
            BucketClass::ScratchSend => {
                let dep = self.classify_sends(
                    graph.node(cur).first_inst(),
                    graph.node(entry.node).first_inst(),
                );
                // Scratch ranges can recur under indirect offsets; never
                // kill so every overlapping pair stays ordered.
                (dep, dep.is_some(), false)
            }
        }
    }

    /// Conservative message-channel classification between two sends.
    fn classify_sends(&self, cur: &Instruction, live: &Instruction) -> Option<DepKind> {
        let (cd, ld) = (cur.send_desc()?, live.send_desc()?);
        if !cd.target.may_alias(&ld.target) && self.config.reorder_unrelated_sends {
            return None;
        }
        let cur_writes = !matches!(cd.op, SendOp::Read);
        let live_writes = !matches!(ld.op, SendOp::Read);
        match (cur_writes, live_writes) {
            (true, true) => Some(DepKind::WawMemory),
            (true, false) => Some(DepKind::RawMemory),
            (false, true) => Some(DepKind::WarMemory),
            (false, false) => None,
        }
    }

    /// Expand one instruction into bucket descriptors. The second return
    /// is true when an indirect operand could not be resolved and the
    /// instruction must be treated as a barrier.
    fn bucket_descrs(&self, inst: &Instruction) -> SchedResult<(Vec<BucketDescr>, bool)> {
        let mut out = Vec::new();
        let mut unresolved = false;
        let mut bad_operand = false;

        inst.for_each_operand(|role, op| {
            if op.indirect {
                match self.alias.possible_targets(op) {
                    Some(targets) => {
                        for base in targets {
                            if self.push_base(&mut out, base, None, role).is_err() {
                                bad_operand = true;
                            }
                        }
                    }
                    None => unresolved = true,
                }
                return;
            }
            if self.push_base(&mut out, op.base, Some(op.mask), role).is_err() {
                bad_operand = true;
            }
        });

        if bad_operand {
            return Err(SchedError::MalformedOperand { inst: inst.local_id() });
        }

        // Sends additionally occupy their message channel bucket.
        if let Some(desc) = inst.send_desc() {
            let bucket = match desc.target {
                shard_core::inst::SendTarget::Scratch { .. } => self.layout.scratch_send(),
                _ => self.layout.send(),
            };
            out.push(BucketDescr {
                bucket,
                mask: shard_core::inst::AccessMask::conservative(),
                role: OperandRole::Dst,
            });
        }
        Ok((out, unresolved))
    }

    /// Append descriptors for one storage base. `mask` is `None` for
    /// aliased targets, which are tracked conservatively.
    fn push_base(
        &self,
        out: &mut Vec<BucketDescr>,
        base: StorageBase,
        mask: Option<shard_core::inst::AccessMask>,
        role: OperandRole,
    ) -> Result<(), ()> {
        match base {
            StorageBase::Null => Ok(()),
            StorageBase::Arch(reg) => {
                out.push(BucketDescr {
                    bucket: self.layout.of_arch(reg),
                    mask: mask.unwrap_or_else(shard_core::inst::AccessMask::conservative),
                    role,
                });
                Ok(())
            }
            StorageBase::Grf { byte_start, byte_len } => {
                let end = byte_start + byte_len.saturating_sub(1);
                let first = self.layout.grf_of_byte(byte_start).ok_or(())?;
                let last = self.layout.grf_of_byte(end).ok_or(())?;
                let m = mask.unwrap_or_else(shard_core::inst::AccessMask::conservative);
                for bucket in first..=last {
                    out.push(BucketDescr { bucket, mask: m, role });
                }
                Ok(())
            }
        }
    }
}

/// Edge kind used for ordering against a barrier of the given class.
fn edge_kind_of(barrier: BarrierKind) -> DepKind {
    if barrier == BarrierKind::Label {
        DepKind::Label
    } else {
        DepKind::Barrier
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shard_core::alias::NoAliasInfo;
    use shard_core::inst::{Opcode, Operand, SendDesc, SendTarget};
    use shard_core::latency::LatencyTable;
    use shard_core::KernelParams;

    fn build(insts: Vec<Instruction>) -> DepGraph {
        let params = KernelParams::default();
        let table = LatencyTable::new(&params, false);
        let config = SchedConfig::default();
        GraphBuilder::new(&table, &NoAliasInfo, &params, &config)
            .build(insts)
            .expect("build failed")
    }

    fn add_r(dst: u32, src: u32) -> Instruction {
        Instruction::new(Opcode::Add, 8)
            .with_dst(Operand::grf(dst * 32, 32))
            .with_src(Operand::grf(src * 32, 32))
    }

    #[test]
    fn test_raw_edge() {
        // r1 = r0; r2 = r1  =>  RAW edge n0 -> n1.
        let g = build(vec![add_r(1, 0), add_r(2, 1)]);
        let e = g.node(NodeId::new(0)).succ_edge_to(NodeId::new(1)).unwrap();
        assert_eq!(e.kind, DepKind::Raw);
        assert_eq!(g.node(NodeId::new(1)).preds_not_scheduled, 1);
    }

    #[test]
    fn test_war_edge() {
        // r2 = r1; r1 = r0  =>  WAR edge n0 -> n1.
        let g = build(vec![add_r(2, 1), add_r(1, 0)]);
        let e = g.node(NodeId::new(0)).succ_edge_to(NodeId::new(1)).unwrap();
        assert_eq!(e.kind, DepKind::War);
    }

    #[test]
    fn test_independent_instructions_have_no_edge() {
        let g = build(vec![add_r(1, 0), add_r(3, 2)]);
        assert!(!g.has_edge(NodeId::new(0), NodeId::new(1)));
        assert!(!g.has_edge(NodeId::new(1), NodeId::new(0)));
        assert_eq!(g.roots().len(), 2);
    }

    #[test]
    fn test_full_overwrite_kills_live_range() {
        // n0 writes r1, n1 overwrites r1 fully, n2 reads r1.
        // n2 must depend on n1 but not on n0.
        let g = build(vec![add_r(1, 0), add_r(1, 2), add_r(3, 1)]);
        assert!(g.has_edge(NodeId::new(0), NodeId::new(1))); // WAW
        assert!(g.has_edge(NodeId::new(1), NodeId::new(2))); // RAW
        assert!(!g.has_edge(NodeId::new(0), NodeId::new(2)));
    }

    #[test]
    fn test_partial_overwrite_does_not_kill() {
        // n0 writes all of r1; n1 writes only half of r1; n2 reads r1.
        let half = Instruction::new(Opcode::Add, 8)
            .with_dst(Operand::grf(32, 16))
            .with_src(Operand::grf(64, 16));
        let g = build(vec![add_r(1, 0), half, add_r(3, 1)]);
        assert!(g.has_edge(NodeId::new(0), NodeId::new(2)));
        assert!(g.has_edge(NodeId::new(1), NodeId::new(2)));
        // The half write is a subregister write.
        assert_eq!(g.node(NodeId::new(1)).subreg_write, Some(1));
    }

    #[test]
    fn test_priority_is_critical_path() {
        // Chain n0 -> n1 -> n2 over RAW edges of latency 14, occupancy 2.
        let g = build(vec![add_r(1, 0), add_r(2, 1), add_r(3, 2)]);
        assert_eq!(g.node(NodeId::new(2)).priority, 2);
        assert_eq!(g.node(NodeId::new(1)).priority, 16);
        assert_eq!(g.node(NodeId::new(0)).priority, 30);
    }

    #[test]
    fn test_label_and_fence_chain() {
        let label = Instruction::new(Opcode::Label, 1);
        let fence = Instruction::new(Opcode::Send, 8).with_send(SendDesc {
            target: SendTarget::DataCache,
            op: SendOp::Write,
            fence: true,
            mask_offset: 0,
        });
        let g = build(vec![label, fence]);
        // A single chained-barrier edge label -> fence, nothing else.
        let edges: usize = g.nodes().iter().map(|n| n.succs().len()).sum();
        assert_eq!(edges, 1);
        let e = g.node(NodeId::new(0)).succ_edge_to(NodeId::new(1)).unwrap();
        assert_eq!(e.kind, DepKind::Label);
        assert_eq!(g.roots(), vec![NodeId::new(0)]);
    }

    #[test]
    fn test_barrier_orders_unconstrained_nodes() {
        // add; fence; add  =>  both adds ordered against the fence.
        let fence = Instruction::new(Opcode::Send, 8).with_send(SendDesc {
            target: SendTarget::DataCache,
            op: SendOp::Write,
            fence: true,
            mask_offset: 0,
        });
        let g = build(vec![add_r(1, 0), fence, add_r(3, 2)]);
        assert!(g.has_edge(NodeId::new(0), NodeId::new(1)));
        assert!(g.has_edge(NodeId::new(1), NodeId::new(2)));
        assert!(g.is_acyclic());
    }

    #[test]
    fn test_unresolved_indirect_is_barrier() {
        let indirect = Instruction::new(Opcode::Mov, 8)
            .with_dst(Operand::grf(0, 32))
            .with_src(Operand::grf(64, 32).indirect());
        let g = build(vec![add_r(1, 0), indirect, add_r(5, 4)]);
        // The indirect mov orders against both neighbors.
        assert!(g.has_edge(NodeId::new(0), NodeId::new(1)));
        assert!(g.has_edge(NodeId::new(1), NodeId::new(2)));
    }

    #[test]
    fn test_resolved_indirect_uses_alias_targets() {
        use shard_core::alias::StaticAliasMap;
        let mut alias = StaticAliasMap::new();
        alias.insert(64, vec![StorageBase::Grf { byte_start: 32, byte_len: 32 }]);

        let params = KernelParams::default();
        let table = LatencyTable::new(&params, false);
        let config = SchedConfig::default();
        let indirect = Instruction::new(Opcode::Mov, 8)
            .with_dst(Operand::grf(96, 32))
            .with_src(Operand::grf(64, 32).indirect());
        let g = GraphBuilder::new(&table, &alias, &params, &config)
            .build(vec![add_r(1, 0), indirect, add_r(5, 4)])
            .unwrap();
        // Reads the aliased r1 written by n0: a plain RAW edge, and no
        // barrier ordering against the unrelated n2.
        let e = g.node(NodeId::new(0)).succ_edge_to(NodeId::new(1)).unwrap();
        assert_eq!(e.kind, DepKind::Raw);
        assert!(!g.has_edge(NodeId::new(1), NodeId::new(2)));
    }

    #[test]
    fn test_sends_same_target_are_ordered() {
        let store = |off| {
            Instruction::new(Opcode::Send, 8)
                .with_src(Operand::grf(off, 32))
                .with_send(SendDesc {
                    target: SendTarget::DataCache,
                    op: SendOp::Write,
                    fence: false,
                    mask_offset: 0,
                })
        };
        let g = build(vec![store(0), store(64)]);
        let e = g.node(NodeId::new(0)).succ_edge_to(NodeId::new(1)).unwrap();
        assert_eq!(e.kind, DepKind::WawMemory);
    }

    #[test]
    fn test_sends_different_targets_can_reorder() {
        let sampler_read = Instruction::new(Opcode::Send, 8)
            .with_dst(Operand::grf(0, 32))
            .with_send(SendDesc {
                target: SendTarget::Sampler,
                op: SendOp::Read,
                fence: false,
                mask_offset: 0,
            });
        let dc_write = Instruction::new(Opcode::Send, 8)
            .with_src(Operand::grf(64, 32))
            .with_send(SendDesc {
                target: SendTarget::DataCache,
                op: SendOp::Write,
                fence: false,
                mask_offset: 0,
            });
        let g = build(vec![sampler_read, dc_write]);
        assert!(!g.has_edge(NodeId::new(0), NodeId::new(1)));
    }

    #[test]
    fn test_malformed_operand_is_an_error() {
        let params = KernelParams::default();
        let table = LatencyTable::new(&params, false);
        let config = SchedConfig::default();
        // Byte range beyond the register file.
        let bad = Instruction::new(Opcode::Mov, 8)
            .with_dst(Operand::grf(params.grf_file_bytes(), 32));
        let err = GraphBuilder::new(&table, &NoAliasInfo, &params, &config)
            .build(vec![bad])
            .unwrap_err();
        assert!(matches!(err, SchedError::MalformedOperand { inst: 0 }));
    }
}
