//! Property test suite for the local instruction scheduler.
//!
//! Covers the correctness guarantees the surrounding compiler relies
//! on:
//! - the dependency graph is acyclic, including after fusion
//! - every edge's producer is scheduled before its consumer, far
//!   enough apart to cover the edge latency
//! - the output is a permutation of the input
//! - scheduling is deterministic and the clock is monotonic
//! - conflicting storage accesses are always ordered
//! - the documented concrete scenarios behave as specified

use shard_core::alias::NoAliasInfo;
use shard_core::inst::{
    Instruction, Opcode, Operand, OperandRole, SendDesc, SendOp, SendTarget, StorageBase,
};
use shard_core::latency::{LatencyOracle, LatencyTable};
use shard_core::{DepKind, KernelParams};
use shard_sched::graph::builder::GraphBuilder;
use shard_sched::graph::fusion::pair_nodes;
use shard_sched::graph::{DepGraph, NodeId};
use shard_sched::scheduler::{ListScheduler, Schedule};
use shard_sched::{LocalScheduler, SchedConfig};

// ============================================================================
// Test Utilities
// ============================================================================

fn add(dst: u32, src: u32) -> Instruction {
    Instruction::new(Opcode::Add, 8)
        .with_dst(Operand::grf(dst * 32, 32))
        .with_src(Operand::grf(src * 32, 32))
}

fn mul(dst: u32, a: u32, b: u32) -> Instruction {
    Instruction::new(Opcode::Mul, 8)
        .with_dst(Operand::grf(dst * 32, 32))
        .with_src(Operand::grf(a * 32, 32))
        .with_src(Operand::grf(b * 32, 32))
}

fn sampler_load(dst: u32, addr: u32) -> Instruction {
    Instruction::new(Opcode::Send, 8)
        .with_dst(Operand::grf(dst * 32, 64))
        .with_src(Operand::grf(addr * 32, 32))
        .with_send(SendDesc {
            target: SendTarget::Sampler,
            op: SendOp::Read,
            fence: false,
            mask_offset: 0,
        })
}

fn split_write(payload: u32, part: u8) -> Instruction {
    Instruction::new(Opcode::Send, 8)
        .with_src(Operand::grf(payload * 32, 32))
        .with_send(SendDesc {
            target: SendTarget::RenderCache,
            op: SendOp::Write,
            fence: false,
            mask_offset: part * 8,
        })
}

/// A moderately tangled block exercising RAW, WAR, WAW, send and math
/// dependencies.
fn mixed_block() -> Vec<Instruction> {
    vec![
        sampler_load(1, 20),
        add(3, 1),
        mul(4, 3, 3),
        add(3, 5),
        add(6, 7),
        mul(8, 6, 6),
        add(6, 9),
        Instruction::new(Opcode::Math(shard_core::MathFn::Sqrt), 8)
            .with_dst(Operand::grf(10 * 32, 32))
            .with_src(Operand::grf(8 * 32, 32)),
        add(11, 10),
        add(12, 2),
    ]
}

fn build_graph(insts: Vec<Instruction>, config: &SchedConfig) -> DepGraph {
    let params = KernelParams::default();
    let table = LatencyTable::new(&params, false);
    GraphBuilder::new(&table, &NoAliasInfo, &params, config)
        .build(insts)
        .expect("graph build failed")
}

fn run_scheduler(insts: Vec<Instruction>, config: &SchedConfig) -> (DepGraph, Schedule) {
    let params = KernelParams::default();
    let table = LatencyTable::new(&params, false);
    let mut graph = build_graph(insts, config);
    let schedule = ListScheduler::new(&table, &params, config)
        .run(&mut graph)
        .expect("scheduling failed");
    (graph, schedule)
}

/// Assert every dependency edge is honored by the schedule.
fn assert_dependencies_hold(graph: &DepGraph, order: &[NodeId]) {
    let position = |id: NodeId| order.iter().position(|&x| x == id).expect("node in order");
    for node in graph.nodes() {
        if node.dead {
            continue;
        }
        for e in node.succs() {
            assert!(
                position(node.id()) < position(e.node),
                "edge {} -> {} violated by order",
                node.id(),
                e.node
            );
            if e.kind != DepKind::Label {
                let pred_cycle = node.sched_cycle;
                let succ_cycle = graph.node(e.node).sched_cycle;
                assert!(
                    succ_cycle >= pred_cycle + e.latency,
                    "edge {} -> {} latency not covered: {} vs {} + {}",
                    node.id(),
                    e.node,
                    succ_cycle,
                    pred_cycle,
                    e.latency
                );
            }
        }
    }
}

/// All storage accesses of an instruction, for the brute-force overlap
/// oracle used by the bucket-correctness test.
fn accesses(inst: &Instruction) -> Vec<(OperandRole, StorageBase)> {
    let mut out = Vec::new();
    inst.for_each_operand(|role, op| out.push((role, op.base)));
    out
}

/// Whether two instructions conflict on storage (overlap with at least
/// one write), ignoring send channels.
fn grf_conflict(a: &Instruction, b: &Instruction) -> bool {
    for (ra, ba) in accesses(a) {
        for (rb, bb) in accesses(b) {
            if !ra.is_write() && !rb.is_write() {
                continue;
            }
            if let (
                StorageBase::Grf { byte_start: sa, byte_len: la },
                StorageBase::Grf { byte_start: sb, byte_len: lb },
            ) = (ba, bb)
            {
                if sa < sb + lb && sb < sa + la {
                    return true;
                }
            }
        }
    }
    false
}

/// Whether `to` is reachable from `from` along successor edges.
fn reachable(graph: &DepGraph, from: NodeId, to: NodeId) -> bool {
    let mut stack = vec![from];
    let mut seen = vec![false; graph.nodes().len()];
    while let Some(id) = stack.pop() {
        if id == to {
            return true;
        }
        if std::mem::replace(&mut seen[id.index()], true) {
            continue;
        }
        for e in graph.node(id).succs() {
            stack.push(e.node);
        }
    }
    false
}

// ============================================================================
// Graph Properties
// ============================================================================

#[test]
fn acyclic_for_mixed_block() {
    let config = SchedConfig::default();
    let g = build_graph(mixed_block(), &config);
    assert!(g.is_acyclic());
}

#[test]
fn acyclic_after_fusion() {
    let config = SchedConfig { fuse_wide_stores: true, fuse_dpas: true, ..Default::default() };
    let mut insts = mixed_block();
    insts.push(split_write(30, 0));
    insts.push(split_write(31, 1));
    let mut g = build_graph(insts, &config);
    let fused = pair_nodes(&mut g, &config);
    assert_eq!(fused, 1);
    assert!(g.is_acyclic());
}

#[test]
fn bucket_correctness_conflicts_are_ordered() {
    // For every pair of instructions with overlapping storage and at
    // least one write, a dependency path must exist in program order.
    let config = SchedConfig::default();
    let insts = mixed_block();
    let copies: Vec<Instruction> = insts.clone();
    let g = build_graph(insts, &config);
    for i in 0..copies.len() {
        for j in (i + 1)..copies.len() {
            if grf_conflict(&copies[i], &copies[j]) {
                assert!(
                    reachable(&g, NodeId::new(i as u32), NodeId::new(j as u32)),
                    "conflicting pair ({i}, {j}) is unordered"
                );
            }
        }
    }
}

// ============================================================================
// Scheduling Properties
// ============================================================================

#[test]
fn dependency_preservation() {
    let config = SchedConfig::default();
    let (graph, schedule) = run_scheduler(mixed_block(), &config);
    assert_dependencies_hold(&graph, &schedule.order);
}

#[test]
fn permutation_property() {
    let config = SchedConfig::default();
    let insts = mixed_block();
    let n = insts.len();
    let (graph, schedule) = run_scheduler(insts, &config);
    let out = graph.into_order(&schedule.order);
    assert_eq!(out.len(), n);
    let mut ids: Vec<u32> = out.iter().map(|i| i.local_id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..n as u32).collect::<Vec<_>>());
}

#[test]
fn determinism() {
    let config = SchedConfig::default();
    let (g1, s1) = run_scheduler(mixed_block(), &config);
    let (g2, s2) = run_scheduler(mixed_block(), &config);
    assert_eq!(s1.order, s2.order);
    assert_eq!(s1.total_cycles, s2.total_cycles);
    let stamps = |g: &DepGraph, s: &Schedule| -> Vec<u32> {
        s.order.iter().map(|&id| g.node(id).sched_cycle).collect()
    };
    assert_eq!(stamps(&g1, &s1), stamps(&g2, &s2));
}

#[test]
fn monotonic_clock() {
    let config = SchedConfig::default();
    let (graph, schedule) = run_scheduler(mixed_block(), &config);
    let mut prev = 0;
    for &id in &schedule.order {
        let c = graph.node(id).sched_cycle;
        assert!(c >= prev);
        prev = c;
    }
}

#[test]
fn sequential_mode_reproduces_input() {
    let config = SchedConfig { sequential: true, ..SchedConfig::default() };
    let (_, schedule) = run_scheduler(mixed_block(), &config);
    let ids: Vec<u32> = schedule.order.iter().map(|id| id.raw()).collect();
    assert_eq!(ids, (0..mixed_block().len() as u32).collect::<Vec<_>>());
}

// ============================================================================
// Concrete Scenarios
// ============================================================================

#[test]
fn scenario_independent_instructions() {
    // No shared operands: no edge in either direction, both ready at
    // cycle 0.
    let config = SchedConfig::default();
    let g = build_graph(vec![add(1, 0), add(3, 2)], &config);
    assert!(!g.has_edge(NodeId::new(0), NodeId::new(1)));
    assert!(!g.has_edge(NodeId::new(1), NodeId::new(0)));
    assert_eq!(g.node(NodeId::new(0)).earliest, 0);
    assert_eq!(g.node(NodeId::new(1)).earliest, 0);
}

#[test]
fn scenario_raw_latency() {
    // A writes r1, B reads r1: RAW edge with the producer's latency,
    // and B is stamped no earlier than A plus that latency.
    let config = SchedConfig::default();
    let params = KernelParams::default();
    let table = LatencyTable::new(&params, false);
    let (graph, _) = run_scheduler(vec![add(1, 0), add(2, 1)], &config);
    let e = *graph.node(NodeId::new(0)).succ_edge_to(NodeId::new(1)).unwrap();
    assert_eq!(e.kind, DepKind::Raw);
    let producer = graph.node(NodeId::new(0));
    assert_eq!(e.latency, table.latency(producer.first_inst(), DepKind::Raw));
    assert!(
        graph.node(NodeId::new(1)).sched_cycle >= producer.sched_cycle + e.latency
    );
}

#[test]
fn scenario_waw_kill() {
    // A writes r1 fully, C rewrites r1 fully with no reader between:
    // the WAW edge exists, but later readers depend only on C.
    let config = SchedConfig::default();
    let g = build_graph(vec![add(1, 0), add(1, 2), add(4, 1)], &config);
    let e = g.node(NodeId::new(0)).succ_edge_to(NodeId::new(1)).unwrap();
    assert_eq!(e.kind, DepKind::Waw);
    assert!(g.has_edge(NodeId::new(1), NodeId::new(2)));
    assert!(!g.has_edge(NodeId::new(0), NodeId::new(2)));
}

#[test]
fn scenario_label_and_barrier_only() {
    // A block of one label and one fence builds a single chained
    // barrier edge and leaves no live bucket entries behind.
    let config = SchedConfig::default();
    let label = Instruction::new(Opcode::Label, 1);
    let fence = Instruction::new(Opcode::Send, 8).with_send(SendDesc {
        target: SendTarget::DataCache,
        op: SendOp::Write,
        fence: true,
        mask_offset: 0,
    });
    let g = build_graph(vec![label, fence], &config);
    let total_edges: usize = g.nodes().iter().map(|n| n.succs().len()).sum();
    assert_eq!(total_edges, 1);
    assert!(g.has_edge(NodeId::new(0), NodeId::new(1)));
    assert_eq!(g.roots(), vec![NodeId::new(0)]);
    // And the block schedules label-first.
    let (_, schedule) = run_scheduler(
        vec![
            Instruction::new(Opcode::Label, 1),
            Instruction::new(Opcode::Send, 8).with_send(SendDesc {
                target: SendTarget::DataCache,
                op: SendOp::Write,
                fence: true,
                mask_offset: 0,
            }),
        ],
        &config,
    );
    assert_eq!(schedule.order, vec![NodeId::new(0), NodeId::new(1)]);
}

#[test]
fn scenario_fusion_cycle_rejected() {
    // An intervening instruction that depends on the first half and
    // feeds the second makes the pair unfusable.
    let config = SchedConfig { fuse_wide_stores: true, ..Default::default() };
    let mid = Instruction::new(Opcode::Add, 8)
        .with_dst(Operand::grf(30 * 32, 32))
        .with_src(Operand::grf(40 * 32, 32));
    let mut g = build_graph(vec![split_write(30, 0), mid, split_write(30, 1)], &config);
    assert_eq!(pair_nodes(&mut g, &config), 0);
    assert_eq!(g.live_count(), 3);
    assert!(g.is_acyclic());
}

// ============================================================================
// Fusion and Grouping
// ============================================================================

#[test]
fn fused_pair_stays_adjacent_and_counts_match() {
    let config = SchedConfig { fuse_wide_stores: true, ..Default::default() };
    let params = KernelParams::default();
    let table = LatencyTable::new(&params, false);
    let insts = vec![add(10, 11), split_write(1, 0), add(12, 13), split_write(2, 1)];
    let n = insts.len();
    let mut graph = build_graph(insts, &config);
    assert_eq!(pair_nodes(&mut graph, &config), 1);
    let schedule = ListScheduler::new(&table, &params, &config)
        .run(&mut graph)
        .unwrap();
    assert_eq!(schedule.order.len(), n - 1);
    let out = graph.into_order(&schedule.order);
    assert_eq!(out.len(), n);
    // The two halves sit adjacent in the output.
    let pos0 = out.iter().position(|i| i.local_id() == 1).unwrap();
    let pos1 = out.iter().position(|i| i.local_id() == 3).unwrap();
    assert_eq!(pos1, pos0 + 1);
}

#[test]
fn send_queue_overflow_is_charged_and_safe() {
    let config = SchedConfig { sampler_queue_depth: 2, ..Default::default() };
    let insts: Vec<Instruction> = (0..5).map(|i| sampler_load(2 * i + 1, 40 + i)).collect();
    let (graph, schedule) = run_scheduler(insts, &config);
    assert!(schedule.send_stall_cycles > 0, "expected modeled queue stalls");
    assert_dependencies_hold(&graph, &schedule.order);
}

// ============================================================================
// Driver-Level Properties
// ============================================================================

#[test]
fn kernel_scheduling_preserves_blocks() {
    let params = KernelParams::default();
    let table = LatencyTable::new(&params, false);
    let sched = LocalScheduler::new(&table, &NoAliasInfo, &params, SchedConfig::default());

    let mut blocks = Vec::new();
    for b in 0..3u32 {
        let mut bb = shard_core::BasicBlock::new(b);
        bb.nest_level = b as u8;
        bb.insts = mixed_block();
        blocks.push(bb);
    }
    let sizes: Vec<usize> = blocks.iter().map(|b| b.len()).collect();
    let stats = sched.schedule_kernel(&mut blocks).unwrap();
    assert_eq!(stats.blocks_scheduled, 3);
    for (bb, n) in blocks.iter().zip(sizes) {
        assert_eq!(bb.len(), n);
    }
    // Deeper nesting weighs more.
    assert!(stats.weighted_cycles > stats.total_cycles as f64);
}

#[test]
fn window_split_blocks_keep_the_permutation() {
    let params = KernelParams::default();
    let table = LatencyTable::new(&params, false);
    let config = SchedConfig { window_size: 4, ..SchedConfig::default() };
    let sched = LocalScheduler::new(&table, &NoAliasInfo, &params, config);
    let mut bb = shard_core::BasicBlock::new(0);
    bb.insts = mixed_block();
    let n = bb.len();
    sched.schedule_block(&mut bb).unwrap();
    assert_eq!(bb.len(), n);
}

#[test]
fn hazard_nops_are_only_nops_and_only_on_hazards() {
    let params = KernelParams::default();
    let table = LatencyTable::new(&params, false);
    let config = SchedConfig {
        insert_hazard_nops: true,
        enable_subreg_hazard: false,
        ..SchedConfig::default()
    };
    let sched = LocalScheduler::new(&table, &NoAliasInfo, &params, config);

    let half = |reg: u32, src: u32| {
        Instruction::new(Opcode::Add, 8)
            .with_dst(Operand::grf(reg * 32, 16))
            .with_src(Operand::grf(src * 32, 16))
    };
    let mut bb = shard_core::BasicBlock::new(0);
    // Two partial writes to r1 with a dependency forcing them back to
    // back, so the hazard cannot be scheduled away.
    bb.insts = vec![half(1, 10), half(1, 10)];
    let before = bb.len();
    let stats = sched.schedule_block(&mut bb).unwrap();
    assert_eq!(bb.len(), before + stats.nops_inserted as usize);
    if stats.nops_inserted > 0 {
        assert_eq!(bb.insts[1].opcode(), Opcode::Nop);
    }
    // A hazard-free block gains nothing.
    let mut clean = shard_core::BasicBlock::new(1);
    clean.insts = vec![add(1, 0), add(2, 1)];
    let stats = sched.schedule_block(&mut clean).unwrap();
    assert_eq!(stats.nops_inserted, 0);
    assert_eq!(clean.len(), 2);
}
