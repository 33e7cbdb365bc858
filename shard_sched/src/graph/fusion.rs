//! Opportunistic Pairing
//!
//! Certain instruction pairs issue better as one unit: two half-width
//! surface writes that together form one full-width message, and
//! chained systolic dot-product instructions that forward their
//! accumulator. Pairing merges the two nodes before scheduling, moving
//! every dependency of the absorbed node onto the survivor.
//!
//! A pair is only legal when merging cannot create a cycle: if any path
//! other than the direct edge connects the two nodes, an intervening
//! instruction both depends on the first and feeds the second, and the
//! fusion is rejected.

use log::trace;
use rustc_hash::FxHashSet;
use shard_core::inst::{Opcode, SendOp, SendTarget};
use shard_core::{SchedError, SchedResult};

use super::{DepGraph, NodeId};
use crate::config::SchedConfig;

/// Discover and apply all enabled pairings. Returns the pair count.
pub fn pair_nodes(graph: &mut DepGraph, config: &SchedConfig) -> u32 {
    let mut pairs: Vec<(NodeId, NodeId)> = Vec::new();
    if config.fuse_wide_stores {
        find_wide_store_pairs(graph, &mut pairs);
    }
    if config.fuse_dpas {
        find_dpas_pairs(graph, &mut pairs);
    }

    let mut taken: FxHashSet<NodeId> = FxHashSet::default();
    let mut fused = 0;
    for (first, second) in pairs {
        if taken.contains(&first) || taken.contains(&second) {
            continue;
        }
        if try_fuse(graph, first, second, config) {
            taken.insert(first);
            taken.insert(second);
            fused += 1;
        }
    }
    graph.num_pairs += fused;
    fused
}

/// Whether a node is the `part`'th quadrant of a split surface write.
fn is_split_write_part(graph: &DepGraph, id: NodeId, part: u8) -> bool {
    let node = graph.node(id);
    if node.dead || node.insts().len() != 1 {
        return false;
    }
    let inst = node.first_inst();
    let Some(desc) = inst.send_desc() else {
        return false;
    };
    desc.target == SendTarget::RenderCache
        && desc.op == SendOp::Write
        && inst.exec_size() == 8
        && desc.mask_offset == part * 8
}

/// Collect complementary half-write pairs: quadrants {0,1} and {2,3}.
fn find_wide_store_pairs(graph: &DepGraph, pairs: &mut Vec<(NodeId, NodeId)>) {
    let ids: Vec<NodeId> = graph.nodes().iter().map(|n| n.id()).collect();

    let mut low: Option<NodeId> = None;
    let mut high: Option<NodeId> = None;
    for &id in &ids {
        if low.is_none() && is_split_write_part(graph, id, 0) {
            low = Some(id);
        } else if let Some(first) = low {
            if is_split_write_part(graph, id, 1) {
                pairs.push((first, id));
                low = None;
            }
        }
        if high.is_none() && is_split_write_part(graph, id, 2) {
            high = Some(id);
        } else if let Some(first) = high {
            if is_split_write_part(graph, id, 3) {
                pairs.push((first, id));
                high = None;
            }
        }
    }

    find_urb_pairs(graph, &ids, pairs);
}

/// A leading URB write must start at a cache-aligned offset.
fn leading_urb_offset(graph: &DepGraph, id: NodeId) -> Option<(u32, u32)> {
    let node = graph.node(id);
    if node.dead || node.insts().len() != 1 {
        return None;
    }
    let desc = node.first_inst().send_desc()?;
    match desc.target {
        SendTarget::Urb { offset, len } if offset % 4 == 0 => Some((offset, len)),
        _ => None,
    }
}

/// Collect URB write pairs covering adjacent offsets.
fn find_urb_pairs(graph: &DepGraph, ids: &[NodeId], pairs: &mut Vec<(NodeId, NodeId)>) {
    let mut leading: Option<(NodeId, u32, u32)> = None;
    for &id in ids {
        let node = graph.node(id);
        if node.dead {
            continue;
        }
        let is_urb = matches!(
            node.first_inst().send_desc().map(|d| d.target),
            Some(SendTarget::Urb { .. })
        );
        match leading {
            None => {
                if let Some((offset, len)) = leading_urb_offset(graph, id) {
                    leading = Some((id, offset, len));
                }
            }
            Some((lead, offset, len)) => {
                if is_urb {
                    let desc = node.first_inst().send_desc().unwrap();
                    if let SendTarget::Urb { offset: o2, len: l2 } = desc.target {
                        if o2 == offset + 2 && l2 == len {
                            pairs.push((lead, id));
                            leading = None;
                        } else {
                            leading = leading_urb_offset(graph, id).map(|(o, l)| (id, o, l));
                        }
                    }
                } else if graph.has_edge(lead, id) {
                    // An intervening dependent of the leading write;
                    // pairing across it could close a cycle.
                    leading = None;
                }
            }
        }
    }
}

/// Collect adjacent dot-product instructions that chain through a
/// shared weight operand.
fn find_dpas_pairs(graph: &DepGraph, pairs: &mut Vec<(NodeId, NodeId)>) {
    let nodes = graph.nodes();
    for w in nodes.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if a.dead || b.dead || a.insts().len() != 1 || b.insts().len() != 1 {
            continue;
        }
        let (ia, ib) = (a.first_inst(), b.first_inst());
        if ia.opcode() != Opcode::Dpas || ib.opcode() != Opcode::Dpas {
            continue;
        }
        // The forwarding rule: both halves read the same weight source.
        if ia.srcs().len() >= 2 && ib.srcs().len() >= 2 && ia.srcs()[1] == ib.srcs()[1] {
            pairs.push((a.id(), b.id()));
        }
    }
}

/// Merge `second` into `first` if no dependency cycle results.
fn try_fuse(graph: &mut DepGraph, first: NodeId, second: NodeId, config: &SchedConfig) -> bool {
    if graph.node(first).dead || graph.node(second).dead {
        return false;
    }
    match fuse(graph, first, second, config) {
        Ok(()) => true,
        Err(_) => {
            trace!("fusion {first} + {second} rejected: would create a cycle");
            false
        }
    }
}

/// Merge `second` into `first`, transplanting every dependency of the
/// absorbed node. Fails with [`SchedError::FusionCycle`] when any path
/// other than the direct edge connects the two nodes.
pub fn fuse(
    graph: &mut DepGraph,
    first: NodeId,
    second: NodeId,
    config: &SchedConfig,
) -> SchedResult<()> {
    if graph.indirect_path_exists(first, second) {
        return Err(SchedError::FusionCycle {
            first: first.raw(),
            second: second.raw(),
        });
    }

    graph.move_deps(second, first);
    let second_node = graph.node_mut(second);
    second_node.dead = true;
    let inst = second_node.insts.remove(0);
    debug_assert!(second_node.insts.is_empty());

    let first_node = graph.node_mut(first);
    first_node.insts.push(inst);
    if config.atomic_fused_sends {
        let lead = &mut first_node.insts[0];
        if lead.is_send() && matches!(lead.send_desc().map(|d| d.target), Some(SendTarget::Urb { .. }))
        {
            lead.set_atomic();
        }
    }
    debug_assert!(graph.is_acyclic(), "fusion created a cycle");
    trace!("fused {first} + {second}");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
