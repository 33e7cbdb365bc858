//! Debug Dumps
//!
//! Human-readable renderings of the dependency DAG and of a finished
//! schedule. The library never touches the filesystem; callers route
//! the strings to a log sink or a file as they see fit.

use std::fmt::Write;

use crate::graph::{DepGraph, NodeId};
use shard_core::DepKind;

/// Render the dependency graph in Graphviz dot format.
pub fn dot(graph: &DepGraph, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {name} {{");
    for node in graph.nodes() {
        if node.dead {
            continue;
        }
        let fill = if node.is_scheduled() {
            "#CCCCCC"
        } else if node.insts().len() > 1 {
            "#FFEE99"
        } else {
            "#FFFFFF"
        };
        let mut label = String::new();
        for inst in node.insts() {
            let _ = write!(label, "{:?} ", inst.opcode());
        }
        let _ = writeln!(
            out,
            "  {} [label=\"{}[{}] O{} E{} P{}\", style=\"filled\", fillcolor=\"{}\"]",
            node.id().raw(),
            label,
            node.id(),
            node.occupancy(),
            node.earliest,
            node.priority,
            fill,
        );
        for e in node.succs() {
            let color = match e.kind {
                DepKind::Raw | DepKind::RawMemory => "black",
                DepKind::War | DepKind::WarMemory => "red",
                DepKind::Waw | DepKind::WawMemory => "orange",
                DepKind::Barrier | DepKind::Label => "grey",
            };
            let _ = writeln!(
                out,
                "  {} -> {} [label=\"{}\", color=\"{}\"]",
                node.id().raw(),
                e.node.raw(),
                e.latency,
                color,
            );
        }
    }
    let _ = writeln!(out, "}}");
    out
}

/// Render a finished schedule as one line per node: issue cycle, id,
/// occupancy, priority, opcodes.
pub fn schedule_map(graph: &DepGraph, order: &[NodeId]) -> String {
    let mut out = String::new();
    for &id in order {
        let node = graph.node(id);
        let _ = write!(
            out,
            "{:>6}: [{}] O{} P{} ",
            node.sched_cycle,
            id,
            node.occupancy(),
            node.priority,
        );
        for inst in node.insts() {
            let _ = write!(out, "{:?} ", inst.opcode());
        }
        let _ = writeln!(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedConfig;
    use crate::graph::builder::GraphBuilder;
    use shard_core::alias::NoAliasInfo;
    use shard_core::inst::{Instruction, Opcode, Operand};
    use shard_core::latency::LatencyTable;
    use shard_core::KernelParams;

    #[test]
    fn test_dot_contains_nodes_and_edges() {
        let params = KernelParams::default();
        let table = LatencyTable::new(&params, false);
        let config = SchedConfig::default();
        let g = GraphBuilder::new(&table, &NoAliasInfo, &params, &config)
            .build(vec![
                Instruction::new(Opcode::Add, 8)
                    .with_dst(Operand::grf(32, 32))
                    .with_src(Operand::grf(0, 32)),
                Instruction::new(Opcode::Mul, 8)
                    .with_dst(Operand::grf(64, 32))
                    .with_src(Operand::grf(32, 32)),
            ])
            .unwrap();
        let text = dot(&g, "bb0");
        assert!(text.starts_with("digraph bb0 {"));
        assert!(text.contains("0 -> 1"));
        assert!(text.contains("Add"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_schedule_map_lists_in_order() {
        let params = KernelParams::default();
        let table = LatencyTable::new(&params, false);
        let config = SchedConfig::default();
        let g = GraphBuilder::new(&table, &NoAliasInfo, &params, &config)
            .build(vec![Instruction::new(Opcode::Nop, 1)])
            .unwrap();
        let text = schedule_map(&g, &[crate::graph::NodeId::new(0)]);
        assert!(text.contains("Nop"));
    }
}
