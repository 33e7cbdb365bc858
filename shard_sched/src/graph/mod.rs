//! Dependency Graph
//!
//! The scheduling DAG: one node per instruction (or per fused pair),
//! edges annotated with a dependency kind and a latency. Nodes live in
//! an arena indexed by [`NodeId`]; a node's id equals its original
//! program position, which doubles as the deterministic tie-breaker.
//! Edges are stored as mirrored adjacency lists (successors and
//! predecessors), with at most one edge per ordered node pair: adding a
//! stronger dependency upgrades the existing edge in place.

pub mod buckets;
pub mod builder;
pub mod fusion;

use shard_core::inst::{BarrierKind, Instruction};
use shard_core::DepKind;
use smallvec::SmallVec;

// =============================================================================
// Node Id
// =============================================================================

/// Identifier of a scheduling node; equals the original program
/// position of the node's (first) instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a node id from a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        NodeId(index)
    }

    /// Raw arena index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw id value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Sentinel for a node that has not been stamped with a cycle yet.
pub const UNSCHEDULED: u32 = u32::MAX;

// =============================================================================
// Edges
// =============================================================================

/// A directed dependency edge to a neighbor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// The neighbor: successor in `succs` lists, predecessor in `preds`.
    pub node: NodeId,
    /// Dependency kind.
    pub kind: DepKind,
    /// Minimum cycles between the producer's issue and the consumer's.
    pub latency: u32,
}

// =============================================================================
// Node Timing
// =============================================================================

/// Precomputed per-node timing, sampled from the latency oracle once at
/// graph-build time so edge creation never re-queries the oracle.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeTiming {
    /// Issue-pipe occupancy.
    pub occupancy: u32,
    /// Latency charged on true-dependency edges.
    pub raw: u32,
    /// Latency charged on WAR/WAW edges.
    pub false_dep: u32,
    /// Latency charged on barrier/label edges.
    pub barrier: u32,
}

impl NodeTiming {
    /// Edge latency for a dependency of the given kind.
    #[inline]
    pub fn edge_latency(&self, kind: DepKind) -> u32 {
        match kind {
            DepKind::Raw | DepKind::RawMemory => self.raw,
            DepKind::War | DepKind::WarMemory | DepKind::Waw | DepKind::WawMemory => {
                self.false_dep
            }
            DepKind::Barrier | DepKind::Label => self.barrier,
        }
    }
}

// =============================================================================
// Scheduling Node
// =============================================================================

/// One schedulable unit: a single instruction, or a fused pair that must
/// issue atomically.
#[derive(Debug, Clone)]
pub struct SchedNode {
    id: NodeId,
    insts: SmallVec<[Instruction; 1]>,
    /// Precomputed timing.
    pub timing: NodeTiming,
    /// Longest-latency path to the end of the block.
    pub priority: u32,
    /// Earliest cycle this node may issue at.
    pub earliest: u32,
    /// Cycle the node was issued at, or [`UNSCHEDULED`].
    pub sched_cycle: u32,
    /// Predecessors not yet scheduled.
    pub preds_not_scheduled: u32,
    /// Barrier classification.
    pub barrier: BarrierKind,
    /// Set on the absorbed half of a fused pair.
    pub dead: bool,
    /// GRF bucket this node partially overwrites, if any.
    pub subreg_write: Option<u32>,
    /// Whether a path to the next barrier already exists.
    pub reaches_barrier: bool,
    /// Scheduled predecessor that most recently raised `earliest`.
    pub last_sched_pred: Option<NodeId>,
    succs: Vec<Edge>,
    preds: Vec<Edge>,
}

impl SchedNode {
    fn new(id: NodeId, inst: Instruction, timing: NodeTiming, barrier: BarrierKind) -> Self {
        let mut insts = SmallVec::new();
        insts.push(inst);
        SchedNode {
            id,
            insts,
            timing,
            priority: timing.occupancy,
            earliest: 0,
            sched_cycle: UNSCHEDULED,
            preds_not_scheduled: 0,
            barrier,
            dead: false,
            subreg_write: None,
            reaches_barrier: false,
            last_sched_pred: None,
            succs: Vec::new(),
            preds: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node's instructions: one, or two for a fused pair.
    #[inline]
    pub fn insts(&self) -> &[Instruction] {
        &self.insts
    }

    /// The node's first (lead) instruction.
    #[inline]
    pub fn first_inst(&self) -> &Instruction {
        &self.insts[0]
    }

    #[inline]
    pub fn succs(&self) -> &[Edge] {
        &self.succs
    }

    #[inline]
    pub fn preds(&self) -> &[Edge] {
        &self.preds
    }

    #[inline]
    pub fn occupancy(&self) -> u32 {
        self.timing.occupancy
    }

    #[inline]
    pub fn is_label(&self) -> bool {
        self.barrier == BarrierKind::Label
    }

    #[inline]
    pub fn is_scheduled(&self) -> bool {
        self.sched_cycle != UNSCHEDULED
    }

    /// Program position of the node's last instruction.
    #[inline]
    pub fn last_local_id(&self) -> u32 {
        self.insts.last().map(|i| i.local_id()).unwrap_or(self.id.raw())
    }

    /// Direct successor edge to `other`, if present.
    pub fn succ_edge_to(&self, other: NodeId) -> Option<&Edge> {
        self.succs.iter().find(|e| e.node == other)
    }
}

// =============================================================================
// Dependency Graph
// =============================================================================

/// The dependency DAG of one basic block (or scheduling window).
#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    nodes: Vec<SchedNode>,
    /// Fused pairs created on this graph.
    pub num_pairs: u32,
}

impl DepGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; its id is its arena position.
    pub(crate) fn push_node(
        &mut self,
        inst: Instruction,
        timing: NodeTiming,
        barrier: BarrierKind,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(SchedNode::new(id, inst, timing, barrier));
        id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &SchedNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut SchedNode {
        &mut self.nodes[id.index()]
    }

    /// All nodes, including dead ones, in program order.
    #[inline]
    pub fn nodes(&self) -> &[SchedNode] {
        &self.nodes
    }

    /// Number of nodes that still take part in scheduling.
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.dead).count()
    }

    /// Nodes with no predecessors; these seed the ready queue. Computed
    /// on demand so fusion never has to patch a stored root list.
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !n.dead && n.preds.is_empty())
            .map(|n| n.id)
            .collect()
    }

    /// Whether a direct edge `pred -> succ` exists.
    pub fn has_edge(&self, pred: NodeId, succ: NodeId) -> bool {
        self.node(pred).succ_edge_to(succ).is_some()
    }

    /// Create the edge `pred -> succ` of the given kind, or upgrade an
    /// existing edge if the new kind carries a higher latency. The
    /// producer's priority is raised to cover the successor's critical
    /// path.
    pub fn add_edge(&mut self, pred: NodeId, succ: NodeId, kind: DepKind) {
        debug_assert_ne!(pred, succ, "self edge");
        let latency = self.node(pred).timing.edge_latency(kind);
        let succ_priority = self.node(succ).priority;

        let mut existed = false;
        let mut upgraded = false;
        {
            let pred_node = &mut self.nodes[pred.index()];
            if let Some(existing) = pred_node.succs.iter_mut().find(|e| e.node == succ) {
                existed = true;
                if latency > existing.latency {
                    existing.kind = kind;
                    existing.latency = latency;
                    upgraded = true;
                }
            } else {
                pred_node.succs.push(Edge { node: succ, kind, latency });
            }
            if !existed || upgraded {
                pred_node.priority = pred_node.priority.max(succ_priority + latency);
            }
        }

        let succ_node = &mut self.nodes[succ.index()];
        if existed {
            if upgraded {
                let mirror = succ_node
                    .preds
                    .iter_mut()
                    .find(|e| e.node == pred)
                    .expect("mirrored pred edge missing");
                mirror.kind = kind;
                mirror.latency = latency;
            }
            return;
        }
        succ_node.preds.push(Edge { node: pred, kind, latency });
        succ_node.preds_not_scheduled += 1;
    }

    /// Remove the mirrored predecessor entry `pred` from `node`.
    fn delete_pred(&mut self, node: NodeId, pred: NodeId) {
        let n = &mut self.nodes[node.index()];
        let pos = n
            .preds
            .iter()
            .position(|e| e.node == pred)
            .expect("deleting a non-predecessor");
        n.preds.swap_remove(pos);
        n.preds_not_scheduled -= 1;
    }

    /// Whether `second` is reachable from `first` through any path other
    /// than the direct edge. Used to reject fusions that would create a
    /// cycle. The search only follows nodes between the two in program
    /// order, which bounds it for the adjacent pairs fusion considers.
    pub fn indirect_path_exists(&self, first: NodeId, second: NodeId) -> bool {
        let limit = self.node(second).last_local_id();
        let mut stack: Vec<NodeId> = Vec::new();
        for e in self.node(first).succs() {
            if e.node != second {
                stack.push(e.node);
            }
        }
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            if id == second {
                return true;
            }
            if seen[id.index()] || self.node(id).last_local_id() > limit {
                continue;
            }
            seen[id.index()] = true;
            for e in self.node(id).succs() {
                stack.push(e.node);
            }
        }
        false
    }

    /// Move every dependency of `from` onto `to`, leaving `from` with no
    /// edges. Duplicate edges collapse through the upgrade rule, so no
    /// constraint is lost.
    pub fn move_deps(&mut self, from: NodeId, to: NodeId) {
        // Outgoing edges: from -> X becomes to -> X.
        let succs: Vec<Edge> = std::mem::take(&mut self.nodes[from.index()].succs);
        for e in succs {
            self.delete_pred(e.node, from);
            if e.node != to {
                self.add_edge(to, e.node, e.kind);
            }
        }

        // Incoming edges: P -> from becomes P -> to.
        let preds: Vec<Edge> = std::mem::take(&mut self.nodes[from.index()].preds);
        self.nodes[from.index()].preds_not_scheduled = 0;
        for e in preds {
            let pred = e.node;
            let pred_node = &mut self.nodes[pred.index()];
            let mut kinds: SmallVec<[DepKind; 2]> = SmallVec::new();
            let mut i = 0;
            while i < pred_node.succs.len() {
                if pred_node.succs[i].node == from {
                    kinds.push(pred_node.succs[i].kind);
                    pred_node.succs.swap_remove(i);
                } else {
                    i += 1;
                }
            }
            if pred != to {
                for kind in kinds {
                    self.add_edge(pred, to, kind);
                }
            }
        }
    }

    /// Kahn's check that the live part of the graph is acyclic.
    pub fn is_acyclic(&self) -> bool {
        let mut degree: Vec<u32> = self
            .nodes
            .iter()
            .map(|n| if n.dead { 0 } else { n.preds.len() as u32 })
            .collect();
        let mut work: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| !n.dead && n.preds.is_empty())
            .map(|n| n.id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = work.pop() {
            visited += 1;
            for e in self.node(id).succs() {
                let d = &mut degree[e.node.index()];
                *d -= 1;
                if *d == 0 {
                    work.push(e.node);
                }
            }
        }
        visited == self.live_count()
    }

    /// Consume the graph, emitting instructions in the given node order.
    pub fn into_order(mut self, order: &[NodeId]) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for &id in order {
            let node = &mut self.nodes[id.index()];
            out.extend(node.insts.drain(..));
        }
        out
    }

    /// Consume the graph, restoring the original program order. Used as
    /// the release-mode fallback when a post-condition check fails.
    pub fn into_original_order(self) -> Vec<Instruction> {
        let mut all: Vec<Instruction> = self
            .nodes
            .into_iter()
            .flat_map(|n| n.insts.into_iter())
            .collect();
        all.sort_by_key(|i| i.local_id());
        all
    }
}

// =============================================================================
// Tests
// =============================================================================
