//! List Scheduler Core Loop
//!
//! Priority-driven forward list scheduling over the dependency DAG.
//! Nodes move through four states: blocked (unscheduled predecessors
//! remain), pending (predecessors satisfied, earliest cycle may be in
//! the future), ready (issueable at the current clock), and scheduled.
//!
//! Two heaps drive the loop: the pending heap orders by earliest
//! issueable cycle, the ready heap by scheduling preference. Every
//! iteration schedules exactly one node (or one write-combined group),
//! so the loop runs exactly N steps for N nodes.
//!
//! # Candidate selection
//!
//! The default pick is the ready node with the highest critical-path
//! priority, ties broken toward long-latency sends, then the lower
//! earliest cycle, then original program order. The configured
//! heuristics may replace the pick with another ready node; readiness
//! is never violated.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::debug;
use shard_core::latency::LatencyOracle;
use shard_core::params::KernelParams;
use shard_core::{SchedError, SchedResult};
use smallvec::{smallvec, SmallVec};

use crate::config::SchedConfig;
use crate::graph::{DepGraph, Edge, NodeId};
use crate::heuristics::{build_policies, Decision, SelectCtx, SelectionPolicy};

// =============================================================================
// Schedule Result
// =============================================================================

/// The produced order and its modeled cost.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    /// Scheduled nodes, issue order.
    pub order: Vec<NodeId>,
    /// Clock value after the last issue.
    pub total_cycles: u32,
    /// Cycles spent stalled on full request queues.
    pub send_stall_cycles: u32,
}

// =============================================================================
// Heap Entries
// =============================================================================

/// Ready-heap entry; `Ord` makes the heap's max the preferred pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyEntry {
    priority: u32,
    long_send: bool,
    earliest: u32,
    id: NodeId,
    sequential: bool,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.sequential {
            // Pure program order for debug reproduction.
            return other.id.cmp(&self.id);
        }
        self.priority
            .cmp(&other.priority)
            .then(self.long_send.cmp(&other.long_send))
            .then(other.earliest.cmp(&self.earliest))
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending-heap entry; `Ord` makes the heap's max the lowest earliest
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEntry {
    earliest: u32,
    id: NodeId,
    sequential: bool,
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.sequential {
            return other.id.cmp(&self.id);
        }
        other
            .earliest
            .cmp(&self.earliest)
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// List Scheduler
// =============================================================================

/// Schedules one dependency graph.
pub struct ListScheduler<'a> {
    latency: &'a dyn LatencyOracle,
    params: &'a KernelParams,
    config: &'a SchedConfig,
    policies: Vec<Box<dyn SelectionPolicy>>,
    max_window: usize,
}

impl<'a> ListScheduler<'a> {
    /// Create a scheduler with the policies enabled by `config`.
    pub fn new(
        latency: &'a dyn LatencyOracle,
        params: &'a KernelParams,
        config: &'a SchedConfig,
    ) -> Self {
        let policies = build_policies(config);
        let max_window = policies.iter().map(|p| p.window(config)).max().unwrap_or(0);
        ListScheduler { latency, params, config, policies, max_window }
    }

    /// Run the scheduling loop, stamping every live node with its issue
    /// cycle and returning the order.
    pub fn run(&mut self, graph: &mut DepGraph) -> SchedResult<Schedule> {
        let live = graph.live_count();
        let mut order: Vec<NodeId> = Vec::with_capacity(live);
        let mut ready: BinaryHeap<ReadyEntry> = BinaryHeap::new();
        let mut pending: BinaryHeap<PendingEntry> = BinaryHeap::new();
        for id in graph.roots() {
            pending.push(self.pending_entry(graph, id));
        }

        let mut clock: u32 = 0;
        let mut stalls: u32 = 0;
        let mut last: Option<NodeId> = None;

        while !(ready.is_empty() && pending.is_empty()) {
            // Promote everything issueable at the current clock.
            while let Some(&top) = pending.peek() {
                if top.earliest > clock {
                    break;
                }
                pending.pop();
                ready.push(self.ready_entry(graph, top.id));
            }

            // Nothing issueable: jump the clock forward.
            if ready.is_empty() {
                clock = pending.peek().expect("pending non-empty").earliest;
                continue;
            }

            let candidate = ready.pop().expect("ready non-empty").id;
            let picks = self.reselect(graph, &mut ready, candidate, clock, last);
            for id in picks {
                stalls += self.commit(graph, &mut pending, &mut order, id, &mut clock, last);
                last = Some(id);
            }
        }

        // Post-condition: strict monotonic progress scheduled everything.
        if order.len() != live {
            debug_assert!(false, "scheduled {} of {} nodes", order.len(), live);
            let missing = graph
                .nodes()
                .iter()
                .find(|n| !n.dead && !n.is_scheduled())
                .map(|n| n.id().raw())
                .unwrap_or(0);
            return Err(SchedError::UnscheduledNode { node: missing });
        }
        debug!(
            "scheduled {} nodes in {} modeled cycles ({} stall)",
            live, clock, stalls
        );
        Ok(Schedule { order, total_cycles: clock, send_stall_cycles: stalls })
    }

    fn ready_entry(&self, graph: &DepGraph, id: NodeId) -> ReadyEntry {
        let node = graph.node(id);
        ReadyEntry {
            priority: node.priority,
            long_send: node
                .first_inst()
                .send_desc()
                .is_some_and(|d| d.is_long_latency()),
            earliest: node.earliest,
            id,
            sequential: self.config.sequential,
        }
    }

    fn pending_entry(&self, graph: &DepGraph, id: NodeId) -> PendingEntry {
        PendingEntry {
            earliest: graph.node(id).earliest,
            id,
            sequential: self.config.sequential,
        }
    }

    /// Offer the candidate to the policy chain; first change wins. The
    /// returned list is the node (or atomic group) to schedule now.
    fn reselect(
        &mut self,
        graph: &DepGraph,
        ready: &mut BinaryHeap<ReadyEntry>,
        candidate: NodeId,
        clock: u32,
        last: Option<NodeId>,
    ) -> SmallVec<[NodeId; 4]> {
        if self.policies.is_empty() || self.config.sequential || ready.is_empty() {
            return smallvec![candidate];
        }

        let window = peek_top(ready, self.max_window);
        let mut decision = Decision::Keep;
        {
            let ctx = SelectCtx {
                graph,
                latency: self.latency,
                config: self.config,
                params: self.params,
                clock,
                last,
            };
            for policy in &mut self.policies {
                match policy.select(&ctx, candidate, &window) {
                    Decision::Keep => continue,
                    other => {
                        decision = other;
                        break;
                    }
                }
            }
        }

        match decision {
            Decision::Keep => smallvec![candidate],
            Decision::Replace(alt) => {
                debug_assert!(window.contains(&alt), "replacement not in the ready window");
                remove_ready(ready, alt);
                ready.push(self.ready_entry(graph, candidate));
                smallvec![alt]
            }
            Decision::Group(ids) => {
                debug_assert!(ids.contains(&candidate), "group must contain the candidate");
                for &id in &ids {
                    if id != candidate {
                        remove_ready(ready, id);
                    }
                }
                SmallVec::from_vec(ids)
            }
        }
    }

    /// Issue one node: charge modeled stalls, stamp the cycle, update
    /// successors, and advance the clock by the node's occupancy.
    fn commit(
        &mut self,
        graph: &mut DepGraph,
        pending: &mut BinaryHeap<PendingEntry>,
        order: &mut Vec<NodeId>,
        id: NodeId,
        clock: &mut u32,
        last: Option<NodeId>,
    ) -> u32 {
        // Admission stalls (full request queues) delay the issue; each
        // policy sees the clock as delayed by the ones before it.
        let mut stall = 0u32;
        for i in 0..self.policies.len() {
            let ctx = SelectCtx {
                graph: &*graph,
                latency: self.latency,
                config: self.config,
                params: self.params,
                clock: *clock + stall,
                last,
            };
            stall += self.policies[i].note_scheduled(&ctx, id);
        }
        *clock += stall;

        let issue_cycle = *clock;
        {
            let node = graph.node_mut(id);
            debug_assert!(!node.dead, "scheduling a dead node");
            debug_assert!(!node.is_scheduled(), "scheduling a node twice");
            node.sched_cycle = issue_cycle;
        }
        order.push(id);

        let is_label = graph.node(id).is_label();
        let occupancy = graph.node(id).occupancy();
        let succs: SmallVec<[Edge; 8]> = graph.node(id).succs().iter().copied().collect();
        for e in succs {
            let succ = graph.node_mut(e.node);
            if is_label {
                // Pure control sequencing restarts the clock model.
                succ.earliest = 0;
            } else {
                let earliest_new = issue_cycle + e.latency.max(occupancy);
                if succ.earliest <= earliest_new || succ.last_sched_pred.is_none() {
                    succ.last_sched_pred = Some(id);
                }
                succ.earliest = succ.earliest.max(earliest_new);
            }
            succ.preds_not_scheduled -= 1;
            if succ.preds_not_scheduled == 0 {
                let entry = self.pending_entry(graph, e.node);
                pending.push(entry);
            }
        }

        *clock += occupancy;
        stall
    }
}

/// Ids of the heap's best `k` entries, best first, heap unchanged.
fn peek_top(heap: &mut BinaryHeap<ReadyEntry>, k: usize) -> Vec<NodeId> {
    let k = k.min(heap.len());
    let mut tmp: Vec<ReadyEntry> = Vec::with_capacity(k);
    for _ in 0..k {
        tmp.push(heap.pop().expect("sized by len"));
    }
    let ids = tmp.iter().map(|e| e.id).collect();
    for e in tmp {
        heap.push(e);
    }
    ids
}

/// Remove one entry from the heap by id.
fn remove_ready(heap: &mut BinaryHeap<ReadyEntry>, id: NodeId) {
    let mut tmp: Vec<ReadyEntry> = Vec::new();
    let mut found = false;
    while let Some(e) = heap.pop() {
        if e.id == id {
            found = true;
            break;
        }
        tmp.push(e);
    }
    debug_assert!(found, "removing a node that is not ready");
    for e in tmp {
        heap.push(e);
    }
}

// =============================================================================
// Tests
// =============================================================================
