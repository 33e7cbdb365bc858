//! Outstanding-Request Queue Model
//!
//! Long-latency sends occupy a bounded hardware queue per request class
//! (sampler traffic is queued separately from other memory traffic).
//! Issuing into a full queue stalls the front end until the oldest
//! request retires. This policy steers around a full queue when a
//! non-send candidate is ready, and otherwise admits the send and
//! charges the modeled stall to the clock.

use std::collections::VecDeque;

use log::trace;
use shard_core::inst::SendQueueClass;

use super::{Decision, SelectCtx, SelectionPolicy};
use crate::config::SchedConfig;
use crate::graph::NodeId;

/// Bounded-depth outstanding request queues, one per class.
pub struct SendQueuePolicy {
    sampler: VecDeque<u32>,
    memory: VecDeque<u32>,
    sampler_depth: usize,
    memory_depth: usize,
}

impl SendQueuePolicy {
    /// Queues sized from the configuration.
    pub fn new(config: &SchedConfig) -> Self {
        SendQueuePolicy {
            sampler: VecDeque::new(),
            memory: VecDeque::new(),
            sampler_depth: config.sampler_queue_depth,
            memory_depth: config.memory_queue_depth,
        }
    }

    fn queue_mut(&mut self, class: SendQueueClass) -> (&mut VecDeque<u32>, usize) {
        match class {
            SendQueueClass::Sampler => (&mut self.sampler, self.sampler_depth),
            SendQueueClass::Memory => (&mut self.memory, self.memory_depth),
        }
    }

    /// Drop requests that retired at or before `clock`.
    fn drain(queue: &mut VecDeque<u32>, clock: u32) {
        while queue.front().is_some_and(|&retire| retire <= clock) {
            queue.pop_front();
        }
    }

    /// Queue class of a node, if it is a long-latency send.
    fn class_of(ctx: &SelectCtx<'_>, id: NodeId) -> Option<SendQueueClass> {
        let desc = ctx.graph.node(id).first_inst().send_desc()?;
        desc.is_long_latency().then(|| desc.queue_class())
    }
}

impl SelectionPolicy for SendQueuePolicy {
    fn name(&self) -> &'static str {
        "send-queue"
    }

    fn window(&self, config: &SchedConfig) -> usize {
        config.send_search_window
    }

    fn select(&mut self, ctx: &SelectCtx<'_>, candidate: NodeId, window: &[NodeId]) -> Decision {
        let Some(class) = Self::class_of(ctx, candidate) else {
            return Decision::Keep;
        };
        let clock = ctx.clock;
        let (queue, depth) = self.queue_mut(class);
        Self::drain(queue, clock);
        if queue.len() < depth {
            return Decision::Keep;
        }

        // The queue is full. A ready non-send candidate costs nothing
        // and gives the queue time to drain.
        for &alt in window.iter().take(ctx.config.send_search_window) {
            if !ctx.graph.node(alt).first_inst().is_send() {
                trace!("send queue full, issuing {alt} ahead of {candidate}");
                return Decision::Replace(alt);
            }
        }
        // No alternative; admit with a stall (charged in note_scheduled).
        Decision::Keep
    }

    fn note_scheduled(&mut self, ctx: &SelectCtx<'_>, node: NodeId) -> u32 {
        let Some(class) = Self::class_of(ctx, node) else {
            return 0;
        };
        let completion = ctx.graph.node(node).timing.raw;
        let clock = ctx.clock;
        let (queue, depth) = self.queue_mut(class);
        Self::drain(queue, clock);

        let mut stall = 0;
        if queue.len() >= depth {
            // Wait for the oldest request to retire.
            let retire = queue.pop_front().expect("full queue has a front");
            stall = retire.saturating_sub(clock);
        }
        queue.push_back(clock + stall + completion);
        stall
    }
}

// =============================================================================
// Tests
// =============================================================================
