//! Subregister Write Hazard Avoidance
//!
//! Two back-to-back instructions writing different sub-parts of the
//! same register stall the write-back stage on hardware that merges
//! partial writes. The graph builder records which register a node
//! partially overwrites; this policy keeps such writers apart, trying a
//! bounded number of alternatives before accepting the hazard.

use log::trace;

use super::{Decision, SelectCtx, SelectionPolicy};
use crate::config::SchedConfig;
use crate::graph::NodeId;

/// Separates back-to-back partial writes to one register.
#[derive(Debug, Default)]
pub struct SubregHazardPolicy;

impl SubregHazardPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        SubregHazardPolicy
    }
}

impl SelectionPolicy for SubregHazardPolicy {
    fn name(&self) -> &'static str {
        "subreg-hazard"
    }

    fn window(&self, config: &SchedConfig) -> usize {
        config.subreg_hazard_attempts
    }

    fn select(&mut self, ctx: &SelectCtx<'_>, candidate: NodeId, window: &[NodeId]) -> Decision {
        let Some(last) = ctx.last else {
            return Decision::Keep;
        };
        let Some(reg) = ctx.graph.node(last).subreg_write else {
            return Decision::Keep;
        };
        if ctx.graph.node(candidate).subreg_write != Some(reg) {
            return Decision::Keep;
        }
        // Bounded retries; fall back to the candidate when every
        // alternative in reach has the same hazard.
        for &alt in window.iter().take(ctx.config.subreg_hazard_attempts) {
            if ctx.graph.node(alt).subreg_write != Some(reg) {
                trace!("subreg hazard on r{reg}, issuing {alt} instead of {candidate}");
                return Decision::Replace(alt);
            }
        }
        Decision::Keep
    }
}

// =============================================================================
// Tests
// =============================================================================
