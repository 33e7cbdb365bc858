//! Scheduler Configuration
//!
//! Every tunable of the scheduler lives here: feature gates for the
//! fusion transformations and each heuristic, search-window sizes, and
//! the modeled queue depths. The surrounding compiler driver owns the
//! mapping from its option surface onto this struct.

/// Configuration for one scheduling invocation.
#[derive(Debug, Clone)]
pub struct SchedConfig {
    /// Skip blocks with fewer instructions than this.
    pub min_block_size: usize,

    /// Split blocks larger than this into independently scheduled
    /// windows. Zero disables splitting.
    pub window_size: usize,

    /// Order both ready queues purely by original program order,
    /// reproducing the input schedule. Debug aid.
    pub sequential: bool,

    // =========================================================================
    // Fusion
    // =========================================================================
    /// Pair complementary half-width surface writes into one node.
    pub fuse_wide_stores: bool,

    /// Pair chained systolic dot-product instructions into one node.
    pub fuse_dpas: bool,

    /// Mark the lead instruction of a fused send pair for atomic issue.
    pub atomic_fused_sends: bool,

    // =========================================================================
    // Dependency analysis
    // =========================================================================
    /// Allow reordering sends that target different shared-function
    /// units. When off, all send pairs are kept in order.
    pub reorder_unrelated_sends: bool,

    // =========================================================================
    // Heuristics
    // =========================================================================
    /// Model bounded-depth outstanding-request queues for sends.
    pub enable_send_queue: bool,

    /// Chain systolic dot-product macros at selection time.
    pub enable_dpas_affinity: bool,

    /// Prefer candidates that keep operand read suppression alive.
    pub enable_read_suppression: bool,

    /// Avoid register bank conflicts with the previous instruction.
    pub enable_bank_conflict: bool,

    /// Balance issue across execution pipes.
    pub enable_pipe_balance: bool,

    /// Avoid back-to-back writes to sub-parts of one register.
    pub enable_subreg_hazard: bool,

    /// Group independent move-class instructions for combined emission.
    pub enable_write_combine: bool,

    // =========================================================================
    // Heuristic tunables
    // =========================================================================
    /// Outstanding sampler requests before the queue model stalls.
    pub sampler_queue_depth: usize,

    /// Outstanding memory requests before the queue model stalls.
    pub memory_queue_depth: usize,

    /// Ready-queue window inspected when steering around a full queue.
    pub send_search_window: usize,

    /// Ready-queue window inspected for a dot-product macro partner.
    pub dpas_search_window: usize,

    /// Ready-queue depth searched for a read-suppression partner.
    pub read_suppression_depth: usize,

    /// Ready-queue window inspected for a conflict-free candidate.
    pub bank_conflict_window: usize,

    /// Ready-queue depth searched when balancing pipes.
    pub pipe_balance_depth: usize,

    /// Candidates tried before giving up on a subregister hazard.
    pub subreg_hazard_attempts: usize,

    /// Smallest move run worth combining.
    pub write_combine_min_run: usize,

    /// Largest move run combined in one step.
    pub write_combine_max_run: usize,

    // =========================================================================
    // Hazard no-ops
    // =========================================================================
    /// Insert synthetic no-ops between unavoidable subregister-write
    /// hazards after scheduling.
    pub insert_hazard_nops: bool,

    /// No-ops inserted per hazard.
    pub hazard_nop_gap: u32,

    // =========================================================================
    // Statistics
    // =========================================================================
    /// Per-nesting-level multiplier of the kernel cost estimate.
    pub loop_weight: f32,
}

impl Default for SchedConfig {
    fn default() -> Self {
        SchedConfig {
            min_block_size: 2,
            window_size: 4096,
            sequential: false,
            // Fusion
            fuse_wide_stores: false,
            fuse_dpas: false,
            atomic_fused_sends: true,
            // Dependency analysis
            reorder_unrelated_sends: true,
            // Heuristics
            enable_send_queue: true,
            enable_dpas_affinity: true,
            enable_read_suppression: true,
            enable_bank_conflict: true,
            enable_pipe_balance: true,
            enable_subreg_hazard: true,
            enable_write_combine: true,
            // Tunables
            sampler_queue_depth: 4,
            memory_queue_depth: 6,
            send_search_window: 8,
            dpas_search_window: 4,
            read_suppression_depth: 4,
            bank_conflict_window: 4,
            pipe_balance_depth: 2,
            subreg_hazard_attempts: 2,
            write_combine_min_run: 4,
            write_combine_max_run: 8,
            // No-ops
            insert_hazard_nops: false,
            hazard_nop_gap: 1,
            // Statistics
            loop_weight: 10.0,
        }
    }
}

impl SchedConfig {
    /// Minimal configuration: dependency-safe reordering only, no
    /// candidate reselection. Fastest compile.
    pub fn minimal() -> Self {
        SchedConfig {
            fuse_wide_stores: false,
            fuse_dpas: false,
            enable_send_queue: false,
            enable_dpas_affinity: false,
            enable_read_suppression: false,
            enable_bank_conflict: false,
            enable_pipe_balance: false,
            enable_subreg_hazard: false,
            enable_write_combine: false,
            ..Default::default()
        }
    }

    /// Full configuration with every transformation enabled.
    pub fn full() -> Self {
        SchedConfig {
            fuse_wide_stores: true,
            fuse_dpas: true,
            insert_hazard_nops: true,
            ..Default::default()
        }
    }
}
