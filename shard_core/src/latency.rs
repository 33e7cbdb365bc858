//! Latency and Occupancy Oracle
//!
//! Maps instructions to modeled issue-pipe occupancy and to
//! producer-to-consumer latency per dependency kind. The scheduler never
//! interprets opcodes for timing itself; everything goes through
//! [`LatencyOracle`] so targets with different pipelines can substitute
//! their own tables.
//!
//! # Model
//!
//! Occupancy is the number of cycles an instruction holds the issuing
//! pipe: SIMD passes (exec size over the native pass width) times a
//! per-class pass cost, doubled for math and dot-product classes.
//! True-dependency latency depends on the producer: fixed-function
//! latency for sends (by target unit), math-pipe latency for
//! transcendentals, the modeled FPU pipeline depth otherwise. False
//! dependencies (WAR/WAW) only pay the short in-order issue latency.
//! Every edge latency is clamped to at least the producer's occupancy.

use crate::dep::DepKind;
use crate::inst::{Instruction, Opcode, SendTarget};
use crate::params::KernelParams;

// =============================================================================
// Oracle Trait
// =============================================================================

/// Timing oracle consulted during graph construction and scheduling.
pub trait LatencyOracle {
    /// Cycles the instruction holds the issue pipe.
    fn occupancy(&self, inst: &Instruction) -> u32;

    /// Cycles between issuing `producer` and the earliest legal issue of
    /// a consumer related by an edge of kind `kind`.
    fn latency(&self, producer: &Instruction, kind: DepKind) -> u32;

    /// Cycles until a long-latency send has read its source payload
    /// registers. Drives the outstanding-request queue model.
    fn send_src_read_latency(&self, inst: &Instruction) -> u32;
}

// =============================================================================
// Default Latency Table
// =============================================================================

/// Default timing table for the modeled in-order execution unit.
///
/// All entries are tunable; the defaults reflect the modeled pipeline
/// this scheduler was validated against.
#[derive(Debug, Clone)]
pub struct LatencyTable {
    /// SIMD channels per issue pass.
    pub pass_width: u32,
    /// Pass cost of ordinary ALU instructions.
    pub alu_pass_cycles: u32,
    /// FPU pipeline depth charged on register true dependencies.
    pub pipeline_depth: u32,
    /// Latency of short math functions.
    pub math_latency: u32,
    /// Latency of long math functions (pow, fdiv).
    pub long_math_latency: u32,
    /// Issue latency charged on WAR/WAW edges.
    pub short_latency: u32,
    /// Completion latency of sampler messages.
    pub sampler_latency: u32,
    /// Completion latency of data-cache messages.
    pub data_cache_latency: u32,
    /// Completion latency of render-cache messages.
    pub render_cache_latency: u32,
    /// Completion latency of scratch-block messages.
    pub scratch_latency: u32,
    /// Completion latency of URB writes.
    pub urb_latency: u32,
    /// Cycles until a send's source payload has been read out.
    pub send_src_read: u32,
    /// Divide edge latencies by `hw_threads_per_eu / coissue_units`,
    /// modeling latency hiding across resident threads.
    pub mt_scaling: bool,
    threads_per_eu: u32,
    coissue_units: u32,
}

impl LatencyTable {
    /// Build the default table for the given kernel geometry.
    pub fn new(params: &KernelParams, mt_scaling: bool) -> Self {
        LatencyTable {
            pass_width: 8,
            alu_pass_cycles: 2,
            pipeline_depth: 14,
            math_latency: 22,
            long_math_latency: 30,
            short_latency: 2,
            sampler_latency: 300,
            data_cache_latency: 200,
            render_cache_latency: 160,
            scratch_latency: 200,
            urb_latency: 95,
            send_src_read: 10,
            mt_scaling,
            threads_per_eu: params.hw_threads_per_eu,
            coissue_units: params.coissue_units,
        }
    }

    /// Fixed-function completion latency of a send by target unit.
    fn send_latency(&self, target: &SendTarget) -> u32 {
        match target {
            SendTarget::Sampler => self.sampler_latency,
            SendTarget::DataCache => self.data_cache_latency,
            SendTarget::RenderCache => self.render_cache_latency,
            SendTarget::Scratch { .. } => self.scratch_latency,
            SendTarget::Urb { .. } => self.urb_latency,
        }
    }

    /// Latency of the producing value becoming available on a true
    /// dependency, before occupancy clamping.
    fn raw_latency(&self, producer: &Instruction) -> u32 {
        if let Some(desc) = producer.send_desc() {
            return self.send_latency(&desc.target);
        }
        match producer.opcode() {
            Opcode::Math(f) if f.is_long() => self.long_math_latency,
            Opcode::Math(_) => self.math_latency,
            _ => self.pipeline_depth,
        }
    }

    /// Apply multithreaded latency scaling.
    fn scale(&self, latency: u32) -> u32 {
        if !self.mt_scaling || self.coissue_units == 0 {
            return latency;
        }
        let divisor = self.threads_per_eu as f32 / self.coissue_units as f32;
        if divisor <= 1.0 {
            return latency;
        }
        (latency as f32 / divisor) as u32
    }
}

impl LatencyOracle for LatencyTable {
    fn occupancy(&self, inst: &Instruction) -> u32 {
        // Labels carry exec size 1 by convention but must always cost a
        // single cycle.
        if inst.is_label() {
            return 1;
        }
        let passes = (inst.exec_size() as u32 / self.pass_width).max(1);
        let pass_cycles = match inst.opcode() {
            Opcode::Math(f) if f.is_long() => 2 * self.alu_pass_cycles * 2,
            Opcode::Math(_) => self.alu_pass_cycles * 2,
            Opcode::Mad | Opcode::Dpas => self.alu_pass_cycles * 2,
            _ => self.alu_pass_cycles,
        };
        passes * pass_cycles
    }

    fn latency(&self, producer: &Instruction, kind: DepKind) -> u32 {
        let occupancy = self.occupancy(producer);
        let raw = match kind {
            DepKind::Raw | DepKind::RawMemory => self.raw_latency(producer),
            DepKind::War | DepKind::WarMemory | DepKind::Waw | DepKind::WawMemory => {
                self.short_latency
            }
            DepKind::Barrier | DepKind::Label => {
                // A read send ordered only against a barrier is a
                // prefetch; assume its result is consumed right after
                // the transfer.
                if let Some(desc) = producer.send_desc() {
                    if matches!(desc.op, crate::inst::SendOp::Read) {
                        return self.scale(self.send_latency(&desc.target)).max(occupancy);
                    }
                }
                return occupancy;
            }
        };
        self.scale(raw).max(occupancy)
    }

    fn send_src_read_latency(&self, _inst: &Instruction) -> u32 {
        self.send_src_read
    }
}

// =============================================================================
// Tests
// =============================================================================
