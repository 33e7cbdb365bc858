//! Hazard No-Op Insertion
//!
//! Some hardware revisions forbid back-to-back partial writes into one
//! register. The subregister-hazard policy separates such writers when
//! it can; this post-pass inserts synthetic no-ops between the pairs
//! that could not be separated. It is the only transformation that
//! changes the instruction count, and it is off by default.

use shard_core::inst::{Instruction, Opcode, StorageBase};
use shard_core::params::KernelParams;

/// Register partially overwritten by the instruction, if its
/// destination is a sub-range of a single general register.
fn partial_write_reg(inst: &Instruction, params: &KernelParams) -> Option<u32> {
    let dst = inst.dst()?;
    let StorageBase::Grf { byte_start, byte_len } = dst.base else {
        return None;
    };
    let reg = byte_start / params.grf_byte_size;
    let end_reg = (byte_start + byte_len.saturating_sub(1)) / params.grf_byte_size;
    if reg != end_reg {
        return None;
    }
    let full = byte_start % params.grf_byte_size == 0
        && byte_len == params.grf_byte_size
        && !dst.mask.non_contiguous;
    (!full).then_some(reg)
}

/// Insert `gap` no-ops between consecutive partial writes to the same
/// register. Returns the number of no-ops inserted.
pub fn insert_hazard_nops(
    insts: &mut Vec<Instruction>,
    params: &KernelParams,
    gap: u32,
) -> u32 {
    if gap == 0 {
        return 0;
    }
    let mut inserted = 0;
    let mut i = 1;
    while i < insts.len() {
        let hazard = match (
            partial_write_reg(&insts[i - 1], params),
            partial_write_reg(&insts[i], params),
        ) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if hazard {
            for _ in 0..gap {
                insts.insert(i, Instruction::new(Opcode::Nop, 1));
            }
            inserted += gap;
            i += gap as usize;
        }
        i += 1;
    }
    inserted
}

// =============================================================================
// Tests
// =============================================================================
