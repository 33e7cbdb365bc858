//! Live Bucket Table
//!
//! Dependency tracking during the reverse scan is bucketed by storage
//! granule: one bucket per general register, plus fixed buckets for each
//! special register class and for outstanding send messages. When a new
//! instruction is analyzed only the buckets it touches need to be
//! consulted, instead of the whole live set.

use shard_core::inst::{AccessMask, ArchReg, OperandRole};
use shard_core::params::KernelParams;

use super::NodeId;

// =============================================================================
// Bucket Layout
// =============================================================================

/// Coarse class of a bucket, selecting the dependency-classification
/// rules applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketClass {
    /// One general register; byte-precise masks and kills.
    Grf,
    /// Accumulator; role-pair classification, never killed.
    Acc,
    /// Flag register; role-pair classification, never killed.
    Flag,
    /// Address register; role-pair classification, never killed.
    Addr,
    /// Send channel; message-target classification.
    Send,
    /// Scratch-block send channel; range-overlap classification.
    ScratchSend,
    /// Remaining architectural registers; conservative.
    OtherArf,
}

/// Index layout of the bucket table: GRF buckets first, then the fixed
/// special buckets.
#[derive(Debug, Clone, Copy)]
pub struct BucketLayout {
    grf_count: usize,
    grf_byte_size: u32,
}

impl BucketLayout {
    /// Layout for the given register-file geometry.
    pub fn new(params: &KernelParams) -> Self {
        BucketLayout {
            grf_count: params.grf_count as usize,
            grf_byte_size: params.grf_byte_size,
        }
    }

    #[inline]
    pub fn acc(&self) -> usize {
        self.grf_count
    }

    #[inline]
    pub fn flag0(&self) -> usize {
        self.grf_count + 1
    }

    #[inline]
    pub fn flag1(&self) -> usize {
        self.grf_count + 2
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.grf_count + 3
    }

    #[inline]
    pub fn send(&self) -> usize {
        self.grf_count + 4
    }

    #[inline]
    pub fn scratch_send(&self) -> usize {
        self.grf_count + 5
    }

    #[inline]
    pub fn other_arf(&self) -> usize {
        self.grf_count + 6
    }

    /// Total bucket count.
    #[inline]
    pub fn total(&self) -> usize {
        self.grf_count + 7
    }

    /// Bucket of an architectural register.
    pub fn of_arch(&self, reg: ArchReg) -> usize {
        match reg {
            ArchReg::Acc => self.acc(),
            ArchReg::Flag0 => self.flag0(),
            ArchReg::Flag1 => self.flag1(),
            ArchReg::Addr => self.addr(),
            ArchReg::Scalar(_) => self.other_arf(),
        }
    }

    /// Bucket of the general register holding `byte`, if in range.
    #[inline]
    pub fn grf_of_byte(&self, byte: u32) -> Option<usize> {
        let reg = (byte / self.grf_byte_size) as usize;
        (reg < self.grf_count).then_some(reg)
    }

    /// Byte span `[start, end]` of a GRF bucket.
    #[inline]
    pub fn grf_span(&self, bucket: usize) -> (u32, u32) {
        let start = bucket as u32 * self.grf_byte_size;
        (start, start + self.grf_byte_size - 1)
    }

    /// Classification of a bucket index.
    pub fn class_of(&self, bucket: usize) -> BucketClass {
        if bucket < self.grf_count {
            BucketClass::Grf
        } else if bucket == self.acc() {
            BucketClass::Acc
        } else if bucket == self.flag0() || bucket == self.flag1() {
            BucketClass::Flag
        } else if bucket == self.addr() {
            BucketClass::Addr
        } else if bucket == self.send() {
            BucketClass::Send
        } else if bucket == self.scratch_send() {
            BucketClass::ScratchSend
        } else {
            BucketClass::OtherArf
        }
    }
}

// =============================================================================
// Bucket Descriptors
// =============================================================================

/// One (bucket, mask, role) access of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketDescr {
    /// Bucket index in the layout.
    pub bucket: usize,
    /// Bytes touched.
    pub mask: AccessMask,
    /// Operand role producing the access.
    pub role: OperandRole,
}

// =============================================================================
// Live Entries
// =============================================================================

/// A not-yet-killed access hanging from a bucket.
#[derive(Debug, Clone, Copy)]
pub struct LiveEntry {
    /// Node owning the access.
    pub node: NodeId,
    /// Bytes the access touches.
    pub mask: AccessMask,
    /// Operand role of the access.
    pub role: OperandRole,
}

/// The live bucket table used during the reverse scan.
#[derive(Debug)]
pub struct LiveBuckets {
    buckets: Vec<Vec<LiveEntry>>,
}

impl LiveBuckets {
    /// Empty table for the given layout.
    pub fn new(layout: &BucketLayout) -> Self {
        LiveBuckets { buckets: vec![Vec::new(); layout.total()] }
    }

    /// Append a live entry to a bucket.
    pub fn add(&mut self, bucket: usize, entry: LiveEntry) {
        self.buckets[bucket].push(entry);
    }

    /// Live entries of one bucket.
    #[inline]
    pub fn entries(&self, bucket: usize) -> &[LiveEntry] {
        &self.buckets[bucket]
    }

    /// Entry count of one bucket.
    #[inline]
    pub fn len(&self, bucket: usize) -> usize {
        self.buckets[bucket].len()
    }

    /// Kill the entry at `idx` in `bucket` by swap-removal; the caller
    /// must re-inspect `idx` afterwards.
    pub fn kill(&mut self, bucket: usize, idx: usize) {
        self.buckets[bucket].swap_remove(idx);
    }

    /// Drop every live entry (barrier semantics).
    pub fn clear_all(&mut self) {
        for b in &mut self.buckets {
            b.clear();
        }
    }

    /// Iterate every live entry across all buckets.
    pub fn iter_all(&self) -> impl Iterator<Item = &LiveEntry> {
        self.buckets.iter().flatten()
    }

    /// Whether no entry is live in any bucket.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.is_empty())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shard_core::inst::AccessMask;

    fn layout() -> BucketLayout {
        BucketLayout::new(&KernelParams::default())
    }

    #[test]
    fn test_layout_indices_are_disjoint() {
        let l = layout();
        let special = [l.acc(), l.flag0(), l.flag1(), l.addr(), l.send(), l.scratch_send(), l.other_arf()];
        for (i, a) in special.iter().enumerate() {
            assert!(*a >= 128, "special bucket below the GRF range");
            for b in &special[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(l.total(), 128 + 7);
    }

    #[test]
    fn test_grf_bucket_mapping() {
        let l = layout();
        assert_eq!(l.grf_of_byte(0), Some(0));
        assert_eq!(l.grf_of_byte(63), Some(1));
        assert_eq!(l.grf_of_byte(128 * 32), None);
        assert_eq!(l.grf_span(2), (64, 95));
        assert_eq!(l.class_of(5), BucketClass::Grf);
        assert_eq!(l.class_of(l.send()), BucketClass::Send);
    }

    #[test]
    fn test_live_table_add_kill() {
        let l = layout();
        let mut lb = LiveBuckets::new(&l);
        assert!(lb.is_empty());
        lb.add(3, LiveEntry {
            node: NodeId::new(0),
            mask: AccessMask::new(96, 127, false),
            role: OperandRole::Dst,
        });
        lb.add(3, LiveEntry {
            node: NodeId::new(1),
            mask: AccessMask::new(96, 111, false),
            role: OperandRole::Src(0),
        });
        assert_eq!(lb.len(3), 2);
        lb.kill(3, 0);
        assert_eq!(lb.len(3), 1);
        assert_eq!(lb.entries(3)[0].node, NodeId::new(1));
        lb.clear_all();
        assert!(lb.is_empty());
    }
}
