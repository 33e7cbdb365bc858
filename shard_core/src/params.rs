//! Kernel Geometry Parameters
//!
//! Read-only description of the target execution unit shared by every
//! block-scheduling invocation of one kernel.

/// Geometry of the register file and execution unit being modeled.
#[derive(Debug, Clone)]
pub struct KernelParams {
    /// Number of general registers in the flat register file.
    pub grf_count: u32,
    /// Bytes per general register.
    pub grf_byte_size: u32,
    /// Hardware threads resident per execution unit. Scales latency
    /// estimates when multithreaded modeling is enabled.
    pub hw_threads_per_eu: u32,
    /// Issue slots that co-issue per cycle across resident threads.
    pub coissue_units: u32,
    /// Dispatch SIMD width of the kernel.
    pub simd_size: u8,
}

impl Default for KernelParams {
    fn default() -> Self {
        KernelParams {
            grf_count: 128,
            grf_byte_size: 32,
            hw_threads_per_eu: 7,
            coissue_units: 2,
            simd_size: 16,
        }
    }
}

impl KernelParams {
    /// Total bytes in the general register file.
    #[inline]
    pub fn grf_file_bytes(&self) -> u32 {
        self.grf_count * self.grf_byte_size
    }

    /// Register index holding the given linearized byte, if in range.
    #[inline]
    pub fn grf_of_byte(&self, byte: u32) -> Option<u32> {
        let reg = byte / self.grf_byte_size;
        (reg < self.grf_count).then_some(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grf_of_byte() {
        let p = KernelParams::default();
        assert_eq!(p.grf_of_byte(0), Some(0));
        assert_eq!(p.grf_of_byte(31), Some(0));
        assert_eq!(p.grf_of_byte(32), Some(1));
        assert_eq!(p.grf_of_byte(p.grf_file_bytes()), None);
    }
}
