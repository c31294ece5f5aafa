//! Performance records for tracked pipeline resources.
//!
//! One record per measured resource, living in a fixed slot of the
//! shared performance window. Identity fields (resource id, power mode)
//! survive a counter reset; the removal flag marks a record whose slot
//! is waiting for the next disable transition to be reclaimed.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

// ============================================================================
// FLAGS
// ============================================================================

bitflags! {
    /// Packed flag word of a performance record.
    ///
    /// Bit positions are part of the host-visible layout.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u32 {
        /// Resource runs in the low-power (clock-gated) mode
        const LOW_POWER = 1 << 0;
        /// Resource has been deleted; the slot free is deferred
        const REMOVED = 1 << 31;
    }
}

/// Power mode of a measured resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PowerMode {
    /// Full-power mode
    D0 = 0,
    /// Clock-gated low-power mode
    D0ix = 1,
}

// ============================================================================
// RECORD
// ============================================================================

/// One resource's performance counters in the shared window.
///
/// The layout is byte-stable: reserved words make every padding slot
/// explicit, and fields are only ever appended.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PerfRecord {
    /// Id of the resource this record measures
    pub resource_id: u32,
    flags: u32,
    /// Peak load in kilo-cycles per second
    pub peak_kcps: u32,
    /// Average load in kilo-cycles per second
    pub avg_kcps: u32,
    /// Iterations executed since init or reset
    pub total_iteration_count: u32,
    _rsvd0: u32,
    /// Cycles consumed since init or reset
    pub total_cycles_consumed: u64,
    /// Iterations executed under restricted conditions
    pub restricted_total_iterations: u32,
    _rsvd1: u32,
    /// Cycles consumed under restricted conditions
    pub restricted_total_cycles: u64,
    /// Peak single-iteration cycles under restricted conditions
    pub restricted_peak_cycles: u32,
    _rsvd2: u32,
}

const_assert_eq!(core::mem::size_of::<PerfRecord>(), 56);

impl PerfRecord {
    /// All-zero record
    pub const fn zeroed() -> Self {
        Self {
            resource_id: 0,
            flags: 0,
            peak_kcps: 0,
            avg_kcps: 0,
            total_iteration_count: 0,
            _rsvd0: 0,
            total_cycles_consumed: 0,
            restricted_total_iterations: 0,
            _rsvd1: 0,
            restricted_total_cycles: 0,
            restricted_peak_cycles: 0,
            _rsvd2: 0,
        }
    }

    /// Initialize the record for a resource: zero the counters, store
    /// the identity fields, clear the removal flag.
    pub fn init(&mut self, resource_id: u32, power_mode: PowerMode) {
        *self = Self::zeroed();
        self.resource_id = resource_id;
        if matches!(power_mode, PowerMode::D0ix) {
            self.flags = RecordFlags::LOW_POWER.bits();
        }
    }

    /// Start counting over: zero all accumulators, keeping identity
    /// fields and the removal flag.
    pub fn reset(&mut self) {
        self.peak_kcps = 0;
        self.avg_kcps = 0;
        self.total_iteration_count = 0;
        self.total_cycles_consumed = 0;
        self.restricted_total_iterations = 0;
        self.restricted_total_cycles = 0;
        self.restricted_peak_cycles = 0;
    }

    /// Mark the resource as deleted; the slot outlives it until the
    /// next disable transition reconciles deferred frees.
    pub fn mark_removed(&mut self) {
        self.flags |= RecordFlags::REMOVED.bits();
    }

    /// Whether the resource behind this record has been deleted
    #[inline(always)]
    pub fn is_removed(&self) -> bool {
        self.flags().contains(RecordFlags::REMOVED)
    }

    /// Power mode stored at init
    pub fn power_mode(&self) -> PowerMode {
        if self.flags().contains(RecordFlags::LOW_POWER) {
            PowerMode::D0ix
        } else {
            PowerMode::D0
        }
    }

    /// Decoded flag word
    #[inline(always)]
    pub fn flags(&self) -> RecordFlags {
        RecordFlags::from_bits_truncate(self.flags)
    }

    /// Raw flag word as the host sees it
    #[inline(always)]
    pub(crate) const fn raw_flags(&self) -> u32 {
        self.flags
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_stores_identity_and_clears_removal() {
        let mut record = PerfRecord::zeroed();
        record.mark_removed();
        record.total_cycles_consumed = 999;

        record.init(7, PowerMode::D0ix);
        assert_eq!(record.resource_id, 7);
        assert_eq!(record.power_mode(), PowerMode::D0ix);
        assert!(!record.is_removed());
        assert_eq!(record.total_cycles_consumed, 0);
    }

    #[test]
    fn reset_preserves_identity_fields() {
        let mut record = PerfRecord::zeroed();
        record.init(7, PowerMode::D0ix);
        record.peak_kcps = 123;
        record.avg_kcps = 45;
        record.total_iteration_count = 6;
        record.total_cycles_consumed = 7_000;
        record.restricted_peak_cycles = 89;

        record.reset();
        assert_eq!(record.resource_id, 7);
        assert_eq!(record.power_mode(), PowerMode::D0ix);
        assert!(!record.is_removed());
        assert_eq!(record.peak_kcps, 0);
        assert_eq!(record.avg_kcps, 0);
        assert_eq!(record.total_iteration_count, 0);
        assert_eq!(record.total_cycles_consumed, 0);
        assert_eq!(record.restricted_peak_cycles, 0);
    }

    #[test]
    fn reset_does_not_touch_removal_flag() {
        let mut record = PerfRecord::zeroed();
        record.init(3, PowerMode::D0);
        record.mark_removed();
        record.reset();
        assert!(record.is_removed());
    }
}
