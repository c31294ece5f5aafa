//! Report builders for host read-out.
//!
//! Both report shapes share the same two-phase layout: one entry per
//! active core first, then one entry per occupied record slot in
//! ascending index order. The entry count is computed once up front and
//! used as the iteration bound; a pool mutation racing the read-out
//! yields a slightly stale or zeroed entry, never an out-of-range
//! access.

use static_assertions::const_assert_eq;

use crate::monitor::PerformanceMonitor;
use crate::pool::SlotIndex;
use crate::systick::{SystickSlot, TelemetryWindow};
use crate::{TelemetryError, TelemetryResult};

// ============================================================================
// ENTRY LAYOUTS
// ============================================================================

/// Placeholder for the extended report's per-core total-cycles field.
///
/// The source data for this field does not exist upstream yet; hosts
/// must treat the value as "not yet available", not as a measurement.
pub const CYCLES_NOT_AVAILABLE: u64 = u64::MAX;

/// One basic report entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfReportEntry {
    /// Core id in phase 1, resource id in phase 2
    pub resource_id: u32,
    /// Raw record flag word; 0 for core entries
    pub flags: u32,
    /// Peak load (core entries: peak tick-period)
    pub peak_kcps: u32,
    /// Average load (core entries: rolling average tick-period)
    pub avg_kcps: u32,
}

const_assert_eq!(core::mem::size_of::<PerfReportEntry>(), 16);

impl PerfReportEntry {
    /// All-zero entry
    pub const fn zeroed() -> Self {
        Self {
            resource_id: 0,
            flags: 0,
            peak_kcps: 0,
            avg_kcps: 0,
        }
    }
}

/// One extended report entry, mirroring the full record layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtPerfReportEntry {
    /// Core id in phase 1, resource id in phase 2
    pub resource_id: u32,
    /// Raw record flag word; 0 for core entries
    pub flags: u32,
    /// Peak load
    pub peak_kcps: u32,
    /// Average load
    pub avg_kcps: u32,
    /// Iterations since init or reset
    pub total_iteration_count: u32,
    _rsvd0: u32,
    /// Cycles since init or reset; [`CYCLES_NOT_AVAILABLE`] for core
    /// entries
    pub total_cycles_consumed: u64,
    /// Restricted-condition iterations
    pub restricted_total_iterations: u32,
    _rsvd1: u32,
    /// Restricted-condition cycles
    pub restricted_total_cycles: u64,
    /// Restricted-condition peak cycles per iteration
    pub restricted_peak_cycles: u32,
    _rsvd2: u32,
}

const_assert_eq!(core::mem::size_of::<ExtPerfReportEntry>(), 56);

impl ExtPerfReportEntry {
    /// All-zero entry
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
}

// ============================================================================
// BUILDERS
// ============================================================================

/// Largest entry count a report over `window` and `monitor` can hold.
///
/// Callers size their buffers to this bound once; the builders then
/// never fail for capacity.
pub fn max_report_entries(window: &TelemetryWindow, monitor: &PerformanceMonitor) -> usize {
    window.core_count() + monitor.capacity()
}

/// Build the basic report. Returns the number of valid entries.
///
/// Takes no lock; the result is a best-effort snapshot.
pub fn basic_report(
    window: &TelemetryWindow,
    monitor: &PerformanceMonitor,
    out: &mut [PerfReportEntry],
) -> TelemetryResult<usize> {
    if out.len() < max_report_entries(window, monitor) {
        return Err(TelemetryError::InvalidArgument);
    }

    let total = window.core_count() + monitor.occupied_count();
    let mut filled = 0;

    for core in 0..window.core_count() {
        let stats = window.core_stats(core).unwrap_or_else(SystickSlot::zeroed);
        out[filled] = PerfReportEntry {
            resource_id: core as u32,
            flags: 0,
            peak_kcps: stats.peak_utilization,
            avg_kcps: stats.avg_utilization,
        };
        filled += 1;
    }

    for index in monitor.pool().occupied_slots().iter() {
        if filled >= total {
            break;
        }
        let Some(record) = monitor.pool().record(SlotIndex(index)) else {
            continue;
        };
        out[filled] = PerfReportEntry {
            resource_id: record.resource_id,
            flags: record.raw_flags(),
            peak_kcps: record.peak_kcps,
            avg_kcps: record.avg_kcps,
        };
        filled += 1;
    }

    // Slots freed between counting and copying leave zeroed entries.
    while filled < total {
        out[filled] = PerfReportEntry::zeroed();
        filled += 1;
    }
    Ok(total)
}

/// Build the extended report. Returns the number of valid entries.
pub fn extended_report(
    window: &TelemetryWindow,
    monitor: &PerformanceMonitor,
    out: &mut [ExtPerfReportEntry],
) -> TelemetryResult<usize> {
    if out.len() < max_report_entries(window, monitor) {
        return Err(TelemetryError::InvalidArgument);
    }

    let total = window.core_count() + monitor.occupied_count();
    let mut filled = 0;

    for core in 0..window.core_count() {
        let stats = window.core_stats(core).unwrap_or_else(SystickSlot::zeroed);
        let mut entry = ExtPerfReportEntry::zeroed();
        entry.resource_id = core as u32;
        entry.peak_kcps = stats.peak_utilization;
        entry.avg_kcps = stats.avg_utilization;
        entry.total_cycles_consumed = CYCLES_NOT_AVAILABLE;
        out[filled] = entry;
        filled += 1;
    }

    for index in monitor.pool().occupied_slots().iter() {
        if filled >= total {
            break;
        }
        let Some(record) = monitor.pool().record(SlotIndex(index)) else {
            continue;
        };
        out[filled] = ExtPerfReportEntry {
            resource_id: record.resource_id,
            flags: record.raw_flags(),
            peak_kcps: record.peak_kcps,
            avg_kcps: record.avg_kcps,
            total_iteration_count: record.total_iteration_count,
            _rsvd0: 0,
            total_cycles_consumed: record.total_cycles_consumed,
            restricted_total_iterations: record.restricted_total_iterations,
            _rsvd1: 0,
            restricted_total_cycles: record.restricted_total_cycles,
            restricted_peak_cycles: record.restricted_peak_cycles,
            _rsvd2: 0,
        };
        filled += 1;
    }

    while filled < total {
        out[filled] = ExtPerfReportEntry::zeroed();
        filled += 1;
    }
    Ok(total)
}

// ============================================================================
// TESTS
// ============================================================================
