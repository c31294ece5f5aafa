//! # Aria Telemetry
//!
//! On-device performance telemetry for the Aria audio DSP: per-core
//! execution-time statistics for the scheduler tick loop and
//! per-resource performance counters, published into fixed-layout
//! shared-memory windows that the host-side monitor reads without
//! synchronization.
//!
//! ## Components
//!
//! - **Cycle Tracker**: per-core tick accounting with rolling average
//!   and peak-decay windows
//! - **Slot Pool**: bitmap-allocated performance records for
//!   dynamically created pipeline resources
//! - **Performance Monitor**: record lifecycle and the
//!   enable/disable/reset control state machine
//! - **Report Builders**: basic and extended host read-out snapshots
//! - **I/O Counters** (feature `io-performance`): per-interface
//!   transfer counters over a distinct pool
//!
//! ## Concurrency
//!
//! The subsystem has no tasks of its own; every entry point is called
//! synchronously from the tick handler, the resource lifecycle, or the
//! host control path, and none of them blocks. Each core exclusively
//! owns its window slot; only the slot-pool bitmap takes a lock, held
//! for the bit operations alone. Readers get best-effort snapshots and
//! tolerate reads torn by one in-flight update.

#![cfg_attr(not(test), no_std)]

pub mod error;
#[cfg(feature = "io-performance")]
pub mod io;
pub mod monitor;
pub mod pool;
pub mod queue;
pub mod record;
pub mod report;
pub mod systick;

pub use error::{TelemetryError, TelemetryResult};
#[cfg(feature = "io-performance")]
pub use io::{IoDirection, IoInterface, IoPerfMonitor, IoPerfRecord, IoRecordDesc};
pub use monitor::{MeasurementState, PerformanceMonitor, ResourceBinding, ResourceDirectory};
pub use pool::{MAX_SLOTS, OccupiedSlots, SlotIndex, SlotPool};
pub use queue::AvgQueue;
pub use record::{PerfRecord, PowerMode, RecordFlags};
pub use report::{
    CYCLES_NOT_AVAILABLE, ExtPerfReportEntry, PerfReportEntry, basic_report, extended_report,
    max_report_entries,
};
pub use systick::{
    AVG_MEAS_DEPTH, AVG_MEAS_PERIOD, CoreCycleTracker, MAX_CORE_COUNT, SystickSlot,
    TelemetryWindow, WINDOW_SEPARATOR,
};

pub use aria_shmem::{Arena, Region, ShmemError};

// ============================================================================
// SUBSYSTEM FACADE
// ============================================================================

/// The assembled telemetry subsystem: telemetry window plus performance
/// monitor, bound to their shared-memory regions.
///
/// The host control commands (enable, disable, reset, get-report,
/// get/set state) map one-to-one onto the methods here and on
/// [`PerformanceMonitor`].
#[derive(Debug)]
pub struct Telemetry {
    window: TelemetryWindow,
    monitor: PerformanceMonitor,
}

impl Telemetry {
    /// One-time boot hook.
    ///
    /// Writes the window separator marker, zeroes all per-core stats and
    /// sets up the record pool over the performance window. Must
    /// complete before any tick or allocation call.
    pub fn init(
        window_region: Region,
        record_region: Region,
        core_count: usize,
    ) -> TelemetryResult<Self> {
        let window = TelemetryWindow::new(window_region, core_count)?;
        window.initialize()?;
        let monitor = PerformanceMonitor::new(Arena::at(record_region, 0)?);
        log::info!(
            "telemetry up: {} cores, {} record slots",
            core_count,
            monitor.capacity()
        );
        Ok(Self { window, monitor })
    }

    /// The telemetry window (cheap copy of the mapping)
    #[inline(always)]
    pub fn window(&self) -> TelemetryWindow {
        self.window
    }

    /// The performance monitor
    #[inline(always)]
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Cycle tracker for one core, to be owned by that core's scheduler
    /// context.
    pub fn tracker_for_core(&self, core_id: usize) -> TelemetryResult<CoreCycleTracker> {
        CoreCycleTracker::new(self.window, core_id)
    }

    /// Largest entry count any report can contain; callers size report
    /// buffers to this once.
    pub fn max_report_entries(&self) -> usize {
        report::max_report_entries(&self.window, &self.monitor)
    }

    /// Build the basic report into `out`.
    pub fn basic_report(&self, out: &mut [PerfReportEntry]) -> TelemetryResult<usize> {
        report::basic_report(&self.window, &self.monitor, out)
    }

    /// Build the extended report into `out`.
    pub fn extended_report(&self, out: &mut [ExtPerfReportEntry]) -> TelemetryResult<usize> {
        report::extended_report(&self.window, &self.monitor, out)
    }

    /// Zero per-core peaks and all record accumulators.
    pub fn reset(&self) -> TelemetryResult<()> {
        self.monitor.reset(&self.window)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr::NonNull;

    fn region(len: usize) -> Region {
        let words = Box::leak(vec![0u64; len.div_ceil(8)].into_boxed_slice());
        let base = NonNull::new(words.as_mut_ptr().cast::<u8>()).unwrap();
        // SAFETY: leaked allocation lives for the test process lifetime.
        unsafe { Region::from_raw_parts(base, len) }
    }

    struct EmptyDirectory;

    impl ResourceDirectory for EmptyDirectory {
        fn for_each_resource(&mut self, _visit: &mut dyn FnMut(ResourceBinding)) {}
    }

    #[test]
    fn init_wires_window_and_pool() {
        let window_len = 4 + 2 * core::mem::size_of::<SystickSlot>();
        let record_len = 8 * core::mem::size_of::<PerfRecord>();
        let telemetry = Telemetry::init(region(window_len), region(record_len), 2).unwrap();

        assert_eq!(telemetry.window().core_count(), 2);
        assert_eq!(telemetry.monitor().capacity(), 8);
        assert_eq!(telemetry.max_report_entries(), 10);
    }

    #[test]
    fn end_to_end_tick_allocate_report() {
        let window_len = 4 + core::mem::size_of::<SystickSlot>();
        let record_len = 4 * core::mem::size_of::<PerfRecord>();
        let telemetry = Telemetry::init(region(window_len), region(record_len), 1).unwrap();

        let mut tracker = telemetry.tracker_for_core(0).unwrap();
        for tick in 0..48u32 {
            let begin = tick * 200;
            tracker.tick(begin, begin + 90);
        }

        let slot = telemetry.monitor().allocate_record(0x51, PowerMode::D0).unwrap();
        telemetry.monitor().enable(&mut EmptyDirectory).unwrap();

        let mut out = [PerfReportEntry::zeroed(); 5];
        let count = telemetry.basic_report(&mut out).unwrap();
        assert_eq!(count, 2);
        assert_eq!(out[0].avg_kcps, 200);
        assert_eq!(out[1].resource_id, 0x51);

        telemetry.reset().unwrap();
        assert_eq!(telemetry.basic_report(&mut out).unwrap(), 2);
        assert_eq!(out[0].peak_kcps, 0);

        telemetry.monitor().release_record(slot).unwrap();
        telemetry.monitor().disable();
        assert_eq!(telemetry.basic_report(&mut out).unwrap(), 1);
    }
}
