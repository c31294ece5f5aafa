//! # Per-Core Cycle Tracking
//!
//! Execution-time accounting for the periodic tick loop, published into
//! the host-visible telemetry window.
//!
//! ## Ownership
//!
//! Each core owns one [`CoreCycleTracker`] and is the only writer of its
//! window slot; the tick path therefore takes `&mut self` and no lock.
//! Cross-core readers (the report builder, the host monitor) take
//! unsynchronized snapshots and tolerate a read torn by one in-flight
//! tick.

use aria_shmem::{Arena, Region};
use static_assertions::const_assert_eq;

#[cfg(feature = "systick-measurements")]
use crate::queue::AvgQueue;
use crate::{TelemetryError, TelemetryResult};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum number of DSP cores the telemetry window describes.
pub const MAX_CORE_COUNT: usize = 8;

/// Marker word written before the per-core slot array, recognized by the
/// host-side monitor.
pub const WINDOW_SEPARATOR: u32 = 0x0000_C0DE;

/// Ring depth of the rolling-average queue.
pub const AVG_MEAS_DEPTH: usize = 64;

/// Number of ticks batched into one average-queue sample.
pub const AVG_MEAS_PERIOD: u32 = 16;

/// Tick mask clearing the short peak-decay window (every 4096 ticks).
#[cfg(feature = "systick-measurements")]
const PEAK_DECAY_4K_MASK: u32 = 0x0FFF;

/// Tick mask clearing the long peak-decay window (every 8192 ticks).
#[cfg(feature = "systick-measurements")]
const PEAK_DECAY_8K_MASK: u32 = 0x1FFF;

// ============================================================================
// WINDOW LAYOUT
// ============================================================================

/// Host-visible execution-time statistics for one core.
///
/// The layout is byte-stable across firmware versions: new fields go
/// into the reserved tail, existing fields are never reordered.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SystickSlot {
    /// Ticks accounted on this core
    pub tick_count: u32,
    /// Duration of the last tick in cycles
    pub last_elapsed: u32,
    /// Longest tick observed in cycles
    pub max_elapsed: u32,
    /// Cycle counter value at the end of the last tick
    pub last_timestamp: u32,
    /// Rolling average of the tick period
    pub avg_utilization: u32,
    /// All-time peak of the tick period
    pub peak_utilization: u32,
    /// Peak of the tick period, cleared every 4096 ticks
    pub peak_utilization_4k: u32,
    /// Peak of the tick period, cleared every 8192 ticks
    pub peak_utilization_8k: u32,
    rsvd: [u32; 2],
}

const_assert_eq!(core::mem::size_of::<SystickSlot>(), 40);

impl SystickSlot {
    /// All-zero slot
    pub const fn zeroed() -> Self {
        Self {
            tick_count: 0,
            last_elapsed: 0,
            max_elapsed: 0,
            last_timestamp: 0,
            avg_utilization: 0,
            peak_utilization: 0,
            peak_utilization_4k: 0,
            peak_utilization_8k: 0,
            rsvd: [0; 2],
        }
    }
}

/// The telemetry window: separator marker followed by one
/// [`SystickSlot`] per core.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryWindow {
    region: Region,
    slots: Arena<SystickSlot>,
    core_count: usize,
}

impl TelemetryWindow {
    /// Byte offset of the per-core slot array, after the separator.
    const SLOTS_OFFSET: usize = core::mem::size_of::<u32>();

    /// Map a telemetry window over `region` for `core_count` cores.
    pub fn new(region: Region, core_count: usize) -> TelemetryResult<Self> {
        if core_count == 0 || core_count > MAX_CORE_COUNT {
            return Err(TelemetryError::InvalidArgument);
        }
        let slots = Arena::at(region, Self::SLOTS_OFFSET)?;
        if slots.capacity() < core_count {
            return Err(TelemetryError::InvalidArgument);
        }
        Ok(Self { region, slots, core_count })
    }

    /// One-time boot hook: write the separator marker and zero every
    /// per-core slot. Must complete before any tick or allocation call.
    pub fn initialize(&self) -> TelemetryResult<()> {
        self.region.write_u32(0, WINDOW_SEPARATOR)?;
        for core in 0..self.core_count {
            self.slots.write(core, SystickSlot::zeroed())?;
        }
        log::info!("telemetry window initialized for {} cores", self.core_count);
        Ok(())
    }

    /// Number of cores the window describes
    #[inline(always)]
    pub const fn core_count(&self) -> usize {
        self.core_count
    }

    /// Unsynchronized snapshot of one core's slot.
    ///
    /// May be torn by one in-flight tick on the owning core.
    pub fn core_stats(&self, core: usize) -> Option<SystickSlot> {
        if core >= self.core_count {
            return None;
        }
        self.slots.read(core).ok()
    }

    /// Zero the peak statistics of one core's slot, leaving the tick
    /// counter and averages untouched.
    pub(crate) fn reset_peaks(&self, core: usize) {
        // Index bounded by core_count; races with the owning core's tick
        // are tolerated like any other cross-core access.
        let _ = self.slots.update(core, |slot| {
            slot.max_elapsed = 0;
            slot.peak_utilization = 0;
            slot.peak_utilization_4k = 0;
            slot.peak_utilization_8k = 0;
        });
    }
}

// ============================================================================
// PER-CORE TRACKER
// ============================================================================

/// Per-core cycle accounting state.
///
/// Owned by the core it describes; the scheduler calls [`tick`] once per
/// pass with the begin/end cycle counter values. Timestamps are
/// free-running counters, so all timestamp arithmetic wraps.
///
/// [`tick`]: CoreCycleTracker::tick
#[derive(Debug)]
pub struct CoreCycleTracker {
    window: TelemetryWindow,
    core_id: usize,
    tick_count: u32,
    #[cfg(feature = "systick-measurements")]
    prev_begin: u32,
    #[cfg(feature = "systick-measurements")]
    period_sum: u64,
    #[cfg(feature = "systick-measurements")]
    period_count: u32,
    #[cfg(feature = "systick-measurements")]
    queue: AvgQueue<AVG_MEAS_DEPTH>,
}

impl CoreCycleTracker {
    /// Tracker for `core_id`, publishing into `window`.
    pub fn new(window: TelemetryWindow, core_id: usize) -> TelemetryResult<Self> {
        if core_id >= window.core_count() {
            return Err(TelemetryError::InvalidArgument);
        }
        Ok(Self {
            window,
            core_id,
            tick_count: 0,
            #[cfg(feature = "systick-measurements")]
            prev_begin: 0,
            #[cfg(feature = "systick-measurements")]
            period_sum: 0,
            #[cfg(feature = "systick-measurements")]
            period_count: 0,
            #[cfg(feature = "systick-measurements")]
            queue: AvgQueue::new(),
        })
    }

    /// Core this tracker accounts for
    #[inline(always)]
    pub const fn core_id(&self) -> usize {
        self.core_id
    }

    /// Account one scheduler tick.
    ///
    /// `begin_timestamp` and `end_timestamp` are raw cycle counter
    /// values bracketing the tick body.
    pub fn tick(&mut self, begin_timestamp: u32, end_timestamp: u32) {
        self.tick_count = self.tick_count.wrapping_add(1);
        let tick_count = self.tick_count;
        let elapsed = end_timestamp.wrapping_sub(begin_timestamp);

        // Slot index was validated at construction.
        let _ = self.window.slots.update(self.core_id, |slot| {
            slot.tick_count = tick_count;
            slot.last_elapsed = elapsed;
            slot.max_elapsed = slot.max_elapsed.max(elapsed);
            slot.last_timestamp = end_timestamp;
        });

        #[cfg(feature = "systick-measurements")]
        self.account_period(begin_timestamp);
    }

    /// Period accounting: rolling average and peak-decay windows over
    /// the interval between tick starts (not the tick duration).
    #[cfg(feature = "systick-measurements")]
    fn account_period(&mut self, begin_timestamp: u32) {
        let measured = begin_timestamp.wrapping_sub(self.prev_begin);
        self.prev_begin = begin_timestamp;

        // The first two ticks have no valid previous begin timestamp.
        if self.tick_count <= 2 {
            return;
        }

        self.period_sum += u64::from(measured);
        self.period_count = (self.period_count + 1) % AVG_MEAS_PERIOD;
        let refreshed_avg = if self.period_count == 0 {
            // Append the average of the last AVG_MEAS_PERIOD periods,
            // then recompute the rolling average over all buckets.
            self.queue.append((self.period_sum / u64::from(AVG_MEAS_PERIOD)) as u32);
            self.period_sum = 0;
            Some(self.queue.average())
        } else {
            None
        };

        let tick_count = self.tick_count;
        let _ = self.window.slots.update(self.core_id, |slot| {
            if let Some(avg) = refreshed_avg {
                slot.avg_utilization = avg;
            }
            slot.peak_utilization = slot.peak_utilization.max(measured);
            slot.peak_utilization_4k = slot.peak_utilization_4k.max(measured);
            slot.peak_utilization_8k = slot.peak_utilization_8k.max(measured);
            if tick_count & PEAK_DECAY_4K_MASK == 0 {
                slot.peak_utilization_4k = 0;
            }
            if tick_count & PEAK_DECAY_8K_MASK == 0 {
                slot.peak_utilization_8k = 0;
            }
        });
    }
}

// ============================================================================
// TESTS
// ============================================================================
