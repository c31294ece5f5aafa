//! # Performance Monitor
//!
//! Record lifecycle and the global enable/disable/reset control state
//! machine.
//!
//! ## Deferred free
//!
//! Deleting a resource while measurements are enabled only marks its
//! record as removed, so a report generated mid-session still shows the
//! resource exactly once. The slot itself is reclaimed in a single
//! reconciliation pass on the next disable transition; when measurements
//! are already disabled the slot is freed immediately.

use core::sync::atomic::{AtomicU32, Ordering};

use aria_shmem::Arena;
use heapless::Vec;

use crate::pool::{SlotIndex, SlotPool, MAX_SLOTS};
use crate::record::{PerfRecord, PowerMode};
use crate::systick::TelemetryWindow;
use crate::{TelemetryError, TelemetryResult};

// ============================================================================
// MEASUREMENT STATE
// ============================================================================

/// Global measurement state, set by the host control path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MeasurementState {
    /// Not measuring; frees are immediate
    Disabled = 0,
    /// Measuring; frees are deferred to the next disable
    Enabled  = 1,
}

impl From<u32> for MeasurementState {
    fn from(value: u32) -> Self {
        match value {
            1 => MeasurementState::Enabled,
            _ => MeasurementState::Disabled,
        }
    }
}

// ============================================================================
// RESOURCE DIRECTORY
// ============================================================================

/// One resource's binding to its performance record slot.
#[derive(Debug, Clone, Copy)]
pub struct ResourceBinding {
    /// Slot holding the resource's record
    pub slot: SlotIndex,
    /// Id reported for the resource
    pub resource_id: u32,
    /// Power mode reported for the resource
    pub power_mode: PowerMode,
}

/// External enumeration of the resources that hold performance records.
///
/// Owned by the pipeline framework; the monitor only queries it during
/// the enable transition to give every record a fresh start.
pub trait ResourceDirectory {
    /// Visit every resource currently bound to a record slot.
    fn for_each_resource(&mut self, visit: &mut dyn FnMut(ResourceBinding));
}

// ============================================================================
// PERFORMANCE MONITOR
// ============================================================================

/// Record pool plus the measurement control state machine.
///
/// The state word has a single writer (the host control path); the
/// allocation and free paths read it with relaxed ordering and treat it
/// as eventually consistent.
#[derive(Debug)]
pub struct PerformanceMonitor {
    pool: SlotPool<PerfRecord>,
    state: AtomicU32,
}

impl PerformanceMonitor {
    /// Monitor over the shared performance-record region.
    pub fn new(records: Arena<PerfRecord>) -> Self {
        Self {
            pool: SlotPool::new(records),
            state: AtomicU32::new(MeasurementState::Disabled as u32),
        }
    }

    /// Current measurement state
    pub fn state(&self) -> MeasurementState {
        self.state.load(Ordering::Relaxed).into()
    }

    fn store_state(&self, state: MeasurementState) {
        self.state.store(state as u32, Ordering::Relaxed);
    }

    /// Number of live records
    pub fn occupied_count(&self) -> usize {
        self.pool.occupied_count()
    }

    /// Total record slots
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Hand out a record for a resource that starts measuring.
    ///
    /// `Exhausted` means measurement is unavailable for this resource;
    /// resource creation itself proceeds.
    pub fn allocate_record(
        &self,
        resource_id: u32,
        power_mode: PowerMode,
    ) -> TelemetryResult<SlotIndex> {
        let slot = self.pool.allocate().inspect_err(|_| {
            log::warn!("perf record pool exhausted, resource {resource_id:#x} unmeasured");
        })?;
        // Field initialization runs outside the pool lock.
        self.pool.update_record(slot, |record| record.init(resource_id, power_mode))?;
        log::debug!("perf record {} bound to resource {resource_id:#x}", slot.index());
        Ok(slot)
    }

    /// Logically delete a record.
    ///
    /// The slot returns to the pool immediately when measurements are
    /// disabled, otherwise at the next disable transition.
    pub fn release_record(&self, slot: SlotIndex) -> TelemetryResult<()> {
        if !self.pool.is_occupied(slot) {
            return Err(TelemetryError::InvalidSlot);
        }
        self.pool.update_record(slot, PerfRecord::mark_removed)?;
        if self.state() == MeasurementState::Disabled {
            self.pool.free(slot)?;
        }
        Ok(())
    }

    /// Start measuring: re-initialize every known resource's record
    /// from scratch, discarding prior statistics.
    ///
    /// `InvalidState` when measurements are already enabled.
    pub fn enable(&self, resources: &mut dyn ResourceDirectory) -> TelemetryResult<()> {
        if self.state() != MeasurementState::Disabled {
            return Err(TelemetryError::InvalidState);
        }
        resources.for_each_resource(&mut |binding| {
            let _ = self.pool.update_record(binding.slot, |record| {
                record.init(binding.resource_id, binding.power_mode);
            });
        });
        self.store_state(MeasurementState::Enabled);
        log::info!("performance measurements enabled");
        Ok(())
    }

    /// Stop measuring and reconcile deferred frees: every slot whose
    /// record is marked removed goes back to the pool now.
    pub fn disable(&self) {
        let mut pending: Vec<SlotIndex, MAX_SLOTS> = Vec::new();
        for index in self.pool.occupied_slots().iter() {
            let slot = SlotIndex(index);
            if self.pool.record(slot).is_some_and(|record| record.is_removed()) {
                // Capacity matches the bitmap, push cannot fail.
                let _ = pending.push(slot);
            }
        }
        for slot in &pending {
            let _ = self.pool.free(*slot);
        }
        self.store_state(MeasurementState::Disabled);
        log::info!(
            "performance measurements disabled, {} deferred slots reclaimed",
            pending.len()
        );
    }

    /// Zero all per-core peak statistics and every occupied record's
    /// accumulators, preserving occupancy and identity fields.
    ///
    /// `InvalidState` when measurements are disabled.
    pub fn reset(&self, window: &TelemetryWindow) -> TelemetryResult<()> {
        if self.state() == MeasurementState::Disabled {
            return Err(TelemetryError::InvalidState);
        }
        for core in 0..window.core_count() {
            window.reset_peaks(core);
        }
        for index in self.pool.occupied_slots().iter() {
            let _ = self.pool.update_record(SlotIndex(index), PerfRecord::reset);
        }
        Ok(())
    }

    /// Map the host set-state command onto the enable/disable
    /// transitions.
    pub fn set_state(
        &self,
        target: MeasurementState,
        resources: &mut dyn ResourceDirectory,
    ) -> TelemetryResult<()> {
        match target {
            MeasurementState::Enabled => self.enable(resources),
            MeasurementState::Disabled => {
                self.disable();
                Ok(())
            },
        }
    }

    pub(crate) fn pool(&self) -> &SlotPool<PerfRecord> {
        &self.pool
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aria_shmem::Region;
    use core::ptr::NonNull;

    fn monitor(slots: usize) -> PerformanceMonitor {
        let len = slots * core::mem::size_of::<PerfRecord>();
        let words = Box::leak(vec![0u64; len.div_ceil(8)].into_boxed_slice());
        let base = NonNull::new(words.as_mut_ptr().cast::<u8>()).unwrap();
        // SAFETY: leaked allocation lives for the test process lifetime.
        let region = unsafe { Region::from_raw_parts(base, len) };
        PerformanceMonitor::new(Arena::at(region, 0).unwrap())
    }

    struct StubDirectory(std::vec::Vec<ResourceBinding>);

    impl ResourceDirectory for StubDirectory {
        fn for_each_resource(&mut self, visit: &mut dyn FnMut(ResourceBinding)) {
            for binding in &self.0 {
                visit(*binding);
            }
        }
    }

    fn empty_directory() -> StubDirectory {
        StubDirectory(std::vec::Vec::new())
    }

    #[test]
    fn starts_disabled() {
        let m = monitor(4);
        assert_eq!(m.state(), MeasurementState::Disabled);
    }

    #[test]
    fn enable_twice_is_invalid_state() {
        let m = monitor(4);
        m.enable(&mut empty_directory()).unwrap();
        assert_eq!(m.state(), MeasurementState::Enabled);
        assert_eq!(
            m.enable(&mut empty_directory()).unwrap_err(),
            TelemetryError::InvalidState
        );
    }

    #[test]
    fn enable_reinitializes_known_records() {
        let m = monitor(4);
        let slot = m.allocate_record(7, PowerMode::D0ix).unwrap();
        m.pool().update_record(slot, |r| r.total_cycles_consumed = 1234).unwrap();

        let mut directory = StubDirectory(vec![ResourceBinding {
            slot,
            resource_id: 7,
            power_mode: PowerMode::D0ix,
        }]);
        m.enable(&mut directory).unwrap();

        let record = m.pool().record(slot).unwrap();
        assert_eq!(record.resource_id, 7);
        assert_eq!(record.power_mode(), PowerMode::D0ix);
        assert_eq!(record.total_cycles_consumed, 0);
    }

    #[test]
    fn release_while_disabled_frees_immediately() {
        let m = monitor(4);
        let slot = m.allocate_record(1, PowerMode::D0).unwrap();
        m.release_record(slot).unwrap();
        assert_eq!(m.occupied_count(), 0);
    }

    #[test]
    fn release_while_enabled_defers_free_until_disable() {
        let m = monitor(4);
        let slot = m.allocate_record(1, PowerMode::D0).unwrap();
        m.enable(&mut empty_directory()).unwrap();

        m.release_record(slot).unwrap();
        // Still occupied, marked removed.
        assert_eq!(m.occupied_count(), 1);
        assert!(m.pool().record(slot).unwrap().is_removed());

        m.disable();
        assert_eq!(m.occupied_count(), 0);
    }

    #[test]
    fn disable_keeps_live_records() {
        let m = monitor(4);
        let live = m.allocate_record(1, PowerMode::D0).unwrap();
        let doomed = m.allocate_record(2, PowerMode::D0).unwrap();
        m.enable(&mut empty_directory()).unwrap();
        m.release_record(doomed).unwrap();

        m.disable();
        assert_eq!(m.occupied_count(), 1);
        assert!(m.pool().is_occupied(live));
        assert!(!m.pool().is_occupied(doomed));
    }

    #[test]
    fn release_of_free_slot_is_invalid() {
        let m = monitor(4);
        let slot = m.allocate_record(1, PowerMode::D0).unwrap();
        m.release_record(slot).unwrap();
        assert_eq!(m.release_record(slot).unwrap_err(), TelemetryError::InvalidSlot);
    }

    #[test]
    fn reset_requires_enabled_state() {
        let m = monitor(4);
        let words = Box::leak(vec![0u64; 16].into_boxed_slice());
        let base = NonNull::new(words.as_mut_ptr().cast::<u8>()).unwrap();
        // SAFETY: leaked allocation lives for the test process lifetime.
        let region = unsafe { Region::from_raw_parts(base, 128) };
        let window = TelemetryWindow::new(region, 1).unwrap();
        window.initialize().unwrap();

        assert_eq!(m.reset(&window).unwrap_err(), TelemetryError::InvalidState);

        m.enable(&mut empty_directory()).unwrap();
        let slot = m.allocate_record(5, PowerMode::D0).unwrap();
        m.pool().update_record(slot, |r| r.avg_kcps = 77).unwrap();

        m.reset(&window).unwrap();
        let record = m.pool().record(slot).unwrap();
        assert_eq!(record.avg_kcps, 0);
        assert_eq!(record.resource_id, 5);
        assert_eq!(m.occupied_count(), 1);
    }

    #[test]
    fn set_state_maps_to_transitions() {
        let m = monitor(4);
        m.set_state(MeasurementState::Enabled, &mut empty_directory()).unwrap();
        assert_eq!(m.state(), MeasurementState::Enabled);
        assert_eq!(
            m.set_state(MeasurementState::Enabled, &mut empty_directory()).unwrap_err(),
            TelemetryError::InvalidState
        );
        m.set_state(MeasurementState::Disabled, &mut empty_directory()).unwrap();
        assert_eq!(m.state(), MeasurementState::Disabled);
    }

    #[test]
    fn concurrent_alloc_free_keeps_pool_consistent() {
        let m = monitor(32);
        std::thread::scope(|scope| {
            for worker in 0..4u32 {
                let m = &m;
                scope.spawn(move || {
                    for i in 0..200u32 {
                        if let Ok(slot) = m.allocate_record(worker * 1000 + i, PowerMode::D0) {
                            m.release_record(slot).unwrap();
                        }
                    }
                });
            }
        });
        assert_eq!(m.occupied_count(), 0);
        assert_eq!(m.occupied_count(), m.pool().occupied_slots().iter().count());
    }
}
