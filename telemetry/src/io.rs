//! # I/O Performance Counters
//!
//! Per-interface transfer counters: a distinct slot pool over its own
//! shared region, reusing the bitmap allocator of the component records.
//! Each record packs the interface identity into one descriptor word and
//! accumulates a single 64-bit byte/event counter.

use core::sync::atomic::{AtomicU32, Ordering};

use aria_shmem::Arena;
use heapless::Vec;
use static_assertions::const_assert_eq;

use crate::monitor::MeasurementState;
use crate::pool::{SlotIndex, SlotPool, MAX_SLOTS};
use crate::record::PowerMode;
use crate::{TelemetryError, TelemetryResult};

// ============================================================================
// INTERFACE IDENTITY
// ============================================================================

/// Counted I/O interfaces. The id values are part of the host contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoInterface {
    /// Host IPC messages (count)
    Ipc          = 0,
    /// Inter-core IDC messages (count)
    Idc          = 1,
    /// DMIC bytes
    Dmic         = 2,
    /// I2S bytes
    I2s          = 3,
    /// SoundWire bytes
    SoundWire    = 4,
    /// HD/A bytes
    Hda          = 5,
    /// USB bytes
    Usb          = 6,
    /// GPIO triggers (count)
    Gpio         = 7,
    /// I2C bytes
    I2c          = 8,
    /// I3C bytes
    I3c          = 9,
    /// I3C interrupts (count)
    I3cInterrupt = 10,
    /// UART bytes
    Uart         = 11,
    /// SPI bytes
    Spi          = 12,
    /// CSI-2 bytes
    Csi2         = 13,
    /// DTF bytes
    Dtf          = 14,
    /// Unassigned slot
    Invalid      = 0xFF,
}

/// I/O direction, seen from the DSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IoDirection {
    /// Into the DSP
    Input  = 0,
    /// Out of the DSP
    Output = 1,
}

// ============================================================================
// DESCRIPTOR WORD
// ============================================================================

/// Packed descriptor word of an I/O counter record.
///
/// Bit layout (host contract): id `[7:0]`, instance `[15:8]`,
/// direction `[16]`, powered state `[17]`, power mode `[19:18]`,
/// removed `[31]`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRecordDesc(u32);

impl IoRecordDesc {
    const INSTANCE_SHIFT: u32 = 8;
    const DIRECTION_BIT: u32 = 1 << 16;
    const POWERED_BIT: u32 = 1 << 17;
    const POWER_MODE_SHIFT: u32 = 18;
    const POWER_MODE_MASK: u32 = 0b11 << Self::POWER_MODE_SHIFT;
    const REMOVED_BIT: u32 = 1 << 31;

    /// Descriptor for one interface instance
    pub const fn new(interface: IoInterface, instance: u8, direction: IoDirection) -> Self {
        let mut raw = interface as u32;
        raw |= (instance as u32) << Self::INSTANCE_SHIFT;
        if matches!(direction, IoDirection::Output) {
            raw |= Self::DIRECTION_BIT;
        }
        Self(raw)
    }

    /// Interface id bits
    pub const fn interface_id(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Instance bits
    pub const fn instance(&self) -> u8 {
        ((self.0 >> Self::INSTANCE_SHIFT) & 0xFF) as u8
    }

    /// Whether the interface is powered up
    pub const fn is_powered(&self) -> bool {
        self.0 & Self::POWERED_BIT != 0
    }

    /// Whether the record is marked removed
    pub const fn is_removed(&self) -> bool {
        self.0 & Self::REMOVED_BIT != 0
    }

    fn set_powered(&mut self, powered: bool) {
        if powered {
            self.0 |= Self::POWERED_BIT;
        } else {
            self.0 &= !Self::POWERED_BIT;
        }
    }

    fn set_power_mode(&mut self, mode: PowerMode) {
        self.0 = (self.0 & !Self::POWER_MODE_MASK) | ((mode as u32) << Self::POWER_MODE_SHIFT);
    }

    fn set_removed(&mut self) {
        self.0 |= Self::REMOVED_BIT;
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// One I/O counter record in the shared region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoPerfRecord {
    /// Packed identity and state bits
    pub desc: IoRecordDesc,
    _rsvd: u32,
    /// Accumulated bytes or events, unit per [`IoInterface`]
    pub data: u64,
}

const_assert_eq!(core::mem::size_of::<IoPerfRecord>(), 16);

impl IoPerfRecord {
    /// Unassigned record
    pub const fn empty() -> Self {
        Self {
            desc: IoRecordDesc::new(IoInterface::Invalid, 0, IoDirection::Input),
            _rsvd: 0,
            data: 0,
        }
    }
}

// ============================================================================
// MONITOR
// ============================================================================

/// I/O counter pool with its own measurement state machine.
///
/// Release semantics mirror the component records: slots of removed
/// interfaces are reclaimed immediately while disabled, otherwise on the
/// next disable transition.
#[derive(Debug)]
pub struct IoPerfMonitor {
    pool: SlotPool<IoPerfRecord>,
    state: AtomicU32,
}

impl IoPerfMonitor {
    /// Monitor over the shared I/O counter region.
    pub fn new(records: Arena<IoPerfRecord>) -> Self {
        Self {
            pool: SlotPool::new(records),
            state: AtomicU32::new(MeasurementState::Disabled as u32),
        }
    }

    /// Current measurement state
    pub fn state(&self) -> MeasurementState {
        self.state.load(Ordering::Relaxed).into()
    }

    /// Apply the host set-state command. Disabling reclaims removed
    /// slots.
    pub fn set_state(&self, target: MeasurementState) -> TelemetryResult<()> {
        match target {
            MeasurementState::Enabled => {
                if self.state() != MeasurementState::Disabled {
                    return Err(TelemetryError::InvalidState);
                }
                self.state.store(target as u32, Ordering::Relaxed);
            },
            MeasurementState::Disabled => {
                self.reclaim_removed();
                self.state.store(target as u32, Ordering::Relaxed);
            },
        }
        Ok(())
    }

    /// Claim a slot for an interface instance.
    pub fn open_slot(&self, desc: IoRecordDesc) -> TelemetryResult<SlotIndex> {
        let slot = self.pool.allocate().inspect_err(|_| {
            log::warn!("io counter pool exhausted, interface {} uncounted", desc.interface_id());
        })?;
        self.pool.update_record(slot, |record| {
            *record = IoPerfRecord::empty();
            record.desc = desc;
        })?;
        Ok(slot)
    }

    /// Mark an interface's record removed, reclaiming the slot now when
    /// measurements are disabled.
    pub fn release_slot(&self, slot: SlotIndex) -> TelemetryResult<()> {
        if !self.pool.is_occupied(slot) {
            return Err(TelemetryError::InvalidSlot);
        }
        self.pool.update_record(slot, |record| record.desc.set_removed())?;
        if self.state() == MeasurementState::Disabled {
            self.pool.free(slot)?;
        }
        Ok(())
    }

    /// Accumulate transferred bytes or events.
    pub fn update_counter(&self, slot: SlotIndex, increment: u32) -> TelemetryResult<()> {
        if self.state() != MeasurementState::Enabled {
            return Ok(());
        }
        self.pool
            .update_record(slot, |record| record.data = record.data.wrapping_add(u64::from(increment)))
    }

    /// Record a power up/down transition of the interface.
    pub fn update_io_state(&self, slot: SlotIndex, powered: bool) -> TelemetryResult<()> {
        self.pool.update_record(slot, |record| record.desc.set_powered(powered))
    }

    /// Record a power-mode change of the interface.
    pub fn update_power_mode(&self, slot: SlotIndex, mode: PowerMode) -> TelemetryResult<()> {
        self.pool.update_record(slot, |record| record.desc.set_power_mode(mode))
    }

    /// Copy every occupied record into `out`, ascending slot order.
    /// Returns the number of entries.
    pub fn report(&self, out: &mut [IoPerfRecord]) -> TelemetryResult<usize> {
        if out.len() < self.pool.capacity() {
            return Err(TelemetryError::InvalidArgument);
        }
        let mut filled = 0;
        for index in self.pool.occupied_slots().iter() {
            let Some(record) = self.pool.record(SlotIndex(index)) else {
                continue;
            };
            out[filled] = record;
            filled += 1;
        }
        Ok(filled)
    }

    fn reclaim_removed(&self) {
        let mut pending: Vec<SlotIndex, MAX_SLOTS> = Vec::new();
        for index in self.pool.occupied_slots().iter() {
            let slot = SlotIndex(index);
            if self.pool.record(slot).is_some_and(|record| record.desc.is_removed()) {
                let _ = pending.push(slot);
            }
        }
        for slot in &pending {
            let _ = self.pool.free(*slot);
        }
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

    fn monitor(slots: usize) -> IoPerfMonitor {
        let len = slots * core::mem::size_of::<IoPerfRecord>();
        let words = Box::leak(vec![0u64; len.div_ceil(8)].into_boxed_slice());
        let base = NonNull::new(words.as_mut_ptr().cast::<u8>()).unwrap();
        // SAFETY: leaked allocation lives for the test process lifetime.
        let region = unsafe { Region::from_raw_parts(base, len) };
        IoPerfMonitor::new(Arena::at(region, 0).unwrap())
    }

    #[test]
    fn descriptor_bit_layout() {
        let mut desc = IoRecordDesc::new(IoInterface::I2s, 2, IoDirection::Output);
        assert_eq!(desc.interface_id(), 3);
        assert_eq!(desc.instance(), 2);
        assert!(!desc.is_powered());
        assert!(!desc.is_removed());

        desc.set_powered(true);
        desc.set_power_mode(PowerMode::D0ix);
        desc.set_removed();
        assert!(desc.is_powered());
        assert!(desc.is_removed());
        assert_eq!(desc.interface_id(), 3);
    }

    #[test]
    fn counter_accumulates_only_while_enabled() {
        let m = monitor(4);
        let slot = m.open_slot(IoRecordDesc::new(IoInterface::Dmic, 0, IoDirection::Input)).unwrap();

        m.update_counter(slot, 100).unwrap();
        assert_eq!(m.pool.record(slot).unwrap().data, 0);

        m.set_state(MeasurementState::Enabled).unwrap();
        m.update_counter(slot, 100).unwrap();
        m.update_counter(slot, 28).unwrap();
        assert_eq!(m.pool.record(slot).unwrap().data, 128);
    }

    #[test]
    fn release_defers_until_disable_like_component_pool() {
        let m = monitor(4);
        m.set_state(MeasurementState::Enabled).unwrap();
        let slot = m.open_slot(IoRecordDesc::new(IoInterface::Uart, 1, IoDirection::Output)).unwrap();

        m.release_slot(slot).unwrap();
        assert_eq!(m.pool.occupied_count(), 1);

        m.set_state(MeasurementState::Disabled).unwrap();
        assert_eq!(m.pool.occupied_count(), 0);
    }

    #[test]
    fn report_copies_occupied_records() {
        let m = monitor(4);
        m.set_state(MeasurementState::Enabled).unwrap();
        let a = m.open_slot(IoRecordDesc::new(IoInterface::Ipc, 0, IoDirection::Input)).unwrap();
        let _b = m.open_slot(IoRecordDesc::new(IoInterface::Spi, 0, IoDirection::Output)).unwrap();
        m.update_counter(a, 7).unwrap();

        let mut out = [IoPerfRecord::empty(); 4];
        let count = m.report(&mut out).unwrap();
        assert_eq!(count, 2);
        assert_eq!(out[0].desc.interface_id(), IoInterface::Ipc as u8);
        assert_eq!(out[0].data, 7);
        assert_eq!(out[1].desc.interface_id(), IoInterface::Spi as u8);

        let mut short = [IoPerfRecord::empty(); 2];
        assert_eq!(m.report(&mut short).unwrap_err(), TelemetryError::InvalidArgument);
    }

    #[test]
    fn enable_twice_is_invalid_state() {
        let m = monitor(2);
        m.set_state(MeasurementState::Enabled).unwrap();
        assert_eq!(m.set_state(MeasurementState::Enabled).unwrap_err(), TelemetryError::InvalidState);
    }
}
