//! Error taxonomy for the telemetry subsystem.
//!
//! No condition here is fatal: callers surface `Exhausted` as
//! "measurement unavailable for this resource" and `InvalidState` as a
//! rejected control command.

use core::fmt;

use aria_shmem::ShmemError;

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Telemetry error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    /// Output buffer too small, or a region/core argument out of range
    InvalidArgument,
    /// Slot pool has no free slot
    Exhausted,
    /// Slot is already free or out of range
    InvalidSlot,
    /// Control command rejected in the current measurement state
    InvalidState,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Exhausted => write!(f, "no free performance data slot"),
            Self::InvalidSlot => write!(f, "slot already free or out of range"),
            Self::InvalidState => write!(f, "rejected in current measurement state"),
        }
    }
}

impl From<ShmemError> for TelemetryError {
    fn from(_: ShmemError) -> Self {
        Self::InvalidArgument
    }
}
