//! # Aria Shared-Memory Primitives
//!
//! Primitives for the fixed-layout memory windows the Aria DSP shares
//! with the host: a raw [`Region`] over an externally mapped window and
//! a typed, fixed-capacity [`Arena`] of records inside it.
//!
//! ## Components
//!
//! - **Region**: bounds-checked volatile access to a raw memory window
//! - **Arena**: indexed record store (`base + index * stride`)
//!
//! ## Consistency Contract
//!
//! The host reads these windows without any synchronization with the
//! device. Every access here is a bounded volatile copy; a concurrent
//! reader may observe a record mid-update (torn across fields) but never
//! an out-of-range access. Writers keep single-writer ownership of their
//! records at a higher layer.

#![cfg_attr(not(test), no_std)]

pub mod arena;
pub mod region;

pub use arena::Arena;
pub use region::Region;

use core::fmt;

/// Result type for shared-memory operations
pub type ShmemResult<T> = Result<T, ShmemError>;

/// Shared-memory access errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmemError {
    /// Offset or index past the end of the region
    OutOfBounds,
    /// Address is not aligned for the requested type
    Misaligned,
    /// Region too small to hold the requested layout
    TooSmall,
}

impl fmt::Display for ShmemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "offset or index out of region bounds"),
            Self::Misaligned => write!(f, "address misaligned for requested type"),
            Self::TooSmall => write!(f, "region too small for requested layout"),
        }
    }
}
