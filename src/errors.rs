//! Crate-specific error types for mmap-region.

use std::io;
use thiserror::Error;

/// Result alias for mmap-region operations.
pub type Result<T> = std::result::Result<T, MmapError>;

/// Error type covering lifecycle, validation, permission and OS failures.
#[derive(Debug, Error)]
pub enum MmapError {
    /// The mapping has already been released.
    #[error("mapping closed")]
    Closed,

    /// A raw mode value outside the defined set.
    #[error("invalid mode {mode:#x}")]
    InvalidMode {
        /// Rejected raw mode value.
        mode: u32,
    },

    /// An offset outside the valid range for the operation.
    #[error("invalid offset {offset:#x}")]
    InvalidOffset {
        /// Rejected offset.
        offset: u64,
    },

    /// A range request with `low >= high`.
    #[error("invalid offset range {low:#x}..{high:#x}")]
    InvalidOffsetRange {
        /// Requested lower bound.
        low: usize,
        /// Requested upper bound (exclusive).
        high: usize,
    },

    /// A size the platform cannot map.
    #[error("invalid size {size}")]
    InvalidSize {
        /// Rejected size.
        size: u64,
    },

    /// Write or sync attempted on a mapping without write permission.
    #[error("{0} is not allowed")]
    NotAllowed(&'static str),

    /// Failure reported by the operating system, passed through unchanged.
    #[error("{operation}: {source}")]
    Os {
        /// Name of the OS primitive that failed.
        operation: &'static str,
        /// The error as reported by the OS.
        #[source]
        source: io::Error,
    },
}

impl MmapError {
    /// Capture the calling thread's last OS error for `operation`.
    pub(crate) fn last_os_error(operation: &'static str) -> Self {
        Self::Os {
            operation,
            source: io::Error::last_os_error(),
        }
    }

    /// The underlying OS error, if this is a pass-through platform failure.
    #[must_use]
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            Self::Os { source, .. } => Some(source),
            _ => None,
        }
    }
}
