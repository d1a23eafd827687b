//! # mmap-region: map an arbitrary byte range of a file handle
//!
//! This crate maps `size` bytes of a file handle starting at any byte offset,
//! hides the page alignment the OS requires, and hands out a bounds-checked
//! view of exactly the requested range.
//!
//! ## Features
//!
//! - **Any offset**: Unaligned offsets are split into a page-aligned base and an inner offset
//! - **Bounds-checked**: Every byte, range and bulk access is checked against the requested length
//! - **Permission modes**: Read-only, shared read-write and private copy-on-write, optionally executable
//! - **Residency and durability**: Lock/unlock pages in RAM and sync dirty pages to storage
//! - **Deterministic release**: `close` or drop releases the mapping exactly once
//! - **Cross-platform**: Unix via `mmap`, Windows via `CreateFileMapping`/`MapViewOfFile`
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::fs::OpenOptions;
//! use mmap_region::{Mapping, Options};
//!
//! let file = OpenOptions::new().read(true).write(true).open("data.bin")?;
//!
//! // Map 100 bytes starting at byte 1000
//! let mut mapping = Mapping::open(&file, 1000, 100, &Options::read_write())?;
//!
//! let written = mapping.write_at(b"Hello, mmap!", 0)?;
//! assert!(written.is_complete());
//!
//! // Sync and unmap
//! mapping.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - [`errors`]: Error types for all mapping operations
//! - [`utils`]: Page size and range helpers
//! - [`mmap`]: The `Mapping` type and its lifecycle
//! - [`platform`]: The OS capability layer behind a mapping

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(missing_docs)]

pub mod errors;
pub mod utils;
pub mod options;
pub mod platform;
pub mod mmap;
mod flush;
mod lock;
mod view;

pub use errors::MmapError;
pub use mmap::Mapping;
pub use options::{Mode, Options};
pub use platform::{AsRawSource, Platform, SystemPlatform};
pub use view::Transfer;
