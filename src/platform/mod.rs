//! Platform capability layer.
//!
//! A [`Platform`] turns the OS mapping primitives into a uniform set of
//! operations that all report [`MmapError::Os`](crate::MmapError::Os) on
//! failure, whatever the native error convention. No semantic validation
//! happens here; [`Mapping`](crate::Mapping) does that before calling in.

use std::fmt;
use std::ptr::NonNull;

use crate::errors::Result;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use self::unix::UnixPlatform;

        /// Platform implementation selected for the build target.
        pub type SystemPlatform = UnixPlatform;

        /// Native handle a mapping is created from.
        pub type RawSource = std::os::unix::io::RawFd;

        /// Anything that can lend a native handle for the duration of `open`.
        pub trait AsRawSource {
            /// Borrow the native handle.
            fn as_raw_source(&self) -> RawSource;
        }

        impl<T: std::os::unix::io::AsFd + ?Sized> AsRawSource for T {
            fn as_raw_source(&self) -> RawSource {
                use std::os::unix::io::AsRawFd;
                self.as_fd().as_raw_fd()
            }
        }
    } else if #[cfg(windows)] {
        mod windows;
        pub use self::windows::{WindowsAux, WindowsPlatform};

        /// Platform implementation selected for the build target.
        pub type SystemPlatform = WindowsPlatform;

        /// Native handle a mapping is created from.
        pub type RawSource = std::os::windows::io::RawHandle;

        /// Anything that can lend a native handle for the duration of `open`.
        pub trait AsRawSource {
            /// Borrow the native handle.
            fn as_raw_source(&self) -> RawSource;
        }

        impl<T: std::os::windows::io::AsHandle + ?Sized> AsRawSource for T {
            fn as_raw_source(&self) -> RawSource {
                use std::os::windows::io::AsRawHandle;
                self.as_handle().as_raw_handle()
            }
        }
    } else {
        compile_error!("mmap-region supports Unix and Windows targets only");
    }
}

/// Memory protection requested for a mapping. Read access is always granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Protection {
    /// Pages are writable.
    pub write: bool,
    /// Pages are executable.
    pub execute: bool,
}

/// Whether writes propagate to the backing store and other mappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sharing {
    /// Writes are shared with other mappers and reach the backing store.
    #[default]
    Shared,
    /// Copy-on-write: writes stay private to this mapping.
    Private,
}

/// An OS mapping as returned by [`Platform::establish`].
///
/// Covers `[base, base + len)` starting on a granularity boundary, plus
/// whatever auxiliary handles the platform needs to tear it down.
pub struct RawRegion<A> {
    base: NonNull<u8>,
    len: usize,
    aux: A,
    mapped: bool,
}

impl<A> RawRegion<A> {
    /// Wrap a freshly established OS mapping.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of `len` bytes (and for writes when the
    /// mapping was established writable) until [`RawRegion::mark_unmapped`]
    /// is called by the platform that created it.
    pub unsafe fn new(base: NonNull<u8>, len: usize, aux: A) -> Self {
        Self {
            base,
            len,
            aux,
            mapped: true,
        }
    }

    /// Aligned base address.
    #[must_use]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Aligned length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Auxiliary handles.
    #[must_use]
    pub fn aux(&self) -> &A {
        &self.aux
    }

    /// Auxiliary handles, for platforms that release them step by step.
    pub fn aux_mut(&mut self) -> &mut A {
        &mut self.aux
    }

    /// Whether the address range is still mapped.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Record that the address range has been unmapped. Irreversible.
    pub fn mark_unmapped(&mut self) {
        self.mapped = false;
    }
}

impl<A: fmt::Debug> fmt::Debug for RawRegion<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRegion")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("aux", &self.aux)
            .field("mapped", &self.mapped)
            .finish()
    }
}

/// OS primitives needed to manage one mapping.
///
/// # Safety
///
/// Implementors must only hand out [`RawRegion`]s that uphold the contract of
/// [`RawRegion::new`], and `release` must call
/// [`RawRegion::mark_unmapped`] exactly when the address range stops being
/// accessible. A failed `release` leaves the remaining steps recorded in the
/// region so that calling it again completes the teardown.
pub unsafe trait Platform {
    /// Auxiliary handles acquired by `establish` (mapping objects, duplicated handles).
    type Aux;

    /// Boundary that mapping offsets must be aligned to.
    fn granularity(&self) -> usize;

    /// Length of the backing object when it is a sized file, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Os` if the handle cannot be queried.
    fn backing_len(&self, source: RawSource) -> Result<Option<u64>> {
        let _ = source;
        Ok(None)
    }

    /// Map `len` bytes of `source` starting at the aligned `offset`.
    ///
    /// # Errors
    ///
    /// Returns the first OS failure; partially acquired resources are released.
    fn establish(
        &self,
        source: RawSource,
        offset: u64,
        len: usize,
        protection: Protection,
        sharing: Sharing,
    ) -> Result<RawRegion<Self::Aux>>;

    /// Pin the whole region in physical memory.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Os` if the OS refuses.
    fn pin(&self, region: &RawRegion<Self::Aux>) -> Result<()>;

    /// Release a previous [`Platform::pin`].
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Os` if the OS refuses.
    fn unpin(&self, region: &RawRegion<Self::Aux>) -> Result<()>;

    /// Raise the process quota for pinned memory by the region's size.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Os` if the quota cannot be read or changed.
    fn raise_quota(&self, region: &RawRegion<Self::Aux>) -> Result<()>;

    /// Push dirty pages to the backing store.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Os` from the first failing flush step.
    fn flush(&self, region: &RawRegion<Self::Aux>) -> Result<()>;

    /// Unmap the region and release auxiliary handles in reverse order of acquisition.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Os` from the first failing step.
    fn release(&self, region: &mut RawRegion<Self::Aux>) -> Result<()>;
}
