//! Memory locking operations to keep mapped pages resident.

use log::trace;

use crate::errors::Result;
use crate::mmap::Mapping;
use crate::platform::Platform;

impl<P: Platform> Mapping<P> {
    /// Lock the mapped pages into physical memory.
    ///
    /// Covers the whole page-aligned region behind the mapping. Locked pages
    /// count against per-process limits; see [`Mapping::ensure_quota`].
    ///
    /// # Platform-specific behavior
    ///
    /// - **Unix**: Uses `mlock`
    /// - **Windows**: Uses `VirtualLock`
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::Os` if the OS refuses, typically for lack of privileges or quota.
    pub fn lock(&self) -> Result<()> {
        let region = self.live_region()?;
        trace!("locking {} bytes", region.len());
        self.platform().pin(region)
    }

    /// Unlock previously locked pages.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::Os` if the unlock operation fails.
    pub fn unlock(&self) -> Result<()> {
        let region = self.live_region()?;
        trace!("unlocking {} bytes", region.len());
        self.platform().unpin(region)
    }

    /// Grow the process quota for locked memory by the size of this mapping.
    ///
    /// Opt-in step for processes whose limits are too small for [`Mapping::lock`].
    ///
    /// # Platform-specific behavior
    ///
    /// - **Unix**: Raises the `RLIMIT_MEMLOCK` soft limit, up to the hard limit
    /// - **Windows**: Grows the minimum and maximum working set size
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::Os` if the quota cannot be read or changed.
    pub fn ensure_quota(&self) -> Result<()> {
        let region = self.live_region()?;
        trace!("raising lock quota by {} bytes", region.len());
        self.platform().raise_quota(region)
    }
}
