//! Mapping lifecycle: open, bounds-checked access and release.

use std::fmt;

use log::{debug, warn};

use crate::errors::{MmapError, Result};
use crate::options::Options;
use crate::platform::{AsRawSource, Platform, RawRegion, SystemPlatform};
use crate::utils::split_offset;
use crate::view::{Transfer, View};

/// Largest mapping length any platform can address as a slice.
const MAX_LEN: usize = isize::MAX as usize;

/// A byte range of a file handle mapped into memory.
///
/// The OS only maps whole pages, so the mapping underneath may start before
/// the requested offset. Callers only ever see the requested `[0, len)` range.
///
/// Dropping an open mapping performs [`Mapping::close`] on a best-effort basis.
/// Call `close` explicitly to observe sync or release failures.
///
/// # Examples
///
/// ```no_run
/// use std::fs::OpenOptions;
/// use mmap_region::{Mapping, Options};
///
/// let file = OpenOptions::new().read(true).write(true).open("data.bin")?;
///
/// // Map 10 bytes starting at byte 5000
/// let mut mapping = Mapping::open(&file, 5000, 10, &Options::read_write())?;
/// mapping.write_byte_at(0, 0xFF)?;
/// assert_eq!(mapping.read_byte_at(0)?, 0xFF);
/// mapping.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Mapping<P: Platform = SystemPlatform> {
    platform: P,
    // Present until the platform has fully released it.
    region: Option<RawRegion<P::Aux>>,
    // Present while the pages are accessible.
    view: Option<View>,
    can_write: bool,
    can_execute: bool,
}

// SAFETY: the mapping exclusively owns its region; shared access only reads
// through the view and mutation requires `&mut self`.
unsafe impl<P> Send for Mapping<P>
where
    P: Platform + Send,
    P::Aux: Send,
{
}

// SAFETY: see above.
unsafe impl<P> Sync for Mapping<P>
where
    P: Platform + Sync,
    P::Aux: Sync,
{
}

impl<P: Platform> fmt::Debug for Mapping<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("len", &self.view.as_ref().map(View::len))
            .field("can_write", &self.can_write)
            .field("can_execute", &self.can_execute)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Mapping {
    /// Map `size` bytes of `source` starting at byte `offset`.
    ///
    /// The caller keeps ownership of `source`; closing the mapping does not
    /// close it.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::InvalidOffset` if `offset` is beyond what the OS can
    /// address, or at or past the end of a regular file.
    /// Returns `MmapError::InvalidSize` if `size` is zero, too large, or runs past
    /// the end of a regular file.
    /// Returns `MmapError::Os` if the OS refuses the mapping.
    pub fn open<S>(source: &S, offset: u64, size: u64, options: &Options) -> Result<Self>
    where
        S: AsRawSource + ?Sized,
    {
        Self::open_with(SystemPlatform::default(), source, offset, size, options)
    }
}

impl<P: Platform> Mapping<P> {
    /// Like [`Mapping::open`], on an explicit platform implementation.
    ///
    /// # Errors
    ///
    /// See [`Mapping::open`].
    pub fn open_with<S>(
        platform: P,
        source: &S,
        offset: u64,
        size: u64,
        options: &Options,
    ) -> Result<Self>
    where
        S: AsRawSource + ?Sized,
    {
        if i64::try_from(offset).is_err() {
            return Err(MmapError::InvalidOffset { offset });
        }
        let requested = match usize::try_from(size) {
            Ok(n) if n > 0 && n <= MAX_LEN => n,
            _ => return Err(MmapError::InvalidSize { size }),
        };

        let protection = options.protection();
        let sharing = options.mode.sharing();

        let (aligned_offset, inner) = split_offset(offset, platform.granularity());
        let aligned_len = inner
            .checked_add(requested)
            .filter(|len| *len <= MAX_LEN)
            .ok_or(MmapError::InvalidSize { size })?;

        let source = source.as_raw_source();
        if let Some(backing) = platform.backing_len(source)? {
            if offset >= backing {
                return Err(MmapError::InvalidOffset { offset });
            }
            if offset.checked_add(size).map_or(true, |end| end > backing) {
                return Err(MmapError::InvalidSize { size });
            }
        }

        let region = platform.establish(source, aligned_offset, aligned_len, protection, sharing)?;

        // SAFETY: the region is valid for `aligned_len = inner + requested` bytes,
        // so the view stays inside it. It is writable only when `can_write`,
        // and every mutable access below checks that flag first.
        let view = unsafe {
            let start = region.base().as_ptr().add(inner);
            View::new(std::ptr::NonNull::new_unchecked(start), requested)
        };

        debug!(
            "mapped {requested} bytes at offset {offset} ({aligned_len} bytes from {aligned_offset}, {:?})",
            options.mode
        );

        Ok(Self {
            platform,
            region: Some(region),
            view: Some(view),
            can_write: protection.write,
            can_execute: protection.execute,
        })
    }

    pub(crate) fn view(&self) -> Result<&View> {
        self.view.as_ref().ok_or(MmapError::Closed)
    }

    fn writable_view(&mut self, operation: &'static str) -> Result<&mut View> {
        let view = self.view.as_mut().ok_or(MmapError::Closed)?;
        if !self.can_write {
            return Err(MmapError::NotAllowed(operation));
        }
        Ok(view)
    }

    /// The platform region behind an open mapping.
    pub(crate) fn live_region(&self) -> Result<&RawRegion<P::Aux>> {
        match (&self.view, &self.region) {
            (Some(_), Some(region)) => Ok(region),
            _ => Err(MmapError::Closed),
        }
    }

    pub(crate) fn platform(&self) -> &P {
        &self.platform
    }

    /// Whether the mapping has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.view.is_none()
    }

    /// Mapped length in bytes: exactly the size requested at open.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    pub fn len(&self) -> Result<usize> {
        Ok(self.view()?.len())
    }

    /// Whether the mapping is empty. Never true while open, since a zero
    /// size is rejected by [`Mapping::open`].
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.view()?.len() == 0)
    }

    /// Whether reading is allowed. Always true for an open mapping.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    pub fn can_read(&self) -> Result<bool> {
        self.view().map(|_| true)
    }

    /// Whether writing is allowed.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    pub fn can_write(&self) -> Result<bool> {
        self.view().map(|_| self.can_write)
    }

    /// Whether the pages are executable.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    pub fn can_execute(&self) -> Result<bool> {
        self.view().map(|_| self.can_execute)
    }

    /// Borrow the bytes in `[low, high)`.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::InvalidOffset` if `low >= len` or `high > len`.
    /// Returns `MmapError::InvalidOffsetRange` if `low >= high`.
    pub fn direct(&self, low: usize, high: usize) -> Result<&[u8]> {
        self.view()?.range(low, high)
    }

    /// Mutably borrow the bytes in `[low, high)`.
    ///
    /// # Errors
    ///
    /// As [`Mapping::direct`], plus `MmapError::NotAllowed` on a non-writable mapping.
    pub fn direct_mut(&mut self, low: usize, high: usize) -> Result<&mut [u8]> {
        self.writable_view("write")?.range_mut(low, high)
    }

    /// Read the byte at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::InvalidOffset` if `offset >= len`.
    pub fn read_byte_at(&self, offset: usize) -> Result<u8> {
        self.view()?.get(offset)
    }

    /// Write `value` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::NotAllowed` on a non-writable mapping.
    /// Returns `MmapError::InvalidOffset` if `offset >= len`.
    pub fn write_byte_at(&mut self, offset: usize, value: u8) -> Result<()> {
        self.writable_view("write")?.set(offset, value)
    }

    /// Copy bytes starting at `offset` into `buf`.
    ///
    /// Copies `min(buf.len(), len - offset)` bytes; the returned [`Transfer`]
    /// reports whether the end of the mapping truncated the copy.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::InvalidOffset` if `offset >= len`.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<Transfer> {
        self.view()?.copy_out(buf, offset)
    }

    /// Copy `buf` into the mapping starting at `offset`.
    ///
    /// Copies `min(buf.len(), len - offset)` bytes; the returned [`Transfer`]
    /// reports whether the end of the mapping truncated the copy.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::NotAllowed` on a non-writable mapping.
    /// Returns `MmapError::InvalidOffset` if `offset >= len`.
    pub fn write_at(&mut self, buf: &[u8], offset: usize) -> Result<Transfer> {
        self.writable_view("write")?.copy_in(buf, offset)
    }

    /// Flush pending writes and release the mapping.
    ///
    /// Writable mappings are synced first; if that fails nothing is released
    /// and the mapping stays open, so `close` can be retried. A release
    /// failure likewise leaves the remaining teardown to a later `close`.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` if already closed.
    /// Returns `MmapError::Os` if sync or release fails.
    pub fn close(&mut self) -> Result<()> {
        if self.region.is_none() {
            return Err(MmapError::Closed);
        }
        if self.view.is_some() && self.can_write {
            self.sync()?;
        }
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(region) = self.region.as_mut() else {
            return Err(MmapError::Closed);
        };
        match self.platform.release(region) {
            Ok(()) => {
                self.view = None;
                self.region = None;
                debug!("mapping released");
                Ok(())
            }
            Err(err) => {
                if !region.is_mapped() {
                    // Pages are gone; only auxiliary handles remain to release.
                    self.view = None;
                }
                Err(err)
            }
        }
    }
}

impl<P: Platform> Drop for Mapping<P> {
    fn drop(&mut self) {
        if self.region.is_none() {
            return;
        }
        if self.view.is_some() && self.can_write {
            if let Err(err) = self.sync() {
                warn!("sync before dropping mapping failed, unflushed writes are lost: {err}");
            }
        }
        if let Err(err) = self.release() {
            warn!("failed to release dropped mapping: {err}");
        }
    }
}
