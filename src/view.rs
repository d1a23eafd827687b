//! Bounds-checked byte span over the caller-visible part of a mapping.

use std::ptr::NonNull;
use std::slice;

use crate::errors::{MmapError, Result};
use crate::utils::check_range;

/// Outcome of a bulk copy between a buffer and a mapping.
///
/// A copy that runs past the end of the mapping transfers what fits and
/// reports `truncated`, like an end-of-data condition on a short read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    count: usize,
    truncated: bool,
}

impl Transfer {
    /// Bytes actually copied.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the end of the mapping cut the copy short.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Whether the whole buffer was transferred.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.truncated
    }
}

/// The `[0, len)` window of a mapping that callers may touch.
///
/// Built once from a verified pointer and length; every access goes through
/// the slice bounds checks below.
#[derive(Debug)]
pub(crate) struct View {
    ptr: NonNull<u8>,
    len: usize,
}

impl View {
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes for as long as the view
    /// exists, and for writes if `as_mut_slice` is ever called.
    pub(crate) unsafe fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: guaranteed by the contract of `View::new`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: guaranteed by the contract of `View::new`; `&mut self` is exclusive.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn get(&self, offset: usize) -> Result<u8> {
        self.as_slice()
            .get(offset)
            .copied()
            .ok_or(MmapError::InvalidOffset {
                offset: offset as u64,
            })
    }

    pub(crate) fn set(&mut self, offset: usize, value: u8) -> Result<()> {
        let byte = self
            .as_mut_slice()
            .get_mut(offset)
            .ok_or(MmapError::InvalidOffset {
                offset: offset as u64,
            })?;
        *byte = value;
        Ok(())
    }

    pub(crate) fn range(&self, low: usize, high: usize) -> Result<&[u8]> {
        check_range(low, high, self.len)?;
        Ok(&self.as_slice()[low..high])
    }

    pub(crate) fn range_mut(&mut self, low: usize, high: usize) -> Result<&mut [u8]> {
        check_range(low, high, self.len)?;
        Ok(&mut self.as_mut_slice()[low..high])
    }

    fn tail(&self, offset: usize) -> Result<usize> {
        if offset >= self.len {
            return Err(MmapError::InvalidOffset {
                offset: offset as u64,
            });
        }
        Ok(self.len - offset)
    }

    pub(crate) fn copy_out(&self, buf: &mut [u8], offset: usize) -> Result<Transfer> {
        let count = buf.len().min(self.tail(offset)?);
        buf[..count].copy_from_slice(&self.as_slice()[offset..offset + count]);
        Ok(Transfer {
            count,
            truncated: count < buf.len(),
        })
    }

    pub(crate) fn copy_in(&mut self, buf: &[u8], offset: usize) -> Result<Transfer> {
        let count = buf.len().min(self.tail(offset)?);
        self.as_mut_slice()[offset..offset + count].copy_from_slice(&buf[..count]);
        Ok(Transfer {
            count,
            truncated: count < buf.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_over(bytes: &mut [u8]) -> View {
        let ptr = NonNull::new(bytes.as_mut_ptr()).expect("non-null");
        // SAFETY: the tests keep `bytes` alive and untouched while the view is used.
        unsafe { View::new(ptr, bytes.len()) }
    }

    #[test]
    fn byte_access_is_bounds_checked() {
        let mut backing = [0u8, 1, 2, 3];
        let mut view = view_over(&mut backing);
        assert_eq!(view.get(3).expect("last"), 3);
        assert!(matches!(view.get(4), Err(MmapError::InvalidOffset { offset: 4 })));
        view.set(0, 0xAA).expect("set");
        assert_eq!(view.get(0).expect("first"), 0xAA);
        assert!(matches!(
            view.set(4, 1),
            Err(MmapError::InvalidOffset { offset: 4 })
        ));
    }

    #[test]
    fn copies_truncate_at_end() {
        let mut backing = [0u8; 8];
        let mut view = view_over(&mut backing);

        let t = view.copy_in(b"abcdef", 4).expect("copy in");
        assert_eq!(t.count(), 4);
        assert!(t.is_truncated());

        let mut out = [0u8; 2];
        let t = view.copy_out(&mut out, 4).expect("copy out");
        assert_eq!((t.count(), t.is_complete()), (2, true));
        assert_eq!(&out, b"ab");

        let mut long = [0u8; 16];
        let t = view.copy_out(&mut long, 6).expect("copy out long");
        assert_eq!(t.count(), 2);
        assert!(t.is_truncated());
        assert_eq!(&long[..2], b"cd");

        assert!(matches!(
            view.copy_out(&mut out, 8),
            Err(MmapError::InvalidOffset { offset: 8 })
        ));
    }

    #[test]
    fn empty_buffer_is_a_complete_transfer() {
        let mut backing = [0u8; 4];
        let view = view_over(&mut backing);
        let t = view.copy_out(&mut [], 1).expect("empty");
        assert_eq!(t.count(), 0);
        assert!(t.is_complete());
    }

    #[test]
    fn sub_ranges() {
        let mut backing = *b"0123456789";
        let mut view = view_over(&mut backing);
        assert_eq!(view.range(2, 5).expect("range"), b"234");
        assert_eq!(view.range(0, 10).expect("whole"), b"0123456789");
        view.range_mut(8, 10).expect("range mut").copy_from_slice(b"XY");
        assert_eq!(view.as_slice(), b"01234567XY");
        assert!(view.range(3, 3).is_err());
        assert!(view.range(0, 11).is_err());
    }
}
