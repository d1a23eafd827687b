//! Utility helpers for page size, alignment and range validation.

use crate::errors::{MmapError, Result};

/// Get the system page size in bytes.
///
/// # Panics
///
/// Panics if the platform cannot report a page size. Nothing about a mapping
/// is well-defined without it, so this is not surfaced as an error.
#[must_use]
pub fn page_size() -> usize {
    #[cfg(target_os = "windows")]
    let size = windows_system_info().0;
    #[cfg(not(target_os = "windows"))]
    let size = unix_page_size();
    assert!(size > 0, "platform did not report a page size");
    size
}

/// Get the granularity at which mappings may start within a file.
///
/// Equal to [`page_size`] on Unix. Windows views must begin on the
/// allocation granularity (typically 64 KiB).
#[must_use]
pub fn allocation_granularity() -> usize {
    #[cfg(target_os = "windows")]
    let size = windows_system_info().1;
    #[cfg(not(target_os = "windows"))]
    let size = page_size();
    assert!(size > 0, "platform did not report an allocation granularity");
    size
}

#[cfg(target_os = "windows")]
fn windows_system_info() -> (usize, usize) {
    use std::mem::MaybeUninit;
    #[allow(non_snake_case)]
    #[repr(C)]
    struct SYSTEM_INFO {
        wProcessorArchitecture: u16,
        wReserved: u16,
        dwPageSize: u32,
        lpMinimumApplicationAddress: *mut core::ffi::c_void,
        lpMaximumApplicationAddress: *mut core::ffi::c_void,
        dwActiveProcessorMask: usize,
        dwNumberOfProcessors: u32,
        dwProcessorType: u32,
        dwAllocationGranularity: u32,
        wProcessorLevel: u16,
        wProcessorRevision: u16,
    }
    extern "system" {
        fn GetSystemInfo(lpSystemInfo: *mut SYSTEM_INFO);
    }
    let mut sysinfo = MaybeUninit::<SYSTEM_INFO>::uninit();
    // SAFETY: GetSystemInfo always fills the structure it is handed.
    unsafe {
        GetSystemInfo(sysinfo.as_mut_ptr());
        let s = sysinfo.assume_init();
        (s.dwPageSize as usize, s.dwAllocationGranularity as usize)
    }
}

#[cfg(not(target_os = "windows"))]
#[allow(clippy::cast_sign_loss)]
fn unix_page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE is safe to call.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return 0;
    }
    size as usize
}

/// Split a byte offset into the aligned base below it and the distance from
/// that base: `offset == aligned + inner` with `inner < granularity`.
#[must_use]
pub fn split_offset(offset: u64, granularity: usize) -> (u64, usize) {
    let inner = offset % granularity as u64;
    // inner < granularity, which came from a usize
    #[allow(clippy::cast_possible_truncation)]
    let inner_usize = inner as usize;
    (offset - inner, inner_usize)
}

/// Validate a `[low, high)` sub-range of a view of `len` bytes.
///
/// `low` must lie in `[0, len)`, `high` in `[0, len]`, and `low < high`.
///
/// # Errors
///
/// Returns `MmapError::InvalidOffset` for a bound outside the view and
/// `MmapError::InvalidOffsetRange` for an empty or inverted range.
pub fn check_range(low: usize, high: usize, len: usize) -> Result<()> {
    if low >= len {
        return Err(MmapError::InvalidOffset { offset: low as u64 });
    }
    if high > len {
        return Err(MmapError::InvalidOffset { offset: high as u64 });
    }
    if low >= high {
        return Err(MmapError::InvalidOffsetRange { low, high });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let ps = page_size();
        assert!(ps.is_power_of_two());
        assert_eq!(allocation_granularity() % ps, 0);
    }

    #[test]
    fn split_offset_decomposes() {
        assert_eq!(split_offset(0, 4096), (0, 0));
        assert_eq!(split_offset(4095, 4096), (0, 4095));
        assert_eq!(split_offset(4096, 4096), (4096, 0));
        assert_eq!(split_offset(10_000, 4096), (8192, 1808));
        assert_eq!(split_offset(70_000, 65_536), (65_536, 4464));
    }

    #[test]
    fn check_range_bounds() {
        assert!(check_range(0, 10, 10).is_ok());
        assert!(check_range(9, 10, 10).is_ok());
        assert!(matches!(
            check_range(10, 10, 10),
            Err(MmapError::InvalidOffset { offset: 10 })
        ));
        assert!(matches!(
            check_range(0, 11, 10),
            Err(MmapError::InvalidOffset { offset: 11 })
        ));
        assert!(matches!(
            check_range(5, 5, 10),
            Err(MmapError::InvalidOffsetRange { low: 5, high: 5 })
        ));
        assert!(matches!(
            check_range(6, 2, 10),
            Err(MmapError::InvalidOffsetRange { low: 6, high: 2 })
        ));
    }
}
