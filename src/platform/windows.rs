//! Windows mapping primitives via kernel32.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use crate::errors::{MmapError, Result};
use crate::platform::{Platform, Protection, RawRegion, RawSource, Sharing};
use crate::utils::allocation_granularity;

type Handle = *mut c_void;
type Bool = i32;

const PAGE_READONLY: u32 = 0x02;
const PAGE_READWRITE: u32 = 0x04;
const PAGE_WRITECOPY: u32 = 0x08;
const PAGE_EXECUTE_READ: u32 = 0x20;
const PAGE_EXECUTE_READWRITE: u32 = 0x40;
const PAGE_EXECUTE_WRITECOPY: u32 = 0x80;

const FILE_MAP_COPY: u32 = 0x01;
const FILE_MAP_WRITE: u32 = 0x02;
const FILE_MAP_READ: u32 = 0x04;
const FILE_MAP_EXECUTE: u32 = 0x20;

const DUPLICATE_SAME_ACCESS: u32 = 0x02;

#[allow(non_snake_case)]
extern "system" {
    fn GetCurrentProcess() -> Handle;
    fn DuplicateHandle(
        hSourceProcessHandle: Handle,
        hSourceHandle: Handle,
        hTargetProcessHandle: Handle,
        lpTargetHandle: *mut Handle,
        dwDesiredAccess: u32,
        bInheritHandle: Bool,
        dwOptions: u32,
    ) -> Bool;
    fn CreateFileMappingW(
        hFile: Handle,
        lpFileMappingAttributes: *mut c_void,
        flProtect: u32,
        dwMaximumSizeHigh: u32,
        dwMaximumSizeLow: u32,
        lpName: *const u16,
    ) -> Handle;
    fn MapViewOfFile(
        hFileMappingObject: Handle,
        dwDesiredAccess: u32,
        dwFileOffsetHigh: u32,
        dwFileOffsetLow: u32,
        dwNumberOfBytesToMap: usize,
    ) -> *mut c_void;
    fn UnmapViewOfFile(lpBaseAddress: *const c_void) -> Bool;
    fn FlushViewOfFile(lpBaseAddress: *const c_void, dwNumberOfBytesToFlush: usize) -> Bool;
    fn FlushFileBuffers(hFile: Handle) -> Bool;
    fn VirtualLock(lpAddress: *mut c_void, dwSize: usize) -> Bool;
    fn VirtualUnlock(lpAddress: *mut c_void, dwSize: usize) -> Bool;
    fn GetProcessWorkingSetSize(
        hProcess: Handle,
        lpMinimumWorkingSetSize: *mut usize,
        lpMaximumWorkingSetSize: *mut usize,
    ) -> Bool;
    fn SetProcessWorkingSetSize(
        hProcess: Handle,
        dwMinimumWorkingSetSize: usize,
        dwMaximumWorkingSetSize: usize,
    ) -> Bool;
    fn CloseHandle(hObject: Handle) -> Bool;
}

#[allow(clippy::cast_possible_truncation)]
fn high_low(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

/// A kernel handle owned by a mapping.
#[derive(Debug)]
struct OwnedHandle(Handle);

// SAFETY: kernel handles are process-wide and usable from any thread.
unsafe impl Send for OwnedHandle {}
// SAFETY: see above; the handle is only closed through `&mut`.
unsafe impl Sync for OwnedHandle {}

fn close(handle: &mut Option<OwnedHandle>) -> Result<()> {
    if let Some(OwnedHandle(raw)) = handle.as_ref() {
        // SAFETY: the handle was obtained by this module and not yet closed.
        if unsafe { CloseHandle(*raw) } == 0 {
            return Err(MmapError::last_os_error("CloseHandle"));
        }
        *handle = None;
    }
    Ok(())
}

/// Handles acquired while establishing a view, released in reverse order.
#[derive(Debug)]
pub struct WindowsAux {
    file: Option<OwnedHandle>,
    mapping: Option<OwnedHandle>,
    sharing: Sharing,
}

/// `CreateFileMapping`/`MapViewOfFile` based platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsPlatform;

impl WindowsPlatform {
    fn page_protection(protection: Protection, sharing: Sharing) -> u32 {
        match (protection.write, sharing, protection.execute) {
            (false, _, false) => PAGE_READONLY,
            (false, _, true) => PAGE_EXECUTE_READ,
            (true, Sharing::Shared, false) => PAGE_READWRITE,
            (true, Sharing::Shared, true) => PAGE_EXECUTE_READWRITE,
            (true, Sharing::Private, false) => PAGE_WRITECOPY,
            (true, Sharing::Private, true) => PAGE_EXECUTE_WRITECOPY,
        }
    }

    fn view_access(protection: Protection, sharing: Sharing) -> u32 {
        let mut access = match (protection.write, sharing) {
            (false, _) => FILE_MAP_READ,
            (true, Sharing::Shared) => FILE_MAP_WRITE,
            (true, Sharing::Private) => FILE_MAP_COPY,
        };
        if protection.execute {
            access |= FILE_MAP_EXECUTE;
        }
        access
    }
}

// SAFETY: regions come from a successful MapViewOfFile of `len` bytes and are
// marked unmapped as soon as UnmapViewOfFile succeeds.
unsafe impl Platform for WindowsPlatform {
    type Aux = WindowsAux;

    fn granularity(&self) -> usize {
        allocation_granularity()
    }

    fn establish(
        &self,
        source: RawSource,
        offset: u64,
        len: usize,
        protection: Protection,
        sharing: Sharing,
    ) -> Result<RawRegion<WindowsAux>> {
        let mut aux = WindowsAux {
            file: None,
            mapping: None,
            sharing,
        };
        // SAFETY: the pseudo-handle of the current process needs no cleanup.
        let process = unsafe { GetCurrentProcess() };
        let mut duplicate: Handle = ptr::null_mut();
        // SAFETY: `source` is a live handle borrowed from the caller.
        let ok = unsafe {
            DuplicateHandle(
                process,
                source,
                process,
                &mut duplicate,
                0,
                0,
                DUPLICATE_SAME_ACCESS,
            )
        };
        if ok == 0 {
            return Err(MmapError::last_os_error("DuplicateHandle"));
        }
        aux.file = Some(OwnedHandle(duplicate));

        let (max_high, max_low) = high_low(offset + len as u64);
        // SAFETY: the duplicated file handle is valid; no name or attributes.
        let mapping = unsafe {
            CreateFileMappingW(
                duplicate,
                ptr::null_mut(),
                Self::page_protection(protection, sharing),
                max_high,
                max_low,
                ptr::null(),
            )
        };
        if mapping.is_null() {
            let err = MmapError::last_os_error("CreateFileMapping");
            let _ = close(&mut aux.file);
            return Err(err);
        }
        aux.mapping = Some(OwnedHandle(mapping));

        let (offset_high, offset_low) = high_low(offset);
        // SAFETY: the mapping handle is valid and covers offset + len.
        let addr = unsafe {
            MapViewOfFile(
                mapping,
                Self::view_access(protection, sharing),
                offset_high,
                offset_low,
                len,
            )
        };
        let Some(base) = NonNull::new(addr.cast::<u8>()) else {
            let err = MmapError::last_os_error("MapViewOfFile");
            let _ = close(&mut aux.mapping);
            let _ = close(&mut aux.file);
            return Err(err);
        };
        // SAFETY: MapViewOfFile succeeded for exactly `len` bytes at `base`.
        Ok(unsafe { RawRegion::new(base, len, aux) })
    }

    fn pin(&self, region: &RawRegion<WindowsAux>) -> Result<()> {
        // SAFETY: the range was returned by MapViewOfFile.
        if unsafe { VirtualLock(region.base().as_ptr().cast(), region.len()) } == 0 {
            return Err(MmapError::last_os_error("VirtualLock"));
        }
        Ok(())
    }

    fn unpin(&self, region: &RawRegion<WindowsAux>) -> Result<()> {
        // SAFETY: the range was returned by MapViewOfFile.
        if unsafe { VirtualUnlock(region.base().as_ptr().cast(), region.len()) } == 0 {
            return Err(MmapError::last_os_error("VirtualUnlock"));
        }
        Ok(())
    }

    fn raise_quota(&self, region: &RawRegion<WindowsAux>) -> Result<()> {
        // SAFETY: the pseudo-handle of the current process needs no cleanup.
        let process = unsafe { GetCurrentProcess() };
        let (mut min, mut max) = (0usize, 0usize);
        // SAFETY: both out-parameters point to live locals.
        if unsafe { GetProcessWorkingSetSize(process, &mut min, &mut max) } == 0 {
            return Err(MmapError::last_os_error("GetProcessWorkingSetSize"));
        }
        let min = min.saturating_add(region.len());
        let max = max.saturating_add(region.len());
        // SAFETY: plain value arguments.
        if unsafe { SetProcessWorkingSetSize(process, min, max) } == 0 {
            return Err(MmapError::last_os_error("SetProcessWorkingSetSize"));
        }
        Ok(())
    }

    fn flush(&self, region: &RawRegion<WindowsAux>) -> Result<()> {
        // SAFETY: the range was returned by MapViewOfFile.
        if unsafe { FlushViewOfFile(region.base().as_ptr().cast(), region.len()) } == 0 {
            return Err(MmapError::last_os_error("FlushViewOfFile"));
        }
        // Copy-on-write pages never reach the file, so only shared views need the
        // second, cache-to-storage flush.
        if region.aux().sharing == Sharing::Shared {
            if let Some(OwnedHandle(file)) = region.aux().file.as_ref() {
                // SAFETY: the duplicated handle is still open.
                if unsafe { FlushFileBuffers(*file) } == 0 {
                    return Err(MmapError::last_os_error("FlushFileBuffers"));
                }
            }
        }
        Ok(())
    }

    fn release(&self, region: &mut RawRegion<WindowsAux>) -> Result<()> {
        if region.is_mapped() {
            // SAFETY: the view is still mapped at `base`.
            if unsafe { UnmapViewOfFile(region.base().as_ptr().cast()) } == 0 {
                return Err(MmapError::last_os_error("UnmapViewOfFile"));
            }
            region.mark_unmapped();
        }
        close(&mut region.aux_mut().mapping)?;
        close(&mut region.aux_mut().file)
    }
}
