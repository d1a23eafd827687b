//! Unix mapping primitives via `libc`.

use std::ptr::{self, NonNull};

use crate::errors::{MmapError, Result};
use crate::platform::{Platform, Protection, RawRegion, RawSource, Sharing};
use crate::utils::page_size;

/// `mmap`/`mlock`/`msync`/`munmap` based platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPlatform;

impl UnixPlatform {
    fn prot(protection: Protection) -> libc::c_int {
        let mut prot = libc::PROT_READ;
        if protection.write {
            prot |= libc::PROT_WRITE;
        }
        if protection.execute {
            prot |= libc::PROT_EXEC;
        }
        prot
    }

    fn flags(sharing: Sharing) -> libc::c_int {
        match sharing {
            Sharing::Shared => libc::MAP_SHARED,
            Sharing::Private => libc::MAP_PRIVATE,
        }
    }
}

// SAFETY: regions come straight from a successful mmap of `len` bytes and are
// marked unmapped as soon as munmap succeeds.
unsafe impl Platform for UnixPlatform {
    type Aux = ();

    fn granularity(&self) -> usize {
        page_size()
    }

    #[allow(clippy::cast_sign_loss)]
    fn backing_len(&self, source: RawSource) -> Result<Option<u64>> {
        // SAFETY: an all-zero stat is a valid out-parameter.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: fstat only writes into `st`; a bad descriptor yields EBADF.
        if unsafe { libc::fstat(source, &mut st) } != 0 {
            return Err(MmapError::last_os_error("fstat"));
        }
        if (st.st_mode & libc::S_IFMT) != libc::S_IFREG {
            return Ok(None);
        }
        Ok(Some(st.st_size.max(0) as u64))
    }

    fn establish(
        &self,
        source: RawSource,
        offset: u64,
        len: usize,
        protection: Protection,
        sharing: Sharing,
    ) -> Result<RawRegion<()>> {
        let file_offset =
            libc::off_t::try_from(offset).map_err(|_| MmapError::InvalidOffset { offset })?;
        // SAFETY: a null hint without MAP_FIXED never replaces existing mappings.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                Self::prot(protection),
                Self::flags(sharing),
                source,
                file_offset,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(MmapError::last_os_error("mmap"));
        }
        let Some(base) = NonNull::new(addr.cast::<u8>()) else {
            return Err(MmapError::Os {
                operation: "mmap",
                source: std::io::Error::from_raw_os_error(libc::EINVAL),
            });
        };
        // SAFETY: mmap succeeded for exactly `len` bytes at `base`.
        Ok(unsafe { RawRegion::new(base, len, ()) })
    }

    fn pin(&self, region: &RawRegion<()>) -> Result<()> {
        // SAFETY: the range was returned by mmap.
        if unsafe { libc::mlock(region.base().as_ptr().cast(), region.len()) } != 0 {
            return Err(MmapError::last_os_error("mlock"));
        }
        Ok(())
    }

    fn unpin(&self, region: &RawRegion<()>) -> Result<()> {
        // SAFETY: the range was returned by mmap.
        if unsafe { libc::munlock(region.base().as_ptr().cast(), region.len()) } != 0 {
            return Err(MmapError::last_os_error("munlock"));
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, clippy::useless_conversion)]
    fn raise_quota(&self, region: &RawRegion<()>) -> Result<()> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: getrlimit only writes into `limit`.
        if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut limit) } != 0 {
            return Err(MmapError::last_os_error("getrlimit"));
        }
        if limit.rlim_cur == libc::RLIM_INFINITY {
            return Ok(());
        }
        let wanted = limit
            .rlim_cur
            .saturating_add(region.len() as libc::rlim_t);
        limit.rlim_cur = if limit.rlim_max == libc::RLIM_INFINITY {
            wanted
        } else {
            wanted.min(limit.rlim_max)
        };
        // SAFETY: setrlimit only reads `limit`.
        if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &limit) } != 0 {
            return Err(MmapError::last_os_error("setrlimit"));
        }
        Ok(())
    }

    fn flush(&self, region: &RawRegion<()>) -> Result<()> {
        // msync writes through the unified page cache, so one call reaches storage.
        // SAFETY: the range was returned by mmap and starts page-aligned.
        if unsafe { libc::msync(region.base().as_ptr().cast(), region.len(), libc::MS_SYNC) } != 0
        {
            return Err(MmapError::last_os_error("msync"));
        }
        Ok(())
    }

    fn release(&self, region: &mut RawRegion<()>) -> Result<()> {
        if !region.is_mapped() {
            return Ok(());
        }
        // SAFETY: the range was returned by mmap and has not been unmapped yet.
        if unsafe { libc::munmap(region.base().as_ptr().cast(), region.len()) } != 0 {
            return Err(MmapError::last_os_error("munmap"));
        }
        region.mark_unmapped();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn establish_flush_release_roundtrip() {
        let mut file = tempfile::tempfile().expect("tempfile");
        let ps = page_size();
        file.write_all(&vec![7u8; ps * 2]).expect("fill");

        let platform = UnixPlatform;
        let mut region = platform
            .establish(
                file.as_raw_fd(),
                ps as u64,
                ps,
                Protection {
                    write: true,
                    execute: false,
                },
                Sharing::Shared,
            )
            .expect("establish");
        assert_eq!(region.len(), ps);
        // SAFETY: the region is mapped read-write for `ps` bytes.
        unsafe {
            assert_eq!(*region.base().as_ptr(), 7);
            *region.base().as_ptr() = 9;
        }
        platform.flush(&region).expect("flush");
        platform.release(&mut region).expect("release");
        assert!(!region.is_mapped());
        // A second release is a no-op rather than a double munmap.
        platform.release(&mut region).expect("release again");
    }

    #[test]
    fn establish_reports_os_error() {
        let file = tempfile::tempfile().expect("tempfile");
        // Unaligned file offsets are rejected by mmap itself.
        let err = UnixPlatform
            .establish(
                file.as_raw_fd(),
                1,
                16,
                Protection::default(),
                Sharing::Shared,
            )
            .expect_err("unaligned offset");
        assert!(matches!(err, MmapError::Os { operation: "mmap", .. }));
        assert!(err.os_error().and_then(std::io::Error::raw_os_error).is_some());
    }

    #[test]
    fn backing_len_of_regular_file() {
        let mut file = tempfile::tempfile().expect("tempfile");
        file.write_all(b"0123456789").expect("fill");
        let len = UnixPlatform.backing_len(file.as_raw_fd()).expect("fstat");
        assert_eq!(len, Some(10));
    }
}
