//! Flushing dirty pages back to the backing store.

use log::trace;

use crate::errors::{MmapError, Result};
use crate::mmap::Mapping;
use crate::platform::Platform;

impl<P: Platform> Mapping<P> {
    /// Flush modified pages of the mapping to its backing store.
    ///
    /// Runs automatically as the first step of [`Mapping::close`] for
    /// writable mappings. For private (copy-on-write) mappings nothing
    /// reaches the file.
    ///
    /// # Platform-specific behavior
    ///
    /// - **Unix**: Uses `msync(MS_SYNC)`
    /// - **Windows**: Uses `FlushViewOfFile`, then `FlushFileBuffers` for shared views
    ///
    /// # Errors
    ///
    /// Returns `MmapError::Closed` after close.
    /// Returns `MmapError::NotAllowed` on a read-only mapping.
    /// Returns `MmapError::Os` if the flush fails.
    pub fn sync(&self) -> Result<()> {
        let region = self.live_region()?;
        if !self.can_write()? {
            return Err(MmapError::NotAllowed("sync"));
        }
        trace!("syncing {} bytes", region.len());
        self.platform().flush(region)
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::MmapError;
    use crate::mmap::tests::mem_mapping;
    use crate::Options;

    #[test]
    fn sync_counts_flushes() {
        let (mut mapping, probe) = mem_mapping(5, 16, &Options::read_write_private());
        mapping.write_at(b"abc", 0).expect("write");
        mapping.sync().expect("sync");
        mapping.sync().expect("sync again");
        assert_eq!(probe.flushed.get(), 2);
    }

    #[test]
    fn sync_propagates_os_error() {
        let (mapping, probe) = mem_mapping(0, 16, &Options::read_write());
        probe.fail_flush.set(true);
        let err = mapping.sync().expect_err("injected");
        assert!(err.os_error().is_some());
        assert!(matches!(err, MmapError::Os { operation: "msync", .. }));
        // Leave the mapping droppable without noise.
        probe.fail_flush.set(false);
    }
}
