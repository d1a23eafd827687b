//! Mapping options: access mode and execute permission.

use crate::errors::MmapError;
use crate::platform::{Protection, Sharing};

/// Memory access mode of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Shared, read-only. Changes made by other mappers of the same file are visible.
    #[default]
    ReadOnly,
    /// Shared, read-write. Writes reach other mappers and eventually the backing file.
    ReadWrite,
    /// Private copy-on-write. Writes stay in this mapping and never reach the backing file.
    ReadWritePrivate,
}

impl Mode {
    /// Whether the mode permits writing through the mapping.
    #[must_use]
    pub fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    pub(crate) fn sharing(self) -> Sharing {
        match self {
            Self::ReadOnly | Self::ReadWrite => Sharing::Shared,
            Self::ReadWritePrivate => Sharing::Private,
        }
    }
}

impl TryFrom<u32> for Mode {
    type Error = MmapError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::ReadOnly),
            1 => Ok(Self::ReadWrite),
            2 => Ok(Self::ReadWritePrivate),
            mode => Err(MmapError::InvalidMode { mode }),
        }
    }
}

impl From<Mode> for u32 {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::ReadOnly => 0,
            Mode::ReadWrite => 1,
            Mode::ReadWritePrivate => 2,
        }
    }
}

/// Options consumed once when a mapping is opened.
///
/// # Examples
///
/// ```
/// use mmap_region::{Mode, Options};
///
/// let opts = Options::new(Mode::ReadWrite).executable(true);
/// assert_eq!(opts.mode, Mode::ReadWrite);
/// assert!(opts.executable);
/// assert_eq!(Options::default().mode, Mode::ReadOnly);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    /// Memory access mode.
    pub mode: Mode,
    /// Map the memory executable.
    pub executable: bool,
}

impl Options {
    /// Options for the given mode, not executable.
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            executable: false,
        }
    }

    /// Shorthand for `Options::new(Mode::ReadOnly)`.
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(Mode::ReadOnly)
    }

    /// Shorthand for `Options::new(Mode::ReadWrite)`.
    #[must_use]
    pub fn read_write() -> Self {
        Self::new(Mode::ReadWrite)
    }

    /// Shorthand for `Options::new(Mode::ReadWritePrivate)`.
    #[must_use]
    pub fn read_write_private() -> Self {
        Self::new(Mode::ReadWritePrivate)
    }

    /// Set whether the mapped memory is executable.
    #[must_use]
    pub fn executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    pub(crate) fn protection(&self) -> Protection {
        Protection {
            write: self.mode.is_writable(),
            execute: self.executable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_raw() {
        assert_eq!(Mode::try_from(0).expect("ro"), Mode::ReadOnly);
        assert_eq!(Mode::try_from(1).expect("rw"), Mode::ReadWrite);
        assert_eq!(Mode::try_from(2).expect("private"), Mode::ReadWritePrivate);
        assert!(matches!(
            Mode::try_from(3),
            Err(MmapError::InvalidMode { mode: 3 })
        ));
        assert_eq!(u32::from(Mode::ReadWritePrivate), 2);
    }

    #[test]
    fn derived_permissions() {
        let ro = Options::read_only();
        assert_eq!(ro.protection(), Protection { write: false, execute: false });
        assert_eq!(ro.mode.sharing(), Sharing::Shared);

        let rw = Options::read_write().executable(true);
        assert_eq!(rw.protection(), Protection { write: true, execute: true });
        assert_eq!(rw.mode.sharing(), Sharing::Shared);

        let private = Options::read_write_private();
        assert_eq!(private.protection(), Protection { write: true, execute: false });
        assert_eq!(private.mode.sharing(), Sharing::Private);
    }
}
