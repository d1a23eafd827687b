//! Permission and sharing behaviour of the three access modes.

use std::fs::{self, OpenOptions};
use std::io::Write;

use mmap_region::{Mapping, MmapError, Mode, Options};
use tempfile::NamedTempFile;

fn backing(contents: &[u8]) -> anyhow::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}

#[test]
fn read_only_refuses_writes_and_sync() -> anyhow::Result<()> {
    let file = backing(&[1u8; 256])?;
    let mut mapping = Mapping::open(file.as_file(), 3, 64, &Options::read_only())?;

    assert!(mapping.can_read()?);
    assert!(!mapping.can_write()?);
    assert!(!mapping.can_execute()?);

    assert!(matches!(mapping.write_byte_at(0, 9), Err(MmapError::NotAllowed("write"))));
    assert!(matches!(mapping.write_at(b"abc", 0), Err(MmapError::NotAllowed("write"))));
    assert!(matches!(mapping.direct_mut(0, 4), Err(MmapError::NotAllowed("write"))));
    assert!(matches!(mapping.sync(), Err(MmapError::NotAllowed("sync"))));

    // Nothing changed underneath.
    assert_eq!(mapping.read_byte_at(0)?, 1);
    mapping.close()?;
    Ok(())
}

#[test]
fn shared_writes_reach_file_and_other_mappers() -> anyhow::Result<()> {
    let file = backing(&[0u8; 512])?;
    let mut writer = Mapping::open(file.as_file(), 200, 16, &Options::read_write())?;
    let reader = Mapping::open(file.as_file(), 200, 16, &Options::read_only())?;

    writer.write_at(b"shared", 0)?;
    writer.sync()?;
    assert_eq!(reader.direct(0, 6)?, b"shared");

    writer.close()?;
    let on_disk = fs::read(file.path())?;
    assert_eq!(&on_disk[200..206], b"shared");
    Ok(())
}

#[test]
fn private_writes_stay_private() -> anyhow::Result<()> {
    let file = backing(&[7u8; 512])?;
    let mut private = Mapping::open(file.as_file(), 40, 32, &Options::read_write_private())?;
    assert!(private.can_write()?);

    private.write_at(b"cow", 0)?;
    private.write_byte_at(31, 0)?;
    assert_eq!(private.direct(0, 3)?, b"cow");
    private.sync()?;

    let observer = Mapping::open(file.as_file(), 40, 32, &Options::read_only())?;
    assert_eq!(observer.direct(0, 3)?, &[7, 7, 7]);
    assert_eq!(observer.read_byte_at(31)?, 7);

    private.close()?;
    let on_disk = fs::read(file.path())?;
    assert!(on_disk.iter().all(|b| *b == 7));
    Ok(())
}

#[test]
fn private_mapping_of_read_only_handle() -> anyhow::Result<()> {
    let file = backing(&[5u8; 128])?;
    let read_only = OpenOptions::new().read(true).open(file.path())?;
    let mut private = Mapping::open(&read_only, 0, 128, &Options::read_write_private())?;
    private.write_byte_at(0, 6)?;
    assert_eq!(private.read_byte_at(0)?, 6);
    // Copy-on-write sync must not need write access to the file.
    private.sync()?;
    private.close()?;
    Ok(())
}

#[test]
fn shared_write_needs_writable_handle() -> anyhow::Result<()> {
    let file = backing(&[0u8; 128])?;
    let read_only = OpenOptions::new().read(true).open(file.path())?;
    let err = Mapping::open(&read_only, 0, 128, &Options::read_write()).expect_err("read-only handle");
    assert!(matches!(err, MmapError::Os { .. }));
    assert!(err.os_error().and_then(std::io::Error::raw_os_error).is_some());
    Ok(())
}

#[test]
fn executable_flag_is_recorded() -> anyhow::Result<()> {
    let file = backing(&[0xC3u8; 64])?;
    let options = Options::new(Mode::ReadOnly).executable(true);
    // Temp directories mounted noexec refuse executable mappings.
    match Mapping::open(file.as_file(), 0, 64, &options) {
        Ok(mapping) => {
            assert!(mapping.can_execute()?);
            assert!(!mapping.can_write()?);
        }
        Err(err) => assert!(matches!(err, MmapError::Os { .. }), "{err}"),
    }
    Ok(())
}
