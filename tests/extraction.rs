use std::fs;
use std::io::Cursor;

use anyhow::Result;

use ziprw::result::ZipError;
use ziprw::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn archive_of(entries: &[(&str, &[u8])]) -> Result<ZipArchive<Cursor<Vec<u8>>>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(name, FileOptions::default())?;
        } else {
            writer.add_bytes(name, data, FileOptions::default())?;
        }
    }
    Ok(ZipArchive::new(Cursor::new(writer.close()?.into_inner()))?)
}

#[test]
fn extracts_everything() -> Result<()> {
    init_logging();
    let tempdir = tempfile::tempdir()?;
    let root = tempdir.path().join("out");

    let mut archive = archive_of(&[
        ("a.txt", b"hello"),
        ("dir/b.bin", &[0; 70000]),
        ("./dir/c.txt", b"see"),
        ("empty/", b""),
    ])?;
    archive.extract_all(&root)?;

    assert_eq!(fs::read(root.join("a.txt"))?, b"hello");
    assert_eq!(fs::read(root.join("dir/b.bin"))?, vec![0; 70000]);
    assert_eq!(fs::read(root.join("dir/c.txt"))?, b"see");
    assert!(root.join("empty").is_dir());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(root.join("a.txt"))?.permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
        let mode = fs::metadata(root.join("empty"))?.permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
    Ok(())
}

#[test]
fn traversal_is_rejected_before_writing_anything() -> Result<()> {
    init_logging();
    let tempdir = tempfile::tempdir()?;

    for evil in ["../evil.txt", "dir/../../evil.txt", "/tmp/evil.txt", "C:\\evil.txt"] {
        let root = tempdir.path().join("out");
        // A perfectly good entry comes first; it shouldn't get written either.
        let mut archive = archive_of(&[("good.txt", b"good"), (evil, b"evil")])?;
        match archive.extract_all(&root) {
            Err(ZipError::InvalidPath(_)) => {}
            Err(other) => panic!("Expected an invalid path for {}, got {:?}", evil, other),
            Ok(()) => panic!("Extracted {}", evil),
        }
        assert!(!root.exists());
        assert!(!tempdir.path().join("evil.txt").exists());
    }
    Ok(())
}

#[test]
fn corrupt_files_are_removed() -> Result<()> {
    init_logging();
    let tempdir = tempfile::tempdir()?;
    let root = tempdir.path().join("out");

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.add_bytes(
        "a.txt",
        b"hello, world",
        FileOptions::default().compression_method(CompressionMethod::Stored),
    )?;
    let mut bytes = writer.close()?.into_inner();
    // Past the 30-byte header and 5-byte name
    bytes[35] ^= 1;

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    assert!(matches!(
        archive.extract_all(&root),
        Err(ZipError::Crc { .. })
    ));
    assert!(!root.join("a.txt").exists());
    Ok(())
}

#[test]
fn files_bigger_than_recorded_are_removed() -> Result<()> {
    init_logging();
    let tempdir = tempfile::tempdir()?;
    let root = tempdir.path().join("out");

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.add_bytes("a.txt", &[b'a'; 100_000], FileOptions::default())?;
    let mut bytes = writer.close()?.into_inner();

    // Claim it's 10 bytes, in both the local header and the central directory.
    let eocdr = bytes.len() - 22;
    let record = u32::from_le_bytes(bytes[eocdr + 16..eocdr + 20].try_into()?) as usize;
    bytes[22..26].copy_from_slice(&10u32.to_le_bytes());
    bytes[record + 24..record + 28].copy_from_slice(&10u32.to_le_bytes());

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    assert!(matches!(
        archive.extract_all(&root),
        Err(ZipError::InvalidArchive { record: "file data", .. })
    ));
    assert!(!root.join("a.txt").exists());
    Ok(())
}
