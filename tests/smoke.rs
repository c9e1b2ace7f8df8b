use std::io;

use anyhow::{Context, Result};
use log::*;

use rayon::prelude::*;

use ziprw::result::ZipError;
use ziprw::*;

#[test]
fn smoke() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let tempdir = tempfile::tempdir()?;
    let zip_path = tempdir.path().join("smoke.zip");

    info!("Writing {}", zip_path.display());
    let mut writer = ZipWriter::create(&zip_path).context("Couldn't create zip file")?;
    writer.add_bytes("a.txt", b"hello", FileOptions::default())?;
    writer.add_bytes("dir/b.bin", &vec![0u8; 70000], FileOptions::default())?;
    writer.close().context("Couldn't finish zip file")?;

    let mut archive = ZipArchive::open(&zip_path).context("Couldn't load archive")?;
    assert_eq!(archive.list(), ["a.txt", "dir/b.bin"]);

    let zeroes = archive.get_info("dir/b.bin").expect("No dir/b.bin");
    assert_eq!(zeroes.compression_method, CompressionMethod::Deflate);
    assert_eq!(zeroes.uncompressed_size, 70000);
    assert!(zeroes.compressed_size < zeroes.uncompressed_size);
    assert!(zeroes.is_file());

    assert_eq!(archive.open_entry("a.txt")?.read_all()?, b"hello");
    assert_eq!(archive.open_entry("dir/b.bin")?.read_all()?, vec![0u8; 70000]);

    match archive.open_entry("no/such/file") {
        Err(ZipError::NoSuchFile(p)) => assert_eq!(p, "no/such/file"),
        Err(other) => panic!("Got incorrect error from path with no file: {:?}", other),
        Ok(_) => panic!("Got a file back from a path with no file"),
    };
    archive.close();

    read_in_parallel(&zip_path)?;
    tempdir.close()?;
    Ok(())
}

/// Each reader gets its own handle, so they don't step on each other's seeks.
fn read_in_parallel(zip_path: &std::path::Path) -> Result<()> {
    let names: Vec<String> = ZipArchive::open(zip_path)?
        .list()
        .into_iter()
        .map(str::to_owned)
        .collect();

    // Read every file a few times over, from as many threads as Rayon likes.
    names
        .par_iter()
        .chain(names.par_iter())
        .chain(names.par_iter())
        .try_for_each::<_, Result<()>>(|name| {
            let mut archive = ZipArchive::open(zip_path)?;
            let expected_size = archive
                .get_info(name)
                .expect("Name went missing")
                .uncompressed_size;
            let mut reader = archive.open_entry(name)?;
            let mut sink = io::sink();
            // The CRC32 gets checked when the reader runs dry.
            let copied = io::copy(&mut reader, &mut sink)?;
            assert_eq!(copied, expected_size);
            Ok(())
        })?;
    Ok(())
}
