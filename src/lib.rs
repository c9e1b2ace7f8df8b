//! ziprw reads and writes Zip archives, Zip64 included, using a simple API:
//!
//! ```no_run
//! # use ziprw::*;
//! let mut writer = ZipWriter::create("foo.zip")?;
//! writer.add_bytes("hello/hi.txt", b"Hello, world!", FileOptions::default())?;
//! writer.add_directory("hello/empty", FileOptions::default())?;
//! writer.close()?;
//!
//! let mut archive = ZipArchive::open("foo.zip")?;
//! for name in archive.list() {
//!     println!("{}", name);
//! }
//! let contents = archive.open_entry("hello/hi.txt")?.read_all()?;
//! assert_eq!(contents, b"Hello, world!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Each archive holds its own file handle, so we can read one file
//! from as many threads as we'd like by opening it once per thread:
//! ```no_run
//! # use std::io;
//! # use rayon::prelude::*;
//! # use ziprw::*;
//! #
//! let names: Vec<String> = ZipArchive::open("foo.zip")?
//!     .list()
//!     .into_iter()
//!     .map(str::to_owned)
//!     .collect();
//!
//! names.par_iter().try_for_each(|name| {
//!     let mut archive = ZipArchive::open("foo.zip")?;
//!     let mut reader = archive.open_entry(name)?;
//!     // Reaching the end checks the file's CRC32.
//!     io::copy(&mut reader, &mut io::sink())?;
//!     # return Ok::<(), anyhow::Error>(());
//!     Ok(())
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Zip is an interesting archive format: unlike compressed tarballs often seen
//! in Linux land (`*.tar.gz`, `*.tar.zst`, ...),
//! each file in a Zip archive is compressed independently,
//! with a central directory at the very end telling us where to find each file.
//! Readers start from that end; writers can't finish until they get there.
//! Sizes and offsets that don't fit in the format's original 32-bit fields
//! are moved to Zip64 records, which both the reader and the writers handle
//! without being asked.
//!
//! Archives from elsewhere shouldn't be trusted: every size and offset
//! is checked against the file before it's used, and
//! [`ZipArchive::extract_all()`](read/struct.ZipArchive.html#method.extract_all)
//! refuses names that would land outside the directory it's given.

pub mod extract;
pub mod read;
pub mod result;
pub mod stream_write;
pub mod write;

pub use read::CompressionMethod;
pub use read::ZipArchive;
pub use read::ZipEntry;
pub use stream_write::ZipStreamWriter;
pub use write::FileOptions;
pub use write::Zip64Limits;
pub use write::ZipWriter;

mod arch;
mod crc32;
mod spec;
