//! Helper module to compute CRC32 checksums, in both directions:
//! verifying what we decompress, and accumulating what we compress.
//!
//! The reader was borrowed from zip-rs:
//! <https://github.com/mvdnes/zip-rs/commit/b3c836d9c32efa120cdd5366280f940d3c3b985c>

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

use crate::result::ZipError;

/// Reader that validates the CRC32 when it reaches the EOF.
///
/// Nothing is checked until the inner reader runs dry,
/// so partial reads never report a mismatch.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    provided_checksum: u32,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, provided_checksum: u32) -> Crc32Reader<R> {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            provided_checksum,
        }
    }

    /// Returns an error if the final checksum doesn't match the one provided by `new()`
    fn check_matches(&self) -> Result<(), ZipError> {
        let actual = self.hasher.clone().finalize();
        if actual == self.provided_checksum {
            Ok(())
        } else {
            Err(ZipError::Crc {
                expected: self.provided_checksum,
                actual,
            })
        }
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.check_matches()?;
                0
            }
            Ok(n) => n,
            Err(e) => return Err(e),
        };
        self.hasher.update(&buf[0..count]);
        Ok(count)
    }
}

/// Reader that hashes and counts everything passing through it,
/// for entries we're writing.
pub struct Crc32Counter<R> {
    inner: R,
    hasher: Hasher,
    count: u64,
}

impl<R> Crc32Counter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            count: 0,
        }
    }

    /// Bytes read so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The CRC32 of the bytes read so far
    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl<R: Read> Read for Crc32Counter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.hasher.update(&buf[..count]);
        self.count += count as u64;
        Ok(count)
    }
}
