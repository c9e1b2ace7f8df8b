//! Writes ZIP archives to destinations that can't seek.
//!
//! Each entry's CRC and sizes aren't known until its data is written,
//! so its local header sets bit 3 of the flags and zeroes them,
//! and a data descriptor with the real values follows the data.
//! The central directory gets the real values and leaves bit 3 off,
//! so readers can't tell the difference from [`ZipWriter`]'s output.
//!
//! [`ZipWriter`]: ../write/struct.ZipWriter.html

use std::io::{Read, Write};

use log::*;

use crate::crc32::Crc32Counter;
use crate::read::ZipEntry;
use crate::result::*;
use crate::spec::{self, DataDescriptor};
use crate::write::{
    build_central_directory, check_comment, compress, directory_name, local_header_bytes,
    new_entry, CountingWriter, FileOptions, Zip64Limits,
};

/// Writes a ZIP archive to anything that's `Write`.
///
/// ```no_run
/// # use std::io;
/// # use ziprw::*;
/// let mut writer = ZipStreamWriter::new(io::stdout().lock());
/// writer.add_stream("input.txt", io::stdin().lock(), FileOptions::default())?;
/// writer.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ZipStreamWriter<W: Write> {
    /// Counts everything written, which gives us each record's offset.
    /// `None` once closed.
    inner: Option<CountingWriter<W>>,
    files: Vec<ZipEntry>,
    comment: Vec<u8>,
    limits: Zip64Limits,
    failed: bool,
}

impl<W: Write> ZipStreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Some(CountingWriter::new(inner)),
            files: Vec::new(),
            comment: Vec::new(),
            limits: Zip64Limits::default(),
            failed: false,
        }
    }

    /// Sets the thresholds for switching to Zip64 records.
    pub fn with_zip64_limits(mut self, limits: Zip64Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the archive comment, which is empty by default.
    pub fn set_comment<C: Into<Vec<u8>>>(&mut self, comment: C) -> ZipResult<()> {
        let comment = comment.into();
        self.guard(|_| check_comment(&comment))?;
        self.comment = comment;
        Ok(())
    }

    /// Writes everything `reader` has as the file `name`,
    /// compressing it in chunks as it goes.
    pub fn add_stream<R: Read>(
        &mut self,
        name: &str,
        reader: R,
        options: FileOptions,
    ) -> ZipResult<()> {
        self.guard(|w| w.write_stream(name, reader, &options))
    }

    /// Adds a directory entry. A trailing `/` is added to `name` if it's missing.
    ///
    /// Directories have no data, so they don't need a data descriptor.
    pub fn add_directory(&mut self, name: &str, options: FileOptions) -> ZipResult<()> {
        self.guard(|w| {
            let inner = w.inner.as_mut().ok_or(ZipError::Aborted)?;
            let entry = new_entry(&directory_name(name), &options, inner.count(), true)?;
            inner.write_all(&local_header_bytes(&entry, 0, false)?)?;
            debug!("Wrote {:?}", entry);
            w.files.push(entry);
            Ok(())
        })
    }

    /// Writes the central directory and end records, then returns the inner writer.
    pub fn close(mut self) -> ZipResult<W> {
        if self.failed {
            return Err(ZipError::Aborted);
        }
        let mut inner = self.inner.take().ok_or(ZipError::Aborted)?;
        let trailer =
            build_central_directory(&self.files, inner.count(), &self.comment, self.limits)?;
        inner.write_all(&trailer)?;
        inner.flush()?;
        debug!("Closed streamed archive with {} entries", self.files.len());
        Ok(inner.into_inner())
    }

    /// Runs the given operation, poisoning the writer if it fails.
    fn guard<T, F: FnOnce(&mut Self) -> ZipResult<T>>(&mut self, op: F) -> ZipResult<T> {
        if self.failed {
            return Err(ZipError::Aborted);
        }
        let result = op(self);
        if let Err(e) = &result {
            warn!("Aborting streamed archive: {}", e);
            self.failed = true;
        }
        result
    }

    fn write_stream<R: Read>(
        &mut self,
        name: &str,
        reader: R,
        options: &FileOptions,
    ) -> ZipResult<()> {
        let inner = self.inner.as_mut().ok_or(ZipError::Aborted)?;
        let mut entry = new_entry(name, options, inner.count(), false)?;

        inner.write_all(&local_header_bytes(&entry, spec::FLAG_DATA_DESCRIPTOR, false)?)?;

        let mut source = Crc32Counter::new(reader);
        entry.compressed_size = compress(&mut source, &mut *inner, options)?;
        entry.uncompressed_size = source.count();
        entry.crc32 = source.crc32();

        let zip64 = entry.compressed_size > self.limits.bytes
            || entry.uncompressed_size > self.limits.bytes;
        let descriptor = DataDescriptor {
            crc32: entry.crc32,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
        };
        let mut descriptor_bytes = Vec::with_capacity(DataDescriptor::MAX_SIZE);
        descriptor.write(&mut descriptor_bytes, zip64)?;
        inner.write_all(&descriptor_bytes)?;

        debug!("Streamed {:?}", entry);
        self.files.push(entry);
        Ok(())
    }
}

impl<W: Write> Drop for ZipStreamWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && !self.failed {
            warn!("ZipStreamWriter dropped without close(); the archive is incomplete");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::read::CompressionMethod;
    use crate::spec::LocalFileHeader;

    #[test]
    fn local_header_defers_to_descriptor() {
        let mut writer = ZipStreamWriter::new(Vec::new());
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        writer.add_stream("a.txt", &b"hello"[..], options).unwrap();
        let bytes = writer.close().unwrap();

        let header = LocalFileHeader::parse(&bytes, 0).unwrap();
        assert!(spec::has_data_descriptor(header.flags));
        assert_eq!(header.crc32, 0);
        assert_eq!(header.compressed_size, 0);
        assert_eq!(header.uncompressed_size, 0);

        let descriptor_offset = header.size_in_file() as usize + 5;
        let descriptor = &bytes[descriptor_offset..descriptor_offset + 16];
        assert_eq!(&descriptor[..4], &spec::DATA_DESCRIPTOR_MAGIC);
        let parsed = DataDescriptor::parse(descriptor, false, descriptor_offset as u64).unwrap();
        assert_eq!(parsed.crc32, crc32fast::hash(b"hello"));
        assert_eq!(parsed.compressed_size, 5);
        assert_eq!(parsed.uncompressed_size, 5);

        // The central directory doesn't mention the descriptor.
        let central_directory = &bytes[descriptor_offset + 16..];
        assert_eq!(&central_directory[..4], &spec::CENTRAL_DIRECTORY_MAGIC);
        assert_eq!(&central_directory[8..10], &[0, 0]);
    }

    #[test]
    fn zip64_descriptor_past_the_limit() {
        let mut writer =
            ZipStreamWriter::new(Vec::new()).with_zip64_limits(Zip64Limits::new(3, 100));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        writer.add_stream("a.txt", &b"hello"[..], options).unwrap();
        let bytes = writer.close().unwrap();

        let descriptor_offset = LocalFileHeader::FIXED_SIZE + 5 + 5;
        let descriptor = &bytes[descriptor_offset..descriptor_offset + 24];
        let parsed = DataDescriptor::parse(descriptor, true, descriptor_offset as u64).unwrap();
        assert_eq!(parsed.compressed_size, 5);
        assert_eq!(parsed.uncompressed_size, 5);
        assert_eq!(
            &bytes[descriptor_offset + 24..descriptor_offset + 28],
            &spec::CENTRAL_DIRECTORY_MAGIC
        );
    }

    #[test]
    fn errors_abort_the_writer() {
        let mut writer = ZipStreamWriter::new(Vec::new());
        assert!(matches!(
            writer.add_stream("", &b""[..], FileOptions::default()),
            Err(ZipError::InvalidInput(_))
        ));
        assert!(matches!(
            writer.add_directory("dir", FileOptions::default()),
            Err(ZipError::Aborted)
        ));
        assert!(matches!(writer.close(), Err(ZipError::Aborted)));
    }
}
