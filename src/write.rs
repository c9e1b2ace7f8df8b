//! Tools for writing a ZIP archive.
//!
//! [`ZipWriter`] writes each entry's local header and data as it's added,
//! then the central directory on [`close()`]. Nothing it writes is a usable
//! archive until `close()` succeeds.
//!
//! When the destination can't seek (a pipe, a socket),
//! use [`ZipStreamWriter`](../stream_write/struct.ZipStreamWriter.html) instead.
//!
//! [`ZipWriter`]: struct.ZipWriter.html
//! [`close()`]: struct.ZipWriter.html#method.close

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::*;

use crate::crc32::Crc32Counter;
use crate::read::{CompressionMethod, ZipEntry};
use crate::result::*;
use crate::spec::{
    self, CentralDirectoryEntry, EndOfCentralDirectory, LocalFileHeader, System,
    Zip64EndOfCentralDirectory, Zip64EndOfCentralDirectoryLocator, Zip64ExtraField,
};

/// Metadata for a file to be written
#[derive(Debug, Copy, Clone)]
pub struct FileOptions {
    pub(crate) compression_method: CompressionMethod,
    pub(crate) compression_level: Option<u32>,
    pub(crate) last_modified: NaiveDateTime,
    pub(crate) permissions: Option<u32>,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            compression_method: CompressionMethod::Deflate,
            compression_level: None,
            last_modified: chrono::Local::now().naive_local(),
            permissions: None,
        }
    }
}

impl FileOptions {
    /// Set the compression method for the new file
    ///
    /// The default is `CompressionMethod::Deflate`.
    pub fn compression_method(mut self, method: CompressionMethod) -> Self {
        self.compression_method = method;
        self
    }

    /// Set the deflate level, from 0 (fastest) to 9 (smallest).
    ///
    /// Ignored for stored files. The default is flate2's default level.
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = Some(level);
        self
    }

    /// Set the last modified time
    ///
    /// The default is the current local time.
    /// ZIP archives store times with 2-second precision, between 1980 and 2107.
    pub fn last_modified_time(mut self, time: NaiveDateTime) -> Self {
        self.last_modified = time;
        self
    }

    /// Set the permissions for the new file.
    ///
    /// The format is represented with unix-style permissions.
    /// The default is `0o644`, which represents `rw-r--r--` for files,
    /// and `0o755`, which represents `rwxr-xr-x` for directories
    pub fn unix_permissions(mut self, mode: u32) -> Self {
        self.permissions = Some(mode & 0o777);
        self
    }

    fn compression(&self) -> ZipResult<Compression> {
        match self.compression_level {
            None => Ok(Compression::default()),
            Some(level) if level <= 9 => Ok(Compression::new(level)),
            Some(level) => Err(ZipError::InvalidInput(format!(
                "Compression level {} isn't between 0 and 9",
                level
            ))),
        }
    }
}

/// Thresholds above which a writer switches to Zip64 fields
///
/// Any size or offset above `bytes`, or an entry count above `entries`,
/// gets a sentinel in its usual field and its real value in a Zip64 record.
/// The defaults are the largest values the 32 and 16-bit fields can hold
/// without colliding with their sentinels; larger limits are clamped to them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Zip64Limits {
    pub(crate) bytes: u64,
    pub(crate) entries: u64,
}

impl Zip64Limits {
    pub const MAX_BYTES: u64 = 0xFFFF_FFFE;
    pub const MAX_ENTRIES: u64 = 0xFFFE;

    pub fn new(bytes: u64, entries: u64) -> Self {
        Self {
            bytes: bytes.min(Self::MAX_BYTES),
            entries: entries.min(Self::MAX_ENTRIES),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }
}

impl Default for Zip64Limits {
    fn default() -> Self {
        Self::new(Self::MAX_BYTES, Self::MAX_ENTRIES)
    }
}

/// Writes a ZIP archive to a seekable destination.
///
/// ```no_run
/// # use ziprw::*;
/// let mut writer = ZipWriter::create("foo.zip")?;
/// writer.add_bytes("hello.txt", b"Hello, world!", FileOptions::default())?;
/// writer.add_directory("empty/", FileOptions::default())?;
/// writer.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// `inner` should be empty (or at least positioned at its start),
/// since entries are located by their offset from there.
/// Dropping a writer without calling [`close()`](#method.close)
/// leaves an unreadable archive behind.
pub struct ZipWriter<W: Write + Seek> {
    /// `None` once closed.
    inner: Option<W>,
    /// Entries written so far, for the central directory
    files: Vec<ZipEntry>,
    /// Bytes written so far, which is where the next record goes
    offset: u64,
    comment: Vec<u8>,
    limits: Zip64Limits,
    /// Set by any error, after which the archive can't be finished.
    failed: bool,
}

impl ZipWriter<BufWriter<File>> {
    /// Creates (or truncates) the file at the given path and writes an archive to it.
    pub fn create<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        let path = path.as_ref();
        debug!("Creating {}", path.display());
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Some(inner),
            files: Vec::new(),
            offset: 0,
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

    /// Compresses `data` in memory, then writes it as the file `name`.
    pub fn add_bytes(&mut self, name: &str, data: &[u8], options: FileOptions) -> ZipResult<()> {
        self.guard(|w| w.write_bytes(name, data, &options))
    }

    /// Writes `size` bytes from `reader` as the file `name`,
    /// compressing them as they go by.
    ///
    /// The local header is rewritten once the data is done,
    /// so nothing gets buffered in memory.
    /// If `reader` yields more or less than `size` bytes, that's an error.
    pub fn add_stream_known_size<R: Read>(
        &mut self,
        name: &str,
        size: u64,
        reader: R,
        options: FileOptions,
    ) -> ZipResult<()> {
        self.guard(|w| w.write_known_size(name, size, reader, &options))
    }

    /// Adds a directory entry. A trailing `/` is added to `name` if it's missing.
    pub fn add_directory(&mut self, name: &str, options: FileOptions) -> ZipResult<()> {
        self.guard(|w| {
            let entry = new_entry(&directory_name(name), &options, w.offset, true)?;
            let header = local_header_bytes(&entry, 0, false)?;
            w.writer()?.write_all(&header)?;
            w.finish_entry(entry, header.len() as u64);
            Ok(())
        })
    }

    /// Writes the central directory and end records, then returns the inner writer.
    pub fn close(mut self) -> ZipResult<W> {
        if self.failed {
            return Err(ZipError::Aborted);
        }
        let trailer = build_central_directory(&self.files, self.offset, &self.comment, self.limits);
        // Once we're this far, there's nothing left for Drop to warn about.
        let mut inner = self.inner.take().ok_or(ZipError::Aborted)?;
        inner.write_all(&trailer?)?;
        inner.flush()?;
        debug!("Closed archive with {} entries", self.files.len());
        Ok(inner)
    }

    /// Runs the given operation, poisoning the writer if it fails.
    fn guard<T, F: FnOnce(&mut Self) -> ZipResult<T>>(&mut self, op: F) -> ZipResult<T> {
        if self.failed {
            return Err(ZipError::Aborted);
        }
        let result = op(self);
        if let Err(e) = &result {
            warn!("Aborting archive: {}", e);
            self.failed = true;
        }
        result
    }

    fn writer(&mut self) -> ZipResult<&mut W> {
        self.inner.as_mut().ok_or(ZipError::Aborted)
    }

    fn finish_entry(&mut self, entry: ZipEntry, bytes_written: u64) {
        debug!("Wrote {:?}", entry);
        self.offset += bytes_written;
        self.files.push(entry);
    }

    fn write_bytes(&mut self, name: &str, data: &[u8], options: &FileOptions) -> ZipResult<()> {
        let mut entry = new_entry(name, options, self.offset, false)?;

        let mut compressed = Vec::new();
        let mut source = data;
        entry.compressed_size = compress(&mut source, &mut compressed, options)?;
        entry.uncompressed_size = data.len() as u64;
        entry.crc32 = crc32fast::hash(data);

        let zip64 = entry.uncompressed_size > self.limits.bytes
            || entry.compressed_size > self.limits.bytes;
        let header = local_header_bytes(&entry, 0, zip64)?;

        let inner = self.writer()?;
        inner.write_all(&header)?;
        inner.write_all(&compressed)?;
        self.finish_entry(entry, (header.len() + compressed.len()) as u64);
        Ok(())
    }

    fn write_known_size<R: Read>(
        &mut self,
        name: &str,
        size: u64,
        mut reader: R,
        options: &FileOptions,
    ) -> ZipResult<()> {
        let mut entry = new_entry(name, options, self.offset, false)?;

        // We find out the compressed size after the header's written,
        // so make room for Zip64 sizes if they could possibly be needed.
        let worst_case = match options.compression_method {
            CompressionMethod::Deflate => size.saturating_add(size / 1000).saturating_add(64),
            _ => size,
        };
        let zip64 = worst_case > self.limits.bytes;
        let placeholder = local_header_bytes(&entry, 0, zip64)?;

        let limit = self.limits.bytes;
        let inner = self.writer()?;
        let header_position = inner.stream_position()?;
        inner.write_all(&placeholder)?;

        let mut source = Crc32Counter::new(reader.by_ref().take(size));
        entry.compressed_size = compress(&mut source, &mut *inner, options)?;
        entry.uncompressed_size = source.count();
        entry.crc32 = source.crc32();

        if entry.uncompressed_size < size {
            return Err(ZipError::InvalidInput(format!(
                "{} ended after {} of {} bytes",
                name, entry.uncompressed_size, size
            )));
        }
        if reader.read(&mut [0u8; 1])? != 0 {
            return Err(ZipError::InvalidInput(format!(
                "{} is longer than the {} bytes promised",
                name, size
            )));
        }
        if !zip64 && entry.compressed_size > limit {
            return Err(ZipError::InvalidInput(format!(
                "{} compressed to {} bytes, past the Zip64 limit of {}",
                name, entry.compressed_size, limit
            )));
        }

        // Same name, same extra field, so the real header fits exactly over the placeholder.
        let header = local_header_bytes(&entry, 0, zip64)?;
        let data_end = inner.stream_position()?;
        inner.seek(SeekFrom::Start(header_position))?;
        inner.write_all(&header)?;
        inner.seek(SeekFrom::Start(data_end))?;

        self.finish_entry(entry, data_end - header_position);
        Ok(())
    }
}

impl<W: Write + Seek> Drop for ZipWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && !self.failed {
            warn!("ZipWriter dropped without close(); the archive is incomplete");
        }
    }
}

/// Counts bytes on their way to the inner writer.
pub(crate) struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Compresses everything `source` has into `out`, returning the compressed size.
pub(crate) fn compress<R: Read, W: Write>(
    source: &mut R,
    out: W,
    options: &FileOptions,
) -> ZipResult<u64> {
    let mut out = CountingWriter::new(out);
    match options.compression_method {
        CompressionMethod::Stored => {
            io::copy(source, &mut out)?;
        }
        CompressionMethod::Deflate => {
            let mut encoder = DeflateEncoder::new(&mut out, options.compression()?);
            io::copy(source, &mut encoder)?;
            encoder.finish()?;
        }
        CompressionMethod::Unsupported(method) => {
            return Err(ZipError::UnsupportedArchive(format!(
                "Compression method {} not supported",
                method
            )))
        }
    }
    Ok(out.count())
}

pub(crate) fn check_comment(comment: &[u8]) -> ZipResult<()> {
    if comment.len() > spec::MAX_FIELD_LENGTH {
        return Err(ZipError::InvalidInput(format!(
            "Archive comment is {} bytes, more than 65535",
            comment.len()
        )));
    }
    Ok(())
}

pub(crate) fn directory_name(name: &str) -> String {
    if name.ends_with('/') {
        name.to_owned()
    } else {
        format!("{}/", name)
    }
}

/// Starts the metadata for an entry whose header goes at `header_offset`.
/// Its CRC and sizes are filled in once its data is written.
pub(crate) fn new_entry(
    name: &str,
    options: &FileOptions,
    header_offset: u64,
    is_dir: bool,
) -> ZipResult<ZipEntry> {
    if name.is_empty() {
        return Err(ZipError::InvalidInput("Entry names can't be empty".to_owned()));
    }
    if name.len() > spec::MAX_FIELD_LENGTH {
        return Err(ZipError::InvalidInput(format!(
            "Entry name is {} bytes, more than 65535",
            name.len()
        )));
    }

    let general_purpose_flags = if name.is_ascii() { 0 } else { spec::FLAG_UTF8 };
    let (mode, external_attributes, compression_method) = if is_dir {
        let mode = spec::UNIX_DIRECTORY_MODE | options.permissions.unwrap_or(0o755);
        (
            mode,
            (mode << 16) | spec::DOS_DIRECTORY_ATTRIBUTE,
            CompressionMethod::Stored,
        )
    } else {
        let mode = spec::UNIX_FILE_MODE | options.permissions.unwrap_or(0o644);
        (mode, mode << 16, options.compression_method)
    };

    Ok(ZipEntry {
        name: name.to_owned(),
        uncompressed_size: 0,
        compressed_size: 0,
        compression_method,
        crc32: 0,
        local_header_offset: header_offset,
        general_purpose_flags,
        last_modified: Some(options.last_modified),
        external_attributes,
        unix_mode: Some(mode),
    })
}

fn msdos_time(entry: &ZipEntry) -> (u16, u16) {
    match &entry.last_modified {
        Some(time) => spec::to_msdos(time),
        // 1980-01-01
        None => (0, (1 << 5) | 1),
    }
}

/// Serializes an entry's local header, with `extra_flags` on top of its own.
///
/// If `zip64` is set, both sizes go in a Zip64 extra field,
/// leaving sentinels in their usual spots.
pub(crate) fn local_header_bytes(
    entry: &ZipEntry,
    extra_flags: u16,
    zip64: bool,
) -> ZipResult<Vec<u8>> {
    let (compressed_size, uncompressed_size, extra_field, version) = if zip64 {
        let extra_field = Zip64ExtraField {
            uncompressed_size: Some(entry.uncompressed_size),
            compressed_size: Some(entry.compressed_size),
            header_offset: None,
        };
        (
            spec::SENTINEL_U32,
            spec::SENTINEL_U32,
            extra_field.to_bytes(),
            spec::VERSION_ZIP64,
        )
    } else {
        (
            narrow(entry.compressed_size, &entry.name)?,
            narrow(entry.uncompressed_size, &entry.name)?,
            Vec::new(),
            spec::VERSION_DEFAULT,
        )
    };
    let (last_modified_time, last_modified_date) = msdos_time(entry);

    let header = LocalFileHeader {
        minimum_extract_version: version,
        flags: entry.general_purpose_flags | extra_flags,
        compression_method: entry.compression_method.to_u16(),
        last_modified_time,
        last_modified_date,
        crc32: entry.crc32,
        compressed_size,
        uncompressed_size,
        path: entry.name.as_bytes(),
        extra_field: &extra_field,
    };
    let mut bytes =
        Vec::with_capacity(LocalFileHeader::FIXED_SIZE + entry.name.len() + extra_field.len());
    header.write(&mut bytes)?;
    Ok(bytes)
}

fn narrow(size: u64, name: &str) -> ZipResult<u32> {
    u32::try_from(size).map_err(|_| {
        ZipError::InvalidInput(format!("{} is too big ({} bytes) without Zip64", name, size))
    })
}

/// Serializes the central directory for `files`, starting at `central_directory_offset`,
/// followed by the Zip64 end records if anything overflowed, then the end record.
pub(crate) fn build_central_directory(
    files: &[ZipEntry],
    central_directory_offset: u64,
    comment: &[u8],
    limits: Zip64Limits,
) -> ZipResult<Vec<u8>> {
    check_comment(comment)?;
    let mut out = Vec::new();

    for file in files {
        let (uncompressed_size, uncompressed64) =
            spec::promote(file.uncompressed_size, limits.bytes);
        let (compressed_size, compressed64) = spec::promote(file.compressed_size, limits.bytes);
        let (header_offset, offset64) = spec::promote(file.local_header_offset, limits.bytes);
        let zip64 = Zip64ExtraField {
            uncompressed_size: uncompressed64,
            compressed_size: compressed64,
            header_offset: offset64,
        };
        let version = if zip64.is_empty() {
            spec::VERSION_DEFAULT
        } else {
            spec::VERSION_ZIP64
        };
        let extra_field = zip64.to_bytes();
        let (last_modified_time, last_modified_date) = msdos_time(file);

        let record = CentralDirectoryEntry {
            source_version: System::Unix.version_made_by(version),
            minimum_extract_version: version,
            flags: file.general_purpose_flags,
            compression_method: file.compression_method.to_u16(),
            last_modified_time,
            last_modified_date,
            crc32: file.crc32,
            compressed_size,
            uncompressed_size,
            disk_number: 0,
            internal_file_attributes: 0,
            external_file_attributes: file.external_attributes,
            header_offset,
            path: file.name.as_bytes(),
            extra_field: &extra_field,
            file_comment: &[],
        };
        trace!("{:?}", record);
        record.write(&mut out)?;
    }

    let central_directory_size = out.len() as u64;
    let entries = files.len() as u64;
    let (entries16, entries64) = spec::promote_count(entries, limits.entries);
    let (size32, size64) = spec::promote(central_directory_size, limits.bytes);
    let (offset32, offset64) = spec::promote(central_directory_offset, limits.bytes);

    if entries64 || size64.is_some() || offset64.is_some() {
        let zip64_eocdr = Zip64EndOfCentralDirectory {
            record_size: (Zip64EndOfCentralDirectory::SIZE - 12) as u64,
            source_version: System::Unix.version_made_by(spec::VERSION_ZIP64),
            minimum_extract_version: spec::VERSION_ZIP64,
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: entries,
            entries,
            central_directory_size,
            central_directory_offset,
        };
        trace!("{:?}", zip64_eocdr);
        zip64_eocdr.write(&mut out)?;

        let locator = Zip64EndOfCentralDirectoryLocator {
            disk_with_central_directory: 0,
            zip64_eocdr_offset: central_directory_offset + central_directory_size,
            disks: 1,
        };
        trace!("{:?}", locator);
        locator.write(&mut out)?;
    }

    let eocdr = EndOfCentralDirectory {
        disk_number: 0,
        disk_with_central_directory: 0,
        entries_on_this_disk: entries16,
        entries: entries16,
        central_directory_size: size32,
        central_directory_offset: offset32,
        file_comment: comment,
    };
    trace!("{:?}", eocdr);
    eocdr.write(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    use chrono::NaiveDate;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 8, 15)
            .unwrap()
            .and_hms_opt(20, 45, 6)
            .unwrap()
    }

    #[test]
    fn write_empty_zip() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.set_comment("ZIP").unwrap();
        let result = writer.close().unwrap();
        assert_eq!(
            *result.get_ref(),
            [80, 75, 5, 6, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 90, 73, 80]
        );
    }

    #[test]
    fn write_zip_dir() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_directory("test", FileOptions::default().last_modified_time(fixed_time()))
            .unwrap();
        let result = writer.close().unwrap().into_inner();
        assert_eq!(
            result,
            &[
                80u8, 75, 3, 4, 20, 0, 0, 0, 0, 0, 163, 165, 15, 77, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 0, 5, 0, 0, 0, 116, 101, 115, 116, 47, 80, 75, 1, 2, 20, 3, 20, 0, 0, 0, 0, 0,
                163, 165, 15, 77, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 16, 0, 237, 65, 0, 0, 0, 0, 116, 101, 115, 116, 47, 80, 75, 5, 6, 0, 0, 0, 0,
                1, 0, 1, 0, 51, 0, 0, 0, 35, 0, 0, 0, 0, 0
            ] as &[u8]
        );
    }

    #[test]
    fn non_ascii_names_are_flagged() {
        let entry = new_entry("caf\u{e9}.txt", &FileOptions::default(), 0, false).unwrap();
        assert_eq!(entry.general_purpose_flags, spec::FLAG_UTF8);
        let entry = new_entry("cafe.txt", &FileOptions::default(), 0, false).unwrap();
        assert_eq!(entry.general_purpose_flags, 0);
    }

    #[test]
    fn bad_names_are_rejected() {
        let options = FileOptions::default();
        assert!(matches!(
            new_entry("", &options, 0, false),
            Err(ZipError::InvalidInput(_))
        ));
        let long = "x".repeat(spec::MAX_FIELD_LENGTH + 1);
        assert!(matches!(
            new_entry(&long, &options, 0, false),
            Err(ZipError::InvalidInput(_))
        ));
    }

    #[test]
    fn errors_abort_the_writer() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        assert!(matches!(
            writer.set_comment(vec![0u8; spec::MAX_FIELD_LENGTH + 1]),
            Err(ZipError::InvalidInput(_))
        ));
        assert!(matches!(
            writer.add_bytes("a.txt", b"hello", FileOptions::default()),
            Err(ZipError::Aborted)
        ));
        assert!(matches!(writer.close(), Err(ZipError::Aborted)));
    }

    #[test]
    fn bad_compression_level() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_level(10);
        assert!(matches!(
            writer.add_bytes("a.txt", b"hello", options),
            Err(ZipError::InvalidInput(_))
        ));
    }

    #[test]
    fn limits_are_clamped() {
        let limits = Zip64Limits::new(u64::MAX, u64::MAX);
        assert_eq!(limits, Zip64Limits::default());
        assert_eq!(limits.bytes(), 0xFFFF_FFFE);
        assert_eq!(limits.entries(), 0xFFFE);
        let low = Zip64Limits::new(100, 2);
        assert_eq!((low.bytes(), low.entries()), (100, 2));
    }

    #[test]
    fn zip64_local_header_has_both_sizes() {
        let mut entry = new_entry("big", &FileOptions::default(), 0, false).unwrap();
        entry.uncompressed_size = 0x1_0000_0000;
        entry.compressed_size = 12;
        let header = local_header_bytes(&entry, 0, true).unwrap();
        // Version needed
        assert_eq!(&header[4..6], &45u16.to_le_bytes());
        // Both sizes are sentinels
        assert_eq!(&header[18..26], &[0xff; 8]);
        let extra = &header[LocalFileHeader::FIXED_SIZE + 3..];
        assert_eq!(&extra[..4], &[1, 0, 16, 0]);
        assert_eq!(&extra[4..12], &0x1_0000_0000u64.to_le_bytes());
        assert_eq!(&extra[12..20], &12u64.to_le_bytes());
    }

    #[test]
    fn central_directory_promotes_fields_independently() {
        let mut entry = new_entry("a", &FileOptions::default(), 200, false).unwrap();
        entry.uncompressed_size = 50;
        entry.compressed_size = 150;
        let bytes =
            build_central_directory(&[entry], 300, &[], Zip64Limits::new(100, 10)).unwrap();

        // Only the compressed size and offset overflowed.
        assert_eq!(&bytes[20..24], &[0xff; 4]);
        assert_eq!(&bytes[24..28], &50u32.to_le_bytes());
        assert_eq!(&bytes[42..46], &[0xff; 4]);
        let extra = &bytes[CentralDirectoryEntry::FIXED_SIZE + 1..];
        assert_eq!(&extra[..4], &[1, 0, 16, 0]);
        assert_eq!(&extra[4..12], &150u64.to_le_bytes());
        assert_eq!(&extra[12..20], &200u64.to_le_bytes());

        // The central directory starts past the limit, so Zip64 end records follow it.
        let central_directory_size = CentralDirectoryEntry::FIXED_SIZE + 1 + 20;
        let zip64_eocdr = &bytes[central_directory_size..];
        assert_eq!(&zip64_eocdr[..4], &spec::ZIP64_EOCDR_MAGIC);
        assert_eq!(&zip64_eocdr[4..12], &44u64.to_le_bytes());
        let locator = &zip64_eocdr[Zip64EndOfCentralDirectory::SIZE..];
        assert_eq!(&locator[..4], &spec::ZIP64_EOCDR_LOCATOR_MAGIC);
        assert_eq!(
            &locator[8..16],
            &(300 + central_directory_size as u64).to_le_bytes()
        );
        let eocdr = &locator[Zip64EndOfCentralDirectoryLocator::SIZE..];
        assert_eq!(eocdr.len(), EndOfCentralDirectory::SIZE);
        // One entry still fits, but the offset doesn't.
        assert_eq!(&eocdr[8..12], &[1, 0, 1, 0]);
        assert_eq!(&eocdr[16..20], &[0xff; 4]);
    }
}
