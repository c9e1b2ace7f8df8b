//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, open it with [`ZipArchive::open()`],
//! or hand [`ZipArchive::new()`] anything that's `Read + Seek`.
//! The central directory is read once, up front;
//! after that, the archive's index never changes.
//!
//! [`ZipArchive::open()`]: struct.ZipArchive.html#method.open
//! [`ZipArchive::new()`]: struct.ZipArchive.html#method.new

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::NaiveDateTime;
use flate2::read::DeflateDecoder;
use log::*;

use crate::arch::usize;
use crate::crc32::Crc32Reader;
use crate::result::*;
use crate::spec::{
    self, CentralDirectoryEntry, DataDescriptor, EndOfCentralDirectory, FieldReader,
    LocalFileHeader, Zip64EndOfCentralDirectory, Zip64EndOfCentralDirectoryLocator, Zip64Values,
};

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    Stored,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

/// Metadata for a file or directory in the archive,
/// retrieved from its central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// The path of the file inside the archive, `/`-separated.
    ///
    /// This comes straight from the archive;
    /// see [`enclosed_name()`](../extract/fn.enclosed_name.html)
    /// before using it to touch the filesystem.
    pub name: String,

    /// Uncompressed size of the file in bytes
    pub uncompressed_size: u64,

    /// Compressed size of the file in bytes
    pub compressed_size: u64,

    /// Compression algorithm used to store the file
    pub compression_method: CompressionMethod,

    /// The CRC-32 of the decompressed file
    pub crc32: u32,

    /// The offset to the local file header in the archive
    pub local_header_offset: u64,

    /// The general purpose bit flag from the central directory
    pub general_purpose_flags: u16,

    /// When the file was last modified, if the archive recorded a valid date
    pub last_modified: Option<NaiveDateTime>,

    /// Host-specific file attributes
    pub external_attributes: u32,

    /// Unix mode bits, if the file was archived in a Unix OS.
    ///
    /// This library does _not_ try to convert DOS permission bits into
    /// roughly-equivalent Unix mode bits, or do other cross-OS handwaving.
    pub unix_mode: Option<u32>,
}

impl ZipEntry {
    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
            || spec::attributes_say_directory(self.external_attributes, self.unix_mode)
    }

    /// Returns true if the given entry is a file
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// True if the file is encrypted (decryption is unsupported)
    pub fn is_encrypted(&self) -> bool {
        spec::is_encrypted(self.general_purpose_flags)
    }
}

/// A ZIP archive to be read
///
/// Each archive owns its own handle to the underlying file,
/// so several `ZipArchive`s can read the same file at once
/// (so long as nobody's writing to it).
pub struct ZipArchive<R> {
    /// The archive itself. `None` once closed.
    reader: Option<R>,
    /// Total length of the archive, which bounds every offset in it
    archive_len: u64,
    /// Entries from the ZIP's central directory, in order
    entries: Vec<ZipEntry>,
    /// Maps names to their index in `entries`
    index: HashMap<String, usize>,
    /// The archive comment
    comment: Vec<u8>,
}

impl ZipArchive<File> {
    /// Opens the ZIP archive at the given path.
    ///
    /// ```no_run
    /// # use ziprw::*;
    /// let mut archive = ZipArchive::open("foo.zip")?;
    /// for name in archive.list() {
    ///     println!("{}", name);
    /// }
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> ZipResult<Self> {
        let path = path.as_ref();
        debug!("Opening {}", path.display());
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Reads a ZIP archive's central directory from the given source.
    ///
    /// Smaller archives can be read into a buffer and wrapped in a `Cursor`:
    ///
    /// ```no_run
    /// # use std::fs;
    /// # use std::io::Cursor;
    /// # use ziprw::*;
    /// let bytes = fs::read("foo.zip")?;
    /// let archive = ZipArchive::new(Cursor::new(bytes))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(mut reader: R) -> ZipResult<Self> {
        let archive_len = reader.seek(SeekFrom::End(0))?;

        // The EOCDR is 22 bytes, followed by a comment of at most 64K,
        // so it must start somewhere in the last 65557 bytes.
        let tail_len =
            archive_len.min((EndOfCentralDirectory::SIZE + spec::MAX_FIELD_LENGTH) as u64);
        let tail_offset = archive_len - tail_len;
        let tail = read_at(
            &mut reader,
            tail_offset,
            usize(tail_len)?,
            archive_len,
            "end of central directory",
        )?;
        let eocdr_posit = spec::find_eocdr(&tail, tail_offset)?;
        let eocdr_offset = tail_offset + eocdr_posit as u64;
        let eocdr = EndOfCentralDirectory::parse(&tail[eocdr_posit..], eocdr_offset)?;
        trace!("{:?}", eocdr);

        if eocdr.disk_number != eocdr.disk_with_central_directory {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: disk ({}) != disk with central directory ({})",
                eocdr.disk_number, eocdr.disk_with_central_directory
            )));
        }
        if eocdr.entries != eocdr.entries_on_this_disk {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: entries ({}) != entries this disk ({})",
                eocdr.entries, eocdr.entries_on_this_disk
            )));
        }

        let locator = match eocdr_offset.checked_sub(Zip64EndOfCentralDirectoryLocator::SIZE as u64)
        {
            Some(locator_offset) => {
                let bytes = read_at(
                    &mut reader,
                    locator_offset,
                    Zip64EndOfCentralDirectoryLocator::SIZE,
                    archive_len,
                    "Zip64 end of central directory locator",
                )?;
                Zip64EndOfCentralDirectoryLocator::parse(&bytes, locator_offset)?
                    .map(|locator| (locator, locator_offset))
            }
            None => None,
        };

        // Where the central directory is, how big it is, how many entries it holds,
        // and the record after it (which it can't run into).
        let entry_count: u64;
        let central_directory_size: u64;
        let central_directory_offset: u64;
        let central_directory_limit: u64;

        if let Some((locator, locator_offset)) = locator {
            trace!("{:?}", locator);
            let zip64_eocdr = read_zip64_eocdr(&mut reader, &locator, locator_offset)?;
            trace!("{:?}", zip64_eocdr);

            if eocdr.disk_number as u32 != zip64_eocdr.disk_number
                || zip64_eocdr.disk_number != zip64_eocdr.disk_with_central_directory
                || zip64_eocdr.entries != zip64_eocdr.entries_on_this_disk
            {
                return Err(ZipError::UnsupportedArchive(format!(
                    "No support for multi-disk archives: Zip64 EOCDR reports disk {}, \
                     central directory on disk {}, and {} of {} entries on this disk",
                    zip64_eocdr.disk_number,
                    zip64_eocdr.disk_with_central_directory,
                    zip64_eocdr.entries_on_this_disk,
                    zip64_eocdr.entries
                )));
            }

            entry_count = zip64_eocdr.entries;
            central_directory_size = zip64_eocdr.central_directory_size;
            central_directory_offset = zip64_eocdr.central_directory_offset;
            central_directory_limit = locator.zip64_eocdr_offset;
        } else if eocdr.has_sentinels() {
            return Err(ZipError::invalid(
                "end of central directory",
                eocdr_offset,
                "Zip64 sentinel values without a Zip64 End Of Central Directory Locator",
            ));
        } else {
            entry_count = eocdr.entries as u64;
            central_directory_size = eocdr.central_directory_size as u64;
            central_directory_offset = eocdr.central_directory_offset as u64;
            central_directory_limit = eocdr_offset;
        }

        let fits = central_directory_offset
            .checked_add(central_directory_size)
            .is_some_and(|end| end <= central_directory_limit);
        if !fits {
            return Err(ZipError::invalid(
                "central directory",
                central_directory_offset,
                format!(
                    "{} bytes of central directory would run past the record at {}",
                    central_directory_size, central_directory_limit
                ),
            ));
        }
        // Don't let a bogus entry count make us allocate the world.
        let plausible = entry_count
            .checked_mul(CentralDirectoryEntry::FIXED_SIZE as u64)
            .is_some_and(|minimum| minimum <= central_directory_size);
        if !plausible {
            return Err(ZipError::invalid(
                "central directory",
                central_directory_offset,
                format!(
                    "{} entries can't fit in {} bytes",
                    entry_count, central_directory_size
                ),
            ));
        }

        trace!(
            "{} entries in {} bytes at offset {}",
            entry_count,
            central_directory_size,
            central_directory_offset
        );

        let central_directory_bytes = read_at(
            &mut reader,
            central_directory_offset,
            usize(central_directory_size)?,
            archive_len,
            "central directory",
        )?;
        let mut central_directory = FieldReader::new(
            &central_directory_bytes,
            "central directory entry",
            central_directory_offset,
        );

        let capacity = usize(entry_count)?;
        let mut entries: Vec<ZipEntry> = Vec::with_capacity(capacity);
        let mut index = HashMap::with_capacity(capacity);

        for _ in 0..entry_count {
            let record_offset = central_directory.position();
            let dir_entry = CentralDirectoryEntry::parse_and_consume(&mut central_directory)?;
            trace!("{:?}", dir_entry);

            let entry = ZipEntry::from_cde(&dir_entry, record_offset)?;
            validate_entry(&entry, record_offset, archive_len)?;
            debug!("{:?}", entry);

            // The format allows duplicate names. The last one wins,
            // but keeps the position of the first so list() names each once.
            match index.get(&entry.name) {
                Some(&existing) => {
                    warn!("Duplicate entry for {}; using the later one", entry.name);
                    entries[existing] = entry;
                }
                None => {
                    index.insert(entry.name.clone(), entries.len());
                    entries.push(entry);
                }
            }
        }

        Ok(ZipArchive {
            reader: Some(reader),
            archive_len,
            entries,
            index,
            comment: eocdr.file_comment.to_vec(),
        })
    }

    /// Returns the name of every entry, in central directory order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Returns the entries found in the ZIP archive's central directory.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by name, or `None` if there isn't one.
    pub fn get_info(&self, name: &str) -> Option<&ZipEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// The archive comment
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Opens the named entry for reading.
    ///
    /// The returned reader decompresses lazily and checks the entry's CRC32
    /// once it's exhausted, returning an error instead of EOF if it doesn't match.
    pub fn open_entry(&mut self, name: &str) -> ZipResult<ZipEntryReader<'_>> {
        let entry = self
            .index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| ZipError::NoSuchFile(name.to_owned()))?;
        let reader = self.reader.as_mut().ok_or(ZipError::Closed)?;
        read_entry(reader, entry, self.archive_len)
    }

    /// Releases the underlying file. Calling this more than once is harmless;
    /// opening entries afterwards fails with [`ZipError::Closed`].
    ///
    /// [`ZipError::Closed`]: ../result/enum.ZipError.html#variant.Closed
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("Closed archive");
        }
    }
}

/// Reads `len` bytes at `offset`, which must lie inside the archive.
fn read_at<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    len: usize,
    archive_len: u64,
    record: &'static str,
) -> ZipResult<Vec<u8>> {
    let in_bounds = offset
        .checked_add(len as u64)
        .is_some_and(|end| end <= archive_len);
    if !in_bounds {
        return Err(ZipError::invalid(
            record,
            offset,
            format!(
                "{} bytes would run past the end of the archive ({} bytes)",
                len, archive_len
            ),
        ));
    }
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ZipError::invalid(record, offset, "archive ended early"),
        _ => ZipError::from(e),
    })?;
    Ok(buf)
}

fn read_zip64_eocdr<R: Read + Seek>(
    reader: &mut R,
    locator: &Zip64EndOfCentralDirectoryLocator,
    locator_offset: u64,
) -> ZipResult<Zip64EndOfCentralDirectory> {
    if locator.disk_with_central_directory != 0 || locator.disks != 1 {
        return Err(ZipError::UnsupportedArchive(format!(
            "No support for multi-disk archives: Zip64 EOCDR locator reports disk {} of {}",
            locator.disk_with_central_directory, locator.disks
        )));
    }

    let offset = locator.zip64_eocdr_offset;
    let bytes = read_at(
        reader,
        offset,
        Zip64EndOfCentralDirectory::SIZE,
        locator_offset,
        "Zip64 end of central directory",
    )?;
    let zip64_eocdr = Zip64EndOfCentralDirectory::parse(&bytes, offset)?;

    // Any extensible data has to fit before the locator, too.
    let fits = offset
        .checked_add(zip64_eocdr.size_in_file())
        .is_some_and(|end| end <= locator_offset);
    if !fits {
        return Err(ZipError::invalid(
            "Zip64 end of central directory",
            offset,
            format!(
                "a {}-byte record would overlap its locator at {}",
                zip64_eocdr.size_in_file(),
                locator_offset
            ),
        ));
    }
    Ok(zip64_eocdr)
}

/// Sanity-checks what the central directory told us about an entry
/// before anyone tries to read it.
fn validate_entry(entry: &ZipEntry, record_offset: u64, archive_len: u64) -> ZipResult<()> {
    if entry.compression_method == CompressionMethod::Stored
        && entry.compressed_size != entry.uncompressed_size
    {
        return Err(ZipError::invalid(
            "central directory entry",
            record_offset,
            format!(
                "stored file {} is {} bytes compressed but {} bytes uncompressed",
                entry.name, entry.compressed_size, entry.uncompressed_size
            ),
        ));
    }
    let fits = entry
        .local_header_offset
        .checked_add(LocalFileHeader::FIXED_SIZE as u64)
        .and_then(|data| data.checked_add(entry.compressed_size))
        .is_some_and(|end| end <= archive_len);
    if !fits {
        return Err(ZipError::invalid(
            "central directory entry",
            record_offset,
            format!(
                "{} ({} bytes at offset {}) runs past the end of the archive ({} bytes)",
                entry.name, entry.compressed_size, entry.local_header_offset, archive_len
            ),
        ));
    }
    Ok(())
}

/// Finds the entry's data via its local header and wraps it in a reader.
fn read_entry<'a, R: Read + Seek>(
    reader: &'a mut R,
    entry: &ZipEntry,
    archive_len: u64,
) -> ZipResult<ZipEntryReader<'a>> {
    if entry.is_encrypted() {
        return Err(ZipError::UnsupportedArchive(format!(
            "Can't read encrypted file {}",
            entry.name
        )));
    }

    let header_offset = entry.local_header_offset;
    let fixed = read_at(
        reader,
        header_offset,
        LocalFileHeader::FIXED_SIZE,
        archive_len,
        "local file header",
    )?;
    let variable_length = LocalFileHeader::variable_length(&fixed, header_offset)?;
    let header_bytes = read_at(
        reader,
        header_offset,
        LocalFileHeader::FIXED_SIZE + variable_length,
        archive_len,
        "local file header",
    )?;
    let local_header = LocalFileHeader::parse(&header_bytes, header_offset)?;
    trace!("{:?}", local_header);

    let data_offset = header_offset + local_header.size_in_file();
    let data_end = data_offset
        .checked_add(entry.compressed_size)
        .filter(|&end| end <= archive_len)
        .ok_or_else(|| {
            ZipError::invalid(
                "file data",
                data_offset,
                format!(
                    "{} bytes of {} would run past the end of the archive ({} bytes)",
                    entry.compressed_size, entry.name, archive_len
                ),
            )
        })?;

    if cfg!(feature = "check-local-metadata") {
        check_local_header(entry, &local_header, header_offset)?;
        if spec::has_data_descriptor(local_header.flags) {
            check_data_descriptor(reader, entry, data_end, archive_len)?;
        }
    }

    debug!("Reading {} from offset {}", entry.name, data_offset);
    reader.seek(SeekFrom::Start(data_offset))?;
    make_reader(entry, data_offset, reader.take(entry.compressed_size))
}

fn metadata_mismatch(record: &'static str, offset: u64, what: &str) -> ZipError {
    ZipError::invalid(
        record,
        offset,
        format!("{} doesn't match the central directory", what),
    )
}

/// Makes sure the local header agrees with the central directory,
/// guarding against tampered (or just broken) archives.
fn check_local_header(entry: &ZipEntry, local: &LocalFileHeader, offset: u64) -> ZipResult<()> {
    const RECORD: &str = "local file header";

    if spec::decode_name(local.path, local.flags)? != entry.name {
        return Err(metadata_mismatch(RECORD, offset, "file name"));
    }
    if local.compression_method != entry.compression_method.to_u16() {
        return Err(metadata_mismatch(RECORD, offset, "compression method"));
    }
    // Streaming writers set the data descriptor bit locally but not centrally.
    if (local.flags ^ entry.general_purpose_flags) & !spec::FLAG_DATA_DESCRIPTOR != 0 {
        return Err(metadata_mismatch(RECORD, offset, "general purpose flags"));
    }
    // If the sizes and CRC trail the data, they're zero (or junk) here.
    if spec::has_data_descriptor(local.flags) {
        return Ok(());
    }

    if local.crc32 != entry.crc32 {
        return Err(metadata_mismatch(RECORD, offset, "CRC32"));
    }
    let mut values = Zip64Values {
        uncompressed_size: local.uncompressed_size.into(),
        compressed_size: local.compressed_size.into(),
        header_offset: 0,
        disk_number: 0,
    };
    let extra_field_offset = offset + (LocalFileHeader::FIXED_SIZE + local.path.len()) as u64;
    values.apply_extra_field(local.extra_field, extra_field_offset)?;
    if values.uncompressed_size != entry.uncompressed_size
        || values.compressed_size != entry.compressed_size
    {
        return Err(metadata_mismatch(RECORD, offset, "file size"));
    }
    Ok(())
}

/// Makes sure the data descriptor after a streamed entry
/// agrees with the central directory.
fn check_data_descriptor<R: Read + Seek>(
    reader: &mut R,
    entry: &ZipEntry,
    offset: u64,
    archive_len: u64,
) -> ZipResult<()> {
    let available = (archive_len - offset).min(DataDescriptor::MAX_SIZE as u64);
    let bytes = read_at(reader, offset, usize(available)?, archive_len, "data descriptor")?;
    let expected = DataDescriptor {
        crc32: entry.crc32,
        compressed_size: entry.compressed_size,
        uncompressed_size: entry.uncompressed_size,
    };
    // Nothing says whether the writer used 32 or 64-bit sizes, so try both.
    let matches = [false, true].into_iter().any(|zip64| {
        DataDescriptor::parse(&bytes, zip64, offset).is_ok_and(|found| found == expected)
    });
    if !matches {
        return Err(metadata_mismatch("data descriptor", offset, "data descriptor"));
    }
    Ok(())
}

/// Returns a reader for a compressed file, which checks both the file's
/// size and its CRC against what the central directory recorded.
fn make_reader<'a, R: io::Read + 'a>(
    entry: &ZipEntry,
    data_offset: u64,
    reader: R,
) -> ZipResult<ZipEntryReader<'a>> {
    let size = entry.uncompressed_size;
    let inner: Box<dyn io::Read + 'a> = match entry.compression_method {
        CompressionMethod::Stored => Box::new(Crc32Reader::new(
            ExpectedSize::new(reader, size, data_offset),
            entry.crc32,
        )),
        CompressionMethod::Deflate => {
            let deflate_reader = DecompressionErrors(DeflateDecoder::new(reader));
            Box::new(Crc32Reader::new(
                ExpectedSize::new(deflate_reader, size, data_offset),
                entry.crc32,
            ))
        }
        CompressionMethod::Unsupported(method) => {
            return Err(ZipError::UnsupportedArchive(format!(
                "Compression method {} not supported",
                method
            )))
        }
    };
    Ok(ZipEntryReader { inner })
}

/// Fails once a file's data runs past its recorded size, or ends short of it.
///
/// Reads are capped one byte past the end, so an oversized file
/// never hands back more than we expected.
struct ExpectedSize<R> {
    inner: R,
    expected: u64,
    produced: u64,
    /// Where the file's data starts, for errors
    offset: u64,
}

impl<R> ExpectedSize<R> {
    fn new(inner: R, expected: u64, offset: u64) -> Self {
        Self {
            inner,
            expected,
            produced: 0,
            offset,
        }
    }

    fn error(&self, reason: String) -> io::Error {
        ZipError::invalid("file data", self.offset, reason).into()
    }
}

impl<R: Read> Read for ExpectedSize<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let room = self.expected.saturating_sub(self.produced).saturating_add(1);
        let len = buf.len().min(usize::try_from(room).unwrap_or(usize::MAX));
        let count = self.inner.read(&mut buf[..len])?;

        if count == 0 && self.produced < self.expected {
            return Err(self.error(format!(
                "ended after {} of {} bytes",
                self.produced, self.expected
            )));
        }
        self.produced += count as u64;
        if self.produced > self.expected {
            return Err(self.error(format!("more than the {} bytes recorded", self.expected)));
        }
        Ok(count)
    }
}

/// Marks errors from the decompressor as such,
/// so callers can tell a corrupt stream from a failing disk.
struct DecompressionErrors<R>(R);

impl<R: Read> Read for DecompressionErrors<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                ZipError::Compression(e).into()
            }
            _ => e,
        })
    }
}

/// A single pass over an entry's decompressed contents.
///
/// CRC and decompression failures surface as `io::Error`s from `read()`;
/// `ZipError::from()` (or [`read_all()`](#method.read_all)) recovers them.
pub struct ZipEntryReader<'a> {
    inner: Box<dyn io::Read + 'a>,
}

impl ZipEntryReader<'_> {
    /// Reads the rest of the entry, verifying its CRC32.
    pub fn read_all(&mut self) -> ZipResult<Vec<u8>> {
        let mut contents = Vec::new();
        self.inner.read_to_end(&mut contents)?;
        Ok(contents)
    }
}

impl io::Read for ZipEntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    use crate::spec::*;

    /// Hand-builds a one-file stored archive, with knobs for breaking it.
    struct Fixture {
        data: &'static [u8],
        flags: u16,
        method: u16,
        central_name: &'static [u8],
        local_name: &'static [u8],
    }

    impl Default for Fixture {
        fn default() -> Self {
            Self {
                data: b"hello",
                flags: 0,
                method: 0,
                central_name: b"a.txt",
                local_name: b"a.txt",
            }
        }
    }

    impl Fixture {
        fn build(&self) -> Vec<u8> {
            let crc32 = crc32fast::hash(self.data);
            let size = self.data.len() as u32;
            let mut out = Vec::new();
            LocalFileHeader {
                minimum_extract_version: VERSION_DEFAULT,
                flags: self.flags,
                compression_method: self.method,
                last_modified_time: 0,
                last_modified_date: (1 << 5) | 1,
                crc32,
                compressed_size: size,
                uncompressed_size: size,
                path: self.local_name,
                extra_field: &[],
            }
            .write(&mut out)
            .unwrap();
            out.extend_from_slice(self.data);

            let central_directory_offset = out.len() as u32;
            CentralDirectoryEntry {
                source_version: System::Unix.version_made_by(VERSION_DEFAULT),
                minimum_extract_version: VERSION_DEFAULT,
                flags: self.flags,
                compression_method: self.method,
                last_modified_time: 0,
                last_modified_date: (1 << 5) | 1,
                crc32,
                compressed_size: size,
                uncompressed_size: size,
                disk_number: 0,
                internal_file_attributes: 0,
                external_file_attributes: 0o100644 << 16,
                header_offset: 0,
                path: self.central_name,
                extra_field: &[],
                file_comment: &[],
            }
            .write(&mut out)
            .unwrap();
            let central_directory_size = out.len() as u32 - central_directory_offset;

            EndOfCentralDirectory {
                disk_number: 0,
                disk_with_central_directory: 0,
                entries_on_this_disk: 1,
                entries: 1,
                central_directory_size,
                central_directory_offset,
                file_comment: b"fixture",
            }
            .write(&mut out)
            .unwrap();
            out
        }
    }

    fn open(bytes: Vec<u8>) -> ZipResult<ZipArchive<Cursor<Vec<u8>>>> {
        ZipArchive::new(Cursor::new(bytes))
    }

    /// Where the EOCDR's central directory offset lives in a fixture
    fn eocdr_field(bytes: &[u8], field_offset: usize) -> usize {
        bytes.len() - b"fixture".len() - EndOfCentralDirectory::SIZE + field_offset
    }

    #[test]
    fn reads_fixture() {
        let mut archive = open(Fixture::default().build()).unwrap();
        assert_eq!(archive.list(), vec!["a.txt"]);
        assert_eq!(archive.comment(), b"fixture");
        let entry = archive.get_info("a.txt").unwrap();
        assert_eq!(entry.uncompressed_size, 5);
        assert_eq!(entry.unix_mode, Some(0o100644));
        assert!(entry.is_file());
        assert_eq!(archive.open_entry("a.txt").unwrap().read_all().unwrap(), b"hello");
        assert!(archive.get_info("b.txt").is_none());
        assert!(matches!(
            archive.open_entry("b.txt"),
            Err(ZipError::NoSuchFile(_))
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let mut archive = open(Fixture::default().build()).unwrap();
        archive.close();
        archive.close();
        // The index outlives the handle.
        assert_eq!(archive.list(), vec!["a.txt"]);
        assert!(matches!(archive.open_entry("a.txt"), Err(ZipError::Closed)));
    }

    #[test]
    fn encrypted_entries_are_unsupported() {
        let mut archive = open(
            Fixture {
                flags: FLAG_ENCRYPTED,
                ..Default::default()
            }
            .build(),
        )
        .unwrap();
        assert!(archive.get_info("a.txt").unwrap().is_encrypted());
        assert!(matches!(
            archive.open_entry("a.txt"),
            Err(ZipError::UnsupportedArchive(_))
        ));
    }

    #[test]
    fn unknown_methods_are_unsupported() {
        let mut archive = open(
            Fixture {
                method: 12,
                ..Default::default()
            }
            .build(),
        )
        .unwrap();
        assert_eq!(
            archive.get_info("a.txt").unwrap().compression_method,
            CompressionMethod::Unsupported(12)
        );
        assert!(matches!(
            archive.open_entry("a.txt"),
            Err(ZipError::UnsupportedArchive(_))
        ));
    }

    #[cfg(feature = "check-local-metadata")]
    #[test]
    fn tampered_local_header() {
        let mut archive = open(
            Fixture {
                local_name: b"b.txt",
                ..Default::default()
            }
            .build(),
        )
        .unwrap();
        match archive.open_entry("a.txt") {
            Err(ZipError::InvalidArchive { record, offset, .. }) => {
                assert_eq!(record, "local file header");
                assert_eq!(offset, 0);
            }
            Err(other) => panic!("Expected a mismatch, got {:?}", other),
            Ok(_) => panic!("Read an entry with a tampered local header"),
        };
    }

    #[test]
    fn bad_local_signature() {
        let mut bytes = Fixture::default().build();
        bytes[0] = b'X';
        let mut archive = open(bytes).unwrap();
        assert!(matches!(
            archive.open_entry("a.txt"),
            Err(ZipError::InvalidArchive { offset: 0, .. })
        ));
    }

    #[test]
    fn missing_eocdr() {
        let mut bytes = Fixture::default().build();
        let eocdr = eocdr_field(&bytes, 0);
        bytes.truncate(eocdr + 10);
        assert!(matches!(open(bytes), Err(ZipError::InvalidArchive { .. })));
        assert!(matches!(open(Vec::new()), Err(ZipError::InvalidArchive { .. })));
    }

    #[test]
    fn central_directory_out_of_bounds() {
        let mut bytes = Fixture::default().build();
        let field = eocdr_field(&bytes, 16);
        bytes[field..field + 4].copy_from_slice(&0x7fff_0000u32.to_le_bytes());
        match open(bytes) {
            Err(ZipError::InvalidArchive { record, offset, .. }) => {
                assert_eq!(record, "central directory");
                assert_eq!(offset, 0x7fff_0000);
            }
            Err(other) => panic!("Expected a bounds error, got {:?}", other),
            Ok(_) => panic!("Opened an archive pointing past its end"),
        }
    }

    #[test]
    fn too_many_entries() {
        let mut bytes = Fixture::default().build();
        let field = eocdr_field(&bytes, 8);
        bytes[field..field + 4].copy_from_slice(&[2, 0, 2, 0]);
        assert!(matches!(open(bytes), Err(ZipError::InvalidArchive { .. })));
    }

    #[test]
    fn sentinels_need_a_locator() {
        let mut bytes = Fixture::default().build();
        let field = eocdr_field(&bytes, 8);
        bytes[field..field + 4].copy_from_slice(&[0xff; 4]);
        match open(bytes) {
            Err(ZipError::InvalidArchive { record, .. }) => {
                assert_eq!(record, "end of central directory")
            }
            Err(other) => panic!("Expected a missing locator, got {:?}", other),
            Ok(_) => panic!("Opened an archive with dangling Zip64 sentinels"),
        }
    }

    #[test]
    fn stored_sizes_must_agree() {
        let mut bytes = Fixture::default().build();
        // Bump the central directory's compressed size.
        let central_directory = memchr::memmem::find(&bytes, &CENTRAL_DIRECTORY_MAGIC).unwrap();
        bytes[central_directory + 20] = 4;
        assert!(matches!(open(bytes), Err(ZipError::InvalidArchive { .. })));
    }
}
