//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] and [`write`] modules.
//! Everything in here is a pure transformation between bytes and records:
//! no seeking, no buffering policy, and every decode fails closed
//! with the offending record and offset.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! [_Zip Files: History, Explanation and Implementation_]
//! is also a fantastic resource and a great read.
//!
//! [`read`]: ../read/index.html
//! [`write`]: ../write/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT
//! [_Zip Files: History, Explanation and Implementation_]: https://www.hanshq.net/zip.html

use std::borrow::Cow;
use std::io::{self, Write};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use codepage_437::*;
use memchr::memmem;

use crate::read::{CompressionMethod, ZipEntry};
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number
pub const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Zip64 end of central directory magic number
pub const ZIP64_EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 6, 6];
/// Zip64 end of central directory locator magic number
pub const ZIP64_EOCDR_LOCATOR_MAGIC: [u8; 4] = [b'P', b'K', 6, 7];
/// Central directory magic number
pub const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number
pub const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];
/// Data descriptor magic number (optional, but we always write it)
pub const DATA_DESCRIPTOR_MAGIC: [u8; 4] = [b'P', b'K', 7, 8];

/// A 32-bit field holding this defers to the Zip64 extra field.
pub const SENTINEL_U32: u32 = 0xFFFF_FFFF;
/// A 16-bit field holding this defers to the Zip64 records.
pub const SENTINEL_U16: u16 = 0xFFFF;

/// Header ID of the Zip64 extended information extra field
pub const ZIP64_EXTRA_FIELD_TAG: u16 = 0x0001;

/// Version needed to extract: deflate and directories
pub const VERSION_DEFAULT: u16 = 20;
/// Version needed to extract: Zip64 format extensions
pub const VERSION_ZIP64: u16 = 45;

/// Bit 0: If set, indicates that the file is encrypted
pub const FLAG_ENCRYPTED: u16 = 1;
/// Bit 3: crc-32, compressed size and uncompressed size are set to zero
/// in the local header and follow the data in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// Bit 11: Language encoding flag (EFS).
pub const FLAG_UTF8: u16 = 1 << 11;

/// The most bytes a comment, name, or extra field can hold
pub const MAX_FIELD_LENGTH: usize = u16::MAX as usize;

/// MS-DOS directory attribute, found in the low byte of external attributes
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;
/// Unix `S_IFDIR`
pub const UNIX_DIRECTORY_MODE: u32 = 0o040000;
/// Unix `S_IFREG`
pub const UNIX_FILE_MODE: u32 = 0o100000;
const UNIX_FILE_TYPE_MASK: u32 = 0o170000;

impl CompressionMethod {
    pub(crate) fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }

    pub(crate) fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(v) => v,
        }
    }
}

/// The OS a file in the archive was compressed with.
/// Used to decode additional metadata like permissions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum System {
    Dos,
    Unix,
    Unknown,
}

impl System {
    pub fn from_source_version(source_version: u16) -> Self {
        // 4.4.2.1 The upper byte indicates the compatibility of the file
        // attribute information.  If the external file attributes
        // are compatible with MS-DOS and can be read by PKZIP for
        // DOS version 2.04g then this value will be zero.  If these
        // attributes are not compatible, then this value will
        // identify the host system on which the attributes are
        // compatible.
        //
        // 4.4.2.2 The current mappings are:
        //
        //  0 - MS-DOS and OS/2 (FAT / VFAT / FAT32 file systems)
        //  3 - UNIX
        //  (and many more we don't care about)
        match source_version >> 8 {
            0 => System::Dos,
            3 => System::Unix,
            _ => System::Unknown,
        }
    }

    /// "Version made by" for a record written on this system
    pub fn version_made_by(self, version: u16) -> u16 {
        let host = match self {
            System::Dos => 0,
            System::Unix => 3,
            System::Unknown => 3,
        };
        (host << 8) | version
    }
}

/// Reads little-endian fields from the front of a record.
///
/// Unlike slicing, running off the end is an error that names the record
/// and the absolute offset where we ran out.
pub struct FieldReader<'a> {
    input: &'a [u8],
    consumed: usize,
    record: &'static str,
    offset: u64,
}

impl<'a> FieldReader<'a> {
    /// `offset` is where `input` starts in the archive.
    pub fn new(input: &'a [u8], record: &'static str, offset: u64) -> Self {
        Self {
            input,
            consumed: 0,
            record,
            offset,
        }
    }

    /// The absolute position of the next unread byte
    pub fn position(&self) -> u64 {
        self.offset + self.consumed as u64
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.input
    }

    pub fn bytes(&mut self, len: usize) -> ZipResult<&'a [u8]> {
        if self.input.len() < len {
            return Err(ZipError::invalid(
                self.record,
                self.position(),
                format!(
                    "truncated: needed {} bytes, only {} remain",
                    len,
                    self.input.len()
                ),
            ));
        }
        let (taken, rest) = self.input.split_at(len);
        self.input = rest;
        self.consumed += len;
        Ok(taken)
    }

    fn array<const N: usize>(&mut self) -> ZipResult<[u8; N]> {
        let mut array = [0; N];
        array.copy_from_slice(self.bytes(N)?);
        Ok(array)
    }

    pub fn magic(&mut self, expected: [u8; 4]) -> ZipResult<()> {
        let position = self.position();
        let found = self.array::<4>()?;
        if found != expected {
            return Err(ZipError::invalid(
                self.record,
                position,
                format!(
                    "bad signature: expected {:02x?}, found {:02x?}",
                    expected, found
                ),
            ));
        }
        Ok(())
    }

    pub fn u16(&mut self) -> ZipResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> ZipResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> ZipResult<u64> {
        self.array().map(u64::from_le_bytes)
    }
}

/// Little-endian helpers for the write side.
pub trait WriteLe: Write {
    fn write_u16_le(&mut self, v: u16) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn write_u32_le(&mut self, v: u32) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }

    fn write_u64_le(&mut self, v: u64) -> io::Result<()> {
        self.write_all(&v.to_le_bytes())
    }
}

impl<W: Write + ?Sized> WriteLe for W {}

/// Lengths of names, comments, and extra fields are 16 bits on disk.
fn field_length(field: &[u8], what: &str) -> io::Result<u16> {
    u16::try_from(field.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is {} bytes, more than 65535", what, field.len()),
        )
    })
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
#[derive(Debug)]
pub struct EndOfCentralDirectory<'a> {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: &'a [u8],
}

impl<'a> EndOfCentralDirectory<'a> {
    pub const SIZE: usize = 22;

    pub fn parse(eocdr: &'a [u8], offset: u64) -> ZipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        // .ZIP file comment       (variable size)
        let mut fields = FieldReader::new(eocdr, "end of central directory", offset);
        fields.magic(EOCDR_MAGIC)?;
        let disk_number = fields.u16()?;
        let disk_with_central_directory = fields.u16()?;
        let entries_on_this_disk = fields.u16()?;
        let entries = fields.u16()?;
        let central_directory_size = fields.u32()?;
        let central_directory_offset = fields.u32()?;
        let comment_length = fields.u16()?;
        let file_comment = fields.bytes(comment_length as usize)?;

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }

    /// True if any field defers to the Zip64 end of central directory record.
    pub fn has_sentinels(&self) -> bool {
        self.entries == SENTINEL_U16
            || self.entries_on_this_disk == SENTINEL_U16
            || self.central_directory_size == SENTINEL_U32
            || self.central_directory_offset == SENTINEL_U32
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let comment_length = field_length(self.file_comment, "Archive comment")?;
        out.write_all(&EOCDR_MAGIC)?;
        out.write_u16_le(self.disk_number)?;
        out.write_u16_le(self.disk_with_central_directory)?;
        out.write_u16_le(self.entries_on_this_disk)?;
        out.write_u16_le(self.entries)?;
        out.write_u32_le(self.central_directory_size)?;
        out.write_u32_le(self.central_directory_offset)?;
        out.write_u16_le(comment_length)?;
        out.write_all(self.file_comment)
    }
}

/// Searches backward through `tail` (the last bytes of the archive,
/// starting at `tail_offset`) to find the End of central directory record.
///
/// It should be right at the end of the file,
/// but its variable-length comment means we can't jump to a known offset.
/// The comment could also contain the magic number,
/// so skip candidates whose record wouldn't fit in what's left of the file.
pub fn find_eocdr(tail: &[u8], tail_offset: u64) -> ZipResult<usize> {
    memmem::rfind_iter(tail, &EOCDR_MAGIC)
        .find(|&posit| {
            let record = &tail[posit..];
            if record.len() < EndOfCentralDirectory::SIZE {
                return false;
            }
            let comment_length = u16::from_le_bytes([record[20], record[21]]) as usize;
            EndOfCentralDirectory::SIZE + comment_length <= record.len()
        })
        .ok_or_else(|| {
            ZipError::invalid(
                "end of central directory",
                tail_offset,
                "couldn't find End Of Central Directory Record",
            )
        })
}

/// Data from the Zip64 end of central directory locator
///
/// This should immediately precede the End of central directory record
/// on Zip64 files and tell us where to find the Zip64 end of central directory record.
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_central_directory: u32,
    pub zip64_eocdr_offset: u64,
    pub disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub const SIZE: usize = 20;

    /// Returns `None` if `mapping` doesn't start with the locator's magic.
    pub fn parse(mapping: &[u8], offset: u64) -> ZipResult<Option<Self>> {
        // 4.3.15 Zip64 end of central directory locator
        //
        // zip64 end of central dir locator
        // signature                       4 bytes  (0x07064b50)
        // number of the disk with the
        // start of the zip64 end of
        // central directory               4 bytes
        // relative offset of the zip64
        // end of central directory record 8 bytes
        // total number of disks           4 bytes
        if !mapping.starts_with(&ZIP64_EOCDR_LOCATOR_MAGIC) {
            return Ok(None);
        }
        let mut fields =
            FieldReader::new(mapping, "Zip64 end of central directory locator", offset);
        fields.magic(ZIP64_EOCDR_LOCATOR_MAGIC)?;
        let disk_with_central_directory = fields.u32()?;
        let zip64_eocdr_offset = fields.u64()?;
        let disks = fields.u32()?;

        Ok(Some(Self {
            disk_with_central_directory,
            zip64_eocdr_offset,
            disks,
        }))
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&ZIP64_EOCDR_LOCATOR_MAGIC)?;
        out.write_u32_le(self.disk_with_central_directory)?;
        out.write_u64_le(self.zip64_eocdr_offset)?;
        out.write_u32_le(self.disks)
    }
}

/// Data from the Zip64 end of central directory record
///
/// Stands in for the "End of central directory" record's fields
/// once they overflow.
/// We neither read nor write the "zip64 extensible data sector";
/// it's reserved for PKWARE's own use.
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectory {
    pub record_size: u64,
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    pub const SIZE: usize = 56;

    pub fn parse(eocdr: &[u8], offset: u64) -> ZipResult<Self> {
        // 4.3.14  Zip64 end of central directory record
        //
        // zip64 end of central dir
        // signature                       4 bytes  (0x06064b50)
        // size of zip64 end of central
        // directory record                8 bytes
        // version made by                 2 bytes
        // version needed to extract       2 bytes
        // number of this disk             4 bytes
        // number of the disk with the
        // start of the central directory  4 bytes
        // total number of entries in the
        // central directory on this disk  8 bytes
        // total number of entries in the
        // central directory               8 bytes
        // size of the central directory   8 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        8 bytes
        // zip64 extensible data sector    (variable size)
        let mut fields = FieldReader::new(eocdr, "Zip64 end of central directory", offset);
        fields.magic(ZIP64_EOCDR_MAGIC)?;
        let record_size = fields.u64()?;
        let source_version = fields.u16()?;
        let minimum_extract_version = fields.u16()?;
        let disk_number = fields.u32()?;
        let disk_with_central_directory = fields.u32()?;
        let entries_on_this_disk = fields.u64()?;
        let entries = fields.u64()?;
        let central_directory_size = fields.u64()?;
        let central_directory_offset = fields.u64()?;

        // 4.3.14.1 The value stored into the "size of zip64 end of central
        // directory record" SHOULD be the size of the remaining
        // record and SHOULD NOT include the leading 12 bytes.
        //
        // Size = SizeOfFixedFields + SizeOfVariableData - 12.
        if record_size < (Self::SIZE - 12) as u64 {
            return Err(ZipError::invalid(
                "Zip64 end of central directory",
                offset + 4,
                format!("record size {} is smaller than its fixed fields", record_size),
            ));
        }

        Ok(Self {
            record_size,
            source_version,
            minimum_extract_version,
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
        })
    }

    /// Bytes the record occupies in the file, extensible data included.
    pub fn size_in_file(&self) -> u64 {
        self.record_size.saturating_add(12)
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&ZIP64_EOCDR_MAGIC)?;
        out.write_u64_le(self.record_size)?;
        out.write_u16_le(self.source_version)?;
        out.write_u16_le(self.minimum_extract_version)?;
        out.write_u32_le(self.disk_number)?;
        out.write_u32_le(self.disk_with_central_directory)?;
        out.write_u64_le(self.entries_on_this_disk)?;
        out.write_u64_le(self.entries)?;
        out.write_u64_le(self.central_directory_size)?;
        out.write_u64_le(self.central_directory_offset)
    }
}

/// Data from a central directory entry
///
/// Each of these records contians information about a file or folder
/// stored in the ZIP archive.
#[derive(Debug)]
pub struct CentralDirectoryEntry<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
    pub file_comment: &'a [u8],
}

impl<'a> CentralDirectoryEntry<'a> {
    pub const FIXED_SIZE: usize = 46;

    pub fn parse_and_consume(entry: &mut FieldReader<'a>) -> ZipResult<Self> {
        // 4.3.12  Central directory structure:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        entry.magic(CENTRAL_DIRECTORY_MAGIC)?;
        let source_version = entry.u16()?;
        let minimum_extract_version = entry.u16()?;
        let flags = entry.u16()?;
        let compression_method = entry.u16()?;
        let last_modified_time = entry.u16()?;
        let last_modified_date = entry.u16()?;
        let crc32 = entry.u32()?;
        let compressed_size = entry.u32()?;
        let uncompressed_size = entry.u32()?;
        let path_length = entry.u16()? as usize;
        let extra_field_length = entry.u16()? as usize;
        let file_comment_length = entry.u16()? as usize;
        let disk_number = entry.u16()?;
        let internal_file_attributes = entry.u16()?;
        let external_file_attributes = entry.u32()?;
        let header_offset = entry.u32()?;
        let path = entry.bytes(path_length)?;
        let extra_field = entry.bytes(extra_field_length)?;
        let file_comment = entry.bytes(file_comment_length)?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_field,
            file_comment,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let path_length = field_length(self.path, "File name")?;
        let extra_field_length = field_length(self.extra_field, "Extra field")?;
        let file_comment_length = field_length(self.file_comment, "File comment")?;
        out.write_all(&CENTRAL_DIRECTORY_MAGIC)?;
        out.write_u16_le(self.source_version)?;
        out.write_u16_le(self.minimum_extract_version)?;
        out.write_u16_le(self.flags)?;
        out.write_u16_le(self.compression_method)?;
        out.write_u16_le(self.last_modified_time)?;
        out.write_u16_le(self.last_modified_date)?;
        out.write_u32_le(self.crc32)?;
        out.write_u32_le(self.compressed_size)?;
        out.write_u32_le(self.uncompressed_size)?;
        out.write_u16_le(path_length)?;
        out.write_u16_le(extra_field_length)?;
        out.write_u16_le(file_comment_length)?;
        out.write_u16_le(self.disk_number)?;
        out.write_u16_le(self.internal_file_attributes)?;
        out.write_u32_le(self.external_file_attributes)?;
        out.write_u32_le(self.header_offset)?;
        out.write_all(self.path)?;
        out.write_all(self.extra_field)?;
        out.write_all(self.file_comment)
    }
}

/// Data from a local file header
///
/// Each files' actual contents is preceded by this header.
/// These headers allow for "streaming" decompression without
/// the use of the central directory,
/// but we only use them to find the data and double-check the directory.
#[derive(Debug)]
pub struct LocalFileHeader<'a> {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
}

impl<'a> LocalFileHeader<'a> {
    pub const FIXED_SIZE: usize = 30;

    /// Given the fixed-size part of a header,
    /// returns the length of the name and extra field after it.
    pub fn variable_length(fixed: &[u8], offset: u64) -> ZipResult<usize> {
        let mut fields = FieldReader::new(fixed, "local file header", offset);
        fields.magic(LOCAL_FILE_HEADER_MAGIC)?;
        fields.bytes(22)?;
        let path_length = fields.u16()? as usize;
        let extra_field_length = fields.u16()? as usize;
        Ok(path_length + extra_field_length)
    }

    pub fn parse(header: &'a [u8], offset: u64) -> ZipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        let mut fields = FieldReader::new(header, "local file header", offset);
        fields.magic(LOCAL_FILE_HEADER_MAGIC)?;
        let minimum_extract_version = fields.u16()?;
        let flags = fields.u16()?;
        let compression_method = fields.u16()?;
        let last_modified_time = fields.u16()?;
        let last_modified_date = fields.u16()?;
        let crc32 = fields.u32()?;
        let compressed_size = fields.u32()?;
        let uncompressed_size = fields.u32()?;
        let path_length = fields.u16()? as usize;
        let extra_field_length = fields.u16()? as usize;
        let path = fields.bytes(path_length)?;
        let extra_field = fields.bytes(extra_field_length)?;

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_field,
        })
    }

    pub fn size_in_file(&self) -> u64 {
        (Self::FIXED_SIZE + self.path.len() + self.extra_field.len()) as u64
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let path_length = field_length(self.path, "File name")?;
        let extra_field_length = field_length(self.extra_field, "Extra field")?;
        out.write_all(&LOCAL_FILE_HEADER_MAGIC)?;
        out.write_u16_le(self.minimum_extract_version)?;
        out.write_u16_le(self.flags)?;
        out.write_u16_le(self.compression_method)?;
        out.write_u16_le(self.last_modified_time)?;
        out.write_u16_le(self.last_modified_date)?;
        out.write_u32_le(self.crc32)?;
        out.write_u32_le(self.compressed_size)?;
        out.write_u32_le(self.uncompressed_size)?;
        out.write_u16_le(path_length)?;
        out.write_u16_le(extra_field_length)?;
        out.write_all(self.path)?;
        out.write_all(self.extra_field)
    }
}

/// Data from a data descriptor
///
/// Trails an entry's data when its CRC and sizes weren't known
/// as the local header was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// The most bytes a descriptor can occupy (signature + Zip64 sizes)
    pub const MAX_SIZE: usize = 24;

    pub fn parse(descriptor: &[u8], zip64: bool, offset: u64) -> ZipResult<Self> {
        // 4.3.9  Data descriptor:
        //
        // [data descriptor signature      4 bytes  (0x08074b50), optional]
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        //
        // 4.3.9.2 When compressing files, compressed and uncompressed sizes
        // SHOULD be stored in ZIP64 format (as 8 byte values) when a
        // file's size exceeds 0xFFFFFFFF.
        let mut fields = FieldReader::new(descriptor, "data descriptor", offset);
        if descriptor.starts_with(&DATA_DESCRIPTOR_MAGIC) {
            fields.magic(DATA_DESCRIPTOR_MAGIC)?;
        }
        let crc32 = fields.u32()?;
        let (compressed_size, uncompressed_size) = if zip64 {
            (fields.u64()?, fields.u64()?)
        } else {
            (fields.u32()? as u64, fields.u32()? as u64)
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W, zip64: bool) -> io::Result<()> {
        out.write_all(&DATA_DESCRIPTOR_MAGIC)?;
        out.write_u32_le(self.crc32)?;
        if zip64 {
            out.write_u64_le(self.compressed_size)?;
            out.write_u64_le(self.uncompressed_size)
        } else {
            out.write_u32_le(narrow(self.compressed_size)?)?;
            out.write_u32_le(narrow(self.uncompressed_size)?)
        }
    }
}

fn narrow(value: u64) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} doesn't fit in a 32-bit field", value),
        )
    })
}

/// The fields a Zip64 extended information extra field can stand in for,
/// as read from a central directory entry or local file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64Values {
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub header_offset: u64,
    pub disk_number: u32,
}

impl Zip64Values {
    /// Scans the "extra fields" found in central directory entries
    /// and local file headers, replacing sentinel values with the
    /// 64-bit ones from a Zip64 extra field.
    ///
    /// `offset` is where `extra_field` starts in the archive.
    pub fn apply_extra_field(&mut self, extra_field: &[u8], offset: u64) -> ZipResult<()> {
        // 4.5.1 In order to allow different programs and different types
        // of information to be stored in the 'extra' field in .ZIP
        // files, the following structure MUST be used for all
        // programs storing data in this field:
        //
        //     header1+data1 + header2+data2 . . .
        //
        // Each header MUST consist of:
        //
        //     Header ID - 2 bytes
        //     Data Size - 2 bytes
        let mut fields = FieldReader::new(extra_field, "extra field", offset);
        // Tools like zipalign pad with fewer bytes than a header needs.
        while fields.remaining().len() >= 4 {
            let kind = fields.u16()?;
            let field_len = fields.u16()? as usize;
            let data_offset = fields.position();
            let data = fields.bytes(field_len)?;
            if kind == ZIP64_EXTRA_FIELD_TAG {
                self.apply_zip64(data, data_offset)?;
            }
        }
        Ok(())
    }

    fn apply_zip64(&mut self, data: &[u8], offset: u64) -> ZipResult<()> {
        // 4.5.3 -Zip64 Extended Information Extra Field (0x0001):
        //
        // The order of the fields in the zip64 extended
        // information record is fixed, but the fields MUST
        // only appear if the corresponding Local or Central
        // directory record field is set to 0xFFFF or 0xFFFFFFFF.
        //
        // Original Size       8 bytes
        // Compressed Size     8 bytes
        // Relative Header Offset  8 bytes
        // Disk Start Number   4 bytes
        let mut fields = FieldReader::new(data, "Zip64 extra field", offset);
        if self.uncompressed_size == SENTINEL_U32 as u64 {
            self.uncompressed_size = fields.u64()?;
        }
        if self.compressed_size == SENTINEL_U32 as u64 {
            self.compressed_size = fields.u64()?;
        }
        if self.header_offset == SENTINEL_U32 as u64 {
            self.header_offset = fields.u64()?;
        }
        if self.disk_number == SENTINEL_U16 as u32 {
            self.disk_number = fields.u32()?;
        }
        Ok(())
    }
}

/// A Zip64 extended information extra field as we write it:
/// only the values that overflowed their 32-bit slots, in the fixed order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Zip64ExtraField {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
}

impl Zip64ExtraField {
    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }

    fn values(&self) -> impl Iterator<Item = u64> {
        [
            self.uncompressed_size,
            self.compressed_size,
            self.header_offset,
        ]
        .into_iter()
        .flatten()
    }

    /// Bytes the field occupies, header included. Zero if it's empty.
    pub fn size_in_file(&self) -> usize {
        match self.values().count() {
            0 => 0,
            n => 4 + 8 * n,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size_in_file());
        if self.is_empty() {
            return bytes;
        }
        bytes.extend_from_slice(&ZIP64_EXTRA_FIELD_TAG.to_le_bytes());
        bytes.extend_from_slice(&((self.size_in_file() - 4) as u16).to_le_bytes());
        for value in self.values() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

/// Splits a 64-bit value into what goes in its 32-bit field
/// and, if it's over `limit`, what goes in the Zip64 extra field.
pub fn promote(value: u64, limit: u64) -> (u32, Option<u64>) {
    match u32::try_from(value) {
        Ok(narrow) if value <= limit => (narrow, None),
        _ => (SENTINEL_U32, Some(value)),
    }
}

/// Like [`promote`], for 16-bit entry counts.
pub fn promote_count(value: u64, limit: u64) -> (u16, bool) {
    match u16::try_from(value) {
        Ok(narrow) if value <= limit => (narrow, false),
        _ => (SENTINEL_U16, true),
    }
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumped to be CP437.
pub fn is_utf8(flags: u16) -> bool {
    flags & FLAG_UTF8 != 0
}

/// Extracts the "is this file encrypted?" bit from the 16-bit flags field.
pub fn is_encrypted(flags: u16) -> bool {
    flags & FLAG_ENCRYPTED != 0
}

/// Extracts the "sizes are in a data descriptor" bit from the 16-bit flags field.
pub fn has_data_descriptor(flags: u16) -> bool {
    flags & FLAG_DATA_DESCRIPTOR != 0
}

/// Decodes an entry name per its UTF-8 flag.
pub fn decode_name(raw: &[u8], flags: u16) -> ZipResult<String> {
    if is_utf8(flags) {
        Ok(std::str::from_utf8(raw)?.to_owned())
    } else {
        let decoded: Cow<str> = Cow::borrow_from_cp437(raw, &CP437_CONTROL);
        Ok(decoded.into_owned())
    }
}

impl ZipEntry {
    /// Extracts a `ZipEntry` from a central directory entry
    /// that started at `offset` in the archive.
    pub(crate) fn from_cde(cde: &CentralDirectoryEntry, offset: u64) -> ZipResult<Self> {
        let name = decode_name(cde.path, cde.flags)?;

        let mut values = Zip64Values {
            uncompressed_size: cde.uncompressed_size.into(),
            compressed_size: cde.compressed_size.into(),
            header_offset: cde.header_offset.into(),
            disk_number: cde.disk_number.into(),
        };
        let extra_field_offset =
            offset + (CentralDirectoryEntry::FIXED_SIZE + cde.path.len()) as u64;
        values.apply_extra_field(cde.extra_field, extra_field_offset)?;

        if values.disk_number != 0 {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: file {} claims to be on disk {}",
                name, values.disk_number,
            )));
        }

        let unix_mode = match System::from_source_version(cde.source_version) {
            System::Unix => Some(cde.external_file_attributes >> 16),
            _ => None,
        };

        Ok(Self {
            name,
            uncompressed_size: values.uncompressed_size,
            compressed_size: values.compressed_size,
            compression_method: CompressionMethod::from_u16(cde.compression_method),
            crc32: cde.crc32,
            local_header_offset: values.header_offset,
            general_purpose_flags: cde.flags,
            last_modified: parse_msdos(cde.last_modified_time, cde.last_modified_date),
            external_attributes: cde.external_file_attributes,
            unix_mode,
        })
    }
}

/// True if external attributes mark a directory, in either DOS or Unix terms.
pub fn attributes_say_directory(external_attributes: u32, unix_mode: Option<u32>) -> bool {
    if let Some(mode) = unix_mode {
        if mode & UNIX_FILE_TYPE_MASK == UNIX_DIRECTORY_MODE {
            return true;
        }
    }
    external_attributes & DOS_DIRECTORY_ATTRIBUTE != 0
}

/// Decodes an MS-DOS date and time, or `None` if they don't make a valid one.
pub fn parse_msdos(time: u16, date: u16) -> Option<NaiveDateTime> {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // MSDOS uses 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // MSDOS uses years since 1980; Always interpreted as a positive value
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)?.and_hms_opt(hours, minutes, seconds)
}

/// Encodes a timestamp as an MS-DOS (time, date) pair,
/// clamping to the 1980-2107 range it can represent.
pub fn to_msdos(datetime: &NaiveDateTime) -> (u16, u16) {
    if datetime.year() < 1980 {
        // 1980-01-01 00:00:00
        return (0, (1 << 5) | 1);
    }
    if datetime.year() > 2107 {
        // 2107-12-31 23:59:58
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }
    let time = (datetime.hour() << 11) | (datetime.minute() << 5) | (datetime.second() / 2);
    let date = ((datetime.year() as u32 - 1980) << 9) | (datetime.month() << 5) | datetime.day();
    (time as u16, date as u16)
}
