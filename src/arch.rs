use crate::result::*;

/// A checked cast from u64 to usize
///
/// Sizes read from an archive are 64-bit no matter the platform;
/// anything we buffer in memory has to fit in the address space.
pub fn usize<I: Into<u64>>(i: I) -> ZipResult<usize> {
    let i: u64 = i.into();
    usize::try_from(i).map_err(|_| ZipError::InsufficientAddressSpace)
}
