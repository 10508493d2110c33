//! Byte-for-byte layout of a download agent container, as bincode decodes it.
use bincode::Decode;

use crate::{LLParser, da::err::Error};

/// Every entry carries a fixed 10-slot region array on disk, regardless of
/// how many of those slots `load_regions_count` actually claims are in use.
pub(crate) const LOAD_REGIONS_PER_ENTRY: usize = 10;

/// Wire size of an [`Entry`]'s fixed fields, ahead of its region array.
pub(crate) const ENTRY_HEADER_SIZE: usize = 20;

/// Wire size of a single [`LoadRegion`].
pub(crate) const LOAD_REGION_SIZE: usize = 20;

/// Bytes an entry occupies in the container, including its full region array.
pub(crate) const ENTRY_STRIDE: usize =
    ENTRY_HEADER_SIZE + LOAD_REGIONS_PER_ENTRY * LOAD_REGION_SIZE;

/// Wire size of the container header.
pub(crate) const HEADER_SIZE: usize = 32 + 64 + 4 + 4 + 4;

#[derive(Debug, Decode)]
pub(crate) struct Header {
    pub da_identifier: [u8; 32],
    pub da_description: [u8; 64],
    pub da_info_ver: u32,
    pub da_info_magic: u32,
    pub da_count: u32,
}

impl LLParser for Header {
    type Error = Error;

    fn validate(&self) -> core::result::Result<(), Self::Error> {
        if self.da_info_ver != 0x4 {
            Err(Error::InvalidInfoVer(self.da_info_ver))
        } else if self.da_info_magic != 0x2266_8899 {
            Err(Error::InvalidInfoMagic(self.da_info_magic))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Decode)]
pub(crate) struct Entry {
    pub magic: u16,
    pub hw_code: u16,
    pub hw_sub_code: u16,
    pub hw_ver: u16,
    pub sw_ver: u16,
    pub chip_evolution: u16,
    pub da_feature_set: u32,
    pub entry_region_index: u16,
    pub load_regions_count: u16,
}

impl LLParser for Entry {
    type Error = Error;

    fn validate(&self) -> core::result::Result<(), Self::Error> {
        if self.magic != 0xdada {
            Err(Error::InvalidEntryMagic(self.magic))
        } else if self.load_regions_count > 10 {
            Err(Error::TooManyLoadRegions(self.load_regions_count))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Decode, Clone, Copy)]
pub(crate) struct LoadRegion {
    pub offset: u32,
    pub len: u32,
    pub start_addr: u32,
    pub sig_offset: u32,
    pub sig_len: u32,
}

impl LLParser for LoadRegion {
    type Error = Error;

    fn validate(&self) -> core::result::Result<(), Self::Error> {
        if self.sig_len > 0 && self.sig_offset + self.sig_len != self.len {
            Err(Error::InconsistentSignature {
                sig_offset: self.sig_offset,
                sig_len: self.sig_len,
                len: self.len,
            })
        } else {
            Ok(())
        }
    }
}
