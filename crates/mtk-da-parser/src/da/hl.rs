//! Owned, borrow-checked view of a download agent container.
//!
//! Per-entry and per-region invariants (`magic == 0xdada`, `load_regions_count <= 10`,
//! `entry_region_index < load_regions_count`, signature tail alignment) are *not*
//! enforced here — only the container header is validated eagerly. An entry the
//! caller never selects is never required to be well-formed; the caller asserts
//! these invariants itself at the moment it picks an entry to use.
use std::{ffi::CStr, fmt::Display};

use getset::Getters;

use crate::{HLParser, LLParser, Result, da::ll};

#[derive(Debug, Getters)]
pub struct DA<'a> {
    /// Human-readable description carried in the container header
    #[getset(get = "pub")]
    description: String,

    /// One entry per supported hardware code, in file order
    #[getset(get = "pub")]
    entries: Vec<Entry<'a>>,
}

impl<'a> HLParser<ll::Header> for DA<'a> {
    fn parse(data: &'a [u8], position: usize, ll: ll::Header) -> Result<Self> {
        Ok(Self {
            description: CStr::from_bytes_until_nul(&ll.da_description)
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&ll.da_description).to_string()),
            entries: (0..ll.da_count as usize)
                .map(|i| {
                    let start = position + i * ll::ENTRY_STRIDE;
                    let entry_ll = ll::Entry::parse(&data[start..])?;
                    Entry::parse(data, start + ll::ENTRY_HEADER_SIZE, entry_ll)
                })
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

impl Display for DA<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Description: {}", self.description)?;
        writeln!(f, "Entries:")?;
        for (i, entry) in self.entries.iter().enumerate() {
            writeln!(f, "Entry {}:", i + 1)?;
            for line in format!("{entry}").lines() {
                writeln!(f, "\t{line}")?;
            }
            if i != self.entries.len() - 1 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl<'a> DA<'a> {
    /// Finds the entry matching a device's identity triple. First match wins.
    #[must_use]
    pub fn entry(&self, hw_code: u16, hw_ver: u16, sw_ver: u16) -> Option<&Entry<'a>> {
        self.entries
            .iter()
            .find(|e| e.hw_code == hw_code && e.hw_ver == hw_ver && e.sw_ver == sw_ver)
    }
}

#[derive(Debug, Getters)]
pub struct Entry<'a> {
    #[getset(get = "pub")]
    magic: u16,
    #[getset(get = "pub")]
    hw_code: u16,
    #[getset(get = "pub")]
    hw_sub_code: u16,
    #[getset(get = "pub")]
    hw_ver: u16,
    #[getset(get = "pub")]
    sw_ver: u16,
    #[getset(get = "pub")]
    chip_evolution: u16,
    #[getset(get = "pub")]
    da_feature_set: u32,
    #[getset(get_copy = "pub")]
    entry_region_index: u16,
    #[getset(get_copy = "pub")]
    load_regions_count: u16,

    /// Fixed 10-slot region array, in on-disk order (unfiltered by `load_regions_count`)
    #[getset(get = "pub")]
    regions: Vec<Region<'a>>,
}

impl<'a> HLParser<ll::Entry> for Entry<'a> {
    fn parse(data: &'a [u8], position: usize, ll: ll::Entry) -> Result<Self> {
        Ok(Self {
            magic: ll.magic,
            hw_code: ll.hw_code,
            hw_sub_code: ll.hw_sub_code,
            hw_ver: ll.hw_ver,
            sw_ver: ll.sw_ver,
            chip_evolution: ll.chip_evolution,
            da_feature_set: ll.da_feature_set,
            entry_region_index: ll.entry_region_index,
            load_regions_count: ll.load_regions_count,
            regions: (0..ll::LOAD_REGIONS_PER_ENTRY)
                .map(|i| {
                    let region_ll =
                        ll::LoadRegion::parse(&data[position + i * ll::LOAD_REGION_SIZE..])?;
                    Ok(Region::new(data, region_ll))
                })
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

impl Display for Entry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Magic: {:#06x}", self.magic)?;
        writeln!(f, "HW code: {:#06x}", self.hw_code)?;
        writeln!(f, "HW sub code: {:#06x}", self.hw_sub_code)?;
        writeln!(f, "HW version: {:#06x}", self.hw_ver)?;
        writeln!(f, "SW version: {:#06x}", self.sw_ver)?;
        writeln!(f, "Load regions in use: {}", self.load_regions_count)?;
        writeln!(f, "Regions:")?;
        for (i, region) in self.regions.iter().enumerate() {
            writeln!(f, "Region {i}:")?;
            for line in format!("{region}").lines() {
                writeln!(f, "\t{line}")?;
            }
            if i != self.regions.len() - 1 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl<'a> Entry<'a> {
    /// Asserts the invariants a caller must hold before trusting this entry:
    /// a correct magic, a region count within the fixed 10-slot array, and an
    /// `entry_region_index` that actually lands inside the in-use regions.
    pub fn validate(&self) -> core::result::Result<(), super::err::Error> {
        if self.magic != 0xdada {
            Err(super::err::Error::InvalidEntryMagic(self.magic))
        } else if self.load_regions_count > ll::LOAD_REGIONS_PER_ENTRY as u16 {
            Err(super::err::Error::TooManyLoadRegions(self.load_regions_count))
        } else if self.entry_region_index >= self.load_regions_count {
            Err(super::err::Error::EntryRegionIndexOutOfBounds {
                entry_region_index: self.entry_region_index,
                load_regions_count: self.load_regions_count,
            })
        } else {
            Ok(())
        }
    }

    /// Scans forward from `entry_region_index` for the first in-use region that
    /// carries a signature.
    #[must_use]
    pub fn stage1(&self) -> Option<&Region<'a>> {
        self.regions
            .iter()
            .take(self.load_regions_count as usize)
            .skip(self.entry_region_index as usize)
            .find(|r| r.sig_len() > 0)
    }

    /// The in-use region immediately following [`Entry::stage1`].
    #[must_use]
    pub fn stage2(&self) -> Option<&Region<'a>> {
        let stage1_index = self
            .regions
            .iter()
            .take(self.load_regions_count as usize)
            .skip(self.entry_region_index as usize)
            .position(|r| r.sig_len() > 0)?
            + self.entry_region_index as usize;
        self.regions.get(stage1_index + 1)
    }
}

#[derive(Debug, Getters)]
pub struct Region<'a> {
    data: &'a [u8],
    offset: u32,
    len: u32,

    /// Signature length, trailing the region's code
    #[getset(get_copy = "pub")]
    sig_len: u32,
    #[getset(get_copy = "pub")]
    sig_offset: u32,

    /// Load address in device memory
    #[getset(get_copy = "pub")]
    start_addr: u32,
}

impl<'a> Region<'a> {
    /// Asserts the signature tail sits exactly at the end of the region.
    /// Checked unconditionally — a selected stage with `sig_len == 0` but
    /// `sig_offset + sig_len != len` is just as malformed as one with a
    /// nonzero signature in the wrong place.
    pub fn validate(&self) -> core::result::Result<(), super::err::Error> {
        if self.sig_offset + self.sig_len != self.len {
            Err(super::err::Error::InconsistentSignature {
                sig_offset: self.sig_offset,
                sig_len: self.sig_len,
                len: self.len,
            })
        } else {
            Ok(())
        }
    }

    fn new(data: &'a [u8], ll: ll::LoadRegion) -> Self {
        Self {
            data,
            offset: ll.offset,
            len: ll.len,
            sig_len: ll.sig_len,
            sig_offset: ll.sig_offset,
            start_addr: ll.start_addr,
        }
    }

    /// Full region bytes (code + trailing signature), bounds-checked against
    /// the container's backing data. Out-of-range `offset`/`len` on a region
    /// that is never selected never surfaces as an error.
    pub fn data(&self) -> core::result::Result<&'a [u8], super::err::Error> {
        self.data
            .get(self.offset as usize..self.offset as usize + self.len as usize)
            .ok_or(super::err::Error::RegionOutOfBounds {
                offset: self.offset,
                len: self.len,
                container_len: self.data.len(),
            })
    }

    /// Region bytes without the trailing signature.
    pub fn code(&self) -> core::result::Result<&'a [u8], super::err::Error> {
        let data = self.data()?;
        Ok(&data[..data.len() - self.sig_len as usize])
    }

    /// Trailing signature bytes.
    pub fn signature(&self) -> core::result::Result<&'a [u8], super::err::Error> {
        let data = self.data()?;
        Ok(&data[data.len() - self.sig_len as usize..])
    }
}

impl Display for Region<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Offset: {:#x}, length: {} bytes", self.offset, self.len)?;
        writeln!(f, "Signature: {} bytes", self.sig_len)?;
        write!(f, "Load address: {:#x}", self.start_addr)
    }
}
