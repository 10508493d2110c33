use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    #[error("invalid da_info_ver: {0:#x}, expected 0x4")]
    InvalidInfoVer(u32),
    #[error("invalid da_info_magic: {0:#x}, expected 0x22668899")]
    InvalidInfoMagic(u32),
    #[error("container is {actual} bytes, needs at least {required} to hold its {da_count} entries")]
    TooShort {
        actual: usize,
        required: usize,
        da_count: u32,
    },

    #[error("invalid entry magic: {0:#x}, expected 0xdada")]
    InvalidEntryMagic(u16),
    #[error("load_regions_count {0} exceeds the 10 region slots an entry carries")]
    TooManyLoadRegions(u16),
    #[error("entry_region_index {entry_region_index} is out of bounds for load_regions_count {load_regions_count}")]
    EntryRegionIndexOutOfBounds {
        entry_region_index: u16,
        load_regions_count: u16,
    },

    #[error("load region signature [{sig_offset}, {sig_offset}+{sig_len}) does not end at len {len}")]
    InconsistentSignature {
        sig_offset: u32,
        sig_len: u32,
        len: u32,
    },

    #[error("region [{offset:#x}, {offset:#x}+{len}) runs past the container's {container_len} bytes")]
    RegionOutOfBounds {
        offset: u32,
        len: u32,
        container_len: usize,
    },
}
