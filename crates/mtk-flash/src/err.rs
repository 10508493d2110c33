use std::path::PathBuf;

use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// More than one device matching the expected VID/PID is connected
    #[error("please disconnect other devices in preloader mode")]
    MoreThanOneDevice,

    /// A `--dump`/`--flash` flag was given with no accumulated length
    #[error("--dump/--flash requires a preceding non-zero --length")]
    ZeroLengthOperation,

    /// More operations were requested than the fixed-size operation table holds
    #[error("at most {0} operations are supported per invocation")]
    TooManyOperations(usize),

    /// `--download-agent` is required unless `--da-stage2` is given
    #[error("--download-agent is required unless --da-stage2 is given")]
    MissingDownloadAgent,

    /// A `--flash` source file is shorter than the requested `--length`
    #[error("flash source {path:?} is {actual} bytes, needs at least {required}")]
    FlashSourceTooShort {
        path: PathBuf,
        required: u64,
        actual: u64,
    },

    /// The device returned an unexpected status for a command
    #[error("invalid status! expected {0}, got {1}")]
    InvalidStatus(u16, u16),

    /// The device returned an unexpected single-byte retval for a DA command
    #[error("{command} did not return the expected retval: {retval:#04x}")]
    InvalidRetval { command: &'static str, retval: u8 },

    /// A device reply carried a wrong-valued scalar outside the status/retval
    /// conventions above (e.g. DA `SEND_DA`'s zero acknowledgement word)
    #[error("{context}: expected {expected:#x}, got {got:#x}")]
    UnexpectedValue {
        context: &'static str,
        expected: u64,
        got: u64,
    },

    /// No entry in the download agent container matches the connected device
    #[error(
        "no download agent entry for hw_code={hw_code:#06x} hw_ver={hw_ver:#06x} sw_ver={sw_ver:#06x}"
    )]
    NoMatchingDaEntry {
        hw_code: u16,
        hw_ver: u16,
        sw_ver: u16,
    },

    /// An entry's load regions don't contain a usable stage1/stage2 pair
    #[error("download agent entry has no usable stage1/stage2 load region pair")]
    NoUsableLoadRegions,

    /// A chunked transfer's host-computed checksum disagreed with the device's
    #[error("checksum mismatch: host computed {host:#06x}, device reported {device:#06x}")]
    ChecksumMismatch { host: u16, device: u16 },

    /// DA stage 1 reported a NAND controller present where none was expected
    #[error("NAND controller did not report NAND_NOT_FOUND: {0:#x}")]
    NandPresent(u32),

    /// DA stage 1 reported an eMMC controller error
    #[error("eMMC controller reported an error: {0:#x}")]
    EmmcError(u32),

    /// Framed transport (USB bulk/echo) error
    #[error("transport error: {0}")]
    Transport(#[from] mtk_transport::err::Error),

    /// Download agent container parsing error
    #[error("download agent container error: {0}")]
    DaParser(#[from] mtk_da_parser::err::Error),

    /// I/O error reading/writing operation files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// USB device enumeration/open error
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// Any other error
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Process exit status: `1` for host/library-level failures (I/O, USB
    /// setup, CLI misuse, container loading), `2` for device-protocol-level
    /// failures observed mid-session.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidStatus(..)
            | Self::InvalidRetval { .. }
            | Self::UnexpectedValue { .. }
            | Self::NoMatchingDaEntry { .. }
            | Self::NoUsableLoadRegions
            | Self::ChecksumMismatch { .. }
            | Self::NandPresent(_)
            | Self::EmmcError(_)
            | Self::DaParser(_)
            | Self::Transport(mtk_transport::err::Error::EchoMismatch { .. }) => 2,
            _ => 1,
        }
    }
}
