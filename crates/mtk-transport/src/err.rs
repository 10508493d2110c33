use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    /// USB bulk or control transfer failed
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// A value written to the device did not come back unchanged
    #[error("echo mismatch: wrote {written:#x}, device returned {got:#x}")]
    EchoMismatch { written: u64, got: u64 },
}

pub type Result<T> = core::result::Result<T, Error>;
