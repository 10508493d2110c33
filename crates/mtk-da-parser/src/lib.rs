use bincode::Decode;

use crate::err::Error;

pub mod da;
pub mod err;

pub type Result<T> = core::result::Result<T, Error>;

pub use da::hl::DA;

/// Decodes a fixed-layout, little-endian packed struct straight off the
/// wire and checks it against its own invariants.
pub trait LLParser: Decode<()> + Sized {
    type Error;

    fn parse(data: &[u8]) -> Result<Self> {
        let config = bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding();
        bincode::decode_from_slice(data, config)
            .map(|r| r.0)
            .map_err(|e| e.into())
    }

    fn validate(&self) -> core::result::Result<(), Self::Error>;
}

/// Builds the owned, borrow-checked view of a parsed struct on top of its
/// low-level counterpart, given the byte slice it and its children live in.
pub trait HLParser<T: LLParser>: Sized {
    fn parse(data: &[u8], position: usize, ll: T) -> Result<Self>;
}

/// Parses a complete download agent container.
pub fn parse_da(data: &[u8]) -> Result<DA> {
    let header = da::ll::Header::parse(data)?;
    header.validate()?;
    let required = da::ll::HEADER_SIZE + header.da_count as usize * da::ll::ENTRY_STRIDE;
    if data.len() < required {
        return Err(da::err::Error::TooShort {
            actual: data.len(),
            required,
            da_count: header.da_count,
        }
        .into());
    }
    DA::parse(data, da::ll::HEADER_SIZE, header)
}
