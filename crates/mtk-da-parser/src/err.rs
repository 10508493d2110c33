use thiserror::Error as TError;

#[derive(Debug, TError)]
pub enum Error {
    #[error("download agent container: {0}")]
    Da(#[from] crate::da::err::Error),

    #[error("bincode decode error: {0}")]
    Bincode(#[from] bincode::error::DecodeError),

    #[error("{0}")]
    Custom(String),
}
