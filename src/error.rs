use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A part cannot be cut from any sheet type, even on an empty sheet.
    #[error("part '{id}' ({width}x{height}) does not fit any sheet type")]
    Unpackable { id: String, width: u32, height: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid part '{id}': {reason}")]
    InvalidPart { id: String, reason: String },

    #[error("invalid sheet type '{id}': {reason}")]
    InvalidSheetType { id: String, reason: String },
}
