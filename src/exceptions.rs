//! Error types for peforge

use std::fmt;

/// Main error type for peforge operations
#[derive(Debug)]
pub enum ForgeError {
    /// Declared size is smaller than the smallest schema revision
    TruncatedRecord {
        record: &'static str,
        needed: usize,
        available: usize,
    },

    /// A view or field above the decoded tier was requested
    UnsupportedVersion(String),

    /// A write targeted a field outside the decoded tier's schema
    SchemaMismatch(String),

    /// Digest or key algorithm not implemented
    UnsupportedAlgorithm(String),

    /// Structural ASN.1/DER error
    MalformedEncoding(String),

    /// Region exceeds the loaded image
    OutOfRange { offset: u64, length: u64, size: u64 },

    /// Binary format not supported
    UnsupportedFormat(String),

    /// IO error
    IoError(std::io::Error),

    /// Generic error with message
    Generic(String),
}

impl fmt::Display for ForgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForgeError::TruncatedRecord {
                record,
                needed,
                available,
            } => write!(
                f,
                "Truncated record: {record} needs at least {needed} bytes, {available} available"
            ),
            ForgeError::UnsupportedVersion(msg) => write!(f, "Unsupported version: {msg}"),
            ForgeError::SchemaMismatch(msg) => write!(f, "Schema mismatch: {msg}"),
            ForgeError::UnsupportedAlgorithm(msg) => write!(f, "Unsupported algorithm: {msg}"),
            ForgeError::MalformedEncoding(msg) => write!(f, "Malformed encoding: {msg}"),
            ForgeError::OutOfRange {
                offset,
                length,
                size,
            } => write!(
                f,
                "Out of range: 0x{offset:x}+0x{length:x} exceeds image size 0x{size:x}"
            ),
            ForgeError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {msg}"),
            ForgeError::IoError(err) => write!(f, "IO error: {err}"),
            ForgeError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ForgeError {}

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        ForgeError::IoError(err)
    }
}

impl From<der::Error> for ForgeError {
    fn from(err: der::Error) -> Self {
        ForgeError::MalformedEncoding(err.to_string())
    }
}

impl From<anyhow::Error> for ForgeError {
    fn from(err: anyhow::Error) -> Self {
        ForgeError::Generic(format!("{err:#}"))
    }
}

/// Result type for peforge operations
pub type Result<T> = std::result::Result<T, ForgeError>;
