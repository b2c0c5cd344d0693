//! peforge - versioned PE structures and Authenticode verification
//!
//! This crate decodes the PE load configuration directory at whatever
//! revision an image carries, and checks the PKCS#7 signatures stored in
//! the security directory against a certificate store.

// Enforce strict code quality and reliability
#![deny(
    // Safety
    unsafe_code,

    // Correctness
    missing_debug_implementations,

    // Future compatibility
    future_incompatible,
)]
#![warn(
    // Documentation
    missing_docs,

    // Rust 2018 idioms
    rust_2018_idioms,
    unreachable_pub,

    // Error handling best practices
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo,

    // Performance
    clippy::inefficient_to_string,
    clippy::large_enum_variant,

    // Code clarity and maintainability
    clippy::cognitive_complexity,
    clippy::type_complexity,

    // Best practices
    clippy::clone_on_ref_ptr,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
)]
#![allow(
    missing_docs,  // TODO: document the load configuration field accessors
)]

pub mod api;
pub mod exceptions;
pub mod logger;
pub mod pe;
pub mod record;
pub mod utils;
pub mod version;

// Re-export main API functions
pub use api::{VerifyResult, parse_binary, verify_binary};
pub use exceptions::{ForgeError, Result};

// Re-export the object model for direct use
pub use pe::signature::{
    Certificate, CertificateStore, ContentInfo, DigestAlgorithm, Signature, SignerInfo,
    VerificationFlags, decode_pkcs7, verify,
};
pub use pe::{
    Binary, BinaryFormat, LoadConfigField, LoadConfigVersion, LoadConfiguration, ParserConfig,
    PeType, decode_load_config, detect_format,
};
pub use record::{Layout, RecordSchema, RecordView, VersionedRecord};
