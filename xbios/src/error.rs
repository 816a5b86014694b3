//! Error taxonomy for the codec.
//!
//! `InvalidBldr` and `PreldrNotFound` are soft: callers get them back via
//! [`PreldrStatus`] / [`LoadStatus`] rather than as a hard `Err`, and the image
//! handle remains usable afterward. Everything else aborts the current operation.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum XbiosError {
    #[error("image size {0} is not one of the allowed sizes (256K/512K/1M)")]
    InvalidSize(usize),

    #[error("preldr pointer out of bounds or public key header malformed")]
    PreldrMalformed,

    #[error("LZX decompression failed: {0}")]
    DecompressFailed(String),

    #[error("required external key was not supplied: {0}")]
    KeyMissing(&'static str),

    #[error("bounds violation during codec execution: {0}")]
    Fatal(String),
}

pub type XbiosResult<T> = Result<T, XbiosError>;

/// Outcome of [`crate::preldr::decode_preldr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreldrStatus {
    /// The preldr decrypted the 2BL and it is the authority for this image.
    BldrDecrypted,
    /// A preldr is present, but it is not the authority for this image; the 2BL
    /// was re-encrypted to restore the image's original state.
    Found,
    /// No preldr block is present (e.g. MCPX v1.0 images).
    NotFound,
    /// A preldr appeared to be present but failed validation.
    Error,
}

/// Outcome of [`crate::bldr::decode_bldr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Success,
    /// Non-fatal: the 2BL's boot params failed structural validation. The image
    /// remains inspectable and `boot_params` is still exposed.
    InvalidBldr,
    Failed,
}
