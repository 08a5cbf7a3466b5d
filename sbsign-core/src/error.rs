// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed error kinds for the signing pipeline.
//!
//! Each stage of the pipeline (image loading, digesting, ASN.1 encoding,
//! key/cert loading, signing, I/O) fails into exactly one of these kinds so
//! callers, and tests, can match on *why* a run aborted, not just that it
//! did.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignError {
    /// PE parsing or structural validation failed.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Requested digest or key algorithm is not implementable.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signing provider could not materialize a signer handle.
    #[error("key load failure: {0}")]
    KeyLoadFailure(String),

    /// The signer or an intermediate certificate could not be parsed.
    #[error("certificate load failure: {0}")]
    CertificateLoadFailure(String),

    /// The signing provider rejected or failed the signature operation.
    #[error("sign failure: {0}")]
    SignFailure(String),

    /// ASN.1/DER serialization failed.
    #[error("encoding failure: {0}")]
    EncodingFailure(String),

    /// A filesystem read or write failed.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SignError>;

impl SignError {
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn unsupported_algorithm(msg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(msg.into())
    }

    pub fn key_load_failure(msg: impl Into<String>) -> Self {
        Self::KeyLoadFailure(msg.into())
    }

    pub fn certificate_load_failure(msg: impl Into<String>) -> Self {
        Self::CertificateLoadFailure(msg.into())
    }

    pub fn sign_failure(msg: impl Into<String>) -> Self {
        Self::SignFailure(msg.into())
    }

    pub fn encoding_failure(msg: impl Into<String>) -> Self {
        Self::EncodingFailure(msg.into())
    }
}
