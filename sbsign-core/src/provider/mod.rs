// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable signing providers.
//!
//! A [`SigningProvider`] turns key material (on disk, or behind an external
//! crypto backend) into a [`SignerHandle`]: an opaque capability that can
//! produce an RSA PKCS#1v1.5 signature over an arbitrary byte string plus
//! the certificate chain to embed alongside it. `pkcs7::build` only ever
//! talks to this trait, never to a concrete key type, so file-based and
//! external signing share one code path downstream.

pub mod external;
pub mod file;

use crate::digest::DigestAlgorithm;
use crate::error::Result;
use x509_cert::Certificate;

/// How the signer's private key material is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyForm {
    Pem,
    Der,
    /// The key never leaves an external backend; `--engine` names it.
    External,
}

impl std::str::FromStr for KeyForm {
    type Err = crate::error::SignError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pem" => Ok(KeyForm::Pem),
            "der" => Ok(KeyForm::Der),
            "external" => Ok(KeyForm::External),
            other => Err(crate::error::SignError::unsupported_algorithm(format!(
                "key form '{other}' is not supported"
            ))),
        }
    }
}

/// Something that can produce a raw PKCS#1v1.5 signature over an arbitrary
/// message under a chosen digest algorithm. Implemented for on-disk RSA
/// keys ([`file`]) and for the external-backend bridge ([`external`]);
/// `SignerHandle` erases the difference behind a trait object.
pub trait RawSigner {
    fn try_sign_raw(&self, digest_alg: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>>;
}

/// An opaque signing capability bound to one signer certificate.
///
/// Holding a `SignerHandle` never exposes the underlying private key; it
/// only allows producing signatures over caller-supplied bytes, performing
/// the full hash-then-sign in one call: the provider hashes `message_bytes`
/// with `digest_alg` and returns the signature.
pub struct SignerHandle {
    signer: Box<dyn RawSigner + Send + Sync>,
}

impl SignerHandle {
    pub fn new(signer: Box<dyn RawSigner + Send + Sync>) -> Self {
        Self { signer }
    }

    /// Hashes `message` with `digest_alg` and signs it, returning the raw
    /// PKCS#1v1.5 signature bytes.
    pub fn sign(&self, digest_alg: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>> {
        self.signer.try_sign_raw(digest_alg, message)
    }
}

/// Produces a [`SignerHandle`] and the signer's certificate from whatever
/// key material this provider was configured with.
pub trait SigningProvider {
    fn load(&self) -> Result<(SignerHandle, Certificate)>;
}
