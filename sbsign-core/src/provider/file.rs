// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-based signing provider: an RSA private key (PEM or DER, PKCS#8 or
//! PKCS#1) and an X.509 signer certificate (PEM), both read from disk.

use super::{KeyForm, RawSigner, SignerHandle, SigningProvider};
use crate::digest::DigestAlgorithm;
use crate::error::{Result, SignError};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha1::Sha1;
use sha2::Sha256;
use std::path::PathBuf;
use x509_cert::der::{Decode, DecodePem};
use x509_cert::Certificate;

pub struct FileProvider {
    pub key_path: PathBuf,
    pub key_form: KeyForm,
    pub cert_path: PathBuf,
}

impl FileProvider {
    pub fn new(key_path: impl Into<PathBuf>, key_form: KeyForm, cert_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
            key_form,
            cert_path: cert_path.into(),
        }
    }

    fn load_private_key(&self) -> Result<RsaPrivateKey> {
        let raw = std::fs::read(&self.key_path)?;
        match self.key_form {
            KeyForm::Pem => {
                let pem = String::from_utf8(raw).map_err(|e| {
                    SignError::key_load_failure(format!("key file is not valid UTF-8 PEM: {e}"))
                })?;
                use rsa::pkcs8::DecodePrivateKey;
                RsaPrivateKey::from_pkcs8_pem(&pem)
                    .or_else(|_| {
                        use rsa::pkcs1::DecodeRsaPrivateKey;
                        RsaPrivateKey::from_pkcs1_pem(&pem)
                    })
                    .map_err(|e| SignError::key_load_failure(format!("PEM private key: {e}")))
            }
            KeyForm::Der => {
                use rsa::pkcs8::DecodePrivateKey;
                RsaPrivateKey::from_pkcs8_der(&raw)
                    .or_else(|_| {
                        use rsa::pkcs1::DecodeRsaPrivateKey;
                        RsaPrivateKey::from_pkcs1_der(&raw)
                    })
                    .map_err(|e| SignError::key_load_failure(format!("DER private key: {e}")))
            }
            KeyForm::External => Err(SignError::key_load_failure(
                "FileProvider cannot load an external key form",
            )),
        }
    }

    fn load_certificate(&self) -> Result<Certificate> {
        let raw = std::fs::read(&self.cert_path)?;
        if let Ok(pem) = std::str::from_utf8(&raw) {
            if let Ok(cert) = Certificate::from_pem(pem) {
                return Ok(cert);
            }
        }
        Certificate::from_der(&raw)
            .map_err(|e| SignError::certificate_load_failure(format!("signer certificate: {e}")))
    }
}

impl SigningProvider for FileProvider {
    fn load(&self) -> Result<(SignerHandle, Certificate)> {
        let private_key = self.load_private_key()?;
        let certificate = self.load_certificate()?;
        let handle = SignerHandle::new(Box::new(RsaPkcs1v15Signer(private_key)));
        Ok((handle, certificate))
    }
}

/// Signs with RSA PKCS#1v1.5 under whichever digest algorithm the caller
/// asks for. `sbsign-core` never pins the on-disk key to one hash up
/// front, since the same key signs SHA-256 in the common case and SHA-1
/// only for legacy-verifier compatibility.
struct RsaPkcs1v15Signer(RsaPrivateKey);

impl RawSigner for RsaPkcs1v15Signer {
    fn try_sign_raw(&self, digest_alg: DigestAlgorithm, message: &[u8]) -> Result<Vec<u8>> {
        match digest_alg {
            DigestAlgorithm::Sha256 => SigningKey::<Sha256>::new(self.0.clone())
                .try_sign(message)
                .map(|sig| sig.to_vec())
                .map_err(|e| SignError::sign_failure(e.to_string())),
            DigestAlgorithm::Sha1 => SigningKey::<Sha1>::new(self.0.clone())
                .try_sign(message)
                .map(|sig| sig.to_vec())
                .map_err(|e| SignError::sign_failure(e.to_string())),
        }
    }
}

/// Loads zero or more additional certificates (PEM, possibly concatenated)
/// to embed in the signature's certificate set alongside the signer's own
/// certificate (the `--addcert` CLI option).
pub fn load_intermediate_certificates(path: &std::path::Path) -> Result<Vec<Certificate>> {
    let raw = std::fs::read(path)?;
    let text = String::from_utf8(raw)
        .map_err(|e| SignError::certificate_load_failure(format!("intermediate bundle: {e}")))?;

    let mut certs = Vec::new();
    let mut remainder = text.as_str();
    while let Some(start) = remainder.find("-----BEGIN CERTIFICATE-----") {
        let Some(end_rel) = remainder[start..].find("-----END CERTIFICATE-----") else {
            break;
        };
        let end = start + end_rel + "-----END CERTIFICATE-----".len();
        let pem_block = &remainder[start..end];
        let cert = Certificate::from_pem(pem_block)
            .map_err(|e| SignError::certificate_load_failure(format!("intermediate certificate: {e}")))?;
        certs.push(cert);
        remainder = &remainder[end..];
    }

    if certs.is_empty() {
        return Err(SignError::certificate_load_failure(
            "no PEM certificates found in --addcert bundle",
        ));
    }
    Ok(certs)
}
