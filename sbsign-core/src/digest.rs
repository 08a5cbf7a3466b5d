// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authenticode message digest computation.

use crate::error::{Result, SignError};
use crate::image::Image;
use const_oid::db::rfc5912;
use const_oid::ObjectIdentifier;
use digest::Digest;

/// Digest algorithms accepted for Authenticode signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    /// SHA-256, the default and only algorithm new signatures should use.
    Sha256,
    /// SHA-1, accepted for compatibility with legacy verifiers only.
    Sha1,
}

impl DigestAlgorithm {
    pub fn object_identifier(self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha256 => rfc5912::ID_SHA_256,
            DigestAlgorithm::Sha1 => rfc5912::ID_SHA_1,
        }
    }

    pub fn output_size(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha1 => 20,
        }
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = SignError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "sha1" | "sha-1" => Ok(DigestAlgorithm::Sha1),
            other => Err(SignError::unsupported_algorithm(format!(
                "digest algorithm '{other}' is not supported"
            ))),
        }
    }
}

/// The result of hashing an image's Authenticode-covered byte ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDigest {
    pub algorithm: DigestAlgorithm,
    pub bytes: Vec<u8>,
}

impl ImageDigest {
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Hashes `image`'s Authenticode regions (see [`Image::authenticode_regions`])
/// with `alg`, streaming each range through the digest rather than
/// materializing a copy of the covered bytes.
pub fn compute(image: &Image, alg: DigestAlgorithm) -> Result<ImageDigest> {
    let regions = image.authenticode_regions();
    let bytes = match alg {
        DigestAlgorithm::Sha256 => {
            let mut hasher = sha2::Sha256::new();
            for region in &regions {
                hasher.update(&image.bytes()[region.clone()]);
            }
            hasher.finalize().to_vec()
        }
        DigestAlgorithm::Sha1 => {
            let mut hasher = sha1::Sha1::new();
            for region in &regions {
                hasher.update(&image.bytes()[region.clone()]);
            }
            hasher.finalize().to_vec()
        }
    };
    Ok(ImageDigest { algorithm: alg, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::test_support::minimal_pe32_plus;

    #[test]
    fn sha256_digest_is_32_bytes_and_deterministic() {
        let image = Image::from_bytes(minimal_pe32_plus(4096)).unwrap();
        let a = compute(&image, DigestAlgorithm::Sha256).unwrap();
        let b = compute(&image, DigestAlgorithm::Sha256).unwrap();
        assert_eq!(a.bytes.len(), 32);
        assert_eq!(a, b);
    }

    #[test]
    fn sha1_digest_is_20_bytes() {
        let image = Image::from_bytes(minimal_pe32_plus(4096)).unwrap();
        let d = compute(&image, DigestAlgorithm::Sha1).unwrap();
        assert_eq!(d.bytes.len(), 20);
    }

    #[test]
    fn parses_algorithm_names_case_insensitively() {
        assert_eq!("SHA256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert_eq!("sha-1".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha1);
        assert!("md5".parse::<DigestAlgorithm>().is_err());
    }

    #[test]
    fn checksum_field_does_not_affect_digest() {
        let mut bytes = minimal_pe32_plus(4096);
        let image_before = Image::from_bytes(bytes.clone()).unwrap();
        let digest_before = compute(&image_before, DigestAlgorithm::Sha256).unwrap();

        // Flip the checksum bytes (offset derived the same way image::parse_layout does).
        let coff = 0x80 + 4;
        let opt = coff + 20;
        bytes[opt + 64] ^= 0xff;
        let image_after = Image::from_bytes(bytes).unwrap();
        let digest_after = compute(&image_after, DigestAlgorithm::Sha256).unwrap();

        assert_eq!(digest_before, digest_after);
    }
}
