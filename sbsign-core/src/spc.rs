// SPDX-License-Identifier: MIT OR Apache-2.0
//! Microsoft `SpcIndirectDataContent` encoding (Authenticode's
//! content-type-specific payload, OID `1.3.6.1.4.1.311.2.1.4`).
//!
//! Only the fixed shape Authenticode actually emits is modeled: an
//! `SpcPeImageData` value with empty flags and an empty `SpcLink::File`
//! name. Real-world signers vary little here, so rather than implement the
//! full `SpcLink`/`SpcString` CHOICE grammar we hand-encode the one template
//! value every verifier expects, matching `SpcAttributeTypeAndOptionalValue`
//! / `DigestInfo` / `SpcPeImageData` from the Authenticode ASN.1 module.

use crate::digest::ImageDigest;
use crate::error::{Result, SignError};
use der::asn1::{BitStringRef, BmpString, OctetString};
use der::{Any, Encode, Sequence, TagMode, TagNumber};
use der::asn1::ContextSpecific;
use const_oid::ObjectIdentifier;
use spki::AlgorithmIdentifierOwned;

/// `1.3.6.1.4.1.311.2.1.4`
pub const SPC_INDIRECT_DATA_OBJID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.4");
/// `1.3.6.1.4.1.311.2.1.15`
const SPC_PE_IMAGE_DATA_OBJID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.15");

#[derive(Sequence)]
struct DigestInfo {
    digest_algorithm: AlgorithmIdentifierOwned,
    digest: OctetString,
}

#[derive(Sequence)]
struct SpcAttributeTypeAndOptionalValue {
    ty: ObjectIdentifier,
    value: Any,
}

#[derive(Sequence)]
struct SpcIndirectDataContent {
    data: SpcAttributeTypeAndOptionalValue,
    message_digest: DigestInfo,
}

#[derive(Sequence)]
struct SpcPeImageData {
    flags: BitStringRef<'static>,
    file: Any,
}

/// Builds the fixed `SpcLink::File(SpcString::Unicode(""))` value used by
/// every signature this crate emits: Authenticode verifiers only check that
/// the choice decodes, never its content.
fn empty_spc_link() -> Result<Any> {
    let unicode_name = BmpString::from_utf8("")
        .map_err(|e| SignError::encoding_failure(format!("BMPString encode: {e}")))?;
    let spc_string_choice = ContextSpecific {
        tag_number: TagNumber::new(0),
        tag_mode: TagMode::Implicit,
        value: unicode_name,
    };
    let file_choice = ContextSpecific {
        tag_number: TagNumber::new(2),
        tag_mode: TagMode::Explicit,
        value: spc_string_choice,
    };
    let bytes = file_choice
        .to_der()
        .map_err(|e| SignError::encoding_failure(format!("SpcLink encode: {e}")))?;
    Any::from_der(&bytes).map_err(|e| SignError::encoding_failure(format!("SpcLink re-wrap: {e}")))
}

fn spc_pe_image_data_any() -> Result<Any> {
    let pe_image_data = SpcPeImageData {
        flags: BitStringRef::from_bytes(&[])
            .map_err(|e| SignError::encoding_failure(format!("empty BIT STRING: {e}")))?,
        file: empty_spc_link()?,
    };
    let bytes = pe_image_data
        .to_der()
        .map_err(|e| SignError::encoding_failure(format!("SpcPeImageData encode: {e}")))?;
    Any::from_der(&bytes)
        .map_err(|e| SignError::encoding_failure(format!("SpcPeImageData re-wrap: {e}")))
}

/// Encodes the DER bytes of an `SpcIndirectDataContent` wrapping
/// `image_digest`. This is the content that gets placed inside the CMS
/// `EncapsulatedContentInfo` and whose own digest becomes the CMS
/// `messageDigest` signed attribute.
pub fn encode(image_digest: &ImageDigest) -> Result<Vec<u8>> {
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: image_digest.algorithm.object_identifier(),
        parameters: Some(Any::from(der::asn1::Null)),
    };

    let content = SpcIndirectDataContent {
        data: SpcAttributeTypeAndOptionalValue {
            ty: SPC_PE_IMAGE_DATA_OBJID,
            value: spc_pe_image_data_any()?,
        },
        message_digest: DigestInfo {
            digest_algorithm,
            digest: OctetString::new(image_digest.bytes.clone())
                .map_err(|e| SignError::encoding_failure(format!("digest OCTET STRING: {e}")))?,
        },
    };

    content
        .to_der()
        .map_err(|e| SignError::encoding_failure(format!("SpcIndirectDataContent encode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestAlgorithm;

    #[test]
    fn encodes_a_well_formed_der_sequence() {
        let digest = ImageDigest {
            algorithm: DigestAlgorithm::Sha256,
            bytes: vec![0x11; 32],
        };
        let der_bytes = encode(&digest).unwrap();
        assert_eq!(der_bytes[0], 0x30, "top level must be a SEQUENCE");
        assert!(der_bytes.len() > 32, "must contain the digest bytes plus framing");
        let contains_digest = der_bytes
            .windows(digest.bytes.len())
            .any(|w| w == digest.bytes.as_slice());
        assert!(contains_digest, "encoded content must carry the raw digest bytes");
    }

    #[test]
    fn different_digests_produce_different_encodings() {
        let a = encode(&ImageDigest {
            algorithm: DigestAlgorithm::Sha256,
            bytes: vec![0x01; 32],
        })
        .unwrap();
        let b = encode(&ImageDigest {
            algorithm: DigestAlgorithm::Sha256,
            bytes: vec![0x02; 32],
        })
        .unwrap();
        assert_ne!(a, b);
    }
}
