// SPDX-License-Identifier: MIT OR Apache-2.0
//! PKCS#7 / CMS `SignedData` assembly (RFC 5652), specialized to the one
//! shape Authenticode needs: a single signer, `contentType` and
//! `messageDigest` authenticated attributes, and an `SpcIndirectDataContent`
//! payload.

use crate::digest::DigestAlgorithm;
use crate::error::{Result, SignError};
use crate::provider::SignerHandle;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{
    CertificateSet, DigestAlgorithmIdentifiers, EncapsulatedContentInfo, SignatureValue,
    SignedAttributes, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use const_oid::db::rfc5912::{SHA_1_WITH_RSA_ENCRYPTION, SHA_256_WITH_RSA_ENCRYPTION};
use const_oid::db::rfc6268::{ID_CONTENT_TYPE, ID_MESSAGE_DIGEST, ID_SIGNED_DATA};
use der::asn1::{OctetStringRef, SetOfVec};
use der::{Any, Decode, Encode};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::{Attribute, AttributeValue};
use x509_cert::Certificate;

/// The combined signature-algorithm OID a `SignerInfo` carries for a given
/// digest algorithm (RFC 5912's `sha256WithRSAEncryption`/
/// `sha1WithRSAEncryption`), not the bare `rsaEncryption` OID.
fn signature_algorithm_oid(digest_alg: DigestAlgorithm) -> const_oid::ObjectIdentifier {
    match digest_alg {
        DigestAlgorithm::Sha256 => SHA_256_WITH_RSA_ENCRYPTION,
        DigestAlgorithm::Sha1 => SHA_1_WITH_RSA_ENCRYPTION,
    }
}

fn algorithm_identifier(oid: const_oid::ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: Some(Any::from(der::asn1::Null)),
    }
}

fn attribute(oid: const_oid::ObjectIdentifier, value: impl Encode) -> Result<Attribute> {
    let der_bytes = value
        .to_der()
        .map_err(|e| SignError::encoding_failure(format!("attribute value encode: {e}")))?;
    let any = Any::from_der(&der_bytes)
        .map_err(|e| SignError::encoding_failure(format!("attribute value re-wrap: {e}")))?;
    let mut values = SetOfVec::<AttributeValue>::new();
    values
        .insert(any)
        .map_err(|e| SignError::encoding_failure(format!("attribute SET OF: {e}")))?;
    Ok(Attribute { oid, values })
}

/// Builds the DER bytes of a PKCS#7 `SignedData` wrapping `content_bytes`
/// under `content_oid` (the `SpcIndirectDataContent` produced by
/// [`crate::spc::encode`] under `spc::SPC_INDIRECT_DATA_OBJID`).
///
/// `intermediates` are embedded in the certificate set alongside
/// `signer_cert` but do not otherwise participate in the signature.
pub fn build(
    signer_cert: &Certificate,
    signer_handle: &SignerHandle,
    intermediates: &[Certificate],
    content_bytes: &[u8],
    content_oid: const_oid::ObjectIdentifier,
    digest_alg: DigestAlgorithm,
) -> Result<Vec<u8>> {
    let content_digest = match digest_alg {
        DigestAlgorithm::Sha256 => {
            use digest::Digest;
            sha2::Sha256::digest(content_bytes).to_vec()
        }
        DigestAlgorithm::Sha1 => {
            use digest::Digest;
            sha1::Sha1::digest(content_bytes).to_vec()
        }
    };

    let content_type_attr = attribute(ID_CONTENT_TYPE, content_oid)?;
    let message_digest_attr = attribute(
        ID_MESSAGE_DIGEST,
        OctetStringRef::new(&content_digest)
            .map_err(|e| SignError::encoding_failure(format!("messageDigest OCTET STRING: {e}")))?,
    )?;

    let mut signed_attrs = SignedAttributes::new();
    signed_attrs
        .insert(content_type_attr)
        .map_err(|e| SignError::encoding_failure(format!("signedAttrs insert: {e}")))?;
    signed_attrs
        .insert(message_digest_attr)
        .map_err(|e| SignError::encoding_failure(format!("signedAttrs insert: {e}")))?;

    // RFC 5652 §5.4: the signature covers the DER encoding of the
    // signedAttrs SET (implicit [0] context tag swapped for a universal
    // SET tag for this purpose), not the raw content bytes.
    let signed_attrs_der = signed_attrs
        .to_der()
        .map_err(|e| SignError::encoding_failure(format!("signedAttrs DER: {e}")))?;
    let signature_bytes = signer_handle.sign(digest_alg, &signed_attrs_der)?;

    let issuer_and_serial = cms::cert::IssuerAndSerialNumber {
        issuer: signer_cert.tbs_certificate.issuer.clone(),
        serial_number: signer_cert.tbs_certificate.serial_number.clone(),
    };

    let signer_info = SignerInfo {
        version: cms::signed_data::CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(issuer_and_serial),
        digest_alg: algorithm_identifier(digest_alg.object_identifier()),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: algorithm_identifier(signature_algorithm_oid(digest_alg)),
        signature: SignatureValue::new(&signature_bytes)
            .map_err(|e| SignError::encoding_failure(format!("signature OCTET STRING: {e}")))?,
        unsigned_attrs: None,
    };

    let mut signer_infos = SignerInfos::default();
    signer_infos
        .0
        .insert(signer_info)
        .map_err(|e| SignError::encoding_failure(format!("signerInfos SET OF: {e}")))?;

    let mut digest_algorithms = DigestAlgorithmIdentifiers::default();
    digest_algorithms
        .insert(algorithm_identifier(digest_alg.object_identifier()))
        .map_err(|e| SignError::encoding_failure(format!("digestAlgorithms SET OF: {e}")))?;

    let mut certificate_set = CertificateSet::default();
    certificate_set
        .0
        .insert(CertificateChoices::Certificate(signer_cert.clone()))
        .map_err(|e| SignError::encoding_failure(format!("certificate set insert: {e}")))?;
    for cert in intermediates {
        certificate_set
            .0
            .insert(CertificateChoices::Certificate(cert.clone()))
            .map_err(|e| SignError::encoding_failure(format!("certificate set insert: {e}")))?;
    }

    let encap_content_info = EncapsulatedContentInfo {
        econtent_type: content_oid,
        econtent: Some(
            Any::from_der(&content_bytes.to_der_wrapped()?)
                .map_err(|e| SignError::encoding_failure(format!("eContent re-wrap: {e}")))?,
        ),
    };

    let signed_data = SignedData {
        version: cms::signed_data::CmsVersion::V1,
        digest_algorithms,
        encap_content_info,
        certificates: Some(certificate_set),
        crls: None,
        signer_infos,
    };

    let signed_data_der = signed_data
        .to_der()
        .map_err(|e| SignError::encoding_failure(format!("SignedData encode: {e}")))?;
    let signed_data_any = Any::from_der(&signed_data_der)
        .map_err(|e| SignError::encoding_failure(format!("SignedData re-wrap: {e}")))?;

    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: signed_data_any,
    };

    content_info
        .to_der()
        .map_err(|e| SignError::encoding_failure(format!("ContentInfo encode: {e}")))
}

/// Wraps already-DER-encoded content bytes (an `SpcIndirectDataContent`) as
/// they must appear inside `eContent`: the raw bytes, unmodified, re-tagged
/// as an `Any` so they can be set on `EncapsulatedContentInfo`.
trait ToDerWrapped {
    fn to_der_wrapped(&self) -> Result<Vec<u8>>;
}

impl ToDerWrapped for [u8] {
    fn to_der_wrapped(&self) -> Result<Vec<u8>> {
        Ok(self.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::ImageDigest;
    use crate::provider::file::FileProvider;
    use crate::provider::{KeyForm, SigningProvider};

    fn self_signed_test_cert_and_key() -> (std::path::PathBuf, std::path::PathBuf, tempfile::TempDir) {
        // Test certificates are generated by `rcgen` rather than hand-built
        // DER so the resulting `x509_cert::Certificate` parses as a
        // realistic leaf cert, mirroring a minimal PE32+ binary signed with
        // an RSA-2048 self-signed certificate.
        let params = rcgen::CertificateParams::new(vec!["sbsign.test".into()]);
        let rcgen_cert = rcgen::Certificate::from_params(params).unwrap();
        let cert_der = rcgen_cert.serialize_der().unwrap();
        let key_der = rcgen_cert.serialize_private_key_der();

        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.der");
        let key_path = dir.path().join("key.der");
        std::fs::write(&cert_path, &cert_der).unwrap();
        std::fs::write(&key_path, &key_der).unwrap();
        (key_path, cert_path, dir)
    }

    #[test]
    fn builds_a_well_formed_content_info() {
        let (key_path, cert_path, _dir) = self_signed_test_cert_and_key();
        let provider = FileProvider::new(key_path, KeyForm::Der, cert_path);
        let (handle, cert) = provider.load().unwrap();

        let digest = ImageDigest {
            algorithm: DigestAlgorithm::Sha256,
            bytes: vec![0x42; 32],
        };
        let content = crate::spc::encode(&digest).unwrap();

        let der_bytes = build(
            &cert,
            &handle,
            &[],
            &content,
            crate::spc::SPC_INDIRECT_DATA_OBJID,
            DigestAlgorithm::Sha256,
        )
        .unwrap();

        assert_eq!(der_bytes[0], 0x30);
        let parsed = ContentInfo::from_der(&der_bytes).unwrap();
        assert_eq!(parsed.content_type, ID_SIGNED_DATA);
    }
}
