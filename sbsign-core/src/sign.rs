// SPDX-License-Identifier: MIT OR Apache-2.0
//! Orchestrates one end-to-end signing run: load the image, acquire a
//! signer, compute the Authenticode digest, encode the Microsoft indirect
//! content, assemble the PKCS#7 `SignedData`, and splice it into the image
//! (attached) or write it standalone (detached).
//!
//! This is the one function a driver needs: `sbsign-cli`'s `sign`
//! subcommand calls [`run`] and nothing else from this crate's pipeline
//! directly.

use crate::digest::{self, DigestAlgorithm};
use crate::error::Result;
use crate::image::Image;
use crate::pkcs7;
use crate::provider::external::{ExternalCryptoBackend, ExternalProviderGuard, ExternalProviderTeardown};
use crate::provider::file::{load_intermediate_certificates, FileProvider};
use crate::provider::{KeyForm, SignerHandle, SigningProvider};
use crate::spc;
use std::path::{Path, PathBuf};
use tracing::{debug, debug_span};
use x509_cert::Certificate;

/// Where the signer's private key and certificate come from.
pub enum SignerSource {
    /// A PEM or DER private key file plus a PEM signer certificate, both
    /// read from disk.
    File {
        key_path: PathBuf,
        key_form: KeyForm,
        cert_path: PathBuf,
    },
    /// A caller-supplied external cryptographic backend (HSM, KMS, smart
    /// card...). `sbsign-core` brackets it with
    /// [`crate::provider::external::ExternalProviderGuard`]'s single-active
    /// guarantee and never sees the key material itself.
    External {
        provider_name: String,
        backend: Box<dyn ExternalCryptoBackend>,
    },
}

/// Everything one signing run needs: input image, output location, signer
/// source, and the options a CLI (or other embedder) exposes around them.
pub struct SignConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub detached: bool,
    pub addcert: Option<PathBuf>,
    pub signer: SignerSource,
    pub digest_algorithm: DigestAlgorithm,
    pub verbose: bool,
}

/// Summary of a completed run, printed by the CLI in human or JSON form.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SignReport {
    pub output_path: PathBuf,
    pub digest_algorithm: DigestAlgorithm,
    pub digest_hex: String,
    pub certificate_count: usize,
    pub detached: bool,
}

/// Runs the full signing pipeline end to end and returns a summary of what
/// was produced. Produces no output file at all unless every stage
/// (digest, encode, sign, splice/write) succeeds.
pub fn run(config: SignConfig) -> Result<SignReport> {
    let span = debug_span!("sign::run", input = %config.input.display());
    let _enter = span.enter();

    let mut image = {
        let _s = debug_span!("image::load").entered();
        Image::load(&config.input)?
    };
    debug!(
        existing_certificates = image.certificate_count()?,
        is_pe32_plus = image.is_pe32_plus(),
        "loaded image"
    );

    if config.verbose {
        log_verbose_facts(&config.input);
    }

    let image_digest = {
        let _s = debug_span!("digest::compute", algorithm = ?config.digest_algorithm).entered();
        digest::compute(&image, config.digest_algorithm)?
    };
    debug!(digest = %image_digest.to_hex(), "computed authenticode digest");

    let (signer_handle, signer_cert, teardown) = acquire_signer(config.signer)?;

    // Run every remaining fallible stage that needs `signer_handle` inside
    // one block so the external provider is always torn down afterwards,
    // whether that block succeeded or a stage returned an error early —
    // `ExternalProviderTeardown` also clears the active-provider slot on
    // `Drop` as a backstop, but tearing down explicitly here lets a
    // teardown failure surface through `run`'s `Result` instead of only
    // being logged.
    let pipeline: Result<(Vec<Certificate>, Vec<u8>)> = (|| {
        let intermediates = match &config.addcert {
            Some(path) => {
                let _s = debug_span!("provider::file::load_intermediate_certificates").entered();
                load_intermediate_certificates(path)?
            }
            None => Vec::new(),
        };

        let content = {
            let _s = debug_span!("spc::encode").entered();
            spc::encode(&image_digest)?
        };

        let signed_data_der = {
            let _s = debug_span!("pkcs7::build").entered();
            pkcs7::build(
                &signer_cert,
                &signer_handle,
                &intermediates,
                &content,
                spc::SPC_INDIRECT_DATA_OBJID,
                config.digest_algorithm,
            )?
        };

        Ok((intermediates, signed_data_der))
    })();

    if let Some(teardown) = teardown {
        let teardown_result = teardown.teardown();
        if pipeline.is_ok() {
            teardown_result?;
        } else if let Err(e) = teardown_result {
            tracing::warn!(error = %e, "external provider teardown failed after a prior signing error");
        }
    }

    let (intermediates, signed_data_der) = pipeline?;
    let certificate_count = 1 + intermediates.len();

    let output_path = resolve_output_path(&config.input, config.output.as_deref(), config.detached);

    // Always splice first, then either write the full image or extract the
    // entry we just appended: this is what makes the detached output
    // byte-identical to the attached output's last certificate-table
    // payload, rather than merely "supposed to match".
    image.append_signature(&signed_data_der)?;
    if config.detached {
        let last_index = image.certificate_count()? - 1;
        let _s = debug_span!("image::write_detached").entered();
        image.write_detached(last_index, &output_path)?;
    } else {
        let _s = debug_span!("image::write").entered();
        image.write(&output_path)?;
    }

    Ok(SignReport {
        output_path,
        digest_algorithm: config.digest_algorithm,
        digest_hex: image_digest.to_hex(),
        certificate_count,
        detached: config.detached,
    })
}

fn log_verbose_facts(input: &Path) {
    let Ok(summary) = crate::diag::PeSummary::from_path(input) else {
        return;
    };
    if let Ok((arch, is_64)) = summary.arch_summary() {
        debug!(arch, is_64, "image architecture");
    }
    if let Ok(metadata) = summary.certificate_metadata() {
        debug!(count = metadata.len(), "pre-existing certificate-table entries");
    }
}

fn acquire_signer(
    source: SignerSource,
) -> Result<(SignerHandle, Certificate, Option<ExternalProviderTeardown<Box<dyn ExternalCryptoBackend>>>)> {
    match source {
        SignerSource::File {
            key_path,
            key_form,
            cert_path,
        } => {
            let _s = debug_span!("provider::file::load").entered();
            let provider = FileProvider::new(key_path, key_form, cert_path);
            let (handle, cert) = provider.load()?;
            Ok((handle, cert, None))
        }
        SignerSource::External { provider_name, backend } => {
            let _s = debug_span!("provider::external::load", provider = %provider_name).entered();
            let guard = ExternalProviderGuard::activate(backend)?;
            let cert = guard.certificate()?;
            let (handle, teardown) = guard.into_handle();
            Ok((handle, cert, Some(teardown)))
        }
    }
}

/// Default output path: `<input>.signed`, or `<input>.pk7` when detached,
/// unless the caller supplied one explicitly.
fn resolve_output_path(input: &Path, output: Option<&Path>, detached: bool) -> PathBuf {
    if let Some(path) = output {
        return path.to_path_buf();
    }
    let extension = if detached { "pk7" } else { "signed" };
    let mut file_name = input.file_name().unwrap_or_default().to_os_string();
    file_name.push(".");
    file_name.push(extension);
    input.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::test_support::minimal_pe32_plus;
    use crate::provider::external::test_support::RecordingBackend;
    use std::fs;

    fn write_test_key_and_cert(dir: &Path) -> (PathBuf, PathBuf, Vec<u8>) {
        let params = rcgen::CertificateParams::new(vec!["sbsign.test".into()]);
        let rcgen_cert = rcgen::Certificate::from_params(params).unwrap();
        let cert_der = rcgen_cert.serialize_der().unwrap();
        let key_der = rcgen_cert.serialize_private_key_der();

        let cert_path = dir.join("cert.der");
        let key_path = dir.join("key.der");
        fs::write(&cert_path, &cert_der).unwrap();
        fs::write(&key_path, &key_der).unwrap();
        (key_path, cert_path, cert_der)
    }

    fn write_test_input(dir: &Path) -> PathBuf {
        let input_path = dir.join("input.efi");
        fs::write(&input_path, minimal_pe32_plus(4096)).unwrap();
        input_path
    }

    #[test]
    fn attached_sign_produces_one_certificate_table_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (key_path, cert_path, _) = write_test_key_and_cert(dir.path());
        let input = write_test_input(dir.path());
        let output = dir.path().join("out.signed");

        let config = SignConfig {
            input: input.clone(),
            output: Some(output.clone()),
            detached: false,
            addcert: None,
            signer: SignerSource::File {
                key_path,
                key_form: KeyForm::Der,
                cert_path,
            },
            digest_algorithm: DigestAlgorithm::Sha256,
            verbose: false,
        };

        let report = run(config).unwrap();
        assert_eq!(report.certificate_count, 1);
        assert!(!report.detached);

        let signed_bytes = fs::read(&output).unwrap();
        let signed_image = Image::from_bytes(signed_bytes).unwrap();
        assert_eq!(signed_image.certificate_count().unwrap(), 1);
    }

    #[test]
    fn re_signing_an_already_signed_image_appends_a_second_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (key_path, cert_path, _) = write_test_key_and_cert(dir.path());
        let input = write_test_input(dir.path());
        let once = dir.path().join("once.signed");
        let twice = dir.path().join("twice.signed");

        let config_a = SignConfig {
            input: input.clone(),
            output: Some(once.clone()),
            detached: false,
            addcert: None,
            signer: SignerSource::File {
                key_path: key_path.clone(),
                key_form: KeyForm::Der,
                cert_path: cert_path.clone(),
            },
            digest_algorithm: DigestAlgorithm::Sha256,
            verbose: false,
        };
        run(config_a).unwrap();

        let config_b = SignConfig {
            input: once.clone(),
            output: Some(twice.clone()),
            detached: false,
            addcert: None,
            signer: SignerSource::File {
                key_path,
                key_form: KeyForm::Der,
                cert_path,
            },
            digest_algorithm: DigestAlgorithm::Sha256,
            verbose: false,
        };
        let report = run(config_b).unwrap();

        let signed_image = Image::from_bytes(fs::read(&twice).unwrap()).unwrap();
        assert_eq!(signed_image.certificate_count().unwrap(), 2);
        assert_eq!(report.certificate_count, 1, "report counts this run's own cert set only");
    }

    #[test]
    fn detached_output_matches_attached_last_entry_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (key_path, cert_path, _) = write_test_key_and_cert(dir.path());
        let input = write_test_input(dir.path());
        let attached = dir.path().join("attached.signed");
        let detached = dir.path().join("detached.pk7");

        for (output, is_detached) in [(&attached, false), (&detached, true)] {
            let config = SignConfig {
                input: input.clone(),
                output: Some(output.clone()),
                detached: is_detached,
                addcert: None,
                signer: SignerSource::File {
                    key_path: key_path.clone(),
                    key_form: KeyForm::Der,
                    cert_path: cert_path.clone(),
                },
                digest_algorithm: DigestAlgorithm::Sha256,
                verbose: false,
            };
            run(config).unwrap();
        }

        let attached_image = Image::from_bytes(fs::read(&attached).unwrap()).unwrap();
        let attached_detached_out = dir.path().join("extracted.pk7");
        attached_image.write_detached(0, &attached_detached_out).unwrap();

        let detached_bytes = fs::read(&detached).unwrap();
        let extracted_bytes = fs::read(&attached_detached_out).unwrap();
        assert_eq!(detached_bytes, extracted_bytes);
    }

    #[test]
    fn addcert_bundle_is_embedded_alongside_the_signer_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let (key_path, cert_path, _) = write_test_key_and_cert(dir.path());
        let input = write_test_input(dir.path());
        let output = dir.path().join("out.signed");

        let mut bundle = String::new();
        for name in ["intermediate-a.test", "intermediate-b.test"] {
            let params = rcgen::CertificateParams::new(vec![name.into()]);
            let cert = rcgen::Certificate::from_params(params).unwrap();
            bundle.push_str(&cert.serialize_pem().unwrap());
        }
        let addcert_path = dir.path().join("intermediates.pem");
        fs::write(&addcert_path, bundle).unwrap();

        let config = SignConfig {
            input,
            output: Some(output),
            detached: false,
            addcert: Some(addcert_path),
            signer: SignerSource::File {
                key_path,
                key_form: KeyForm::Der,
                cert_path,
            },
            digest_algorithm: DigestAlgorithm::Sha256,
            verbose: false,
        };

        let report = run(config).unwrap();
        assert_eq!(report.certificate_count, 3);
    }

    #[test]
    fn external_provider_signs_the_der_encoded_signed_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let (_key_path, _cert_path, cert_der) = write_test_key_and_cert(dir.path());
        let input = write_test_input(dir.path());
        let output = dir.path().join("out.signed");

        let backend = RecordingBackend::new(cert_der);
        let recorded = backend.signed_messages.clone();

        let input_for_digest = input.clone();
        let config = SignConfig {
            input,
            output: Some(output),
            detached: false,
            addcert: None,
            signer: SignerSource::External {
                provider_name: "test-hsm".to_string(),
                backend: Box::new(backend),
            },
            digest_algorithm: DigestAlgorithm::Sha256,
            verbose: false,
        };
        run(config).unwrap();

        let messages = recorded.lock().unwrap();
        assert_eq!(messages.len(), 1, "sign is called exactly once per run");

        // The recorded message is the DER-encoded signed attributes, and
        // must carry a messageDigest attribute equal to the SHA-256 of the
        // independently-recomputed SpcIndirectDataContent: the signature
        // truly covers the attribute set, not the raw image digest or
        // content bytes directly.
        let image = Image::load(&input_for_digest).unwrap();
        let image_digest = digest::compute(&image, DigestAlgorithm::Sha256).unwrap();
        let content = spc::encode(&image_digest).unwrap();
        let expected_message_digest = {
            use sha2::Digest as _;
            sha2::Sha256::digest(&content).to_vec()
        };
        let recorded_der = &messages[0];
        let contains_expected_digest = recorded_der
            .windows(expected_message_digest.len())
            .any(|w| w == expected_message_digest.as_slice());
        assert!(
            contains_expected_digest,
            "signed attributes must embed sha256(content) as messageDigest"
        );
    }

    #[test]
    fn external_provider_is_released_when_a_later_stage_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (_key_path, _cert_path, cert_der) = write_test_key_and_cert(dir.path());
        let input = write_test_input(dir.path());
        let output = dir.path().join("out.signed");

        // A nonexistent `--addcert` path fails `load_intermediate_certificates`
        // after the external provider has already been activated; the
        // provider must still be released so the next run can activate one.
        let config = SignConfig {
            input,
            output: Some(output),
            detached: false,
            addcert: Some(dir.path().join("does-not-exist.pem")),
            signer: SignerSource::External {
                provider_name: "test-hsm".to_string(),
                backend: Box::new(RecordingBackend::new(cert_der.clone())),
            },
            digest_algorithm: DigestAlgorithm::Sha256,
            verbose: false,
        };
        assert!(run(config).is_err());

        let input_2 = write_test_input(dir.path());
        let output_2 = dir.path().join("out2.signed");
        let config_2 = SignConfig {
            input: input_2,
            output: Some(output_2),
            detached: false,
            addcert: None,
            signer: SignerSource::External {
                provider_name: "test-hsm".to_string(),
                backend: Box::new(RecordingBackend::new(cert_der)),
            },
            digest_algorithm: DigestAlgorithm::Sha256,
            verbose: false,
        };
        run(config_2).unwrap();
    }

    #[test]
    fn default_output_path_follows_detached_flag() {
        assert_eq!(
            resolve_output_path(Path::new("/tmp/foo.efi"), None, false),
            Path::new("/tmp/foo.efi.signed")
        );
        assert_eq!(
            resolve_output_path(Path::new("/tmp/foo.efi"), None, true),
            Path::new("/tmp/foo.efi.pk7")
        );
        assert_eq!(
            resolve_output_path(Path::new("/tmp/foo.efi"), Some(Path::new("/out/x")), true),
            Path::new("/out/x")
        );
    }
}
