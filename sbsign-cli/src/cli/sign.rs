// SPDX-License-Identifier: MIT OR Apache-2.0
//! `sbsign sign`: the one subcommand this binary exposes.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use sbsign_core::digest::DigestAlgorithm;
use sbsign_core::provider::KeyForm;
use sbsign_core::sign::{self, SignConfig, SignReport, SignerSource};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Output {
    Human,
    Json,
    JsonPretty,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KeyFormArg {
    Pem,
    Der,
    External,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// PE/COFF image to sign
    input: PathBuf,

    /// Locator for the private key: a filesystem path for `pem`/`der`, or an
    /// implementation-defined identifier (e.g. `pkcs11:token=...`) for
    /// `external`
    #[arg(long)]
    key: String,

    /// Signer's X.509 certificate, PEM
    #[arg(long)]
    cert: PathBuf,

    /// PEM file of intermediate certificates to embed alongside the signer
    /// certificate
    #[arg(long)]
    addcert: Option<PathBuf>,

    /// Output path (default: `<input>.signed`, or `<input>.pk7` if `--detached`)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Emit a detached PKCS#7 SignedData blob instead of splicing the image
    #[arg(long)]
    detached: bool,

    /// Name of an external cryptographic provider, required with `--keyform external`
    #[arg(long, visible_alias = "provider")]
    engine: Option<String>,

    /// Form of the `--key` locator
    #[arg(long, value_enum, default_value_t = KeyFormArg::Pem)]
    keyform: KeyFormArg,

    /// How to print the signing summary
    #[arg(long, value_enum, default_value_t = Output::Human)]
    summary: Output,
}

impl SignArgs {
    pub fn run(self, verbose: bool) -> Result<()> {
        let signer = match self.keyform {
            KeyFormArg::Pem => SignerSource::File {
                key_path: PathBuf::from(&self.key),
                key_form: KeyForm::Pem,
                cert_path: self.cert.clone(),
            },
            KeyFormArg::Der => SignerSource::File {
                key_path: PathBuf::from(&self.key),
                key_form: KeyForm::Der,
                cert_path: self.cert.clone(),
            },
            KeyFormArg::External => {
                // sbsign-core only defines the `ExternalCryptoBackend` trait
                // boundary; the concrete HSM/KMS wire protocol isn't shipped
                // with this CLI. Embedders that need `--keyform external`
                // link sbsign-core directly and supply a backend via
                // `sign::SignerSource::External`.
                anyhow::bail!(
                    "keyform=external has no concrete provider bound into this binary \
                     (requested engine {:?}, locator {:?}); embed sbsign-core as a \
                     library and supply an ExternalCryptoBackend instead",
                    self.engine,
                    self.key,
                );
            }
        };

        let config = SignConfig {
            input: self.input.clone(),
            output: self.output.clone(),
            detached: self.detached,
            addcert: self.addcert.clone(),
            signer,
            digest_algorithm: DigestAlgorithm::Sha256,
            verbose,
        };

        let report = sign::run(config).context("signing failed")?;
        print_report(&report, self.summary)
    }
}

fn print_report(report: &SignReport, format: Output) -> Result<()> {
    match format {
        Output::Human => {
            let mode = if report.detached { "detached" } else { "attached" };
            println!("wrote {} ({mode})", report.output_path.display());
            println!("digest: {} ({:?})", report.digest_hex, report.digest_algorithm);
            println!("certificates: {}", report.certificate_count);
        }
        Output::Json => {
            serde_json::to_writer(io::stdout(), report)?;
            io::stdout().write_all(b"\n")?;
        }
        Output::JsonPretty => {
            serde_json::to_writer_pretty(io::stdout(), report)?;
            io::stdout().write_all(b"\n")?;
        }
    }
    Ok(())
}
