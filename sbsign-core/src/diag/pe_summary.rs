// SPDX-License-Identifier: MIT OR Apache-2.0
//! Read-only PE/COFF introspection for `--verbose` logging: architecture
//! and pre-existing certificate-table metadata only.
//!
//! This wraps `goblin`'s parser the same way the UKI tooling this crate was
//! adapted from did: own the bytes, parse on demand, return borrowed slices
//! tied to `&self` so the public API stays lifetime-free. Unlike
//! [`crate::image::Image`], nothing here is ever written back to disk;
//! splicing the certificate table is `image::Image`'s job exclusively.

use anyhow::{Context, Result};
use goblin::pe::{options::ParseOptions, PE};
use std::path::Path;

#[derive(Debug)]
pub struct PeSummary {
    data: Box<[u8]>,
}

impl PeSummary {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Ok(Self {
            data: bytes.into_boxed_slice(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec().into_boxed_slice(),
        }
    }

    fn parse_pe(&self) -> Result<PE<'_>> {
        let mut opts = ParseOptions::default();
        opts.parse_attribute_certificates = true;
        PE::parse_with_opts(&self.data, &opts).context("not a valid PE/COFF image")
    }

    /// Human-oriented architecture label and the PE32+ flag.
    pub fn arch_summary(&self) -> Result<(&'static str, bool)> {
        use goblin::pe::header::*;
        let pe = self.parse_pe()?;
        let arch = match pe.header.coff_header.machine {
            COFF_MACHINE_X86_64 => "x86_64",
            COFF_MACHINE_ARM64 => "aarch64",
            COFF_MACHINE_ARM => "arm",
            COFF_MACHINE_X86 => "i386",
            _ => "unknown",
        };
        Ok((arch, pe.is_64))
    }

    /// `(length, revision, certificate_type)` per WIN_CERTIFICATE entry.
    pub fn certificate_metadata(&self) -> Result<Vec<(u32, u16, u16)>> {
        let pe = self.parse_pe()?;
        Ok(pe
            .certificates
            .iter()
            .map(|c| (c.length, c.revision as u16, c.certificate_type as u16))
            .collect())
    }
}
