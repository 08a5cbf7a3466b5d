// SPDX-License-Identifier: MIT OR Apache-2.0
//! `sbsign`: signs a PE/COFF image for UEFI Secure Boot, producing an
//! Authenticode-compatible PKCS#7 signature, attached or detached.

use anyhow::Result;

mod cli;
mod tracing_init;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    tracing_init::init(&cli.global)?;
    cli.run()
}
