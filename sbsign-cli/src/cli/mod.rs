// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "sbsign", version, about = "UEFI Secure Boot Authenticode image signer")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    cmd: Cmd,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
    pub fn run(self) -> Result<()> {
        let verbose = self.global.verbose;
        match self.cmd {
            Cmd::Sign(a) => a.run(verbose),
        }
    }
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Sets the log verbosity (overridden by RUST_LOG if set)
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Enable informational diagnostics (raises the default filter to debug)
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Sign a PE/COFF image for UEFI Secure Boot
    Sign(sign::SignArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

mod sign;
