// SPDX-License-Identifier: MIT OR Apache-2.0
//! `sbsign-core` implements the Authenticode/PKCS#7 pipeline that signs a
//! PE/COFF image for UEFI Secure Boot: parse and address-map the image
//! ([`image`]), compute its Authenticode digest ([`digest`]), encode the
//! Microsoft-defined indirect-data content ([`spc`]), assemble a PKCS#7
//! `SignedData` over it ([`pkcs7`]) using a pluggable signing capability
//! ([`provider`]), and splice the result back into the image or emit it
//! detached. [`sign::run`] wires these together into the one entry point a
//! driver (CLI or otherwise) needs.

pub mod diag;
pub mod digest;
pub mod error;
pub mod image;
pub mod pkcs7;
pub mod provider;
pub mod sign;
pub mod spc;

pub use error::{Result, SignError};
