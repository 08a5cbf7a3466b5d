// SPDX-License-Identifier: MIT OR Apache-2.0
//! Read-only diagnostics, kept deliberately separate from [`crate::image`]
//! so the goblin-backed introspection path can never be mistaken for the
//! byte-exact splicing path that actually produces a signed image.

pub mod pe_summary;

pub use pe_summary::PeSummary;
