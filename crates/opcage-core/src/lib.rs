//! opcage core: policy model, access filter, and the program image model.
//!
//! This crate defines the data layer shared by the host machinery and by
//! peripheral tooling (report generation, build integration). It carries no
//! execution machinery, so tooling can consume policies and images without
//! pulling in the validator or the engine.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `OpcageError`/`Result`; hostile images
//! and hostile policy documents are ordinary inputs, never crashes.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod image;
pub mod policy;
pub mod symbol;

/// Shared result type.
pub use error::{OpcageError, Result};
