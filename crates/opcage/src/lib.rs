//! Top-level facade crate for opcage.
//!
//! Re-exports the core data layer and the host machinery so users can depend
//! on a single crate.

pub mod core {
    pub use opcage_core::*;
}

pub mod host {
    pub use opcage_host::*;
}
