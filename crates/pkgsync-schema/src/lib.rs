//! Shared data model for pkgsync.
//!
//! Everything here is plain data plus the digest/fingerprint primitives the
//! trust pipeline is built on. Nothing in this crate talks to the network.

pub mod cert;
pub mod hash;
pub mod types;

// Re-exports
pub use cert::*;
pub use hash::*;
pub use types::*;
