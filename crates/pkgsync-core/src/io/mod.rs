//! Byte transport: downloads and read-side instrumentation.

pub mod download;
pub mod progress;
