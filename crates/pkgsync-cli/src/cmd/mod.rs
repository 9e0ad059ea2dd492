pub mod apps;
pub mod fingerprint;
pub mod repo;
pub mod update;
