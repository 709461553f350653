//! CLI command implementations.

pub mod common;
pub mod fetch;
pub mod ingest;
pub mod init;
pub mod manifest;
pub mod sweep;
pub mod update;
