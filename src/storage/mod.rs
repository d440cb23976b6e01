//! # Content Storage
//!
//! Opaque content-addressed blob stores used by the image exporter.
//!
//! - [`filesystem::FilesystemStore`] - an OCI image layout on disk
//! - [`memory::MemoryStore`] - in-process, for tests and dry runs

pub mod filesystem;
pub mod memory;
pub mod traits;
