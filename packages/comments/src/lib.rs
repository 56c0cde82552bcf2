// Posts & Comments - Storage Core
//
// This crate provides the storage-and-notification layer behind the posts and
// comments API: a storage contract with in-memory and PostgreSQL backends, and
// a live comment feed bridged to cancellable per-client streams.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
