// src/env/mod.rs

//! Environment-configuration store.
//!
//! Holds the key/value pairs injected into every supervised process at
//! spawn time. Running instances keep the snapshot they were started with;
//! edits only affect future deployments.

pub mod format;
pub mod store;

pub use format::{MalformedReason, ParsedLine};
pub use store::{ConfigEntry, EnvSnapshot, EnvStore, ImportReport, MalformedLine};
