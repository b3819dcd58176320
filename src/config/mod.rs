//! Configuration management
//!
//! Settings come from an optional TOML file and are overridden by the
//! `FIREBASE_*` / `FIRESTORE_*` environment variables.

pub mod settings;

#[cfg(test)]
mod tests;

pub use settings::{Config, ConfigError, FirebaseConfig};
