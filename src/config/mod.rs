// src/config/mod.rs

//! Configuration loading and validation for buildwarden.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: `RawConfigFile` -> `ConfigFile`, resolving each workspace
//!   into a `WorkspacePlan`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, RawConfigFile, ReportSection, WorkspaceConfig};
pub use validate::parse_duration;
