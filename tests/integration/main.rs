mod classifier;
mod config_resolution;
mod error_handling;
mod fs_abstraction;
mod memory_parsing;
mod validation;
