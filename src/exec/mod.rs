// src/exec/mod.rs

//! Process execution layer.
//!
//! Runs external commands with `tokio::process::Command` under a wall-clock
//! timeout, an optional memory ceiling and a cancellation token.
//!
//! - [`request`] holds the immutable [`CommandRequest`] and its
//!   [`CommandOutput`].
//! - [`runner`] owns the supervision loop (spawn, timeout escalation, memory
//!   sampling, output capture).
//! - [`memory`] reads resident-set sizes of a child's process tree.
//! - [`backend`] provides the [`CommandRunner`] trait and the production
//!   [`ShellRunner`], which tests replace with scripted runners.

pub mod backend;
pub mod memory;
pub mod request;
pub mod runner;

pub use backend::{BoxFuture, CommandRunner, ShellRunner};
pub use request::{CommandOutput, CommandRequest, StdioMode};
pub use runner::run_command;
