// src/exec/backend.rs

//! Pluggable command runner abstraction.
//!
//! The pipeline talks to a [`CommandRunner`] instead of spawning processes
//! itself, so tests can script command outcomes without touching the OS.
//! [`ShellRunner`] is the production implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::StructuredError;
use crate::exec::request::{CommandOutput, CommandRequest};
use crate::exec::runner::run_command;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstracting how a single command is executed.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        request: &'a CommandRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<CommandOutput, StructuredError>>;
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run<'a>(
        &'a self,
        request: &'a CommandRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<CommandOutput, StructuredError>> {
        Box::pin(run_command(request, cancel))
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    fn run<'a>(
        &'a self,
        request: &'a CommandRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<CommandOutput, StructuredError>> {
        (**self).run(request, cancel)
    }
}
