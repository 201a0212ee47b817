use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use buildwarden::errors::{ErrorCode, StructuredError};
use buildwarden::exec::{BoxFuture, CommandOutput, CommandRequest, CommandRunner};
use tokio_util::sync::CancellationToken;

/// What one scripted invocation does.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed(String),
    Fail(StructuredError),
    /// Sleep (honouring cancellation), then do the inner step.
    Delay(Duration, Box<Step>),
}

/// A fake `CommandRunner` that:
/// - records every command line it is asked to run, in order
/// - answers each command from a per-command queue of scripted steps
/// - falls back to the command's sticky step (or success) once the queue
///   is empty.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, VecDeque<Step>>,
    sticky: HashMap<String, Step>,
    invocations: Vec<String>,
    requests: Vec<CommandRequest>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue steps for `command`, consumed one per invocation.
    pub fn script(self, command: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(command.to_string())
            .or_default()
            .extend(steps);
        self
    }

    /// Make `command` always fail with `err` once its queue is empty.
    pub fn always_fail(self, command: &str, err: StructuredError) -> Self {
        self.inner
            .lock()
            .unwrap()
            .sticky
            .insert(command.to_string(), Step::Fail(err));
        self
    }

    pub fn invocations(&self) -> Vec<String> {
        self.inner.lock().unwrap().invocations.clone()
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .invocations
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    fn next_step(&self, request: &CommandRequest) -> Step {
        let mut inner = self.inner.lock().unwrap();
        let command = request.command().to_string();
        inner.invocations.push(command.clone());
        inner.requests.push(request.clone());

        if let Some(step) = inner.queues.get_mut(&command).and_then(VecDeque::pop_front) {
            return step;
        }
        inner
            .sticky
            .get(&command)
            .cloned()
            .unwrap_or_else(|| Step::Succeed(String::new()))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        request: &'a CommandRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<CommandOutput, StructuredError>> {
        let step = self.next_step(request);
        tracing::debug!(command = request.command(), ?step, "scripted command");

        Box::pin(async move {
            let mut step = step;
            loop {
                match step {
                    Step::Succeed(stdout) => {
                        return Ok(CommandOutput {
                            stdout,
                            stderr: String::new(),
                            exit_code: 0,
                            elapsed: Duration::ZERO,
                        });
                    }
                    Step::Fail(err) => return Err(err),
                    Step::Delay(delay, inner) => {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => step = *inner,
                            _ = cancel.cancelled() => {
                                return Err(StructuredError::new(
                                    ErrorCode::Cancelled,
                                    format!("command `{}` was cancelled", request.command()),
                                ));
                            }
                        }
                    }
                }
            }
        })
    }
}

pub fn ok(stdout: &str) -> Step {
    Step::Succeed(stdout.to_string())
}

pub fn fail(code: impl Into<ErrorCode>, message: &str) -> Step {
    Step::Fail(StructuredError::new(code, message))
}

/// Non-zero exit with the given stderr, shaped like the real runner's error.
pub fn exit_failure(command: &str, stderr: &str) -> StructuredError {
    StructuredError::new(
        ErrorCode::CommandFailed,
        format!("command `{command}` exited with code 1"),
    )
    .with_detail("exit_code", 1)
    .with_detail("stderr", stderr)
}
