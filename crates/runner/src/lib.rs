//! One-shot CLI process runner.
//!
//! Spawns one subprocess per execution request, delivers the prompt over
//! stdin or as a trailing argument per provider convention, captures stdout
//! and stderr separately, and races completion against the configured
//! timeout and caller cancellation. For line-oriented providers the stdout
//! buffer is re-parsed as chunks arrive so partial content can stream to the
//! chat view before the process exits.
//!
//! Each request owns its subprocess exclusively. Starting a new request does
//! not kill an in-flight one, but `cancel()` only affects the most recently
//! started request.

pub mod error;

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parsers::{parse_output, partial_content};
use progress::{ExecutionRequest, LlmResponse, ProgressBus, ProgressEvent};
use providers::{AgentCommand, Settings, one_shot_command};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::{debug, warn};

pub use error::RunnerError;

struct ActiveProcess {
    generation: u64,
    kill: Arc<Notify>,
}

/// Runs one-shot agent commands.
#[derive(Default)]
pub struct ProcessRunner {
    active: Mutex<Option<ActiveProcess>>,
    generation: AtomicU64,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute one request to completion.
    ///
    /// Always resolves to a well-formed [`LlmResponse`]; failures are carried
    /// in its `error` field rather than surfaced as a rejection.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        settings: &Settings,
        progress: &ProgressBus,
    ) -> LlmResponse {
        let started = Instant::now();
        match self.run(request, settings, progress).await {
            Ok(stdout) => {
                let parsed = parse_output(request.provider, &stdout);
                LlmResponse {
                    content: parsed.content,
                    provider: request.provider,
                    tokens: parsed.tokens,
                    cost: parsed.cost,
                    duration: started.elapsed(),
                    error: None,
                }
            }
            Err(err) => {
                warn!(provider = %request.provider, error = %err, "one-shot execution failed");
                LlmResponse {
                    content: String::new(),
                    provider: request.provider,
                    tokens: None,
                    cost: None,
                    duration: started.elapsed(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Kill the most recently started request's subprocess.
    ///
    /// Idempotent: with nothing in flight this is a no-op. The tracked handle
    /// is cleared immediately so a completion racing in for the now-dead
    /// process cannot be misattributed to a newer request.
    pub fn cancel(&self) {
        if let Some(active) = self.active.lock().take() {
            debug!(generation = active.generation, "cancelling one-shot process");
            active.kill.notify_one();
        }
    }

    async fn run(
        &self,
        request: &ExecutionRequest,
        settings: &Settings,
        progress: &ProgressBus,
    ) -> Result<String, RunnerError> {
        let provider_settings = settings.provider(request.provider);
        let command = one_shot_command(request.provider, &provider_settings)?;
        let timeout_secs = settings.timeout_secs(request.provider);

        let mut child = spawn(&command, request)?;

        if command.prompt_via_stdin {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| io_error("child stdin missing"))?;
            stdin.write_all(request.prompt.as_bytes()).await?;
            // Closing stdin signals end-of-prompt to the CLI.
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error("child stdout missing"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error("child stderr missing"))?;

        let kill = Arc::new(Notify::new());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.active.lock() = Some(ActiveProcess {
            generation,
            kill: kill.clone(),
        });

        let stdout_task = drain_stdout(stdout, request, progress);
        let stderr_task = tokio::spawn(drain_to_string(stderr));

        let outcome = {
            let wait = child.wait();
            tokio::pin!(wait);
            tokio::select! {
                status = &mut wait => match status {
                    Ok(status) if status.success() => Ok(()),
                    Ok(status) => Err(RunnerError::CommandFailed {
                        code: status.code().unwrap_or(-1),
                        stderr: String::new(),
                    }),
                    Err(err) => Err(RunnerError::Io(err)),
                },
                _ = kill.notified() => Err(RunnerError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
                    Err(RunnerError::Timeout(timeout_secs))
                }
            }
        };

        // Cancellation and timeout both force-terminate the child.
        if matches!(
            outcome,
            Err(RunnerError::Cancelled) | Err(RunnerError::Timeout(_))
        ) {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        // Only clear the tracked handle if it still belongs to this request;
        // a newer execute() may have replaced it.
        {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(|a| a.generation == generation) {
                *active = None;
            }
        }

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        match outcome {
            Ok(()) => Ok(stdout),
            Err(RunnerError::CommandFailed { code, .. }) => {
                Err(RunnerError::CommandFailed { code, stderr })
            }
            Err(err) => Err(err),
        }
    }
}

fn io_error(message: &str) -> RunnerError {
    RunnerError::Io(std::io::Error::other(message))
}

fn spawn(command: &AgentCommand, request: &ExecutionRequest) -> Result<Child, RunnerError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    if !command.prompt_via_stdin {
        cmd.arg(&request.prompt);
    }
    for (key, value) in &command.env {
        cmd.env(key, value);
    }
    if let Some(cwd) = &request.cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(if command.prompt_via_stdin {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    cmd.spawn().map_err(|source| RunnerError::Spawn {
        program: command.program.display().to_string(),
        source,
    })
}

/// Accumulate stdout, re-parsing the buffer after each chunk for providers
/// whose output can be streamed incrementally.
fn drain_stdout(
    mut stdout: tokio::process::ChildStdout,
    request: &ExecutionRequest,
    progress: &ProgressBus,
) -> tokio::task::JoinHandle<String> {
    let provider = request.provider;
    let progress = progress.clone();
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 8192];
        let mut last_partial = String::new();
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if provider.line_oriented() {
                        let so_far = String::from_utf8_lossy(&buffer);
                        if let Some(partial) = partial_content(provider, &so_far) {
                            if partial != last_partial {
                                last_partial = partial.clone();
                                progress.emit(ProgressEvent::text(partial));
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!(error = %err, "stdout read failed");
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

async fn drain_to_string(mut stream: tokio::process::ChildStderr) -> String {
    let mut buffer = Vec::new();
    let _ = stream.read_to_end(&mut buffer).await;
    String::from_utf8_lossy(&buffer).into_owned()
}
