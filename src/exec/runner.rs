use super::shaper::{ShapeLimits, shape};
use crate::error::CommandError;
use crate::planner::{DEFAULT_TIMEOUT_SECS, PlanObservationPayload, PlanStatus, PlanStep};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How long to keep draining pipes after the child is gone. A detached
/// descendant can hold a pipe open indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Observation of one command run plus the reason it did not succeed, if any.
#[derive(Debug)]
pub struct CommandRun {
    pub observation: PlanObservationPayload,
    pub error: Option<CommandError>,
}

impl CommandRun {
    fn rejected(error: CommandError) -> Self {
        Self {
            observation: PlanObservationPayload {
                details: error.to_string(),
                ..PlanObservationPayload::default()
            },
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Status the step takes after this run.
    pub fn status(&self) -> PlanStatus {
        if self.succeeded() {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        }
    }
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Canceled,
}

/// Runs plan-step commands through `<shell> -c <run>`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    drain_grace: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self {
            drain_grace: OUTPUT_DRAIN_GRACE,
        }
    }
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute `step.command` under its timeout.
    ///
    /// The child runs in its own process group so a timeout or cancellation
    /// terminates every descendant. stdout and stderr are captured separately
    /// and shaped with the step's filter and caps.
    #[instrument(skip_all, fields(step_id = %step.id))]
    pub async fn execute(&self, step: &PlanStep, cancel: &CancellationToken) -> CommandRun {
        let draft = &step.command;
        if draft.shell.trim().is_empty() || draft.run.trim().is_empty() {
            warn!("command.invalid");
            return CommandRun::rejected(CommandError::InvalidCommand {
                step_id: step.id.clone(),
            });
        }

        let timeout = effective_timeout(draft.timeout_sec);
        let mut cmd = Command::new(draft.shell.trim());
        cmd.arg("-c")
            .arg(&draft.run)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let cwd = draft.cwd.trim();
        if !cwd.is_empty() {
            cmd.current_dir(shellexpand::tilde(cwd).as_ref());
        }
        #[cfg(unix)]
        cmd.process_group(0);

        info!(shell = %draft.shell, timeout_secs = timeout.as_secs(), "command.start");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(error = %err, "command.spawn_failed");
                return CommandRun::rejected(CommandError::Spawn(err));
            }
        };

        let pid = child.id();
        let stdout = StreamCapture::spawn(child.stdout.take());
        let stderr = StreamCapture::spawn(child.stderr.take());

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            () = tokio::time::sleep(timeout) => Waited::TimedOut,
            () = cancel.cancelled() => Waited::Canceled,
        };

        let mut exit_code = None;
        let outcome = match waited {
            Waited::Exited(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                exit_code = Some(code);
                if code == 0 {
                    None
                } else {
                    Some(CommandError::NonZeroExit(code))
                }
            }
            Waited::Exited(Err(err)) => Some(CommandError::Io(err)),
            Waited::TimedOut => {
                warn!(timeout_secs = timeout.as_secs(), "command.timeout");
                terminate(&mut child, pid).await;
                Some(CommandError::Timeout(timeout))
            }
            Waited::Canceled => {
                warn!("command.canceled");
                terminate(&mut child, pid).await;
                Some(CommandError::Canceled)
            }
        };

        let raw_stdout = stdout.finish(self.drain_grace).await;
        let raw_stderr = stderr.finish(self.drain_grace).await;

        let limits = ShapeLimits {
            filter_pattern: &draft.filter_regex,
            max_bytes: draft.max_bytes,
            tail_lines: draft.tail_lines,
        };
        let shaped_stdout = shape(&raw_stdout, limits);
        let shaped_stderr = shape(&raw_stderr, limits);

        let mut observation = PlanObservationPayload {
            stdout: String::from_utf8_lossy(&shaped_stdout.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&shaped_stderr.bytes).into_owned(),
            truncated: shaped_stdout.truncated || shaped_stderr.truncated,
            exit_code,
            ..PlanObservationPayload::default()
        };
        if let Some(err) = &outcome {
            if !err.has_exit_status() {
                observation.details = err.to_string();
            }
            observation.operation_canceled = matches!(err, CommandError::Canceled);
        }

        debug!(
            exit_code = ?observation.exit_code,
            truncated = observation.truncated,
            stdout_bytes = raw_stdout.len(),
            stderr_bytes = raw_stderr.len(),
            "command.finished"
        );
        CommandRun {
            observation,
            error: outcome,
        }
    }
}

fn effective_timeout(timeout_sec: u64) -> Duration {
    if timeout_sec == 0 {
        Duration::from_secs(DEFAULT_TIMEOUT_SECS)
    } else {
        Duration::from_secs(timeout_sec)
    }
}

/// Kill the child's whole process group, then reap the child.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            kill_process_group(pid);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(err) = child.start_kill() {
        debug!(error = %err, "command.kill_failed");
    }
    if let Err(err) = child.wait().await {
        warn!(error = %err, "command.reap_failed");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only delivers a signal. The group id is the child's pid,
    // which leads its own group because it was spawned with process_group(0).
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(error = %std::io::Error::last_os_error(), "command.killpg_failed");
    }
}

/// Background reader that accumulates one pipe into a shared buffer so that
/// partial output survives an abandoned drain.
struct StreamCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl StreamCapture {
    fn spawn<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|mut reader| {
            let sink = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => sink
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                        Err(err) => {
                            debug!(error = %err, "command.read_failed");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    async fn finish(mut self, grace: Duration) -> Vec<u8> {
        if let Some(mut task) = self.task.take()
            && tokio::time::timeout(grace, &mut task).await.is_err()
        {
            warn!(grace_secs = grace.as_secs(), "command.output_drain_abandoned");
            task.abort();
        }
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
