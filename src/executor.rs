use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::SolverConfig;
use crate::generator::parse_statement_count;
use crate::models::RunStatus;
use crate::progress::{CancellationToken, ProgressReporter, ProgressTracker};

/// Resolve the solver executable: `FLUENT_PATH` first, then the configured path.
///
/// The solver runs with the case folder as working directory, so relative
/// paths are made absolute when they exist.
pub fn resolve_solver_path(config: &SolverConfig) -> PathBuf {
    let raw = std::env::var("FLUENT_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config.executable.clone());
    std::fs::canonicalize(&raw).unwrap_or(raw)
}

/// What a successful solver run leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverRun {
    pub output_dir: PathBuf,
    pub lines_consumed: usize,
    pub elapsed: Duration,
}

/// Launches the solver on a journal and supervises it until it exits.
///
/// One instance drives at most one run at a time; running two supervisors
/// against the same case folder races on the fixed report file names.
pub struct SolverSupervisor {
    executable: PathBuf,
    config: SolverConfig,
    status: RunStatus,
}

impl SolverSupervisor {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            executable: resolve_solver_path(config),
            config: config.clone(),
            status: RunStatus::NotStarted,
        }
    }

    /// Use an explicit executable instead of the resolved one.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn command_args(&self, journal_path: &Path) -> Vec<String> {
        let mut args = vec![
            self.config.dimension.clone(),
            format!("-t{}", self.config.threads),
        ];
        if self.config.hide_gui {
            args.push("-gu".to_string());
        }
        args.push("-i".to_string());
        args.push(journal_path.to_string_lossy().to_string());
        args
    }

    /// Run the solver on `journal_path` with `work_dir` as working directory.
    ///
    /// Progress is `round(100 * lines / statements)` where the statement count
    /// comes from the journal header and the first output line is not
    /// counted. A watchdog enforces the timeout and `cancel` even while the
    /// solver prints nothing.
    pub async fn run(
        &mut self,
        journal_path: &Path,
        work_dir: &Path,
        output_dir: &Path,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<SolverRun, ExecutorError> {
        let journal = tokio::fs::read_to_string(journal_path)
            .await
            .map_err(|e| ExecutorError::IoError(format!("Failed to read journal {:?}: {}", journal_path, e)))?;
        let total_statements = parse_statement_count(&journal)
            .map_err(|e| ExecutorError::InvalidJournal(e.to_string()))?;

        let args = self.command_args(journal_path);
        tracing::info!(
            "Running command: {} {} (cwd {:?}, {} statements)",
            self.executable.display(),
            args.join(" "),
            work_dir,
            total_statements
        );

        let started = Instant::now();
        let mut child = Command::new(&self.executable)
            .args(&args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.status = RunStatus::Failed { code: None };
                ExecutorError::ExecutionError(format!(
                    "Failed to start {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;
        self.status = RunStatus::Running;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_pump(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_pump(stderr, tx.clone());
        }
        drop(tx);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let grace = Duration::from_millis(self.config.drain_grace_ms);
        let mut watchdog = tokio::time::interval(Duration::from_millis(self.config.watchdog_tick_ms.max(1)));
        let mut tracker = ProgressTracker::new(total_statements);
        let mut received = 0usize;
        let mut streams_open = true;
        let mut exited: Option<(ExitStatus, Instant)> = None;

        let exit_status = loop {
            tokio::select! {
                line = rx.recv(), if streams_open => match line {
                    Some(line) => {
                        // The first line is the solver banner, not a journal statement.
                        if received > 0 {
                            tracing::debug!(target: "fluent_postproc::solver", "{}", line);
                            if let Some(pct) = tracker.observe(received) {
                                reporter.on_progress(pct);
                            }
                        }
                        received += 1;
                    }
                    None => streams_open = false,
                },
                _ = watchdog.tick() => {}
            }

            if exited.is_none() {
                if cancel.is_cancelled() {
                    terminate(&mut child).await;
                    self.status = RunStatus::Cancelled;
                    tracing::warn!("Solver run cancelled after {:.1}s", started.elapsed().as_secs_f64());
                    return Err(ExecutorError::Cancelled);
                }

                if started.elapsed() > timeout {
                    terminate(&mut child).await;
                    self.status = RunStatus::TimedOut;
                    tracing::error!("Solver exceeded {}s, process killed", self.config.timeout_secs);
                    return Err(ExecutorError::Timeout(self.config.timeout_secs));
                }

                if let Some(status) = child
                    .try_wait()
                    .map_err(|e| ExecutorError::IoError(format!("Failed to poll solver: {}", e)))?
                {
                    exited = Some((status, Instant::now()));
                }
            }

            if let Some((status, at)) = exited {
                if !streams_open {
                    break status;
                }
                if at.elapsed() >= grace {
                    tracing::warn!("Solver exited but a child process still holds its output, no longer reading it");
                    break status;
                }
            }
        };

        let lines_consumed = received.saturating_sub(1);
        self.finish(exit_status, tracker, reporter, output_dir, lines_consumed, started.elapsed())
    }

    fn finish(
        &mut self,
        exit_status: ExitStatus,
        mut tracker: ProgressTracker,
        reporter: &dyn ProgressReporter,
        output_dir: &Path,
        lines_consumed: usize,
        elapsed: Duration,
    ) -> Result<SolverRun, ExecutorError> {
        if exit_status.success() {
            if let Some(pct) = tracker.finish() {
                reporter.on_progress(pct);
            }
            self.status = RunStatus::Succeeded;
            tracing::info!(
                "Solver finished in {:.1}s, images saved in {:?}",
                elapsed.as_secs_f64(),
                output_dir
            );
            Ok(SolverRun {
                output_dir: output_dir.to_path_buf(),
                lines_consumed,
                elapsed,
            })
        } else {
            let code = exit_status.code();
            self.status = RunStatus::Failed { code };
            tracing::error!("Solver exited with {}", exit_status);
            Err(ExecutorError::AnalysisFailed { code })
        }
    }
}

/// Forward every line of `reader` into `tx` until EOF.
fn spawn_line_pump<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!("Stopped reading solver output: {}", err);
                    break;
                }
            }
        }
    });
}

async fn terminate(child: &mut Child) {
    if let Err(err) = child.kill().await {
        tracing::warn!("Failed to kill solver process: {}", err);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Invalid journal: {0}")]
    InvalidJournal(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Solver exited with code {}", describe_exit(.code))]
    AnalysisFailed { code: Option<i32> },
    #[error("Solver exceeded the {0}s timeout and was killed")]
    Timeout(u64),
    #[error("Solver run was cancelled")]
    Cancelled,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}
