use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::executor::ExecutorError;
use crate::layout::CaseFolder;
use crate::models::{CaseInfo, RunSnapshot, RunStage, RunStatus, SeriesKind};
use crate::pipeline::{PostProcessor, StageObserver};
use crate::progress::{CancellationToken, ChannelReporter, ProgressReporter, RunEvent};
use crate::viewer::{ImageSeries, ViewerError};

/// Finished runs kept for status queries before the oldest are evicted.
pub const DEFAULT_RETAINED_RUNS: usize = 64;

struct RunHandle {
    seq: u64,
    state: Arc<watch::Sender<RunSnapshot>>,
    cancel: CancellationToken,
}

/// The one surface every frontend talks to: pick a case, start and watch
/// runs, cancel them and browse the rendered images.
pub struct PostProcessingSession {
    processor: Arc<PostProcessor>,
    runs: Mutex<HashMap<String, RunHandle>>,
    next_seq: AtomicU64,
    retained_runs: usize,
}

impl PostProcessingSession {
    pub fn new(processor: PostProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
            runs: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            retained_runs: DEFAULT_RETAINED_RUNS,
        }
    }

    /// Keep at most `count` finished runs; active runs are never evicted.
    pub fn with_retained_runs(mut self, count: usize) -> Self {
        self.retained_runs = count;
        self
    }

    pub fn processor(&self) -> &PostProcessor {
        &self.processor
    }

    /// Check that `path` holds exactly one case file.
    pub fn select_case_folder(&self, path: &Path) -> Result<CaseInfo, SessionError> {
        let case = CaseFolder::locate(path).map_err(PipelineError::from)?;
        Ok(CaseInfo {
            case_folder: case.root().to_path_buf(),
            case_file: case.case_file().to_path_buf(),
        })
    }

    /// Start a run in the background and return its id.
    pub async fn start_run(&self, case_folder: &Path) -> Result<String, SessionError> {
        self.start_run_with_events(case_folder, None).await
    }

    /// Like [`start_run`](Self::start_run), also forwarding every [`RunEvent`] to `events`.
    ///
    /// Configuration, case and template problems are returned here, before
    /// the solver is launched.
    pub async fn start_run_with_events(
        &self,
        case_folder: &Path,
        events: Option<mpsc::UnboundedSender<RunEvent>>,
    ) -> Result<String, SessionError> {
        let mut runs = self.runs.lock().await;

        let key = run_key(case_folder);
        let busy = runs.values().any(|handle| {
            let snapshot = handle.state.borrow();
            run_key(&snapshot.case_folder) == key && !snapshot.status.is_terminal()
        });
        if busy {
            return Err(PipelineError::RunInProgress(case_folder.display().to_string()).into());
        }

        self.processor.prepare(case_folder)?;
        prune_finished(&mut runs, self.retained_runs);

        let run_id = Uuid::new_v4().to_string();
        let (state, _) = watch::channel(RunSnapshot {
            run_id: run_id.clone(),
            case_folder: case_folder.to_path_buf(),
            status: RunStatus::Running,
            stage: None,
            progress: 0,
            outcome: None,
            error_message: None,
            started_at: chrono::Utc::now().to_rfc3339(),
        });
        let state = Arc::new(state);
        let cancel = CancellationToken::new();

        runs.insert(
            run_id.clone(),
            RunHandle {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                state: state.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(runs);

        tracing::info!("Run {} started for {:?}", run_id, case_folder);

        let processor = self.processor.clone();
        let folder = case_folder.to_path_buf();
        let id = run_id.clone();
        tokio::spawn(async move {
            let observer = RunObserver {
                state: state.clone(),
                events: events.map(ChannelReporter::new),
            };
            let result = processor.run(&folder, &observer, &observer, &cancel).await;

            match result {
                Ok(outcome) => {
                    tracing::info!("Run {} completed", id);
                    observer.forward(RunEvent::Finished(outcome.clone()));
                    state.send_modify(|s| {
                        s.status = RunStatus::Succeeded;
                        s.outcome = Some(outcome);
                    });
                }
                Err(err) => {
                    tracing::error!("Run {} failed: {}", id, err);
                    observer.forward(RunEvent::Failed(err.to_string()));
                    state.send_modify(|s| {
                        s.status = failure_status(&err);
                        s.error_message = Some(err.to_string());
                    });
                }
            }
        });

        Ok(run_id)
    }

    /// Latest state of a run.
    pub async fn snapshot(&self, run_id: &str) -> Result<RunSnapshot, SessionError> {
        let runs = self.runs.lock().await;
        let handle = runs
            .get(run_id)
            .ok_or_else(|| SessionError::UnknownRun(run_id.to_string()))?;
        let snapshot = handle.state.borrow().clone();
        Ok(snapshot)
    }

    /// Receiver that sees every progress, stage and status change of a run.
    pub async fn on_progress(&self, run_id: &str) -> Result<watch::Receiver<RunSnapshot>, SessionError> {
        let runs = self.runs.lock().await;
        runs.get(run_id)
            .map(|handle| handle.state.subscribe())
            .ok_or_else(|| SessionError::UnknownRun(run_id.to_string()))
    }

    /// Wait until the run reaches a terminal status.
    pub async fn wait(&self, run_id: &str) -> Result<RunSnapshot, SessionError> {
        let mut rx = self.on_progress(run_id).await?;
        let done = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map(|snapshot| snapshot.clone())
            .ok();
        Ok(match done {
            Some(snapshot) => snapshot,
            None => rx.borrow().clone(),
        })
    }

    /// Ask a run to stop. The solver is killed at the next watchdog tick.
    pub async fn cancel_run(&self, run_id: &str) -> Result<RunSnapshot, SessionError> {
        let runs = self.runs.lock().await;
        let handle = runs
            .get(run_id)
            .ok_or_else(|| SessionError::UnknownRun(run_id.to_string()))?;
        if !handle.state.borrow().status.is_terminal() {
            tracing::info!("Cancelling run {}", run_id);
            handle.cancel.cancel();
        }
        let snapshot = handle.state.borrow().clone();
        Ok(snapshot)
    }

    /// Sorted images of one series from a processed case folder.
    pub fn view_image_series(&self, case_folder: &Path, kind: SeriesKind) -> Result<ImageSeries, SessionError> {
        Ok(ImageSeries::for_case(case_folder, kind)?)
    }
}

/// Feeds the run's watch channel and, when present, an event channel.
struct RunObserver {
    state: Arc<watch::Sender<RunSnapshot>>,
    events: Option<ChannelReporter>,
}

impl RunObserver {
    fn forward(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

impl ProgressReporter for RunObserver {
    fn on_progress(&self, percent: u8) {
        self.state.send_modify(|s| s.progress = s.progress.max(percent));
        if let Some(events) = &self.events {
            events.on_progress(percent);
        }
    }
}

impl StageObserver for RunObserver {
    fn on_stage(&self, stage: RunStage) {
        tracing::info!("Stage: {:?}", stage);
        self.state.send_modify(|s| s.stage = Some(stage));
        self.forward(RunEvent::Stage(stage));
    }
}

fn failure_status(err: &PipelineError) -> RunStatus {
    match err {
        PipelineError::Executor(ExecutorError::Timeout(_)) => RunStatus::TimedOut,
        PipelineError::Executor(ExecutorError::Cancelled) => RunStatus::Cancelled,
        PipelineError::Executor(ExecutorError::AnalysisFailed { code }) => RunStatus::Failed { code: *code },
        _ => RunStatus::Failed { code: None },
    }
}

/// Drop the oldest finished runs until at most `keep` remain.
fn prune_finished(runs: &mut HashMap<String, RunHandle>, keep: usize) {
    let mut finished: Vec<(u64, String)> = runs
        .iter()
        .filter(|(_, handle)| handle.state.borrow().status.is_terminal())
        .map(|(id, handle)| (handle.seq, id.clone()))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, id) in finished.into_iter().take(excess) {
        tracing::debug!("Evicting finished run {}", id);
        runs.remove(&id);
    }
}

fn run_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Viewer(#[from] ViewerError),
    #[error("Unknown run: {0}")]
    UnknownRun(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn session() -> PostProcessingSession {
        PostProcessingSession::new(PostProcessor::new(Arc::new(PipelineConfig::default())))
    }

    #[test]
    fn test_failure_status_mapping() {
        assert_eq!(
            failure_status(&PipelineError::Executor(ExecutorError::Timeout(5))),
            RunStatus::TimedOut
        );
        assert_eq!(
            failure_status(&PipelineError::Executor(ExecutorError::AnalysisFailed { code: Some(2) })),
            RunStatus::Failed { code: Some(2) }
        );
        assert_eq!(
            failure_status(&PipelineError::RunInProgress("x".into())),
            RunStatus::Failed { code: None }
        );
    }

    #[test]
    fn test_select_case_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("car.cas.h5"), b"").unwrap();
        let info = session().select_case_folder(dir.path()).unwrap();
        assert_eq!(info.case_file, dir.path().join("car.cas.h5"));

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            session().select_case_folder(empty.path()),
            Err(SessionError::Pipeline(PipelineError::Layout(_)))
        ));
    }

    fn handle(seq: u64, status: RunStatus) -> RunHandle {
        let (state, _) = watch::channel(RunSnapshot {
            run_id: seq.to_string(),
            case_folder: PathBuf::from("case"),
            status,
            stage: None,
            progress: 0,
            outcome: None,
            error_message: None,
            started_at: String::new(),
        });
        RunHandle {
            seq,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_oldest_finished_runs_evicted() {
        let mut runs = HashMap::new();
        runs.insert("a".to_string(), handle(0, RunStatus::Succeeded));
        runs.insert("b".to_string(), handle(1, RunStatus::Running));
        runs.insert("c".to_string(), handle(2, RunStatus::Cancelled));
        runs.insert("d".to_string(), handle(3, RunStatus::TimedOut));

        prune_finished(&mut runs, 1);

        let mut left: Vec<_> = runs.keys().cloned().collect();
        left.sort();
        assert_eq!(left, vec!["b", "d"]);

        prune_finished(&mut runs, 0);
        assert_eq!(runs.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let s = session();
        assert!(matches!(s.snapshot("nope").await, Err(SessionError::UnknownRun(_))));
        assert!(matches!(s.cancel_run("nope").await, Err(SessionError::UnknownRun(_))));
    }

    #[tokio::test]
    async fn test_start_fails_fast_without_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("car.cas.h5"), b"").unwrap();
        let mut config = PipelineConfig::default();
        config.template.master = dir.path().join("missing.xlsx");
        let s = PostProcessingSession::new(PostProcessor::new(Arc::new(config)));

        let err = s.start_run(dir.path()).await.unwrap_err();
        match err {
            SessionError::Pipeline(e) => assert!(e.is_configuration()),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
