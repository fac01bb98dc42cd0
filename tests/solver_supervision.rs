#![cfg(unix)]

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use fluent_postproc::config::SolverConfig;
use fluent_postproc::executor::{ExecutorError, SolverSupervisor};
use fluent_postproc::models::RunStatus;
use fluent_postproc::progress::CancellationToken;

fn quick_config(timeout_secs: u64) -> SolverConfig {
    SolverConfig {
        timeout_secs,
        watchdog_tick_ms: 50,
        ..SolverConfig::default()
    }
}

fn journal(dir: &std::path::Path, statements: usize) -> PathBuf {
    let mut text = format!("; {}\n", statements);
    for i in 0..statements {
        text.push_str(&format!("/display/statement-{}\n", i));
    }
    let path = dir.join("seq.jou");
    fs::write(&path, text).unwrap();
    path
}

#[tokio::test]
async fn progress_follows_output_and_ends_at_100() {
    let dir = tempfile::tempdir().unwrap();
    let solver = common::fake_solver(
        dir.path(),
        "solver.sh",
        "echo 'Fluent banner'\nfor i in 1 2 3 4; do echo \"statement $i\"; done\nexit 0",
    );
    let journal = journal(dir.path(), 4);

    let seen = Mutex::new(Vec::new());
    let reporter = |p: u8| seen.lock().unwrap().push(p);
    let mut supervisor = SolverSupervisor::new(&quick_config(30)).with_executable(solver.clone());

    let run = supervisor
        .run(&journal, dir.path(), dir.path(), &reporter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.lines_consumed, 4);
    assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
    assert_eq!(supervisor.status(), &RunStatus::Succeeded);
}

#[tokio::test]
async fn quiet_success_still_reports_100() {
    let dir = tempfile::tempdir().unwrap();
    let solver = common::fake_solver(dir.path(), "solver.sh", "echo banner\necho one\nexit 0");
    let journal = journal(dir.path(), 50);

    let seen = Mutex::new(Vec::new());
    let reporter = |p: u8| seen.lock().unwrap().push(p);
    let mut supervisor = SolverSupervisor::new(&quick_config(30)).with_executable(solver.clone());
    supervisor
        .run(&journal, dir.path(), dir.path(), &reporter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![2, 100]);
}

#[tokio::test]
async fn exit_is_seen_while_a_child_keeps_the_pipe_open() {
    let dir = tempfile::tempdir().unwrap();
    let solver = common::fake_solver(dir.path(), "solver.sh", "echo banner\necho one\n(sleep 20) &\nexit 0");
    let journal = journal(dir.path(), 4);

    let seen = Mutex::new(Vec::new());
    let reporter = |p: u8| seen.lock().unwrap().push(p);
    let started = Instant::now();
    let mut supervisor = SolverSupervisor::new(&quick_config(5)).with_executable(solver.clone());
    let run = supervisor
        .run(&journal, dir.path(), dir.path(), &reporter, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(supervisor.status(), &RunStatus::Succeeded);
    assert_eq!(run.lines_consumed, 1);
    assert_eq!(seen.lock().unwrap().last(), Some(&100));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn heavy_stderr_output_is_drained() {
    let dir = tempfile::tempdir().unwrap();
    let solver = common::fake_solver(
        dir.path(),
        "solver.sh",
        "i=0\nwhile [ $i -lt 3000 ]; do\n  echo \"warning: turbulence residual line $i, padded out to fill the pipe buffer quickly\" >&2\n  i=$((i+1))\ndone\nexit 0",
    );
    let journal = journal(dir.path(), 10);

    let mut supervisor = SolverSupervisor::new(&quick_config(30)).with_executable(solver.clone());
    let run = supervisor
        .run(&journal, dir.path(), dir.path(), &|_: u8| {}, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(supervisor.status(), &RunStatus::Succeeded);
    assert_eq!(run.lines_consumed, 2999);
}

#[tokio::test]
async fn nonzero_exit_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let solver = common::fake_solver(dir.path(), "solver.sh", "echo banner\necho 'Error: bad case' >&2\nexit 3");
    let journal = journal(dir.path(), 10);

    let mut supervisor = SolverSupervisor::new(&quick_config(30)).with_executable(solver.clone());
    let err = supervisor
        .run(&journal, dir.path(), dir.path(), &|_: u8| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::AnalysisFailed { code: Some(3) }));
    assert_eq!(supervisor.status(), &RunStatus::Failed { code: Some(3) });
}

#[tokio::test]
async fn silent_solver_is_killed_on_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let solver = common::fake_solver(dir.path(), "solver.sh", "exec sleep 30");
    let journal = journal(dir.path(), 10);

    let started = Instant::now();
    let mut supervisor = SolverSupervisor::new(&quick_config(1)).with_executable(solver.clone());
    let err = supervisor
        .run(&journal, dir.path(), dir.path(), &|_: u8| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Timeout(1)));
    assert_eq!(supervisor.status(), &RunStatus::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn cancellation_kills_the_solver() {
    let dir = tempfile::tempdir().unwrap();
    let solver = common::fake_solver(dir.path(), "solver.sh", "echo banner\nexec sleep 30");
    let journal = journal(dir.path(), 10);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let mut supervisor = SolverSupervisor::new(&quick_config(60)).with_executable(solver.clone());
    let err = supervisor
        .run(&journal, dir.path(), dir.path(), &|_: u8| {}, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Cancelled));
    assert_eq!(supervisor.status(), &RunStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn missing_executable_fails_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let journal = journal(dir.path(), 3);

    let mut supervisor =
        SolverSupervisor::new(&quick_config(5)).with_executable(dir.path().join("no-such-solver"));
    let err = supervisor
        .run(&journal, dir.path(), dir.path(), &|_: u8| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::ExecutionError(_)));
    assert_eq!(supervisor.status(), &RunStatus::Failed { code: None });
}

#[tokio::test]
async fn journal_without_header_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.jou");
    fs::write(&path, "/file/read-case-data \"x\"\n/exit yes\n").unwrap();

    let mut supervisor = SolverSupervisor::new(&quick_config(5)).with_executable("/bin/true");
    let err = supervisor
        .run(&path, dir.path(), dir.path(), &|_: u8| {}, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::InvalidJournal(_)));
    assert_eq!(supervisor.status(), &RunStatus::NotStarted);
}
