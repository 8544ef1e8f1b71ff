//! Supervision of the external pose-estimation program.
//!
//! The program is spawned as `<program> <args…> --video <path>`. It writes
//! one JSON result per line to stdout and, after each frame, reads one JSON
//! correction line from stdin. When it exits, a terminal `completed` (exit
//! 0) or `error` (stderr tail) result is queued after its last frame.
//!
//! At most one run exists at a time; starting a run kills the previous one.

use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use posemark_models::api::ContinueRequest;
use posemark_models::InferenceResult;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics;

/// Results buffered ahead of `next` calls.
const RESULT_BUFFER: usize = 16;

/// How long `stop` waits for the supervisor to reap the child.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn inference program: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("No inference process running")]
    NotRunning,

    #[error("Inference run has finished")]
    Finished,

    #[error("Failed to send corrections: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("Failed to encode corrections: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub stderr_tail_lines: usize,
}

struct ActiveRun {
    id: Uuid,
    video_path: String,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    results: Arc<Mutex<mpsc::Receiver<InferenceResult>>>,
    kill_tx: Option<oneshot::Sender<()>>,
    supervisor: JoinHandle<()>,
}

/// Owns the single active run.
pub struct InferenceRunner {
    config: RunnerConfig,
    active: Mutex<Option<ActiveRun>>,
}

impl InferenceRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
        }
    }

    /// Whether a run is active.
    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Video of the active run.
    pub async fn video_path(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|r| r.video_path.clone())
    }

    /// Start a run for `video_path`, killing any previous run.
    pub async fn start(&self, video_path: &Path) -> Result<Uuid, RunnerError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!(run_id = %previous.id, "Stopping previous inference run");
            shutdown(previous).await;
        }

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg("--video")
            .arg(video_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RunnerError::Spawn)?;

        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(RESULT_BUFFER);
        let (kill_tx, kill_rx) = oneshot::channel();
        let tail = Arc::new(StdMutex::new(VecDeque::new()));
        let reported = Arc::new(AtomicBool::new(false));

        let stdin = child.stdin.take();
        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(relay_stdout(id, stdout, tx.clone(), Arc::clone(&reported))));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(collect_stderr(stderr, Arc::clone(&tail), self.config.stderr_tail_lines)));

        let supervisor = tokio::spawn(supervise(
            id,
            child,
            kill_rx,
            [stdout_task, stderr_task],
            tail,
            reported,
            tx,
        ));

        info!(
            run_id = %id,
            program = %self.config.program,
            video_path = %video_path.display(),
            "Inference run started"
        );
        metrics::record_run_started();

        *active = Some(ActiveRun {
            id,
            video_path: video_path.display().to_string(),
            stdin: Arc::new(Mutex::new(stdin)),
            results: Arc::new(Mutex::new(rx)),
            kill_tx: Some(kill_tx),
            supervisor,
        });
        Ok(id)
    }

    /// Wait up to `timeout` for the next result. `Ok(None)` on timeout.
    pub async fn next(&self, timeout: Duration) -> Result<Option<InferenceResult>, RunnerError> {
        let results = {
            let active = self.active.lock().await;
            let run = active.as_ref().ok_or(RunnerError::NotRunning)?;
            Arc::clone(&run.results)
        };

        let mut rx = results.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(result)) => {
                metrics::record_result(&result);
                Ok(Some(result))
            }
            Ok(None) => Err(RunnerError::Finished),
            Err(_) => Ok(None),
        }
    }

    /// Forward corrections to the program as one JSON line.
    pub async fn send_corrections(&self, request: &ContinueRequest) -> Result<(), RunnerError> {
        let stdin = {
            let active = self.active.lock().await;
            let run = active.as_ref().ok_or(RunnerError::NotRunning)?;
            Arc::clone(&run.stdin)
        };

        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');

        let mut stdin = stdin.lock().await;
        let pipe = stdin.as_mut().ok_or(RunnerError::Finished)?;
        if let Err(e) = write_line(pipe, &line).await {
            *stdin = None;
            return Err(RunnerError::Stdin(e));
        }
        debug!(frame = request.frame_number, "Corrections forwarded");
        Ok(())
    }

    /// Kill the active run. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let Some(run) = self.active.lock().await.take() else {
            return false;
        };
        info!(run_id = %run.id, "Stopping inference run");
        shutdown(run).await;
        true
    }
}

async fn write_line(pipe: &mut ChildStdin, line: &[u8]) -> std::io::Result<()> {
    pipe.write_all(line).await?;
    pipe.flush().await
}

async fn shutdown(mut run: ActiveRun) {
    if let Some(kill_tx) = run.kill_tx.take() {
        let _ = kill_tx.send(());
    }
    if tokio::time::timeout(STOP_TIMEOUT, &mut run.supervisor).await.is_err() {
        warn!(run_id = %run.id, "Supervisor did not finish, aborting");
        run.supervisor.abort();
    }
}

async fn relay_stdout(
    run_id: Uuid,
    stdout: tokio::process::ChildStdout,
    tx: mpsc::Sender<InferenceResult>,
    reported: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Failed to read program output");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InferenceResult>(line) {
            Ok(result) => {
                if result.is_terminal() {
                    reported.store(true, Ordering::SeqCst);
                }
                if tx.send(result).await.is_err() {
                    break;
                }
            }
            Err(e) => debug!(run_id = %run_id, error = %e, "Ignoring non-result output line"),
        }
    }
}

async fn collect_stderr(stderr: tokio::process::ChildStderr, tail: Arc<StdMutex<VecDeque<String>>>, keep: usize) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "posemark_backend::program", "{}", line);
        if let Ok(mut tail) = tail.lock() {
            tail.push_back(line);
            while tail.len() > keep.max(1) {
                tail.pop_front();
            }
        }
    }
}

async fn supervise(
    run_id: Uuid,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: [Option<JoinHandle<()>>; 2],
    tail: Arc<StdMutex<VecDeque<String>>>,
    reported: Arc<AtomicBool>,
    tx: mpsc::Sender<InferenceResult>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                warn!(run_id = %run_id, error = %e, "Failed to kill inference program");
            }
            metrics::record_run_finished("stopped");
            info!(run_id = %run_id, "Inference program killed");
            return;
        }
    };

    for reader in readers.into_iter().flatten() {
        let _ = reader.await;
    }

    // The program may announce its own end; only one terminal result is queued
    if reported.load(Ordering::SeqCst) && status.as_ref().map(|s| s.success()).unwrap_or(false) {
        metrics::record_run_finished("completed");
        info!(run_id = %run_id, "Inference program completed");
        return;
    }

    let stderr_tail = tail
        .lock()
        .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default();
    let terminal = terminal_result(status, stderr_tail);

    match &terminal {
        InferenceResult::Status(posemark_models::SessionStatus::Completed) => {
            metrics::record_run_finished("completed");
            info!(run_id = %run_id, "Inference program completed");
        }
        _ => {
            metrics::record_run_finished("error");
            warn!(run_id = %run_id, "Inference program failed");
        }
    }

    let _ = tx.send(terminal).await;
}

fn terminal_result(status: std::io::Result<ExitStatus>, stderr_tail: String) -> InferenceResult {
    match status {
        Ok(status) if status.success() => InferenceResult::completed(),
        Ok(status) if stderr_tail.trim().is_empty() => {
            InferenceResult::error(format!("Inference program exited with {}", status))
        }
        Ok(_) => InferenceResult::error(stderr_tail),
        Err(e) => InferenceResult::error(format!("Failed to wait for inference program: {}", e)),
    }
}
