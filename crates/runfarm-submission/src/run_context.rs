//! Helper for the run/training loop of a submitted job.
//!
//! The context sets things up when the run window opens, tells the job whether
//! it should stop, and cleans up when the window closes. Jobs call
//! [`RunContext::update`] periodically and poll [`RunContext::should_stop`].

use crate::config::{ResolvedRun, SubmitConfig};
use crate::error::{SubmitError, SubmitResult};
use crate::layout::RunDirLayout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Source of an external, cooperative stop request.
pub trait StopSignal: Send + Sync {
    fn is_raised(&self) -> bool;
}

/// Shared in-memory stop flag. Clone it to hand a controller the raising side.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl StopSignal for StopFlag {
    fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raised once a sentinel file exists.
#[derive(Debug, Clone)]
pub struct SentinelFile {
    path: PathBuf,
}

impl SentinelFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StopSignal for SentinelFile {
    fn is_raised(&self) -> bool {
        self.path.exists()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Inactive,
    Active,
    Closed,
}

impl RunState {
    const fn describe(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// How the run window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Stopped,
    Failed,
}

/// One progress report from the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub loss: Option<f64>,
    pub cur_epoch: u64,
    pub max_epoch: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

impl RunProgress {
    #[must_use]
    pub fn epoch(cur_epoch: u64, max_epoch: Option<u64>) -> Self {
        Self { cur_epoch, max_epoch, ..Self::default() }
    }

    #[must_use]
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = Some(loss);
        self
    }

    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// Contents of `run.txt`, one `key: value` per line.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub task_name: String,
    pub host_name: String,
    pub start_time: DateTime<Utc>,
}

impl fmt::Display for RunInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "task_name: {}", self.task_name)?;
        writeln!(f, "host_name: {}", self.host_name)?;
        writeln!(f, "start_time: {}", self.start_time.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Contents of `run_status.json`, written when the context closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatusRecord {
    pub task_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub update_count: u64,
    pub last_progress: Option<RunProgress>,
}

pub struct RunContext<'a> {
    resolved: &'a ResolvedRun,
    layout: RunDirLayout,
    state: RunState,
    stop_signal: Box<dyn StopSignal>,
    stop_latched: Cell<bool>,
    failed: bool,
    started_at: DateTime<Utc>,
    start_time: Instant,
    last_update_time: Instant,
    last_update_interval: Option<Duration>,
    update_count: u64,
    last_progress: Option<RunProgress>,
}

impl fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("task_name", &self.resolved.task_name())
            .field("state", &self.state)
            .field("update_count", &self.update_count)
            .finish_non_exhaustive()
    }
}

impl<'a> RunContext<'a> {
    /// Bind an inactive context to a submitted config.
    ///
    /// Stop requests default to the `_stop.txt` sentinel in the run dir.
    pub fn new(config: &'a SubmitConfig) -> SubmitResult<Self> {
        let resolved = config.require_resolved()?;
        let layout = RunDirLayout::new(resolved.run_dir());
        let stop_signal = Box::new(SentinelFile::new(layout.stop_sentinel_path()));
        let now = Instant::now();
        Ok(Self {
            resolved,
            layout,
            state: RunState::Inactive,
            stop_signal,
            stop_latched: Cell::new(false),
            failed: false,
            started_at: Utc::now(),
            start_time: now,
            last_update_time: now,
            last_update_interval: None,
            update_count: 0,
            last_progress: None,
        })
    }

    /// Create and enter in one step.
    pub fn start(config: &'a SubmitConfig) -> SubmitResult<Self> {
        let mut ctx = Self::new(config)?;
        ctx.enter()?;
        Ok(ctx)
    }

    #[must_use]
    pub fn with_stop_signal(mut self, signal: impl StopSignal + 'static) -> Self {
        self.stop_signal = Box::new(signal);
        self
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    fn require_active(&self, operation: &'static str) -> SubmitResult<()> {
        if self.state == RunState::Active {
            Ok(())
        } else {
            Err(SubmitError::ContextState { operation, state: self.state.describe() })
        }
    }

    /// Open the run window: start the clocks and write `run.txt`.
    pub fn enter(&mut self) -> SubmitResult<()> {
        if self.state != RunState::Inactive {
            return Err(SubmitError::ContextState { operation: "enter", state: self.state.describe() });
        }

        let now = Instant::now();
        self.start_time = now;
        self.last_update_time = now;
        self.started_at = Utc::now();

        let info = RunInfo {
            task_name: self.resolved.task_name().to_string(),
            host_name: self.resolved.host_name().to_string(),
            start_time: self.started_at,
        };
        let path = self.layout.run_info_path();
        std::fs::write(&path, info.to_string()).map_err(|e| SubmitError::io(&path, e))?;

        self.state = RunState::Active;
        tracing::debug!(task_name = %info.task_name, "run context entered");
        Ok(())
    }

    /// Record progress. This is the point where the job should also check `should_stop`.
    pub fn update(&mut self, progress: RunProgress) -> SubmitResult<()> {
        self.require_active("update")?;

        let now = Instant::now();
        self.last_update_interval = Some(now.duration_since(self.last_update_time));
        self.last_update_time = now;
        self.update_count += 1;

        tracing::trace!(
            epoch = progress.cur_epoch,
            max_epoch = ?progress.max_epoch,
            loss = ?progress.loss,
            "run progress"
        );
        self.last_progress = Some(progress);
        self.poll_stop();
        Ok(())
    }

    fn poll_stop(&self) -> bool {
        if self.stop_latched.get() {
            return true;
        }
        if self.stop_signal.is_raised() {
            self.stop_latched.set(true);
            tracing::info!(task_name = %self.resolved.task_name(), "stop requested");
            return true;
        }
        false
    }

    /// Whether a stop was requested. Once true, stays true for this context.
    pub fn should_stop(&self) -> SubmitResult<bool> {
        self.require_active("query should_stop")?;
        Ok(self.poll_stop())
    }

    #[must_use]
    pub fn time_since_start(&self) -> Duration {
        self.start_time.elapsed()
    }

    #[must_use]
    pub fn time_since_last_update(&self) -> Duration {
        self.last_update_time.elapsed()
    }

    /// Interval between the last two updates (or enter and the first update).
    #[must_use]
    pub fn last_update_interval(&self) -> Option<Duration> {
        self.last_update_interval
    }

    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Mark the run as failed; reflected in the status written at close.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    fn final_status(&self) -> RunStatus {
        if self.failed {
            RunStatus::Failed
        } else if self.stop_latched.get() {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        }
    }

    /// Close the run window. Safe to call more than once; only the first call
    /// writes `run_status.json`.
    pub fn close(&mut self) -> SubmitResult<()> {
        match self.state {
            RunState::Closed => return Ok(()),
            RunState::Inactive => {
                self.state = RunState::Closed;
                return Ok(());
            }
            RunState::Active => {}
        }
        // Closed before any I/O so a failed write is not retried on drop.
        self.state = RunState::Closed;

        let record = RunStatusRecord {
            task_name: self.resolved.task_name().to_string(),
            status: self.final_status(),
            started_at: self.started_at,
            closed_at: Utc::now(),
            elapsed_secs: self.time_since_start().as_secs_f64(),
            update_count: self.update_count,
            last_progress: self.last_progress.take(),
        };
        let path = self.layout.status_path();
        std::fs::write(&path, serde_json::to_string_pretty(&record)?).map_err(|e| SubmitError::io(&path, e))?;

        tracing::debug!(task_name = %record.task_name, status = ?record.status, "run context closed");
        Ok(())
    }

    /// Run `body` inside the window: enter, run, close. The window is closed
    /// with status `failed` when the body returns an error.
    pub fn run<T>(mut self, body: impl FnOnce(&mut Self) -> anyhow::Result<T>) -> anyhow::Result<T> {
        if self.state == RunState::Inactive {
            self.enter()?;
        }
        let result = body(&mut self);
        if result.is_err() {
            self.mark_failed();
        }
        self.close()?;
        result
    }
}

impl Drop for RunContext<'_> {
    fn drop(&mut self) {
        if self.state != RunState::Active {
            return;
        }
        if std::thread::panicking() {
            self.failed = true;
        }
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close run context");
        }
    }
}
