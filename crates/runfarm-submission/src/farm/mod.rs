//! Execution targets ("farms").
//!
//! A farm knows how to finish a config for its venue and how to launch the run.
//! Each [`SubmitTarget`] variant maps to exactly one farm in [`farm_for`].

pub mod local;

use crate::config::{SubmitConfig, SubmitTarget};
use crate::error::{SubmitError, SubmitResult};
use crate::registry::RunFunctionRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub use local::LocalFarm;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: u32,
    pub run_name: String,
    pub run_dir: PathBuf,
    pub task_name: String,
    pub elapsed: Duration,
}

/// What a farm's `submit` hands back to the caller.
#[derive(Debug)]
pub enum RunHandle {
    /// The run already finished on the submitting thread.
    Finished(RunReport),
    /// The run is executing elsewhere; join it with [`RunHandle::wait`].
    Running { run_func_name: String, handle: JoinHandle<SubmitResult<RunReport>> },
}

impl RunHandle {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Finished(_) => true,
            Self::Running { handle, .. } => handle.is_finished(),
        }
    }

    /// Block until the run has finished.
    pub fn wait(self) -> SubmitResult<RunReport> {
        match self {
            Self::Finished(report) => Ok(report),
            Self::Running { run_func_name, handle } => handle.join().unwrap_or_else(|_| {
                Err(SubmitError::RunFailed { run_func_name, source: anyhow::anyhow!("run thread panicked") })
            }),
        }
    }
}

pub trait Farm: Send + Sync {
    fn target(&self) -> SubmitTarget;

    /// Fill target-specific fields of an already resolved config. The run dir
    /// has been allocated by the caller.
    fn finalize_submit_config(&self, config: &mut SubmitConfig, host_run_dir: &Path) -> SubmitResult<()>;

    /// Launch the run described by `config`.
    fn submit(&self, config: &SubmitConfig, host_run_dir: &Path) -> SubmitResult<RunHandle>;
}

/// The farm responsible for `target`.
pub fn farm_for(target: SubmitTarget, registry: Arc<RunFunctionRegistry>) -> Box<dyn Farm> {
    match target {
        SubmitTarget::Local => Box::new(LocalFarm::new(registry)),
    }
}

/// Format a duration like `2h 05m 09s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let s = elapsed.as_secs();
    if s < 60 {
        format!("{}s", s)
    } else if s < 60 * 60 {
        format!("{}m {:02}s", s / 60, s % 60)
    } else if s < 24 * 60 * 60 {
        format!("{}h {:02}m {:02}s", s / 3600, (s / 60) % 60, s % 60)
    } else {
        format!("{}d {:02}h {:02}m", s / 86400, (s / 3600) % 24, (s / 60) % 60)
    }
}
