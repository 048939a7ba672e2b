//! Run on the local machine.

use super::{Farm, RunHandle, RunReport, format_elapsed};
use crate::config::{ExecutionVenue, LocalLaunch, SubmitConfig, SubmitTarget};
use crate::error::{SubmitError, SubmitResult};
use crate::layout::RunDirLayout;
use crate::registry::{RunFn, RunFunctionRegistry};
use std::fs::File;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone)]
pub struct LocalFarm {
    registry: Arc<RunFunctionRegistry>,
}

impl LocalFarm {
    #[must_use]
    pub fn new(registry: Arc<RunFunctionRegistry>) -> Self {
        Self { registry }
    }
}

impl Farm for LocalFarm {
    fn target(&self) -> SubmitTarget {
        SubmitTarget::Local
    }

    fn finalize_submit_config(&self, config: &mut SubmitConfig, host_run_dir: &Path) -> SubmitResult<()> {
        let launch = config.local_options()?.launch;
        let resolved = config.require_resolved()?;
        if resolved.run_dir() != host_run_dir {
            return Err(SubmitError::InvalidConfig(format!(
                "host run dir {} does not match the allocated run dir {}",
                host_run_dir.display(),
                resolved.run_dir().display()
            )));
        }
        if config.nvprof {
            tracing::warn!("nvprof is not supported by the local target; running without it");
        }

        tracing::info!(task_name = %resolved.task_name(), ?launch, "local submit");
        config.record_venue(ExecutionVenue::Local { launch, run_dir: host_run_dir.to_path_buf() })
    }

    fn submit(&self, config: &SubmitConfig, host_run_dir: &Path) -> SubmitResult<RunHandle> {
        let resolved = config.require_resolved()?;
        let func = self.registry.get(resolved.run_func_name())?;
        tracing::info!(run_dir = %host_run_dir.display(), "dispatching run");

        match config.local_options()?.launch {
            LocalLaunch::InProcess => Ok(RunHandle::Finished(run_wrapper(config, func.as_ref())?)),
            LocalLaunch::Thread => {
                let run_func_name = resolved.run_func_name().to_string();
                let thread_config = config.clone();
                let handle = std::thread::Builder::new()
                    .name(resolved.task_name().to_string())
                    .spawn(move || run_wrapper(&thread_config, func.as_ref()))
                    .map_err(|e| SubmitError::io(host_run_dir, e))?;
                Ok(RunHandle::Running { run_func_name, handle })
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Execute the run function of a resolved config inside its run window.
///
/// Logs of the window go to `<run_dir>/log.txt` and stderr. `_finished.txt` is
/// created whether the function succeeds, fails or panics.
pub fn run_wrapper(config: &SubmitConfig, func: &RunFn) -> SubmitResult<RunReport> {
    let resolved = config.require_resolved()?;
    let layout = RunDirLayout::new(resolved.run_dir());
    let run_func_name = resolved.run_func_name();

    let log_path = layout.log_path();
    let log_file = File::create(&log_path).map_err(|e| SubmitError::io(&log_path, e))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_target(false).with_writer(Mutex::new(log_file)))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr));

    let outcome = tracing::subscriber::with_default(subscriber, || {
        tracing::info!("Running {}() on {}...", run_func_name, resolved.host_name());
        let start = Instant::now();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| func(config, resolved.run_func_kwargs())));
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(())) => {
                tracing::info!("Finished {}() in {}.", run_func_name, format_elapsed(elapsed));
                Ok(elapsed)
            }
            Ok(Err(source)) => {
                tracing::error!("{}() failed after {}: {:#}", run_func_name, format_elapsed(elapsed), source);
                Err(SubmitError::RunFailed { run_func_name: run_func_name.to_string(), source })
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!("{}() panicked after {}: {}", run_func_name, format_elapsed(elapsed), message);
                Err(SubmitError::RunFailed {
                    run_func_name: run_func_name.to_string(),
                    source: anyhow::anyhow!("panicked: {message}"),
                })
            }
        }
    });

    let marker = layout.finished_marker_path();
    let marked = File::create(&marker).map_err(|e| SubmitError::io(&marker, e));

    let elapsed = outcome?;
    marked?;
    Ok(RunReport {
        run_id: resolved.run_id(),
        run_name: resolved.run_name().to_string(),
        run_dir: resolved.run_dir().to_path_buf(),
        task_name: resolved.task_name().to_string(),
        elapsed,
    })
}
