//! Submit a function to be run locally or, later, on other targets.

use crate::config::{ResolvedRun, ResolvedRunParts, RunFuncKwargs, SubmitConfig, SubmitTarget};
use crate::error::{SubmitError, SubmitResult};
use crate::farm::{RunHandle, farm_for};
use crate::identity::{IdentityResolver, SystemIdentity};
use crate::registry::RunFunctionRegistry;
use crate::run_dir::{create_run_dir_local, populate_run_dir};
use crate::template::path_from_template;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Task names must be accepted by downstream container/task naming rules.
pub const TASK_NAME_PATTERN: &str = r"^[a-zA-Z0-9][a-zA-Z0-9_.-]+$";

static TASK_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(TASK_NAME_PATTERN).expect("valid task name regex"));

#[must_use]
pub fn task_name_for(user_name: &str, run_id: u32, run_desc: &str) -> String {
    format!("{user_name}-{run_id:05}-{run_desc}")
}

pub fn validate_task_name(task_name: &str) -> SubmitResult<()> {
    if TASK_NAME_RE.is_match(task_name) {
        Ok(())
    } else {
        Err(SubmitError::InvalidTaskName { task_name: task_name.to_string(), pattern: TASK_NAME_PATTERN })
    }
}

/// Submits runs: resolves identity, allocates and populates run dirs, and
/// dispatches to the farm selected by `submit_target`.
#[derive(Clone)]
pub struct Submitter {
    registry: Arc<RunFunctionRegistry>,
    identity: Arc<dyn IdentityResolver>,
    source_root: PathBuf,
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("registry", &self.registry)
            .field("source_root", &self.source_root)
            .finish_non_exhaustive()
    }
}

impl Submitter {
    /// Submitter using the OS identity and the current directory as source tree.
    #[must_use]
    pub fn new(registry: RunFunctionRegistry) -> Self {
        Self { registry: Arc::new(registry), identity: Arc::new(SystemIdentity), source_root: PathBuf::from(".") }
    }

    #[must_use]
    pub fn with_identity(mut self, identity: impl IdentityResolver + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    /// Directory whose contents are staged into `<run_dir>/src`.
    #[must_use]
    pub fn with_source_root(mut self, source_root: impl Into<PathBuf>) -> Self {
        self.source_root = source_root.into();
        self
    }

    #[must_use]
    pub fn registry(&self) -> &RunFunctionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Create a run dir, stage files into it, and launch `run_func_name` with
    /// `run_func_kwargs` on the configured target.
    ///
    /// The caller's `config` is never modified. A failure after the run dir has
    /// been allocated leaves the directory in place for inspection.
    pub fn submit_run(
        &self,
        config: &SubmitConfig,
        run_func_name: &str,
        run_func_kwargs: RunFuncKwargs,
    ) -> SubmitResult<RunHandle> {
        let mut config = config.clone();
        if let Some(resolved) = config.resolved() {
            return Err(SubmitError::AlreadySubmitted(resolved.run_name().to_string()));
        }

        let farm = farm_for(config.submit_target, Arc::clone(&self.registry));
        config.gpu_count()?;
        match config.submit_target {
            SubmitTarget::Local => {
                config.local_options()?;
            }
        }
        self.registry.get(run_func_name)?;

        let user_name = match config.user_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.identity.user_name(),
        };
        let host_name = self.identity.host_name();

        let run_dir_root = path_from_template(&config.run_dir_root, &user_name, self.identity.as_ref())?;
        config.run_dir_root = run_dir_root.to_string_lossy().into_owned();
        let allocated = create_run_dir_local(&config)?;

        let task_name = task_name_for(&user_name, allocated.run_id, &config.run_desc);
        validate_task_name(&task_name)?;

        config.seal_resolved(ResolvedRun::seal(ResolvedRunParts {
            run_id: allocated.run_id,
            run_name: allocated.run_name,
            run_dir: allocated.run_dir.clone(),
            run_func_name: run_func_name.to_string(),
            run_func_kwargs,
            user_name,
            task_name,
            host_name,
        }))?;

        let host_run_dir = allocated.run_dir;
        farm.finalize_submit_config(&mut config, &host_run_dir)?;

        if config.print_info {
            tracing::info!("submit config:\n{}", serde_json::to_string_pretty(&config)?);
        }

        populate_run_dir(&config, &host_run_dir, &self.source_root)?;
        farm.submit(&config, &host_run_dir)
    }
}
