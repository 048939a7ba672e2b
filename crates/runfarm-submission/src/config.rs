//! Strongly typed submission configuration.
//!
//! A [`SubmitConfig`] carries two kinds of state:
//! - *requested* fields, set by the caller before submission (plain public fields)
//! - the *resolved* record ([`ResolvedRun`]), filled exactly once by
//!   [`crate::Submitter::submit_run`] and read-only afterwards

use crate::error::{SubmitError, SubmitResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Keyword arguments passed to the run function.
pub type RunFuncKwargs = serde_json::Map<String, serde_json::Value>;

/// Glob patterns skipped when staging source files into a run dir.
pub const DEFAULT_RUN_DIR_IGNORE: &[&str] = &[
    "__pycache__",
    "*.pyproj",
    "*.sln",
    "*.suo",
    ".cache",
    ".idea",
    ".vs",
    ".vscode",
    "_cudacache",
    ".git",
    "target",
];

/// 1 GiB.
pub const DEFAULT_DATA_READER_BUFFER_SIZE: u64 = 1 << 30;

/// Where a run is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SubmitTarget {
    /// Run on this machine.
    #[default]
    Local,
}

impl SubmitTarget {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SubmitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmitTarget {
    type Err = SubmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            _ => Err(SubmitError::UnknownTarget(s.to_string())),
        }
    }
}

impl TryFrom<String> for SubmitTarget {
    type Error = SubmitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubmitTarget> for String {
    fn from(value: SubmitTarget) -> Self {
        value.as_str().to_string()
    }
}

/// How the local farm launches the run body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalLaunch {
    /// Run on the submitting thread; `submit` returns once the run has finished.
    #[default]
    InProcess,
    /// Run on a dedicated thread; `submit` returns a handle to join.
    Thread,
}

/// Options that only apply to [`SubmitTarget::Local`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTargetOptions {
    /// Do not copy source files from the working directory to the run dir.
    pub do_not_copy_source_files: bool,
    pub launch: LocalLaunch,
}

/// Heuristic tuning values consumed by data readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformExtras {
    /// Size of the shared memory region used by a data reader, in bytes.
    pub data_reader_buffer_size: u64,
    /// Number of data reader worker processes; 0 means single-threaded.
    pub data_reader_process_count: u32,
}

impl Default for PlatformExtras {
    fn default() -> Self {
        Self { data_reader_buffer_size: DEFAULT_DATA_READER_BUFFER_SIZE, data_reader_process_count: 0 }
    }
}

/// An additional file staged into the run dir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFile {
    /// Absolute path of the file to copy.
    pub source: PathBuf,
    /// Destination relative to `<run_dir>/src`.
    pub dest: PathBuf,
}

impl ExtraFile {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self { source: source.into(), dest: dest.into() }
    }
}

/// Target-specific values recorded by a farm's `finalize_submit_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum ExecutionVenue {
    Local { launch: LocalLaunch, run_dir: PathBuf },
}

/// Values populated during submission. Immutable once stamped on a config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRun {
    run_id: u32,
    run_name: String,
    run_dir: PathBuf,
    run_func_name: String,
    run_func_kwargs: RunFuncKwargs,
    user_name: String,
    task_name: String,
    host_name: String,
    submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    venue: Option<ExecutionVenue>,
}

/// Builder-side view of a [`ResolvedRun`] before it is sealed onto a config.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedRunParts {
    pub run_id: u32,
    pub run_name: String,
    pub run_dir: PathBuf,
    pub run_func_name: String,
    pub run_func_kwargs: RunFuncKwargs,
    pub user_name: String,
    pub task_name: String,
    pub host_name: String,
}

impl ResolvedRun {
    pub(crate) fn seal(parts: ResolvedRunParts) -> Self {
        Self {
            run_id: parts.run_id,
            run_name: parts.run_name,
            run_dir: parts.run_dir,
            run_func_name: parts.run_func_name,
            run_func_kwargs: parts.run_func_kwargs,
            user_name: parts.user_name,
            task_name: parts.task_name,
            host_name: parts.host_name,
            submitted_at: Utc::now(),
            venue: None,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> u32 {
        self.run_id
    }

    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    #[must_use]
    pub fn run_func_name(&self) -> &str {
        &self.run_func_name
    }

    #[must_use]
    pub fn run_func_kwargs(&self) -> &RunFuncKwargs {
        &self.run_func_kwargs
    }

    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    #[must_use]
    pub fn venue(&self) -> Option<&ExecutionVenue> {
        self.venue.as_ref()
    }
}

/// Config needed to submit runs.
///
/// `run_dir_root` may contain `<USERNAME>` and `<HOST>` tags; it is always
/// expanded through [`crate::template::path_from_template`] before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    pub run_dir_root: String,
    /// Used in the run dir name and the task name.
    pub run_desc: String,
    pub run_dir_ignore: Vec<String>,
    pub run_dir_extra_files: Vec<ExtraFile>,

    pub submit_target: SubmitTarget,
    pub num_gpus: Option<u32>,
    /// Log the fully resolved config before dispatch.
    pub print_info: bool,
    pub nvprof: bool,
    pub local: Option<LocalTargetOptions>,
    pub datasets: Vec<String>,

    /// Overrides the user name otherwise resolved from the OS.
    pub user_name: Option<String>,
    pub platform_extras: PlatformExtras,

    #[serde(skip_serializing_if = "Option::is_none")]
    resolved: Option<ResolvedRun>,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            run_dir_root: "results".to_string(),
            run_desc: String::new(),
            run_dir_ignore: DEFAULT_RUN_DIR_IGNORE.iter().map(|p| (*p).to_string()).collect(),
            run_dir_extra_files: Vec::new(),
            submit_target: SubmitTarget::Local,
            num_gpus: Some(1),
            print_info: false,
            nvprof: false,
            local: Some(LocalTargetOptions::default()),
            datasets: Vec::new(),
            user_name: None,
            platform_extras: PlatformExtras::default(),
            resolved: None,
        }
    }
}

impl SubmitConfig {
    #[must_use]
    pub fn new(run_dir_root: impl Into<String>, run_desc: impl Into<String>) -> Self {
        Self { run_dir_root: run_dir_root.into(), run_desc: run_desc.into(), ..Self::default() }
    }

    /// Values populated by `submit_run`, if this config has been submitted.
    #[must_use]
    pub fn resolved(&self) -> Option<&ResolvedRun> {
        self.resolved.as_ref()
    }

    pub fn require_resolved(&self) -> SubmitResult<&ResolvedRun> {
        self.resolved.as_ref().ok_or(SubmitError::NotResolved)
    }

    /// Shorthand for `require_resolved()?.run_dir()`.
    pub fn run_dir(&self) -> SubmitResult<&Path> {
        Ok(self.require_resolved()?.run_dir())
    }

    /// Number of GPUs requested; `None` and `0` are rejected.
    pub fn gpu_count(&self) -> SubmitResult<u32> {
        match self.num_gpus {
            Some(n) if n >= 1 => Ok(n),
            Some(n) => Err(SubmitError::InvalidGpuCount(n.to_string())),
            None => Err(SubmitError::InvalidGpuCount("unset".to_string())),
        }
    }

    /// Local target options, required when `submit_target` is `Local`.
    pub fn local_options(&self) -> SubmitResult<&LocalTargetOptions> {
        self.local.as_ref().ok_or_else(|| SubmitError::MissingTargetOptions {
            target: self.submit_target.to_string(),
            field: "local",
        })
    }

    pub(crate) fn seal_resolved(&mut self, resolved: ResolvedRun) -> SubmitResult<()> {
        if let Some(existing) = &self.resolved {
            return Err(SubmitError::AlreadySubmitted(existing.run_name.clone()));
        }
        self.resolved = Some(resolved);
        Ok(())
    }

    /// Record the target-specific execution venue. Can be done once per submission.
    pub fn record_venue(&mut self, venue: ExecutionVenue) -> SubmitResult<()> {
        let resolved = self.resolved.as_mut().ok_or(SubmitError::NotResolved)?;
        if resolved.venue.is_some() {
            return Err(SubmitError::InvalidConfig(format!(
                "execution venue for run {} is already recorded",
                resolved.run_name
            )));
        }
        resolved.venue = Some(venue);
        Ok(())
    }

    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> SubmitResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SubmitError::io(path, e))?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file(&self, path: &Path) -> SubmitResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SubmitError::io(parent, e))?;
        }
        std::fs::write(path, content).map_err(|e| SubmitError::io(path, e))
    }
}
