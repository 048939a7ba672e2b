use std::path::PathBuf;
use thiserror::Error;

pub type SubmitResult<T> = std::result::Result<T, SubmitError>;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("unknown submit target: {0}")]
    UnknownTarget(String),

    #[error("num_gpus must be >= 1 (got {0})")]
    InvalidGpuCount(String),

    #[error(
        "invalid task name: {task_name}. Probable reason: unacceptable characters in run_desc. \
         Task name must be accepted by the following regex: {pattern}"
    )]
    InvalidTaskName { task_name: String, pattern: &'static str },

    #[error("submit target {target} requires its target options, but `{field}` is not set")]
    MissingTargetOptions { target: String, field: &'static str },

    #[error("no run function registered under name: {0}")]
    UnknownRunFunction(String),

    #[error("invalid submit config: {0}")]
    InvalidConfig(String),

    #[error("the run dir already exists: {}", .0.display())]
    RunDirExists(PathBuf),

    #[error("extra file does not exist: {}", .0.display())]
    MissingExtraFile(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("submit config has already been submitted (run {0}); submit the original config instead")]
    AlreadySubmitted(String),

    #[error("submit config has not been resolved by submit_run yet")]
    NotResolved,

    #[error("run context: cannot {operation} while {state}")]
    ContextState { operation: &'static str, state: &'static str },

    #[error("run function {run_func_name}() failed: {source:#}")]
    RunFailed {
        run_func_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

impl SubmitError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Configuration errors are fatal and never worth retrying.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownTarget(_)
                | Self::InvalidGpuCount(_)
                | Self::InvalidTaskName { .. }
                | Self::MissingTargetOptions { .. }
                | Self::UnknownRunFunction(_)
                | Self::InvalidConfig(_)
        )
    }
}
