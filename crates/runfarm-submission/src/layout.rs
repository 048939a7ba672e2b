use std::path::{Path, PathBuf};

pub const SOURCE_DIR: &str = "src";
pub const CONFIG_JSON_FILE: &str = "submit_config.json";
pub const CONFIG_TXT_FILE: &str = "submit_config.txt";
pub const RUN_INFO_FILE: &str = "run.txt";
pub const LOG_FILE: &str = "log.txt";
pub const FINISHED_MARKER_FILE: &str = "_finished.txt";
pub const STATUS_FILE: &str = "run_status.json";
pub const STOP_SENTINEL_FILE: &str = "_stop.txt";

/// Filesystem layout of a single run directory.
///
/// ```text
/// <run_dir_root>/<run_id:05>-<run_desc>/
///   src/                 staged sources + extra files
///   submit_config.json   resolved config snapshot
///   submit_config.txt    human-readable snapshot
///   run.txt              task/host/start time
///   log.txt              log of the run window
///   run_status.json      final progress, written at teardown
///   _finished.txt        completion marker
/// ```
#[derive(Debug, Clone)]
pub struct RunDirLayout {
    run_dir: PathBuf,
}

impl RunDirLayout {
    #[must_use]
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self { run_dir: run_dir.into() }
    }

    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    #[must_use]
    pub fn source_dir(&self) -> PathBuf {
        self.run_dir.join(SOURCE_DIR)
    }

    #[must_use]
    pub fn config_json_path(&self) -> PathBuf {
        self.run_dir.join(CONFIG_JSON_FILE)
    }

    #[must_use]
    pub fn config_txt_path(&self) -> PathBuf {
        self.run_dir.join(CONFIG_TXT_FILE)
    }

    #[must_use]
    pub fn run_info_path(&self) -> PathBuf {
        self.run_dir.join(RUN_INFO_FILE)
    }

    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.run_dir.join(LOG_FILE)
    }

    #[must_use]
    pub fn finished_marker_path(&self) -> PathBuf {
        self.run_dir.join(FINISHED_MARKER_FILE)
    }

    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.run_dir.join(STATUS_FILE)
    }

    #[must_use]
    pub fn stop_sentinel_path(&self) -> PathBuf {
        self.run_dir.join(STOP_SENTINEL_FILE)
    }

    /// Whether the run has signalled completion.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished_marker_path().exists()
    }
}
