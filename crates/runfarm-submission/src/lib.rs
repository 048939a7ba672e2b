//! Runfarm Submission
//!
//! Run submission and run lifecycle for experiment jobs:
//! - Describing a submission (`SubmitConfig`)
//! - Allocating and populating numbered run directories
//! - Dispatching runs to an execution target (`Farm`)
//! - Reporting progress and polling for stop requests from inside a run (`RunContext`)

pub mod config;
pub mod error;
pub mod farm;
pub mod identity;
pub mod layout;
pub mod registry;
pub mod run_context;
pub mod run_dir;
pub mod submit;
pub mod template;

pub use config::{
    ExecutionVenue, ExtraFile, LocalLaunch, LocalTargetOptions, PlatformExtras, ResolvedRun, RunFuncKwargs,
    SubmitConfig, SubmitTarget,
};
pub use error::{SubmitError, SubmitResult};
pub use farm::{Farm, LocalFarm, RunHandle, RunReport, farm_for};
pub use identity::{IdentityResolver, StaticIdentity, SystemIdentity};
pub use layout::RunDirLayout;
pub use registry::{RunFn, RunFunctionRegistry};
pub use run_context::{RunContext, RunProgress, RunState, RunStatus, SentinelFile, StopFlag, StopSignal};
pub use run_dir::{AllocatedRunDir, StagingReport, create_run_dir_local, populate_run_dir, read_snapshot};
pub use submit::{Submitter, TASK_NAME_PATTERN, task_name_for, validate_task_name};
pub use template::path_from_template;
