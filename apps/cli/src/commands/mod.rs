//! Subcommands and the run functions they submit.

pub mod generate_images;
pub mod style_mixing;

use anyhow::{Context, Result};
use runfarm_submission::{RunFunctionRegistry, RunReport, SubmitConfig};
use serde::{Deserialize, Serialize};

pub const PLAN_FILE: &str = "generation_plan.json";

/// All run functions this binary can submit.
pub fn registry() -> Result<RunFunctionRegistry> {
    let mut registry = RunFunctionRegistry::new();
    registry.register(generate_images::RUN_FUNC_NAME, generate_images::run)?;
    registry.register(style_mixing::RUN_FUNC_NAME, style_mixing::run)?;
    Ok(registry)
}

/// An image the generator backend is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedImage {
    pub file: String,
    pub seeds: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub col_styles: Vec<u32>,
}

/// Written to `<run_dir>/generation_plan.json` by the run functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub run_func_name: String,
    pub network_pkl: String,
    pub truncation_psi: Option<f64>,
    pub images: Vec<PlannedImage>,
    /// A stop was requested before every image was planned.
    pub stopped_early: bool,
}

impl GenerationPlan {
    pub fn write(&self, config: &SubmitConfig) -> Result<()> {
        let path = config.run_dir()?.join(PLAN_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

pub fn print_report(report: &RunReport) {
    println!("run_dir: {}", report.run_dir.display());
    println!("task_name: {}", report.task_name);
}
