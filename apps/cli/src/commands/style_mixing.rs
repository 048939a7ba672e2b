//! `style-mixing-example`: a grid mixing the styles of row and column seeds.

use super::{GenerationPlan, PlannedImage};
use anyhow::Result;
use runfarm_submission::{RunContext, RunFuncKwargs, RunProgress, RunReport, SubmitConfig, Submitter};
use serde::{Deserialize, Serialize};

pub const RUN_FUNC_NAME: &str = "run_generator::style_mixing_example";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleMixingArgs {
    pub network_pkl: String,
    pub row_seeds: Vec<u32>,
    pub col_seeds: Vec<u32>,
    pub truncation_psi: Option<f64>,
    pub col_styles: Vec<u32>,
}

impl StyleMixingArgs {
    fn into_kwargs(self) -> Result<RunFuncKwargs> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => anyhow::bail!("expected kwargs object, got {other}"),
        }
    }

    /// Source images first, then one image per (row, col) pair, then the grid.
    fn planned_images(&self) -> Vec<PlannedImage> {
        let mut all_seeds: Vec<u32> = self.row_seeds.iter().chain(&self.col_seeds).copied().collect();
        all_seeds.sort_unstable();
        all_seeds.dedup();

        let mut images: Vec<PlannedImage> = all_seeds
            .into_iter()
            .map(|seed| PlannedImage { file: format!("{seed}-{seed}.png"), seeds: vec![seed], col_styles: Vec::new() })
            .collect();
        for &row in &self.row_seeds {
            for &col in &self.col_seeds {
                if row == col {
                    continue;
                }
                images.push(PlannedImage {
                    file: format!("{row}-{col}.png"),
                    seeds: vec![row, col],
                    col_styles: self.col_styles.clone(),
                });
            }
        }
        images.push(PlannedImage {
            file: "grid.png".to_string(),
            seeds: self.row_seeds.iter().chain(&self.col_seeds).copied().collect(),
            col_styles: self.col_styles.clone(),
        });
        images
    }
}

/// Run function body.
pub fn run(config: &SubmitConfig, kwargs: &RunFuncKwargs) -> Result<()> {
    let args: StyleMixingArgs = serde_json::from_value(serde_json::Value::Object(kwargs.clone()))?;
    if args.row_seeds.is_empty() || args.col_seeds.is_empty() {
        anyhow::bail!("style mixing needs at least one row seed and one col seed");
    }
    tracing::info!("Loading networks from \"{}\"...", args.network_pkl);

    let images = args.planned_images();
    let total = images.len() as u64;
    let mut plan = GenerationPlan {
        run_func_name: RUN_FUNC_NAME.to_string(),
        network_pkl: args.network_pkl.clone(),
        truncation_psi: args.truncation_psi,
        images: Vec::with_capacity(images.len()),
        stopped_early: false,
    };

    RunContext::new(config)?.run(|ctx| {
        for (idx, image) in images.into_iter().enumerate() {
            if ctx.should_stop()? {
                plan.stopped_early = true;
                break;
            }
            tracing::debug!("Planning {} ({}/{})", image.file, idx + 1, total);
            plan.images.push(image);
            ctx.update(RunProgress::epoch(idx as u64 + 1, Some(total)))?;
        }
        plan.write(config)
    })
}

/// Submit a `style-mixing-example` run and wait for it.
pub fn execute(submitter: &Submitter, config: &SubmitConfig, args: StyleMixingArgs) -> Result<RunReport> {
    let handle = submitter.submit_run(config, RUN_FUNC_NAME, args.into_kwargs()?)?;
    Ok(handle.wait()?)
}
