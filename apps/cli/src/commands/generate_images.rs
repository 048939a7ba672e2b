//! `generate-images`: one image per seed.

use super::{GenerationPlan, PlannedImage};
use anyhow::Result;
use runfarm_submission::{RunContext, RunFuncKwargs, RunProgress, RunReport, SubmitConfig, Submitter};
use serde::{Deserialize, Serialize};

pub const RUN_FUNC_NAME: &str = "run_generator::generate_images";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateImagesArgs {
    pub network_pkl: String,
    pub seeds: Vec<u32>,
    pub truncation_psi: Option<f64>,
}

impl GenerateImagesArgs {
    fn into_kwargs(self) -> Result<RunFuncKwargs> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => anyhow::bail!("expected kwargs object, got {other}"),
        }
    }
}

/// Run function body.
pub fn run(config: &SubmitConfig, kwargs: &RunFuncKwargs) -> Result<()> {
    let args: GenerateImagesArgs = serde_json::from_value(serde_json::Value::Object(kwargs.clone()))?;
    tracing::info!("Loading networks from \"{}\"...", args.network_pkl);

    let total = args.seeds.len() as u64;
    let mut plan = GenerationPlan {
        run_func_name: RUN_FUNC_NAME.to_string(),
        network_pkl: args.network_pkl.clone(),
        truncation_psi: args.truncation_psi,
        images: Vec::with_capacity(args.seeds.len()),
        stopped_early: false,
    };

    RunContext::new(config)?.run(|ctx| {
        for (idx, seed) in args.seeds.iter().copied().enumerate() {
            if ctx.should_stop()? {
                plan.stopped_early = true;
                break;
            }
            tracing::info!("Generating image for seed {} ({}/{}) ...", seed, idx + 1, total);
            plan.images.push(PlannedImage { file: format!("seed{seed:04}.png"), seeds: vec![seed], col_styles: Vec::new() });
            ctx.update(RunProgress::epoch(idx as u64 + 1, Some(total)))?;
        }
        plan.write(config)
    })
}

/// Submit a `generate-images` run and wait for it.
pub fn execute(submitter: &Submitter, config: &SubmitConfig, args: GenerateImagesArgs) -> Result<RunReport> {
    let handle = submitter.submit_run(config, RUN_FUNC_NAME, args.into_kwargs()?)?;
    Ok(handle.wait()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runfarm_submission::StaticIdentity;
    use tempfile::TempDir;

    #[test]
    fn test_generate_images_writes_plan() {
        let temp = TempDir::new().unwrap();
        let mut config = SubmitConfig::new(temp.path().join("results").to_string_lossy(), "gen");
        config.local.as_mut().unwrap().do_not_copy_source_files = true;
        let submitter =
            Submitter::new(super::super::registry().unwrap()).with_identity(StaticIdentity::new("alice", "box"));

        let args = GenerateImagesArgs { network_pkl: "ffhq.pkl".to_string(), seeds: vec![66, 230], truncation_psi: Some(0.5) };
        let report = execute(&submitter, &config, args).unwrap();

        let plan: GenerationPlan =
            serde_json::from_slice(&std::fs::read(report.run_dir.join(super::super::PLAN_FILE)).unwrap()).unwrap();
        let files: Vec<&str> = plan.images.iter().map(|i| i.file.as_str()).collect();
        assert_eq!(files, vec!["seed0066.png", "seed0230.png"]);
        assert!(!plan.stopped_early);
    }
}
