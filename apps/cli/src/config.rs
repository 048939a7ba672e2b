//! Submit configuration for CLI runs.

use anyhow::{Context, Result};
use runfarm_submission::{LocalLaunch, SubmitConfig};
use std::path::PathBuf;

/// Values given on the command line. They take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct SubmitOverrides {
    pub config_path: Option<PathBuf>,
    pub result_dir: Option<String>,
    pub desc: Option<String>,
    pub num_gpus: Option<u32>,
    pub no_source_copy: bool,
    pub background: bool,
}

/// Build the submit config for a subcommand.
///
/// Configuration precedence:
/// 1. CLI arguments
/// 2. Config file (`--config`)
/// 3. Defaults (`run_desc` falls back to the subcommand name)
pub fn load_submit_config(overrides: &SubmitOverrides, default_desc: &str) -> Result<SubmitConfig> {
    let mut config = match &overrides.config_path {
        Some(path) => SubmitConfig::load_from_file(path)
            .with_context(|| format!("Failed to load submit config: {}", path.display()))?,
        None => SubmitConfig::default(),
    };

    if let Some(result_dir) = &overrides.result_dir {
        config.run_dir_root.clone_from(result_dir);
    }
    if let Some(desc) = &overrides.desc {
        config.run_desc.clone_from(desc);
    }
    if config.run_desc.is_empty() {
        config.run_desc = default_desc.to_string();
    }
    if let Some(num_gpus) = overrides.num_gpus {
        config.num_gpus = Some(num_gpus);
    }
    if overrides.no_source_copy || overrides.background {
        let local = config.local.get_or_insert_with(Default::default);
        if overrides.no_source_copy {
            local.do_not_copy_source_files = true;
        }
        if overrides.background {
            local.launch = LocalLaunch::Thread;
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_use_subcommand_desc() {
        let config = load_submit_config(&SubmitOverrides::default(), "generate-images").unwrap();
        assert_eq!(config.run_desc, "generate-images");
        assert_eq!(config.run_dir_root, "results");
        assert_eq!(config.num_gpus, Some(1));
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("submit.toml");
        std::fs::write(&path, "run_dir_root = \"/data/runs\"\nrun_desc = \"from-file\"\nnum_gpus = 8\n").unwrap();

        let overrides = SubmitOverrides {
            config_path: Some(path),
            num_gpus: Some(2),
            no_source_copy: true,
            ..SubmitOverrides::default()
        };
        let config = load_submit_config(&overrides, "generate-images").unwrap();
        assert_eq!(config.run_dir_root, "/data/runs");
        assert_eq!(config.run_desc, "from-file");
        assert_eq!(config.num_gpus, Some(2));
        assert!(config.local.unwrap().do_not_copy_source_files);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let overrides = SubmitOverrides { config_path: Some(PathBuf::from("/nonexistent/submit.toml")), ..Default::default() };
        assert!(load_submit_config(&overrides, "x").is_err());
    }
}
