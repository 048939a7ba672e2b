//! run-generator - submit image generation runs
//!
//! Each subcommand builds a submit config, allocates a numbered run directory
//! under the result dir and runs the matching run function on the local target.

mod commands;
mod config;
mod num_range;

use clap::{Parser, Subcommand};
use commands::generate_images::GenerateImagesArgs;
use commands::style_mixing::StyleMixingArgs;
use config::SubmitOverrides;
use num_range::NumRange;
use runfarm_submission::Submitter;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const EXAMPLES: &str = "examples:

  # Generate uncurated images
  run-generator generate-images --network=networks/stylegan2-ffhq-config-f.pkl --seeds=6600-6625 --truncation-psi=0.5

  # Generate curated images
  run-generator generate-images --network=networks/stylegan2-ffhq-config-f.pkl --seeds=66,230,389,1518 --truncation-psi=1.0

  # Generate a style mixing example
  run-generator style-mixing-example --network=networks/stylegan2-ffhq-config-f.pkl --row-seeds=85,100,75,458,1500 --col-seeds=55,821,1789,293 --truncation-psi=1.0
";

/// Generator runs. Run 'run-generator <subcommand> --help' for subcommand help.
#[derive(Parser, Debug)]
#[command(name = "run-generator", author, version, about, after_help = EXAMPLES)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Root directory for run outputs
    #[arg(long, global = true, value_name = "DIR")]
    result_dir: Option<String>,

    /// Run description (defaults to the subcommand name)
    #[arg(long, global = true)]
    desc: Option<String>,

    /// Number of GPUs to request
    #[arg(long, global = true)]
    num_gpus: Option<u32>,

    /// Submit config file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Do not copy source files into the run directory
    #[arg(long, global = true)]
    no_source_copy: bool,

    /// Run the job on a worker thread instead of the calling thread
    #[arg(long, global = true)]
    background: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate images
    GenerateImages {
        /// Network pickle filename
        #[arg(long = "network")]
        network_pkl: String,

        /// List of random seeds (e.g. 66,230 or 6600-6625)
        #[arg(long)]
        seeds: NumRange,

        /// Truncation psi
        #[arg(long, default_value_t = 0.5)]
        truncation_psi: f64,
    },

    /// Generate style mixing video
    StyleMixingExample {
        /// Network pickle filename
        #[arg(long = "network")]
        network_pkl: String,

        /// Random seeds to use for image rows
        #[arg(long)]
        row_seeds: NumRange,

        /// Random seeds to use for image columns
        #[arg(long)]
        col_seeds: NumRange,

        /// Style layer range
        #[arg(long, default_value = "0-6")]
        col_styles: NumRange,

        /// Truncation psi
        #[arg(long, default_value_t = 0.5)]
        truncation_psi: f64,
    },
}

impl Command {
    const fn name(&self) -> &'static str {
        match self {
            Self::GenerateImages { .. } => "generate-images",
            Self::StyleMixingExample { .. } => "style-mixing-example",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let overrides = SubmitOverrides {
        config_path: args.config,
        result_dir: args.result_dir,
        desc: args.desc,
        num_gpus: args.num_gpus,
        no_source_copy: args.no_source_copy,
        background: args.background,
    };
    let submit_config = config::load_submit_config(&overrides, args.command.name())?;
    let submitter = Submitter::new(commands::registry()?);

    let report = match args.command {
        Command::GenerateImages { network_pkl, seeds, truncation_psi } => commands::generate_images::execute(
            &submitter,
            &submit_config,
            GenerateImagesArgs { network_pkl, seeds: seeds.0, truncation_psi: Some(truncation_psi) },
        )?,
        Command::StyleMixingExample { network_pkl, row_seeds, col_seeds, col_styles, truncation_psi } => {
            commands::style_mixing::execute(
                &submitter,
                &submit_config,
                StyleMixingArgs {
                    network_pkl,
                    row_seeds: row_seeds.0,
                    col_seeds: col_seeds.0,
                    truncation_psi: Some(truncation_psi),
                    col_styles: col_styles.0,
                },
            )?
        }
    };

    commands::print_report(&report);
    Ok(())
}
