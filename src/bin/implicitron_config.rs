//! # Implicitron Config
//!
//! Prints the experiment configuration after merging an optional YAML file
//! and `key.path=value` overrides over the defaults, and optionally runs
//! training with it.

use anyhow::Context;
use clap::Parser;
use implicitron_trainer::{
    config::load_experiment_config, init_structured_logging, run_training_with_path_manager,
    Device, PathManager, SystemDeviceProbe, TestEnvironment,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "implicitron-config")]
#[command(about = "Render or train an Implicitron experiment configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// YAML file merged over the default configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Train on this device (cpu, cuda:N, or cuda for `gpu_idx`) instead of printing the config
    #[arg(long)]
    train: Option<String>,

    /// Dotted overrides such as `solver_args.lr=0.001`
    overrides: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let cfg = load_experiment_config(cli.config.as_deref(), &cli.overrides)
        .context("failed to load experiment configuration")?;

    let Some(device) = cli.train else {
        print!("{}", cfg.to_yaml()?);
        return Ok(());
    };

    let device = Device::resolve(&device, cfg.gpu_idx, &SystemDeviceProbe)?;
    let env = TestEnvironment::from_env();
    let path_manager = PathManager::for_dataset_root(
        &cfg.data_source_args
            .dataset_map_provider_json_index_args
            .dataset_root,
        &env.remote_store_root,
    )?;

    let summary = run_training_with_path_manager(&cfg, device, Arc::new(path_manager))
        .context("training failed")?;
    info!(
        epochs_run = summary.epochs_run,
        checkpoints = summary.checkpoints.len(),
        "Training complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary.train_stats)?);
    Ok(())
}
