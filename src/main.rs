//! EQA encoder pretraining CLI
//!
//! Trains the multi-task CNN on rendered frames and evaluates saved checkpoints.

#![recursion_limit = "256"]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eqa_pretrain::training::TrainerKind;
use eqa_pretrain::{Config, Result};

#[derive(Parser)]
#[command(name = "eqa-pretrain")]
#[command(about = "Multi-task CNN pretraining for embodied question answering", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Trainer implementation
    #[arg(long, default_value = "eqa-cnn-pretrain")]
    trainer: TrainerKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Train the encoder from scratch
    Train,
    /// Evaluate saved checkpoints on the eval split
    Eval {
        /// Checkpoint file (defaults to every checkpoint in checkpoint_dir)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Step used when recording metrics for --checkpoint
        #[arg(long)]
        index: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Train => commands::train(config, cli.trainer),
        Commands::Eval { checkpoint, index } => commands::eval(config, cli.trainer, checkpoint, index),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use burn::backend::{Autodiff, Wgpu};
    use eqa_pretrain::data::FrameDirectory;
    use eqa_pretrain::training::device::wgpu_candidates;
    use eqa_pretrain::training::{CheckpointManager, CsvScalarWriter, DeviceHandle, Trainer};

    type TrainBackend = Autodiff<Wgpu<f32, i32>>;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        for dir in [
            &config.data.data_dir,
            &config.data.checkpoint_dir,
            &config.data.results_dir,
            &config.data.metrics_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        println!("Created {} and output directories", config.data.data_dir);

        println!("\nNext steps:");
        println!(
            "  1. Place frames under {}/<split>/ as <i>_rgb.png, <i>_depth.png, <i>_seg.png",
            config.data.data_dir
        );
        println!("  2. Run 'eqa-pretrain train' to train the encoder");
        println!("  3. Run 'eqa-pretrain eval' to evaluate every checkpoint");

        Ok(())
    }

    fn build(config: Config, kind: TrainerKind) -> Result<(Box<dyn Trainer>, CsvScalarWriter)> {
        let device = DeviceHandle::<TrainBackend>::acquire_first(wgpu_candidates(config.training.device_id))?;
        let source = FrameDirectory::new(&config.data.data_dir, config.model.num_classes);
        let sink = CsvScalarWriter::new(&config.data.metrics_dir)?;
        log::info!("Trainer: {}", kind);

        Ok((kind.build(config, device, source)?, sink))
    }

    pub fn train(config: Config, kind: TrainerKind) -> Result<()> {
        let (trainer, mut sink) = build(config, kind)?;
        let report = trainer.train(&mut sink)?;

        println!("\nTraining complete:");
        println!("  Iterations: {}", report.iterations);
        for epoch in &report.epochs {
            println!(
                "  Epoch {:>3}: loss {:.4} ({:.1} min)",
                epoch.epoch, epoch.mean_loss, epoch.minutes
            );
        }
        println!("  Checkpoints: {}", report.checkpoints.len());
        Ok(())
    }

    pub fn eval(
        config: Config,
        kind: TrainerKind,
        checkpoint: Option<PathBuf>,
        index: Option<usize>,
    ) -> Result<()> {
        let (trainer, mut sink) = build(config, kind)?;

        let targets: Vec<(PathBuf, usize)> = match checkpoint {
            Some(path) => {
                let index = index
                    .or_else(|| {
                        let name = path.file_name()?.to_string_lossy().into_owned();
                        CheckpointManager::parse_epoch(&name)
                    })
                    .unwrap_or(0);
                vec![(path, index)]
            }
            None => trainer
                .list_checkpoints()?
                .into_iter()
                .map(|record| (record.path, record.epoch))
                .collect(),
        };

        if targets.is_empty() {
            println!("No checkpoints to evaluate");
            return Ok(());
        }

        println!("\n{:<24} {:>10} {:>10} {:>10} {:>10}", "Checkpoint", "Total", "Seg", "AE", "Depth");
        println!("{}", "-".repeat(68));
        for (path, index) in targets {
            let report = trainer.eval_checkpoint(&path, index, &mut sink)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!(
                "{:<24} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                name,
                report.means.total,
                report.means.segmentation,
                report.means.reconstruction,
                report.means.depth
            );
        }
        Ok(())
    }
}
