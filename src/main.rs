//! segmed CLI
//!
//! Trains a U-Net on an image/mask directory pair, evaluates checkpoints and
//! predicts masks for single images.

use clap::{Parser, Subcommand};
use segmed::{AppConfig, Result};

#[derive(Parser)]
#[command(name = "segmed")]
#[command(about = "U-Net image segmentation training", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "segmed.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
    /// Train a U-Net and keep the best checkpoint
    Train {
        /// Image directory (root/<class>/<files>)
        #[arg(long)]
        images: Option<String>,
        /// Mask directory with the same layout as the images
        #[arg(long)]
        masks: Option<String>,
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Override batch size
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override steps per epoch
        #[arg(long)]
        steps_per_epoch: Option<usize>,
        /// Override validation split
        #[arg(long)]
        val_split: Option<f64>,
        /// Override learning rate
        #[arg(long)]
        lr: Option<f64>,
        /// Override checkpoint path
        #[arg(long)]
        model_file: Option<String>,
        /// Override data seed
        #[arg(long)]
        seed: Option<u64>,
        /// Write a preview of the first training pair
        #[arg(long)]
        show: bool,
        /// Write the training history as JSON
        #[arg(long)]
        history: Option<String>,
    },
    /// Report loss, Jaccard index and Dice coefficient of a checkpoint
    Evaluate {
        /// Checkpoint written by `train`
        #[arg(long)]
        checkpoint: String,
        #[arg(long)]
        images: String,
        #[arg(long)]
        masks: String,
        /// Batch size (defaults to the config value)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Predict a binary mask for one image
    Predict {
        #[arg(long)]
        checkpoint: String,
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: String,
        /// Probability above which a pixel belongs to the mask
        #[arg(long, default_value = "0.5")]
        threshold: f64,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config, or fall back to defaults
    let config = if std::path::Path::new(&cli.config).exists() {
        match AppConfig::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        AppConfig::default()
    };

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Train {
            images,
            masks,
            epochs,
            batch_size,
            steps_per_epoch,
            val_split,
            lr,
            model_file,
            seed,
            show,
            history,
        } => {
            let mut config = config;
            let t = &mut config.training;
            if let Some(v) = epochs { t.epochs = v; }
            if let Some(v) = batch_size { t.batch_size = v; }
            if let Some(v) = steps_per_epoch { t.steps_per_epoch = v; }
            if let Some(v) = val_split { t.val_split = v; }
            if let Some(v) = lr { t.learning_rate = v; }
            if let Some(v) = seed { t.seed = v; }
            let d = &mut config.data;
            if let Some(v) = images { d.image_dir = v; }
            if let Some(v) = masks { d.mask_dir = v; }
            if let Some(v) = model_file { d.model_file = v; }
            d.show |= show;
            commands::train(&config, history.as_deref())
        }
        Commands::Evaluate { checkpoint, images, masks, batch_size } => {
            let batch_size = batch_size.unwrap_or(config.training.batch_size);
            commands::evaluate(&checkpoint, &images, &masks, batch_size)
        }
        Commands::Predict { checkpoint, input, output, threshold } => {
            commands::predict(&checkpoint, &input, &output, threshold)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use std::path::Path;

    use segmed::data::codec::{load_tensor, save_tensor, ColorMode};
    use segmed::data::{FlowOptions, ImageDataGenerator, DataGenConfig, PairedGenerator, Subset};
    use segmed::metrics::SEGMENTATION_METRICS;
    use segmed::train::{evaluate as evaluate_model, train_unet};
    use segmed::train::trainer::RESCALE;
    use segmed::{LossType, SegError, UNet};

    pub fn init(config_path: &str) -> Result<()> {
        let config = AppConfig::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        println!("\nNext steps:");
        println!("  1. Edit {} to point [data] at your image and mask directories", config_path);
        println!("  2. Run 'segmed train' to train the model");
        println!("  3. Run 'segmed predict --checkpoint unet.json --input img.png --output mask.png'");

        Ok(())
    }

    pub fn train(config: &AppConfig, history_path: Option<&str>) -> Result<()> {
        let train_config = config.to_train_config()?;
        let history = train_unet(
            config.to_unet_config(),
            &config.data.image_dir,
            &config.data.mask_dir,
            &train_config,
        )?;

        println!("\nTrained {} epochs", history.len());
        if let Some((epoch, value)) = history.best(&train_config.monitor, train_config.checkpoint_mode) {
            println!("Best {} = {:.4} at epoch {}", train_config.monitor, value, epoch);
        }
        println!("Best model: {}", train_config.model_file.display());

        if let Some(path) = history_path {
            history.save_json(path)?;
            println!("History written to {}", path);
        }
        Ok(())
    }

    fn load_model(checkpoint: &str) -> Result<(UNet, (usize, usize, usize))> {
        let saved = UNet::load_json(checkpoint)?;
        let input_size = saved
            .model
            .config
            .input_size
            .ok_or_else(|| SegError::Config(format!("checkpoint {} has no input size", checkpoint)))?;
        Ok((saved.model, input_size))
    }

    pub fn evaluate(checkpoint: &str, images: &str, masks: &str, batch_size: usize) -> Result<()> {
        let (mut model, (h, w, _)) = load_model(checkpoint)?;
        let datagen = ImageDataGenerator::new(DataGenConfig { rescale: RESCALE, ..DataGenConfig::default() })?;
        let flow = |dir: &str, color_mode: ColorMode| {
            datagen.flow_from_directory(
                dir,
                FlowOptions {
                    color_mode,
                    target_size: (h as u32, w as u32),
                    batch_size,
                    seed: 0,
                    subset: Subset::All,
                    shuffle: false,
                },
            )
        };
        let mut pairs = PairedGenerator::new(flow(images, ColorMode::Rgb)?, flow(masks, ColorMode::Grayscale)?)?;
        let steps = pairs.batches_per_pass();
        let logs = evaluate_model(
            &mut model,
            &mut pairs,
            steps,
            LossType::BinaryCrossEntropy,
            &SEGMENTATION_METRICS,
        )?;

        println!("\nEvaluated {} pairs", pairs.len());
        for (key, value) in &logs {
            println!("  {:<15} {:.4}", key, value);
        }
        Ok(())
    }

    pub fn predict(checkpoint: &str, input: &str, output: &str, threshold: f64) -> Result<()> {
        let (mut model, (h, w, _)) = load_model(checkpoint)?;
        let image = load_tensor(Path::new(input), ColorMode::Rgb, (h as u32, w as u32), RESCALE)?;
        let probabilities = model.predict(&image);
        let mask = probabilities.map(|p| if p > threshold { 1.0 } else { 0.0 });
        save_tensor(&mask, Path::new(output))?;

        let covered = mask.data.iter().filter(|&&v| v > 0.0).count();
        println!(
            "Wrote {} ({:.1}% foreground)",
            output,
            100.0 * covered as f64 / mask.len().max(1) as f64
        );
        Ok(())
    }
}
