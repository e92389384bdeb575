use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use facechecker_core::{gallery, Config, DetectorModel, FaceChecker, OnnxAnalyzer};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facechecker", about = "Recognize known faces in images")]
struct Cli {
    /// TOML config file (defaults to $FACECHECKER_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Detector model: fast (hog) or accurate (cnn)
    #[arg(short = 'm', long = "model", global = true)]
    model: Option<DetectorModel>,
    /// Match distance threshold (default 0.4)
    #[arg(long, global = true)]
    threshold: Option<f32>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode the training directory and overwrite the stored encodings
    Train,
    /// Run every image in the validation directory through the matcher
    Validate,
    /// Match the faces in a single image
    Test {
        /// Image file to check
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Browse saved match images
    Images {
        #[command(subcommand)]
        command: ImagesCommand,
    },
}

#[derive(Subcommand)]
enum ImagesCommand {
    /// List saved images, oldest first
    List,
    /// Delete a saved image by file name
    Delete {
        /// File name as shown by `images list`
        name: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(model) = cli.model {
        config.detector = model;
    }
    if let Some(threshold) = cli.threshold {
        config.match_threshold = threshold;
    }
    config.validate()?;

    match cli.command {
        Commands::Train => train(&config),
        Commands::Validate => validate(&config),
        Commands::Test { file } => test(&config, &file),
        Commands::Images { command: ImagesCommand::List } => {
            let images = gallery::list_images(&config.output_dir)?;
            if images.is_empty() {
                println!("No saved images in {}", config.output_dir.display());
            }
            for path in images {
                if let Some(name) = path.file_name() {
                    println!("{}", name.to_string_lossy());
                }
            }
            Ok(())
        }
        Commands::Images { command: ImagesCommand::Delete { name } } => {
            let path = gallery::delete_image(&config.output_dir, &name)?;
            println!("Deleted {}", path.display());
            Ok(())
        }
    }
}

fn load_analyzer(config: &Config) -> Result<OnnxAnalyzer> {
    let analyzer = OnnxAnalyzer::load(&config.model_dir, config.detector)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    tracing::info!(detector = %config.detector, model_dir = %config.model_dir.display(), "models loaded");
    Ok(analyzer)
}

fn checker(config: &Config) -> Result<FaceChecker<OnnxAnalyzer>> {
    Ok(FaceChecker::new(load_analyzer(config)?, &config.encodings_path)
        .with_threshold(config.match_threshold))
}

fn train(config: &Config) -> Result<()> {
    let mut analyzer = load_analyzer(config)?;
    let summary = facechecker_core::train(&config.training_dir, &config.encodings_path, &mut analyzer)
        .context("training failed")?;

    println!(
        "Encoded {} face(s) for {} label(s) from {} image(s), {} skipped",
        summary.encodings, summary.labels, summary.images, summary.skipped
    );
    println!("Saved to {}", config.encodings_path.display());
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    let mut checker = checker(config)?;
    let report = facechecker_core::validate_dir(&mut checker, &config.validation_dir)
        .context("validation failed")?;

    for outcome in &report.outcomes {
        let matched = if outcome.matched.is_empty() {
            "no match".to_string()
        } else {
            outcome.matched.join(", ")
        };
        let verdict = match (&outcome.expected, outcome.is_hit()) {
            (None, _) => String::new(),
            (Some(_), true) => " [hit]".to_string(),
            (Some(expected), false) => format!(" [expected {expected}]"),
        };
        println!("{}: {matched}{verdict}", outcome.path.display());
    }
    println!(
        "{} of {} labelled image(s) contained the expected face",
        report.hits(),
        report.labelled()
    );
    Ok(())
}

fn test(config: &Config, file: &Path) -> Result<()> {
    let mut checker = checker(config)?;
    let recognition = checker
        .check_file(file)
        .with_context(|| format!("failed to check {}", file.display()))?;

    if recognition.faces.is_empty() {
        println!("No faces found");
        return Ok(());
    }

    for recognized in &recognition.faces {
        let loc = recognized.face.location;
        let label = recognized.result.label.as_deref().unwrap_or("unknown");
        println!(
            "{label} (distance {:.3}) at top={} right={} bottom={} left={}",
            recognized.result.distance, loc.top, loc.right, loc.bottom, loc.left
        );
    }

    if let Some(annotated) = &recognition.annotated {
        let path = gallery::save_match(
            &config.output_dir,
            annotated,
            &recognition.matched_labels(),
            Local::now(),
        )?;
        tracing::info!(path = %path.display(), "saved annotated match");
        println!("Saved {}", path.display());
    }
    Ok(())
}
