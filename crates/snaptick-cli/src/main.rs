use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use snaptick_core::{load_manifest, reconcile, DirectorySource, Embedding, FaceEncoder, Roster};
use snaptick_vision::{OnnxFaceEncoder, ARCFACE_MATCH_THRESHOLD};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "snaptick", about = "SnapTick attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode roster images and save the result as a snapshot
    Encode {
        #[command(flatten)]
        source: ManifestArgs,
        /// Directory containing det_10g.onnx and w600k_r50.onnx
        #[arg(long)]
        models: Option<PathBuf>,
        /// Snapshot file to write
        #[arg(short, long, default_value = "roster.json")]
        output: PathBuf,
    },
    /// Take attendance from one photo
    Recognize {
        /// Class photo
        image: PathBuf,
        /// Use a pre-encoded roster instead of the manifest
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[command(flatten)]
        source: ManifestArgs,
        /// Directory containing det_10g.onnx and w600k_r50.onnx
        #[arg(long)]
        models: Option<PathBuf>,
        /// Maximum (exclusive) embedding distance for a match
        #[arg(long, default_value_t = ARCFACE_MATCH_THRESHOLD)]
        threshold: f32,
    },
    /// List the identities in a roster snapshot
    Roster {
        #[arg(default_value = "roster.json")]
        snapshot: PathBuf,
    },
}

#[derive(Args)]
struct ManifestArgs {
    /// Roster manifest
    #[arg(long, default_value = "students.json")]
    manifest: PathBuf,
    /// Directory that manifest image names are relative to
    #[arg(long, default_value = "images")]
    images: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            source,
            models,
            output,
        } => {
            let mut encoder = load_encoder(models)?;
            let roster = build_roster(&source, &mut encoder)?;
            roster
                .save_snapshot(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Encoded {} faces into {}", roster.len(), output.display());
        }
        Commands::Recognize {
            image,
            snapshot,
            source,
            models,
            threshold,
        } => {
            let mut encoder = load_encoder(models)?;
            let roster = match snapshot {
                Some(path) => Roster::load_snapshot(&path)?,
                None => build_roster(&source, &mut encoder)?,
            };

            let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let faces = encoder.encode(&bytes)?;
            let queries: Vec<Embedding> = faces.into_iter().map(|f| f.embedding).collect();
            let report = reconcile(&roster, &queries, threshold)?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Roster { snapshot } => {
            let roster = Roster::load_snapshot(&snapshot)?;
            println!(
                "{} identities, dimension {}, model {}",
                roster.len(),
                roster.dimension().map_or("-".to_string(), |d| d.to_string()),
                roster.model_version().unwrap_or("unknown"),
            );
            for label in roster.labels() {
                println!("  {label}");
            }
        }
    }

    Ok(())
}

fn load_encoder(models: Option<PathBuf>) -> Result<OnnxFaceEncoder> {
    let dir = models.unwrap_or_else(snaptick_vision::default_model_dir);
    OnnxFaceEncoder::load(&dir).with_context(|| format!("loading models from {}", dir.display()))
}

fn build_roster(source: &ManifestArgs, encoder: &mut impl FaceEncoder) -> Result<Roster> {
    require_exists(&source.manifest)?;
    let manifest = load_manifest(&source.manifest)?;
    Ok(Roster::build(&manifest, &DirectorySource::new(&source.images), encoder))
}

/// The daemon tolerates a missing manifest; an explicit CLI run should not.
fn require_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("{} not found", path.display());
    }
    Ok(())
}
