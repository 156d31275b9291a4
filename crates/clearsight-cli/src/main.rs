mod config;
mod gallery;
mod recognition_log;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clearsight_core::{
    Descriptor, EmbeddingModel, FaceProcessor, ImagePayload, Identity, OnnxEmbedder, ProcessError, Recognition,
    RecognitionConfig, ScrfdDetector,
};
use config::Config;
use gallery::Gallery;
use image::RgbImage;
use recognition_log::RecognitionEntry;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "clearsight", about = "ClearSight face enrollment and recognition")]
struct Cli {
    /// TOML file with recognition tunables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face image under an identifier
    Enroll {
        /// Image file (or base64 text file with --base64)
        image: PathBuf,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// Treat the input file as base64 text
        #[arg(long)]
        base64: bool,
    },
    /// Match a face image against enrolled identities
    Recognize {
        image: PathBuf,
        #[arg(long)]
        base64: bool,
    },
    /// Report brightness and sharpness without matching
    Quality {
        image: PathBuf,
        #[arg(long)]
        base64: bool,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity and its recognition history
    Remove {
        /// Identifier to remove
        id: String,
    },
    /// Show recent recognitions, newest first
    Logs {
        #[arg(long, default_value_t = recognition_log::DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Show configuration, model availability, and gallery descriptor health
    Diagnose,
}

/// Input file contents, owned so an `ImagePayload` can borrow them.
enum Input {
    Bytes(Vec<u8>),
    Text(String),
}

impl Input {
    fn read(path: &Path, base64: bool) -> Result<Self> {
        if base64 {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(Self::Text(text))
        } else {
            let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(Self::Bytes(bytes))
        }
    }

    fn payload(&self) -> ImagePayload<'_> {
        match self {
            Self::Bytes(b) => ImagePayload::Bytes(b),
            Self::Text(t) => ImagePayload::Base64(t),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Enroll { image, id, name, base64 } => {
            let input = Input::read(&image, base64)?;
            enroll(&config, &input, id, name)
        }
        Commands::Recognize { image, base64 } => {
            let input = Input::read(&image, base64)?;
            recognize(&config, &input)
        }
        Commands::Quality { image, base64 } => {
            let input = Input::read(&image, base64)?;
            quality(&config, &input)
        }
        Commands::List => {
            let gallery = Gallery::load(&config.gallery_path)?;
            if gallery.identities().is_empty() {
                println!("No identities enrolled");
            }
            for identity in gallery.identities() {
                println!(
                    "{}\t{}\t{} ({})\t{}",
                    identity.id,
                    identity.name,
                    identity.descriptor.kind,
                    identity.descriptor.len(),
                    identity.enrolled_at
                );
            }
            Ok(())
        }
        Commands::Remove { id } => {
            let mut gallery = Gallery::load(&config.gallery_path)?;
            let Some(removed) = gallery.remove(&id) else {
                bail!("identity {id} is not enrolled");
            };
            gallery.save(&config.gallery_path)?;
            if let Some(path) = removed.image_path.as_deref() {
                discard_snapshot(Path::new(path));
            }
            let purged = recognition_log::purge(&config.log_path, &id)?;
            println!("Removed {id} ({purged} recognition log entries)");
            Ok(())
        }
        Commands::Logs { limit } => {
            let entries = recognition_log::recent(&config.log_path, limit)?;
            if entries.is_empty() {
                println!("No recognitions logged");
            }
            for entry in entries {
                println!("{}\t{}\t{}\t{:.4}", entry.recognized_at, entry.id, entry.name, entry.similarity);
            }
            Ok(())
        }
        Commands::Diagnose => diagnose(&config),
    }
}

/// Detector is required; a missing embedding model degrades to classical descriptors.
fn build_processor(config: &Config) -> Result<FaceProcessor> {
    let detector = ScrfdDetector::load(&config.detector_model_path())
        .context("loading face detector")?
        .with_confidence_threshold(config.detector_confidence);

    let embedder: Option<Box<dyn EmbeddingModel>> =
        match OnnxEmbedder::load(&config.embedding_model_path(), config.recognition.feature_dimension) {
            Ok(model) => Some(Box::new(model)),
            Err(e) => {
                tracing::warn!(error = %e, "embedding model unavailable; using classical descriptors");
                None
            }
        };

    let processor = FaceProcessor::new(config.recognition.clone(), Box::new(detector), embedder)?;
    tracing::info!(strategy = ?processor.strategy(), "face processor ready");
    Ok(processor)
}

/// Print the user-facing hint for a rejected image and turn it into an error.
fn report_rejection(err: ProcessError) -> anyhow::Error {
    if let ProcessError::QualityRejected { issue, metrics } = &err {
        println!(
            "{}",
            json!({ "accepted": false, "issue": issue, "hint": issue.hint(), "metrics": metrics })
        );
    }
    err.into()
}

fn enroll(config: &Config, input: &Input, id: String, name: String) -> Result<()> {
    let mut gallery = Gallery::load(&config.gallery_path)?;
    if gallery.contains(&id) {
        bail!("identity {id} is already enrolled");
    }

    let processor = build_processor(config)?;
    let enrollment = processor.enroll(input.payload()).map_err(report_rejection)?;
    let identity = persist_enrollment(config, &mut gallery, id, name, enrollment.descriptor, &enrollment.image)?;

    println!(
        "{}",
        json!({
            "id": identity.id,
            "name": identity.name,
            "kind": identity.descriptor.kind,
            "length": identity.descriptor.len(),
            "image_path": identity.image_path,
            "quality": enrollment.quality,
        })
    );
    Ok(())
}

/// Write the snapshot, then add the identity and save the gallery. On any
/// failure neither the snapshot nor the identity is left behind.
fn persist_enrollment(
    config: &Config,
    gallery: &mut Gallery,
    id: String,
    name: String,
    descriptor: Descriptor,
    image: &RgbImage,
) -> Result<Identity> {
    if gallery.contains(&id) {
        bail!("identity {id} is already enrolled");
    }

    let snapshot = clearsight_core::snapshot::save_face_image(&config.faces_dir, &id, image)?;
    let identity = Identity {
        id,
        name,
        descriptor,
        image_path: Some(snapshot.display().to_string()),
        enrolled_at: chrono::Local::now().to_rfc3339(),
    };

    if let Err(e) = gallery.add(identity.clone()) {
        discard_snapshot(&snapshot);
        return Err(e);
    }
    if let Err(e) = gallery.save(&config.gallery_path) {
        gallery.remove(&identity.id);
        discard_snapshot(&snapshot);
        return Err(e);
    }
    Ok(identity)
}

fn discard_snapshot(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "could not remove snapshot");
    }
}

fn recognize(config: &Config, input: &Input) -> Result<()> {
    let gallery = Gallery::load(&config.gallery_path)?;
    let processor = build_processor(config)?;

    let outcome = processor
        .recognize(input.payload(), gallery.identities())
        .map_err(report_rejection)?;

    let output = match outcome {
        Recognition::NoFace => json!({ "matched": false, "reason": "no_face" }),
        Recognition::NoMatch { best_similarity } => {
            json!({ "matched": false, "reason": "no_match", "best_similarity": best_similarity })
        }
        Recognition::Match { identity, similarity } => {
            let entry = RecognitionEntry::now(&identity.id, &identity.name, similarity);
            recognition_log::append(&config.log_path, &entry)?;
            json!({
                "matched": true,
                "id": identity.id,
                "name": identity.name,
                "similarity": similarity,
                "recognized_at": entry.recognized_at,
            })
        }
    };
    println!("{output}");
    Ok(())
}

/// Quality needs no models, only the thresholds.
fn quality(config: &Config, input: &Input) -> Result<()> {
    let image = match input.payload() {
        ImagePayload::Base64(s) => clearsight_core::decode::decode_base64(s)?,
        ImagePayload::Bytes(b) => clearsight_core::decode::decode_bytes(b)?,
    };
    let thresholds = clearsight_core::quality::QualityThresholds::from(&config.recognition);
    let report = clearsight_core::quality::assess(clearsight_core::quality::measure_rgb(&image), &thresholds);

    println!(
        "{}",
        json!({
            "accepted": report.accepted(),
            "issue": report.issue,
            "hint": report.issue.map(|i| i.hint()),
            "metrics": report.metrics,
        })
    );
    Ok(())
}

fn diagnose(config: &Config) -> Result<()> {
    let detector_path = config.detector_model_path();
    let embedding_path = config.embedding_model_path();
    println!("detector model:  {} ({})", detector_path.display(), presence(&detector_path));
    println!("embedding model: {} ({})", embedding_path.display(), presence(&embedding_path));
    println!("gallery:         {}", config.gallery_path.display());
    println!("snapshots:       {}", config.faces_dir.display());
    println!(
        "recognition log: {} ({} entries)",
        config.log_path.display(),
        recognition_log::load(&config.log_path)?.len()
    );
    println!("recognition:     {}", serde_json::to_string(&config.recognition)?);

    let gallery = Gallery::load(&config.gallery_path)?;
    let expected_kind = if embedding_path.exists() {
        clearsight_core::DescriptorKind::Embedding
    } else {
        clearsight_core::DescriptorKind::Classical
    };

    let mut mismatched = 0usize;
    for identity in gallery.identities() {
        let values = &identity.descriptor.values;
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let flag = if identity.descriptor.kind != expected_kind {
            mismatched += 1;
            "  <- not comparable with current strategy"
        } else {
            ""
        };
        println!(
            "  {} {} len={} min={min:.4} max={max:.4}{flag}",
            identity.id,
            identity.descriptor.kind,
            values.len()
        );
    }

    println!("{} identities, {mismatched} from another descriptor family", gallery.identities().len());

    println!();
    println!("RECOMMENDATIONS");
    for line in recommendations(&config.recognition, gallery.identities().len(), mismatched) {
        println!("  - {line}");
    }
    Ok(())
}

/// Classical scores for distinct faces already reach about 0.92.
const CLASSICAL_THRESHOLD_MIN: f32 = 0.90;
/// Re-captures of one face rarely score above this.
const CLASSICAL_THRESHOLD_MAX: f32 = 0.95;
const EMBEDDING_THRESHOLD_MAX: f32 = 0.50;
/// Ordinary webcam frames fall below this sharpness often.
const SHARPNESS_MAX: f32 = 75.0;

/// Advice for `diagnose`, derived from tunables and gallery state.
fn recommendations(config: &RecognitionConfig, identities: usize, mismatched: usize) -> Vec<String> {
    let defaults = RecognitionConfig::default();
    let mut advice = Vec::new();

    if config.similarity_threshold > CLASSICAL_THRESHOLD_MAX {
        advice.push(format!(
            "similarity_threshold {:.2} is high; repeat captures may not match. Try {:.2}",
            config.similarity_threshold, defaults.similarity_threshold
        ));
    } else if config.similarity_threshold < CLASSICAL_THRESHOLD_MIN {
        advice.push(format!(
            "similarity_threshold {:.2} is low; different people may match. Try {:.2}",
            config.similarity_threshold, defaults.similarity_threshold
        ));
    }
    if config.embedding_threshold > EMBEDDING_THRESHOLD_MAX {
        advice.push(format!(
            "embedding_threshold {:.2} is high; repeat captures may not match. Try {:.2}",
            config.embedding_threshold, defaults.embedding_threshold
        ));
    }
    if config.min_sharpness > SHARPNESS_MAX {
        advice.push(format!(
            "min_sharpness {:.0} rejects many webcam images. Try {:.0}",
            config.min_sharpness, defaults.min_sharpness
        ));
    }

    match identities {
        0 => advice.push("No identities enrolled; run `clearsight enroll` first".to_string()),
        1 => advice.push("One identity enrolled: good for testing".to_string()),
        _ => {}
    }
    if mismatched > 0 {
        advice.push(format!(
            "{mismatched} identities use another descriptor family and are never compared; re-enroll them"
        ));
    }

    if advice.is_empty() {
        advice.push("No issues found".to_string());
    }
    advice
}

fn presence(path: &Path) -> &'static str {
    if path.exists() { "present" } else { "missing" }
}
