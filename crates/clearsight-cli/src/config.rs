use anyhow::{Context, Result};
use clearsight_core::RecognitionConfig;
use std::path::{Path, PathBuf};

/// CLI configuration: filesystem layout plus the recognition tunables.
///
/// Resolution order: built-in defaults, then the TOML file (if any), then
/// `CLEARSIGHT_*` environment variables.
#[derive(Debug)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// JSON file holding enrolled identities.
    pub gallery_path: PathBuf,
    /// Directory enrollment snapshots are written to.
    pub faces_dir: PathBuf,
    /// Append-only JSON Lines file of successful recognitions.
    pub log_path: PathBuf,
    /// Minimum SCRFD detection score.
    pub detector_confidence: f32,
    pub recognition: RecognitionConfig,
}

impl Config {
    /// Load configuration, reading `config_file` (or `CLEARSIGHT_CONFIG`) when given.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let data_dir = std::env::var("CLEARSIGHT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("clearsight")
            });

        let config_file = config_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("CLEARSIGHT_CONFIG").ok().map(PathBuf::from));

        let mut recognition = match &config_file {
            Some(path) => read_recognition_toml(path)?,
            None => RecognitionConfig::default(),
        };
        apply_env_overrides(&mut recognition, |key| std::env::var(key).ok());

        Ok(Self {
            model_dir: env_path("CLEARSIGHT_MODEL_DIR").unwrap_or_else(|| data_dir.join("models")),
            gallery_path: env_path("CLEARSIGHT_GALLERY_PATH").unwrap_or_else(|| data_dir.join("gallery.json")),
            faces_dir: env_path("CLEARSIGHT_UPLOAD_PATH").unwrap_or_else(|| data_dir.join("faces")),
            log_path: env_path("CLEARSIGHT_LOG_PATH").unwrap_or_else(|| data_dir.join("recognitions.jsonl")),
            detector_confidence: env_parse(|k| std::env::var(k).ok(), "CLEARSIGHT_DETECTOR_CONFIDENCE")
                .unwrap_or(0.5),
            recognition,
        })
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the face-embedding model.
    pub fn embedding_model_path(&self) -> PathBuf {
        env_path("CLEARSIGHT_EMBEDDING_MODEL").unwrap_or_else(|| self.model_dir.join("face_embedding.onnx"))
    }
}

fn read_recognition_toml(path: &Path) -> Result<RecognitionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

/// Override recognition tunables from `CLEARSIGHT_*` variables.
/// Unparseable values are ignored with a warning.
fn apply_env_overrides(config: &mut RecognitionConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env_parse(&lookup, "CLEARSIGHT_SIMILARITY_THRESHOLD") {
        config.similarity_threshold = v;
    }
    if let Some(v) = env_parse(&lookup, "CLEARSIGHT_EMBEDDING_THRESHOLD") {
        config.embedding_threshold = v;
    }
    if let Some(v) = env_parse(&lookup, "CLEARSIGHT_MIN_FACE_SIZE") {
        config.min_face_size = v;
    }
    if let Some(v) = env_parse(&lookup, "CLEARSIGHT_MAX_FACE_SIZE") {
        config.max_face_size = Some(v);
    }
    if let Some(v) = env_parse(&lookup, "CLEARSIGHT_MIN_SHARPNESS") {
        config.min_sharpness = v;
    }
    if let Some(v) = env_parse(&lookup, "CLEARSIGHT_MIN_BRIGHTNESS") {
        config.min_brightness = v;
    }
    if let Some(v) = env_parse(&lookup, "CLEARSIGHT_MAX_BRIGHTNESS") {
        config.max_brightness = v;
    }
    if let Some(v) = lookup("CLEARSIGHT_USE_PREPROCESSING") {
        config.use_preprocessing = !matches!(v.trim(), "0" | "false" | "no");
    }
    if let Some(v) = env_parse(&lookup, "CLEARSIGHT_FEATURE_DIMENSION") {
        config.feature_dimension = v;
    }
}

fn env_parse<T: std::str::FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}
