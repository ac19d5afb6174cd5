use pcal_core::DistortionError;
use thiserror::Error;

/// Errors loading or storing a persisted camera
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unsupported camera record version {found} (newest supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Missing camera parameter: {0}")]
    MissingKey(String),

    #[error("Failed to parse camera parameter {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Distortion error: {0}")]
    Distortion(#[from] DistortionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
