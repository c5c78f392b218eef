//! Error types for Fanpost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FanpostError>;

#[derive(Error, Debug)]
pub enum FanpostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl FanpostError {
    /// Exit code for a run that failed before any post was attempted
    ///
    /// Codes 0 and 2 belong to publish outcomes, so setup errors only use 1 and 3.
    pub fn exit_code(&self) -> i32 {
        match self {
            FanpostError::InvalidInput(_) => 3,
            FanpostError::Config(_) | FanpostError::History(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures raised by the image compressor.
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Invalid compression budget: {0}")]
    InvalidBudget(String),

    #[error("Compression task aborted: {0}")]
    Aborted(String),
}

/// Failures raised while serving one account on one platform.
///
/// Adapters convert every one of these into an error
/// [`PlatformPostResult`](crate::types::PlatformPostResult) before returning.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Failed to initialize client: {0}")]
    ClientInit(String),

    #[error("Upload failed for {image} on {platform} after {attempts} attempt(s): {reason}")]
    Upload {
        platform: String,
        image: String,
        attempts: u32,
        reason: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("HTTP {status}: {body}")]
    RemoteApi { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Image compression failed: {0}")]
    Compression(#[from] CompressionError),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Adapter for {0} aborted unexpectedly")]
    AdapterPanic(String),
}

impl PlatformError {
    /// Remote HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::RemoteApi { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => PlatformError::RemoteApi {
                status: status.as_u16(),
                body: error.to_string(),
            },
            None => PlatformError::Network(error.to_string()),
        }
    }
}
