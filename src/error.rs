use thiserror::Error;

/// Everything that can go wrong while turning a video into emotion overlays.
///
/// Only [`Error::SourceOpen`], [`Error::ModelLoad`] and [`Error::Config`] stop a
/// run. The per-frame variants are logged and skipped by the loop.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to open video source: {0}")]
    SourceOpen(String),

    #[error("Failed to decode frame: {0}")]
    FrameDecode(String),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Emotion classification failed: {0}")]
    Classification(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("OpenCV error {0:?}")]
    OpenCv(#[from] opencv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the loop may carry on after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::FrameDecode(_)
                | Error::Detection(_)
                | Error::Classification(_)
                | Error::InvalidImage(_)
                | Error::OpenCv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
