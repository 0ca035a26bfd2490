use thiserror::Error;

#[derive(Debug, Error)]
pub enum TourError {
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("invalid annotation {id}: {reason}")]
    InvalidAnnotation { id: String, reason: String },

    #[error("failed to package archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TourError>;
