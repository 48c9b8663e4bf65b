use thiserror::Error;

use crate::frame::Fiber;

#[derive(Error, Debug)]
pub enum EchelleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not enough background nodes: found {found}, need {required}")]
    InsufficientNodes { found: usize, required: usize },

    #[error("Singular system while fitting background surface")]
    SingularSystem,

    #[error("Invalid background file: {0}")]
    InvalidBackgroundFile(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("No background found for {file_id} fiber {fiber}")]
    NoBackgroundFound { file_id: String, fiber: Fiber },

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, EchelleError>;
