use thiserror::Error;

/// Errors raised while building the engine. Nothing in the per-tick path
/// returns these; bad samples during training are skipped instead.
#[derive(Debug, Error)]
pub enum DrlError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{what} has length {actual}, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("could not read config file: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DrlError>;
