use thiserror::Error;

#[derive(Debug, Error)]
pub enum H2SimError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("degenerate sample: {0}")]
    DegenerateSample(String),
}

pub type Result<T> = std::result::Result<T, H2SimError>;
