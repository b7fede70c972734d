use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FeedbackError {
    #[error("reward weight {name} must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("reward weights must not all be zero")]
    ZeroWeights,
}

pub type Result<T> = std::result::Result<T, FeedbackError>;
