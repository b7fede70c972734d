use thiserror::Error;

/// Rejected caller input. Raised synchronously at the boundary, never
/// silently repaired (clamping policies report through their own flags).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("at most {max} distinct recent genres allowed, got {count}")]
    TooManyRecentGenres { count: usize, max: usize },
    #[error("content id must not be empty")]
    EmptyContentId,
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("user rating must be within 1..=5, got {0}")]
    RatingOutOfRange(u8),
    #[error("watch duration must be a finite, non-negative number of seconds, got {0}")]
    InvalidWatchDuration(f64),
    #[error("completion rate must be finite")]
    NonFiniteCompletion,
    #[error("engagement must be within 0.0..=1.0, got {0}")]
    EngagementOutOfRange(f64),
}

impl ValidationError {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;
