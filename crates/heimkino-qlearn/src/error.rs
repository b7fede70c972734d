use heimkino_core::Action;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QLearnError {
    #[error("non-finite value {value} for {action} in state {state}")]
    NonFiniteValue {
        state: String,
        action: Action,
        value: f64,
    },
    #[error("duplicate entry for {action} in state {state}")]
    DuplicateEntry { state: String, action: Action },
    #[error("experience timestamps go backwards at index {0}")]
    NonMonotonicTimestamps(usize),
    #[error("non-finite reward in experience at index {0}")]
    NonFiniteReward(usize),
    #[error("recorded total {total} is smaller than the {kept} kept experiences")]
    InconsistentTotal { total: u64, kept: usize },
    #[error("invalid epsilon schedule: {0}")]
    InvalidSchedule(String),
}

pub type Result<T> = std::result::Result<T, QLearnError>;
