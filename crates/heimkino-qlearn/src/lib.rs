#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Tabular Q-learning over discretized viewing states.
//!
//! [`QValueTable`] learns which recommendation strategy pays off in which
//! [`State`](heimkino_core::State) and picks strategies ε-greedily.
//! [`ExperienceStore`] keeps the recorded sessions for batch replay, and
//! [`EpsilonSchedule`] turns the number of recorded sessions into the current
//! exploration rate. Nothing in this crate performs I/O.

pub mod epsilon;
pub mod error;
pub mod replay;
pub mod store;
pub mod table;

pub use epsilon::EpsilonSchedule;
pub use error::{QLearnError, Result};
pub use replay::{replay_batch, ReplayReport};
pub use store::ExperienceStore;
pub use table::QValueTable;
