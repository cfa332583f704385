//! Plain data shared by the Stampede engine and its scenarios: load profiles, thresholds, sample
//! sets and run summaries.
mod config;
mod constants;
mod data;
mod duration;
mod error;
mod stats;
mod threshold;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use duration::*;
pub use error::*;
pub use stats::*;
pub use threshold::*;
