//! Host sample data structures and acquisition.
//!
//! Collectors turn raw host readings into immutable [`Sample`] values; the
//! analysis engine never touches the OS directly.

pub mod collector;
pub mod data;
pub mod traits;

// Re-export commonly used items
pub use collector::{AcquisitionConfig, SystemCollector};
pub use data::Sample;
pub use traits::MetricsProvider;
