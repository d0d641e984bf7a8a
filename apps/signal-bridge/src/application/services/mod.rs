//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SignalPipeline`: executes trade signals and produces their results

mod pipeline;

pub use pipeline::{SignalPipeline, execute_signal};
