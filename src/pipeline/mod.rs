//! Pipeline orchestration for exam item generation.
//!
//! # Architecture
//!
//! The pipeline consists of two components:
//!
//! - **Driver**: builds a per-run event bus, wires agents and the validator
//!   onto it, starts the run and applies the stop policy
//! - **Config**: configuration for the oracle, the agents and the run
//!
//! # Pipeline Flow
//!
//! 1. **Topic**: the driver publishes `topic.received` with a fresh job context
//! 2. **Planning**: each subject agent publishes `skill.plan.<subject>`
//! 3. **Generation**: each subject agent publishes `items.<subject>`
//! 4. **Validation**: the validator publishes `items.validated`
//! 5. **Collection**: the driver gathers this job's validated batches until
//!    the stop policy fires, then stops the bus
//!
//! # Example
//!
//! ```rust,ignore
//! use examforge::exam::Subject;
//! use examforge::pipeline::{PipelineConfig, PipelineDriver, RunRequest};
//!
//! let driver = PipelineDriver::from_config(PipelineConfig::from_env()?)?;
//! let outcome = driver.run(RunRequest::single(Subject::Math)).await?;
//!
//! println!("{} items, {} failures", outcome.items.len(), outcome.failed.len());
//! ```

pub mod config;
pub mod driver;

// Re-export main types for convenience
pub use config::{ConfigError, PipelineConfig};
pub use driver::{
    PipelineDriver, PipelineError, RunOutcome, RunRequest, StopPolicy, MIXED_SEED_TOPIC,
};
