//! Generation agents and the item validator.

pub mod coerce;
pub mod error;
pub mod profile;
pub mod retry;
pub mod subject;
pub mod validator;

pub use coerce::{apply_job_settings, coerce_items, MAX_IMAGE_DESCRIPTION_CHARS};
pub use error::{AgentError, AgentResult};
pub use profile::SubjectProfile;
pub use retry::{RetryOutcome, RetryPolicy, SamplingStep, DEFAULT_BACKOFF_BASE};
pub use subject::{AgentConfig, Generation, SubjectAgent, DEFAULT_ITEMS_PER_RUN};
pub use validator::{structural_check, Validator, ValidatorConfig, IMAGE_KEYWORDS};
