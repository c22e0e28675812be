//! Error taxonomy shared by every caller-facing operation
//!
//! Each operation either returns a fully valid result or fails with exactly
//! one of these variants.

use thiserror::Error;

/// Core learner-modeling errors
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range input to profile construction
    #[error("validation error: {0}")]
    Validation(String),

    /// An update would break a profile invariant; the previous profile stands
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Scheduling requested with no skill gaps to cover
    #[error("no skill gaps to schedule")]
    EmptyGap,

    /// The generation backend answered with something that does not fit the schema
    #[error("schema error: {0}")]
    Schema(String),

    /// The generation backend did not answer within the caller's budget
    #[error("generation timed out after {0}s")]
    Timeout(u64),

    /// The generation backend itself failed (network, auth, provider down)
    #[error("generation error: {0}")]
    Generation(String),
}

impl Error {
    /// Failures of the external generation capability.
    ///
    /// A refinement run degrades gracefully on these instead of propagating them.
    pub fn is_generation_failure(&self) -> bool {
        matches!(self, Error::Schema(_) | Error::Timeout(_) | Error::Generation(_))
    }

    /// Short machine-readable tag, used in run reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Consistency(_) => "consistency",
            Error::EmptyGap => "empty_gap",
            Error::Schema(_) => "schema",
            Error::Timeout(_) => "timeout",
            Error::Generation(_) => "generation",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Schema(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
