//! Adaptive Learner - learner modeling and learning path refinement
//!
//! - Learner profiles with validated cognitive status and FSLSM preferences
//! - Incremental profile updates from interaction evidence
//! - Path scheduling over skill gaps, with prerequisite ordering
//! - Simulated learner feedback and an iterative refinement loop
//!
//! Natural-language generation is an injected [`generation::TextGenerator`];
//! `generation::llm::LlmGenerator` talks to any OpenAI-compatible endpoint.
//!
//! # Example
//!
//! ```ignore
//! use adaptive_learner::{Config, LearningService};
//! use adaptive_learner::generation::llm::LlmGenerator;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let service = LearningService::new(Arc::new(LlmGenerator::from_config(&config)?), config);
//!     let profile = service.create_profile("Become an HR Manager", "MBA graduate", &gaps, None).await?;
//!     let path = service.schedule_path(&profile, &gaps, Some(6)).await?;
//!     let run = service.iterative_refine(&profile, &path, Some(3), None).await;
//!     println!("{}", serde_json::to_string_pretty(&run)?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;
pub mod security;
pub mod generation;
pub mod profile;
pub mod path;
pub mod simulator;
pub mod refine;
pub mod service;
pub mod cli;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{Error, Result};
pub use generation::{Prompt, TextGenerator};
pub use path::{LearningPath, LearningSession, SkillGap, SkillOutcome};
pub use profile::{InteractionEvidence, LearnerProfile, SessionCompletion};
pub use refine::{CancelFlag, IterationRecord, RefinementRun, StopReason};
pub use service::LearningService;
pub use simulator::{FeedbackDimension, FeedbackReport, GroundTruth};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
