//! Path refinement: single-shot mutation and the iterative refinement loop
//!
//! The loop is a small state machine:
//!
//! ```text
//! Start -> Evaluate -> Mutate -> { Evaluate | Stop }
//! ```
//!
//! It stops at the iteration limit, at a fixed point (mutation changed
//! nothing), on cancellation, or when a generation call fails. Failures never
//! escape the loop; the run reports them and keeps the last good path.

pub mod cache;

pub use cache::FeedbackCache;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::generation::{generate_with_timeout, GenerationRole, Prompt, TextGenerator};
use crate::path::scheduler::{assign_ids, enforce_coverage, level_order, parse_sessions, SESSIONS_FORMAT};
use crate::path::{LearningPath, LearningSession, SkillGap, FIRST_SESSION_NUMBER};
use crate::profile::{skill_key, CurrentLevel, LearnerProfile, ProficiencyLevel};
use crate::simulator::{FeedbackReport, FeedbackSimulator, GroundTruth};

const REFINER_SYSTEM_PROMPT: &str = r#"You revise learning paths based on learner feedback.
Apply each suggestion as a targeted change:
- progression: reorder, split or merge sessions to fix pacing
- engagement: adjust session density and add activities that keep the learner going
- personalization: reframe sessions to fit the learner's style
Keep every skill outcome the current path targets. Return only the sessions that are not yet learned."#;

/// Shareable flag that stops a run between iterations
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterations,
    Converged,
    SimulatorFailed,
    MutationFailed,
    Cancelled,
}

/// Non-fatal failure reported by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    pub iteration: usize,
    pub kind: String,
    pub message: String,
}

impl RunError {
    fn new(iteration: usize, error: &Error) -> Self {
        Self {
            iteration,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub path_snapshot: LearningPath,
    pub feedback: Option<FeedbackReport>,
    pub mutated_path: Option<LearningPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one refinement run; history is append-only and read-only once returned
#[derive(Debug, Clone, Serialize)]
pub struct RefinementRun {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    iterations: Vec<IterationRecord>,
    final_learning_path: LearningPath,
    stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RunError>,
}

impl RefinementRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    pub fn final_learning_path(&self) -> &LearningPath {
        &self.final_learning_path
    }

    pub fn into_final_learning_path(self) -> LearningPath {
        self.final_learning_path
    }

    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    pub fn error(&self) -> Option<&RunError> {
        self.error.as_ref()
    }

    /// True when the run stopped on a failure rather than finishing
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Applies feedback suggestions to a path
pub struct PathRefiner {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl PathRefiner {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Derive a new candidate path from `path` and the report's suggestions.
    ///
    /// With no non-empty suggestion the input comes back unchanged and the
    /// generator is not called. Learned sessions are kept verbatim and placed
    /// first; every skill the pending sessions targeted stays targeted at the
    /// same level or higher.
    pub async fn refine_path(&self, path: &LearningPath, report: &FeedbackReport) -> Result<LearningPath> {
        let suggestions = report.active_suggestions();
        let completed: Vec<LearningSession> = path.completed().cloned().collect();
        let pending: Vec<&LearningSession> = path.pending().collect();
        if suggestions.is_empty() || pending.is_empty() {
            debug!("Nothing to refine; path unchanged");
            return Ok(path.clone());
        }

        let suggestion_lines = suggestions
            .iter()
            .map(|(dim, text)| format!("- {}: {}", dim, text))
            .collect::<Vec<_>>()
            .join("\n");
        let task = format!(
            "Refine this learning path.\n\n- Current Learning Path: {}\n- Learned Sessions (keep as they are): {}\n\n\
             Suggestions to apply:\n{}",
            serde_json::to_string(path)?,
            serde_json::to_string(&completed)?,
            suggestion_lines
        );
        let prompt = Prompt::new(GenerationRole::Scheduler, REFINER_SYSTEM_PROMPT, task);
        let value = generate_with_timeout(self.generator.as_ref(), &prompt, SESSIONS_FORMAT, self.timeout).await?;

        let learned_titles: HashSet<String> = completed.iter().map(|s| skill_key(&s.title)).collect();
        let mut fresh: Vec<LearningSession> = parse_sessions(value)?
            .into_iter()
            .filter(|s| !learned_titles.contains(&skill_key(&s.title)))
            .collect();
        if fresh.is_empty() {
            return Err(Error::Schema("revision contains no pending sessions".to_string()));
        }

        let targets = pending_targets(&pending);
        let target_refs: Vec<&SkillGap> = targets.iter().collect();
        let limit = fresh.len().max(pending.len());
        enforce_coverage(&mut fresh, &target_refs, limit);
        level_order(&mut fresh);

        let taken: HashSet<String> = completed.iter().map(|s| s.id.clone()).collect();
        assign_ids(&mut fresh, completed.len() + FIRST_SESSION_NUMBER, &taken);

        let mut sessions = completed;
        sessions.extend(fresh);
        Ok(LearningPath::new(sessions))
    }
}

/// Highest level each pending session targets per skill, as coverage requirements
fn pending_targets(pending: &[&LearningSession]) -> Vec<SkillGap> {
    let mut targets: Vec<(String, String, ProficiencyLevel)> = Vec::new();
    for outcome in pending.iter().flat_map(|s| s.desired_outcome_when_completed.iter()) {
        let key = skill_key(&outcome.name);
        match targets.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.2 = entry.2.max(outcome.level),
            None => targets.push((key, outcome.name.clone(), outcome.level)),
        }
    }
    targets
        .into_iter()
        .map(|(_, name, level)| SkillGap::new(name, level, CurrentLevel::Unlearned))
        .collect()
}

/// Evaluate / mutate control loop
pub struct RefinementLoop {
    simulator: Arc<FeedbackSimulator>,
    refiner: Arc<PathRefiner>,
}

impl RefinementLoop {
    pub fn new(simulator: Arc<FeedbackSimulator>, refiner: Arc<PathRefiner>) -> Self {
        Self { simulator, refiner }
    }

    /// Run up to `max_iterations` evaluate/mutate rounds.
    ///
    /// `profile` is only read. Enrichment, when needed, happens once and the
    /// resulting ground truth is reused for every iteration.
    pub async fn run(
        &self,
        profile: &LearnerProfile,
        initial: &LearningPath,
        max_iterations: usize,
        ground_truth: Option<&GroundTruth>,
        cancel: &CancelFlag,
    ) -> RefinementRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let provided = ground_truth.is_some();
        let mut learner = ground_truth.cloned();
        let mut history: Vec<IterationRecord> = Vec::new();
        let mut current = initial.clone();

        info!("Refinement run {} started: up to {} iteration(s)", run_id, max_iterations);

        let conclude = |history: Vec<IterationRecord>, path: LearningPath, reason: StopReason, error: Option<RunError>| {
            info!(
                "Refinement run {} stopped after {} iteration(s): {:?}",
                run_id,
                history.len(),
                reason
            );
            RefinementRun {
                run_id,
                started_at,
                iterations: history,
                final_learning_path: path,
                stop_reason: reason,
                error,
            }
        };

        for iteration in 1..=max_iterations {
            if cancel.is_cancelled() {
                return conclude(history, current, StopReason::Cancelled, None);
            }
            debug!("Iteration {}/{}: evaluating {} session(s)", iteration, max_iterations, current.len());

            let feedback = match self.evaluate(profile, &current, &mut learner, provided).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("Iteration {}: simulation failed: {}", iteration, e);
                    let error = RunError::new(iteration, &e);
                    history.push(IterationRecord {
                        iteration,
                        path_snapshot: current.clone(),
                        feedback: None,
                        mutated_path: None,
                        error: Some(e.to_string()),
                    });
                    return conclude(history, current, StopReason::SimulatorFailed, Some(error));
                }
            };

            let mutated = match self.refiner.refine_path(&current, &feedback).await {
                Ok(path) => path,
                Err(e) => {
                    warn!("Iteration {}: mutation failed: {}", iteration, e);
                    let error = RunError::new(iteration, &e);
                    history.push(IterationRecord {
                        iteration,
                        path_snapshot: current.clone(),
                        feedback: Some(feedback),
                        mutated_path: None,
                        error: Some(e.to_string()),
                    });
                    return conclude(history, current, StopReason::MutationFailed, Some(error));
                }
            };

            let converged = mutated == current;
            history.push(IterationRecord {
                iteration,
                path_snapshot: current.clone(),
                feedback: Some(feedback),
                mutated_path: Some(mutated.clone()),
                error: None,
            });
            if converged {
                return conclude(history, current, StopReason::Converged, None);
            }
            current = mutated;
        }

        conclude(history, current, StopReason::MaxIterations, None)
    }

    async fn evaluate(
        &self,
        profile: &LearnerProfile,
        path: &LearningPath,
        learner: &mut Option<GroundTruth>,
        provided: bool,
    ) -> Result<FeedbackReport> {
        if learner.is_none() && self.simulator.uses_ground_truth() {
            *learner = Some(self.simulator.enrich(profile).await?);
        }
        self.simulator.evaluate_as(profile, path, learner.as_ref(), provided).await
    }
}
