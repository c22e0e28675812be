//! Caller-facing operations
//!
//! `LearningService` wires the components to one text generator and one
//! configuration. Clones share the generator and the feedback cache, so
//! independent runs can proceed concurrently on clones.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::generation::TextGenerator;
use crate::path::{LearningPath, PathScheduler, SkillGap};
use crate::profile::{InteractionEvidence, LearnerProfile, Persona, ProfileUpdater, SessionCompletion};
use crate::refine::{CancelFlag, FeedbackCache, PathRefiner, RefinementLoop, RefinementRun};
use crate::simulator::{FeedbackReport, FeedbackSimulator, GroundTruth};

#[derive(Clone)]
pub struct LearningService {
    config: Arc<Config>,
    updater: Arc<ProfileUpdater>,
    scheduler: Arc<PathScheduler>,
    simulator: Arc<FeedbackSimulator>,
    refiner: Arc<PathRefiner>,
    cache: Arc<Mutex<FeedbackCache>>,
}

impl LearningService {
    pub fn new(generator: Arc<dyn TextGenerator>, config: Config) -> Self {
        let timeout = config.generation.timeout();
        let updater = ProfileUpdater::new(generator.clone(), &config.profile, timeout);
        let scheduler = PathScheduler::new(generator.clone(), timeout);
        let simulator = FeedbackSimulator::new(
            generator.clone(),
            timeout,
            config.refinement.use_ground_truth,
            config.models.simulator.clone(),
        );
        let refiner = PathRefiner::new(generator, timeout);
        let cache = FeedbackCache::new(config.cache.capacity);

        Self {
            config: Arc::new(config),
            updater: Arc::new(updater),
            scheduler: Arc::new(scheduler),
            simulator: Arc::new(simulator),
            refiner: Arc::new(refiner),
            cache: Arc::new(Mutex::new(cache)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the first profile for a goal from background and skill gaps
    pub async fn create_profile(
        &self,
        learning_goal: &str,
        background: &str,
        skill_gaps: &[SkillGap],
        persona: Option<&Persona>,
    ) -> Result<LearnerProfile> {
        self.updater.initialize(learning_goal, background, skill_gaps, persona).await
    }

    /// Merge new evidence; on failure `profile` is still the current state
    pub async fn update_profile(
        &self,
        profile: &LearnerProfile,
        evidence: &InteractionEvidence,
        completion: Option<&SessionCompletion>,
    ) -> Result<LearnerProfile> {
        self.updater.update(profile, evidence, completion).await
    }

    /// `session_count` is bounded by the configured maximum
    pub async fn schedule_path(
        &self,
        profile: &LearnerProfile,
        skill_gaps: &[SkillGap],
        session_count: Option<usize>,
    ) -> Result<LearningPath> {
        let count = self.config.clamp_sessions(session_count);
        self.scheduler.schedule(profile, skill_gaps, count).await
    }

    pub async fn reschedule_path(
        &self,
        path: &LearningPath,
        profile: &LearnerProfile,
        new_count: Option<usize>,
    ) -> Result<LearningPath> {
        let count = self.config.clamp_sessions(new_count);
        let rescheduled = self.scheduler.reschedule(path, profile, count).await?;
        if rescheduled != *path {
            self.cache.lock().await.invalidate(profile, path);
        }
        Ok(rescheduled)
    }

    /// Simulated feedback for (profile, path, ground truth), served from cache when fresh
    pub async fn simulate_feedback(
        &self,
        profile: &LearnerProfile,
        path: &LearningPath,
        ground_truth: Option<&GroundTruth>,
    ) -> Result<FeedbackReport> {
        if let Some(hit) = self.cache.lock().await.get(profile, path, ground_truth) {
            return Ok(hit);
        }
        let report = self.simulator.evaluate(profile, path, ground_truth).await?;
        self.cache.lock().await.put(profile, path, ground_truth, report.clone());
        Ok(report)
    }

    /// Cached feedback for (profile, path, ground truth), if any
    pub async fn cached_feedback(
        &self,
        profile: &LearnerProfile,
        path: &LearningPath,
        ground_truth: Option<&GroundTruth>,
    ) -> Option<FeedbackReport> {
        self.cache.lock().await.get(profile, path, ground_truth)
    }

    /// Single-shot mutation of `path` by `feedback`.
    ///
    /// `profile` identifies the cache entry to drop when the path changes.
    pub async fn refine_path(
        &self,
        path: &LearningPath,
        feedback: &FeedbackReport,
        profile: Option<&LearnerProfile>,
    ) -> Result<LearningPath> {
        let refined = self.refiner.refine_path(path, feedback).await?;
        if refined != *path {
            if let Some(profile) = profile {
                self.cache.lock().await.invalidate(profile, path);
            }
        }
        Ok(refined)
    }

    /// Run the refinement loop; `max_iterations` is bounded by the configured maximum
    pub async fn iterative_refine(
        &self,
        profile: &LearnerProfile,
        path: &LearningPath,
        max_iterations: Option<usize>,
        ground_truth: Option<&GroundTruth>,
    ) -> RefinementRun {
        self.iterative_refine_with_cancel(profile, path, max_iterations, ground_truth, &CancelFlag::new())
            .await
    }

    pub async fn iterative_refine_with_cancel(
        &self,
        profile: &LearnerProfile,
        path: &LearningPath,
        max_iterations: Option<usize>,
        ground_truth: Option<&GroundTruth>,
        cancel: &CancelFlag,
    ) -> RefinementRun {
        let iterations = self.config.clamp_iterations(max_iterations);
        let refinement = RefinementLoop::new(self.simulator.clone(), self.refiner.clone());
        let run = refinement.run(profile, path, iterations, ground_truth, cancel).await;

        // Every path that was mutated away from no longer has valid feedback
        let mut cache = self.cache.lock().await;
        for record in run.iterations() {
            if let Some(report) = &record.feedback {
                if record.mutated_path.as_ref() != Some(&record.path_snapshot) {
                    cache.invalidate(profile, &record.path_snapshot);
                } else {
                    cache.put(profile, &record.path_snapshot, ground_truth, report.clone());
                }
            }
        }
        debug!("{} feedback report(s) cached after run", cache.len());

        info!(
            "Refinement finished: {} iteration(s), {:?}, {} session(s)",
            run.iterations().len(),
            run.stop_reason(),
            run.final_learning_path().len()
        );
        run
    }
}

/// Reject a generation-free request early when nothing could be scheduled
pub fn ensure_schedulable(skill_gaps: &[SkillGap]) -> Result<()> {
    if skill_gaps.iter().any(|g| g.is_open()) {
        Ok(())
    } else {
        Err(Error::EmptyGap)
    }
}
