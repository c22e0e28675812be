//! Iterative refinement: termination, fixed points, degradation and cancellation

mod common;

use adaptive_learner::generation::{GenerationRole, Prompt, TextGenerator};
use adaptive_learner::simulator::GroundTruth;
use adaptive_learner::{CancelFlag, Config, Error, FeedbackReport, LearningService, Result, StopReason};
use async_trait::async_trait;
use common::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Every revision differs from the last, so the loop can only stop on its limit
#[derive(Default)]
struct EverChanging {
    revisions: AtomicUsize,
    cancel_after_first_feedback: Option<CancelFlag>,
}

#[async_trait]
impl TextGenerator for EverChanging {
    async fn generate(&self, prompt: &Prompt, _schema: &str) -> Result<Value> {
        match prompt.role {
            GenerationRole::Simulator => {
                if let Some(flag) = &self.cancel_after_first_feedback {
                    flag.cancel();
                }
                Ok(feedback_answer("Reorder the sessions"))
            }
            _ => {
                let n = self.revisions.fetch_add(1, Ordering::SeqCst);
                Ok(path_answer(&format!("Rev {}", n)))
            }
        }
    }
}

#[tokio::test]
async fn test_run_stops_at_fixed_point() {
    let generator = Arc::new(ScriptedGenerator::new());
    for _ in 0..3 {
        generator.push(GenerationRole::Simulator, Ok(feedback_answer("Put statistics first")));
    }
    generator.push(GenerationRole::Scheduler, Ok(path_answer("Applied")));
    generator.push(GenerationRole::Scheduler, Ok(path_answer("Applied")));

    let svc = service(generator.clone());
    let run = svc
        .iterative_refine(&analyst_profile(), &initial_path(), Some(5), None)
        .await;

    assert_eq!(run.stop_reason(), StopReason::Converged);
    assert_eq!(run.iterations().len(), 2);
    assert_eq!(run.iterations()[0].mutated_path.as_ref(), Some(run.final_learning_path()));
    assert_eq!(run.final_learning_path().sessions[0].title, "Applied Statistics");
    assert_eq!(generator.calls_for(GenerationRole::Simulator), 2);
    assert!(run.error().is_none());
}

#[tokio::test]
async fn test_schema_error_on_third_iteration_keeps_second_candidate() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator
        .push(GenerationRole::Simulator, Ok(feedback_answer("Put statistics first")))
        .push(GenerationRole::Simulator, Ok(feedback_answer("Split the joins session")))
        .push(GenerationRole::Simulator, Ok(json!({"feedback": {"progression": "fine"}})));
    generator
        .push(GenerationRole::Scheduler, Ok(path_answer("First")))
        .push(GenerationRole::Scheduler, Ok(path_answer("Second")));

    let svc = service(generator);
    let run = svc
        .iterative_refine(&analyst_profile(), &initial_path(), Some(5), None)
        .await;

    assert_eq!(run.iterations().len(), 3);
    assert_eq!(run.stop_reason(), StopReason::SimulatorFailed);
    let second = run.iterations()[1].mutated_path.clone().unwrap();
    assert_eq!(run.final_learning_path(), &second);
    assert_eq!(run.final_learning_path().sessions[0].title, "Second Statistics");

    let failed = &run.iterations()[2];
    assert_eq!(failed.iteration, 3);
    assert_eq!(failed.path_snapshot, second);
    assert!(failed.feedback.is_none());
    assert!(failed.mutated_path.is_none());

    let error = run.error().unwrap();
    assert_eq!(error.iteration, 3);
    assert_eq!(error.kind, "schema");
    assert!(run.is_degraded());
}

#[tokio::test]
async fn test_iteration_count_never_exceeds_limit() {
    for limit in [0usize, 1, 3, 5] {
        let svc = service_over(Arc::new(EverChanging::default()));
        let run = svc
            .iterative_refine(&analyst_profile(), &initial_path(), Some(limit), None)
            .await;
        assert_eq!(run.iterations().len(), limit);
        assert_eq!(run.stop_reason(), StopReason::MaxIterations);
        let numbers: Vec<usize> = run.iterations().iter().map(|r| r.iteration).collect();
        assert_eq!(numbers, (1..=limit).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_requested_iterations_clamped_to_config() {
    let mut config = Config::default();
    config.refinement.use_ground_truth = false;
    config.refinement.max_iterations = 2;
    let svc = LearningService::new(Arc::new(EverChanging::default()), config);
    let run = svc
        .iterative_refine(&analyst_profile(), &initial_path(), Some(50), None)
        .await;
    assert_eq!(run.iterations().len(), 2);
}

#[tokio::test]
async fn test_cancel_between_iterations() {
    let cancel = CancelFlag::new();
    let generator = EverChanging {
        cancel_after_first_feedback: Some(cancel.clone()),
        ..Default::default()
    };
    let svc = service_over(Arc::new(generator));
    let run = svc
        .iterative_refine_with_cancel(&analyst_profile(), &initial_path(), Some(5), None, &cancel)
        .await;

    // The iteration in flight finishes; the next one never starts
    assert_eq!(run.stop_reason(), StopReason::Cancelled);
    assert_eq!(run.iterations().len(), 1);
    assert_eq!(run.iterations()[0].mutated_path.as_ref(), Some(run.final_learning_path()));
    assert!(run.error().is_none());
}

#[tokio::test]
async fn test_profile_is_not_touched_by_a_run() {
    let profile = analyst_profile();
    let snapshot = profile.clone();
    let svc = service_over(Arc::new(EverChanging::default()));
    let _ = svc.iterative_refine(&profile, &initial_path(), Some(3), None).await;
    assert_eq!(profile, snapshot);
}

#[tokio::test]
async fn test_independent_runs_proceed_concurrently() {
    let svc = service_over(Arc::new(EverChanging::default()));
    let other = svc.clone();
    let profile = analyst_profile();
    let path = initial_path();
    let (a, b) = tokio::join!(
        svc.iterative_refine(&profile, &path, Some(2), None),
        other.iterative_refine(&profile, &path, Some(3), None),
    );
    assert_eq!(a.iterations().len(), 2);
    assert_eq!(b.iterations().len(), 3);
    assert_ne!(a.run_id(), b.run_id());
}

#[tokio::test]
async fn test_empty_suggestions_refine_to_same_path() {
    let generator = Arc::new(ScriptedGenerator::new());
    let svc = service(generator.clone());
    let report: FeedbackReport = serde_json::from_value(json!({
        "feedback": {"progression": "good", "engagement": "good", "personalization": "good"},
        "suggestions": {"progression": "", "engagement": "   "}
    }))
    .unwrap();

    let path = initial_path();
    let refined = svc.refine_path(&path, &report, None).await.unwrap();
    assert_eq!(refined, path);
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn test_supplied_ground_truth_skips_enrichment_for_every_iteration() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator
        .push(GenerationRole::Simulator, Ok(feedback_answer("Put statistics first")))
        .push(GenerationRole::Simulator, Ok(feedback_answer("")));
    generator.push(GenerationRole::Scheduler, Ok(path_answer("GT")));

    let mut config = Config::default();
    config.refinement.use_ground_truth = true;
    let svc = LearningService::new(generator.clone(), config);
    let ground_truth: GroundTruth =
        serde_json::from_value(json!({"ground_truth_profile": {"patience_level": "low"}})).unwrap();

    let run = svc
        .iterative_refine(&analyst_profile(), &initial_path(), Some(4), Some(&ground_truth))
        .await;

    // second feedback has no suggestions: fixed point at iteration 2
    assert_eq!(run.stop_reason(), StopReason::Converged);
    assert_eq!(run.iterations().len(), 2);
    assert_eq!(generator.calls_for(GenerationRole::Simulator), 2);
    assert!(generator
        .calls()
        .iter()
        .filter(|p| p.role == GenerationRole::Simulator)
        .all(|p| p.task.contains("patience_level")));
}

#[tokio::test]
async fn test_enrichment_happens_once_per_run() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator
        .push(GenerationRole::Simulator, Ok(json!({"ground_truth_profile": {"patience_level": "high"}})))
        .push(GenerationRole::Simulator, Ok(feedback_answer("Put statistics first")))
        .push(GenerationRole::Simulator, Ok(feedback_answer("Put statistics first")));
    generator
        .push(GenerationRole::Scheduler, Ok(path_answer("E")))
        .push(GenerationRole::Scheduler, Ok(path_answer("E")));

    let svc = LearningService::new(generator.clone(), Config::default());
    let run = svc
        .iterative_refine(&analyst_profile(), &initial_path(), Some(3), None)
        .await;
    assert_eq!(run.stop_reason(), StopReason::Converged);
    assert_eq!(generator.calls_for(GenerationRole::Simulator), 3);
    let meta = run.iterations()[0]
        .feedback
        .as_ref()
        .and_then(|f| f.simulation_metadata.clone())
        .unwrap();
    assert!(meta.used_ground_truth);
    assert!(!meta.ground_truth_provided);
}

#[tokio::test]
async fn test_generation_outage_degrades_instead_of_failing() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push(GenerationRole::Simulator, Err(Error::Generation("connection refused".into())));
    let svc = service(generator);
    let run = svc
        .iterative_refine(&analyst_profile(), &initial_path(), Some(3), None)
        .await;
    assert_eq!(run.iterations().len(), 1);
    assert_eq!(run.final_learning_path(), &initial_path());
    assert_eq!(run.error().map(|e| e.kind.as_str()), Some("generation"));
}

fn service_over(generator: Arc<dyn TextGenerator>) -> LearningService {
    let mut config = Config::default();
    config.refinement.use_ground_truth = false;
    config.refinement.max_iterations = 10;
    LearningService::new(generator, config)
}
