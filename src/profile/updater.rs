//! Profile Updater - initial profiling and incremental profile revision
//!
//! Skill bookkeeping (mastery promotion) and FSLSM movement are computed
//! here; the generation backend is only asked for the free-text parts
//! (learner summary, behavioral patterns, notes) and an optional preference
//! reading that is combined with locally detected cues.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::fslsm::{Dimension, FslsmDimensions, Persona};
use super::signals::{self, PreferenceSignals};
use super::{
    BehavioralPatterns, CognitiveStatus, InProgressSkill, LearnerProfile, LearningPreferences,
    MasteredSkill,
};
use crate::config::ProfileConfig;
use crate::error::{Error, Result};
use crate::generation::{generate_with_timeout, GenerationRole, Prompt, TextGenerator};
use crate::path::{LearningSession, SkillGap, SkillOutcome};

const PROFILER_SYSTEM_PROMPT: &str = r#"You are the Adaptive Learner Profiler in an Intelligent Tutoring System designed for goal-oriented learning.
You maintain a learner profile that personalizes the learning experience: what the learner knows, how they prefer to learn, and how they engage.
Learning preferences follow the Felder-Silverman model with four dimensions between -1 and 1:
- processing: -1 active/hands-on to 1 reflective/observation
- perception: -1 sensing/concrete to 1 intuitive/abstract
- input: -1 visual to 1 verbal
- understanding: -1 sequential to 1 global
Be concise and factual. Never invent achievements the evidence does not support."#;

const INITIAL_PROFILE_FORMAT: &str = r#"{
    "learner_information": "Summary of the learner's background relevant to the goal",
    "fslsm_dimensions": {
        "fslsm_processing": 0.0,
        "fslsm_perception": 0.0,
        "fslsm_input": 0.0,
        "fslsm_understanding": 0.0
    },
    "preference_notes": "Other preference notes or null",
    "behavioral_patterns": {
        "system_usage_frequency": "Average of 3 logins per week",
        "session_duration_engagement": "Sessions average 30 minutes; high engagement in interactive tasks",
        "motivational_triggers": "What keeps this learner going, or null",
        "additional_notes": "Other behavioral notes or null"
    }
}"#;

const PROFILE_REFRESH_FORMAT: &str = r#"{
    "learner_information": "Updated summary, or null if unchanged",
    "overall_progress": "integer 0-100, or null if unchanged",
    "preference_notes": "Updated preference notes, or null if unchanged",
    "fslsm_signals": {
        "processing": "float -1..1: direction the evidence pushes this dimension, 0 if no evidence",
        "perception": 0.0,
        "input": 0.0,
        "understanding": 0.0
    },
    "behavioral_patterns": {
        "system_usage_frequency": "updated text or null",
        "session_duration_engagement": "updated text or null",
        "motivational_triggers": "updated text or null",
        "additional_notes": "updated text or null"
    }
}"#;

/// Quiz outcome reported by the learning surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    /// Percentage score in [0, 100]
    pub score: f64,
}

/// New evidence about the learner since the last update
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InteractionEvidence {
    /// Free-text feedback and remarks
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub quiz_results: Vec<QuizResult>,
    /// New background information (e.g. an updated resume)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_information: Option<String>,
}

impl InteractionEvidence {
    pub fn from_feedback(text: impl Into<String>) -> Self {
        Self {
            feedback: vec![text.into()],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.feedback.iter().all(|f| f.trim().is_empty())
            && self.quiz_results.is_empty()
            && self.learner_information.as_deref().map_or(true, |s| s.trim().is_empty())
    }

    fn texts(&self) -> Vec<&str> {
        self.feedback
            .iter()
            .map(|s| s.as_str())
            .chain(self.learner_information.as_deref())
            .filter(|s| !s.trim().is_empty())
            .collect()
    }
}

/// A session the learner finished (or un-finished)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCompletion {
    pub id: String,
    pub if_learned: bool,
    #[serde(default)]
    pub desired_outcome_when_completed: Vec<SkillOutcome>,
}

impl From<&LearningSession> for SessionCompletion {
    fn from(session: &LearningSession) -> Self {
        Self {
            id: session.id.clone(),
            if_learned: session.if_learned,
            desired_outcome_when_completed: session.desired_outcome_when_completed.clone(),
        }
    }
}

/// Generated parts of an initial profile
#[derive(Debug, Default, Deserialize)]
struct InitialProfileDraft {
    #[serde(default)]
    learner_information: Option<String>,
    #[serde(default)]
    fslsm_dimensions: Option<FslsmDimensions>,
    #[serde(default)]
    preference_notes: Option<String>,
    #[serde(default)]
    behavioral_patterns: Option<BehavioralPatterns>,
}

#[derive(Debug, Default, Deserialize)]
struct BehavioralRefresh {
    #[serde(default)]
    system_usage_frequency: Option<String>,
    #[serde(default)]
    session_duration_engagement: Option<String>,
    #[serde(default)]
    motivational_triggers: Option<String>,
    #[serde(default)]
    additional_notes: Option<String>,
}

/// Generated refresh of an existing profile; `None` means "carry over"
#[derive(Debug, Default, Deserialize)]
struct ProfileRefresh {
    #[serde(default)]
    learner_information: Option<String>,
    #[serde(default)]
    overall_progress: Option<i64>,
    #[serde(default)]
    preference_notes: Option<String>,
    #[serde(default)]
    fslsm_signals: Option<PreferenceSignals>,
    #[serde(default)]
    behavioral_patterns: Option<BehavioralRefresh>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Builds and revises learner profiles
pub struct ProfileUpdater {
    generator: Arc<dyn TextGenerator>,
    fslsm_step: f64,
    timeout: Duration,
}

impl ProfileUpdater {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: &ProfileConfig, timeout: Duration) -> Self {
        Self {
            generator,
            fslsm_step: policy.fslsm_step.clamp(0.0, 1.0),
            timeout,
        }
    }

    /// Create the first profile for a goal.
    ///
    /// Cognitive status comes straight from the skill-gap assessment; a
    /// persona, when given, fixes the starting FSLSM values.
    pub async fn initialize(
        &self,
        learning_goal: &str,
        background: &str,
        skill_gaps: &[SkillGap],
        persona: Option<&Persona>,
    ) -> Result<LearnerProfile> {
        if learning_goal.trim().is_empty() {
            return Err(Error::Validation("learning_goal must be non-empty".to_string()));
        }

        let cognitive_status = cognitive_status_from_gaps(skill_gaps);

        let gaps_json = serde_json::to_string(skill_gaps)?;
        let persona_line = persona
            .map(|p| {
                format!(
                    "- Selected persona: {} ({}); keep these FSLSM values as the baseline: {}\n",
                    p.name,
                    p.description,
                    serde_json::to_string(&p.fslsm_dimensions).unwrap_or_default()
                )
            })
            .unwrap_or_default();
        let task = format!(
            "Task A. Initial Profiling.\n\nGenerate an initial profile for the learner based on the provided details:\n\n\
             - Learning Goal: {}\n- Learner Background: {}\n- Skill Gaps: {}\n{}",
            learning_goal.trim(),
            background.trim(),
            gaps_json,
            persona_line
        );
        let prompt = Prompt::new(GenerationRole::Profiler, PROFILER_SYSTEM_PROMPT, task);
        let value = generate_with_timeout(self.generator.as_ref(), &prompt, INITIAL_PROFILE_FORMAT, self.timeout).await?;
        let draft: InitialProfileDraft = serde_json::from_value(value)?;

        let fslsm_dimensions = match (persona, draft.fslsm_dimensions) {
            (Some(p), _) => p.fslsm_dimensions,
            (None, Some(generated)) => clamp_dimensions(generated),
            (None, None) => FslsmDimensions::default(),
        };

        let learner_information = non_blank(draft.learner_information)
            .or_else(|| non_blank(Some(background.to_string())))
            .unwrap_or_else(|| learning_goal.trim().to_string());

        let profile = LearnerProfile::new(
            learner_information,
            learning_goal.to_string(),
            cognitive_status,
            LearningPreferences {
                fslsm_dimensions,
                additional_notes: non_blank(draft.preference_notes),
            },
            draft.behavioral_patterns.unwrap_or_default(),
        )?;

        info!(
            "Created profile for '{}': {} mastered, {} in progress",
            profile.learning_goal,
            profile.cognitive_status.mastered_skills.len(),
            profile.cognitive_status.in_progress_skills.len()
        );
        Ok(profile)
    }

    /// Merge new evidence into a profile.
    ///
    /// Returns a new profile; `previous` is never modified, so a failed
    /// update leaves the caller's state exactly as it was.
    pub async fn update(
        &self,
        previous: &LearnerProfile,
        evidence: &InteractionEvidence,
        completion: Option<&SessionCompletion>,
    ) -> Result<LearnerProfile> {
        let mut draft = previous.clone();

        let promoted = match completion {
            Some(c) if c.if_learned => apply_completion(&mut draft.cognitive_status, c),
            _ => 0,
        };

        let refresh = if evidence.is_empty() {
            ProfileRefresh::default()
        } else {
            self.request_refresh(previous, evidence, completion).await?
        };

        let texts = evidence.texts();
        let detected = signals::detect(texts.as_slice());
        let combined = match &refresh.fslsm_signals {
            Some(generated) => detected.combine(generated),
            None => detected,
        };
        apply_signals(&mut draft.learning_preferences.fslsm_dimensions, &combined, self.fslsm_step);

        merge_refresh(&mut draft, refresh, promoted);

        draft.check().map_err(Error::Consistency)?;

        debug!(
            "Updated profile: progress {} -> {}, {} skill(s) promoted",
            previous.cognitive_status.overall_progress,
            draft.cognitive_status.overall_progress,
            promoted
        );
        Ok(draft)
    }

    async fn request_refresh(
        &self,
        previous: &LearnerProfile,
        evidence: &InteractionEvidence,
        completion: Option<&SessionCompletion>,
    ) -> Result<ProfileRefresh> {
        let session_info = match completion {
            Some(c) => serde_json::to_string(c)?,
            None => "none".to_string(),
        };
        let task = format!(
            "Task B: Profile Update\n\nUpdate the learner's profile based on recent interactions and new information:\n\n\
             - Learner's Previous Profile: {}\n- New Learner Interactions: {}\n- [Optional] Learned Session Information: {}\n\n\
             Report only what the new evidence changes. Use null for anything it does not touch.",
            serde_json::to_string(previous)?,
            serde_json::to_string(evidence)?,
            session_info
        );
        let prompt = Prompt::new(GenerationRole::Profiler, PROFILER_SYSTEM_PROMPT, task);
        let value = generate_with_timeout(self.generator.as_ref(), &prompt, PROFILE_REFRESH_FORMAT, self.timeout).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Flagged gaps become in-progress skills; everything already satisfied is mastered
pub fn cognitive_status_from_gaps(skill_gaps: &[SkillGap]) -> CognitiveStatus {
    let mut status = CognitiveStatus {
        overall_progress: 0,
        mastered_skills: Vec::new(),
        in_progress_skills: Vec::new(),
    };

    for gap in skill_gaps {
        if gap.is_open() {
            status.in_progress_skills.push(InProgressSkill {
                name: gap.name.trim().to_string(),
                required_proficiency_level: gap.required_level,
                current_proficiency_level: gap.current_level,
            });
        } else {
            let level = gap
                .current_level
                .attained()
                .map_or(gap.required_level, |attained| attained.max(gap.required_level));
            status.mastered_skills.push(MasteredSkill {
                name: gap.name.trim().to_string(),
                proficiency_level: level,
            });
        }
    }

    status.overall_progress = status.mastery_percentage();
    status
}

/// Advance every outcome of a completed session; returns how many skills were promoted
pub fn apply_completion(status: &mut CognitiveStatus, completion: &SessionCompletion) -> usize {
    completion
        .desired_outcome_when_completed
        .iter()
        .filter(|outcome| status.advance_skill(&outcome.name, outcome.level))
        .count()
}

fn apply_signals(dims: &mut FslsmDimensions, signals: &PreferenceSignals, step: f64) {
    for dim in Dimension::ALL {
        let signal = signals.get(dim);
        if signal != 0.0 {
            dims.shift(dim, signal * step);
        }
    }
}

fn clamp_dimensions(dims: FslsmDimensions) -> FslsmDimensions {
    let mut out = FslsmDimensions::default();
    for dim in Dimension::ALL {
        out.shift(dim, dims.get(dim));
    }
    out
}

fn merge_refresh(draft: &mut LearnerProfile, refresh: ProfileRefresh, promoted: usize) {
    if let Some(info) = non_blank(refresh.learner_information) {
        draft.learner_information = info;
    }

    match refresh.overall_progress {
        Some(progress) => draft.cognitive_status.overall_progress = progress,
        None if promoted > 0 => {
            let status = &mut draft.cognitive_status;
            status.overall_progress = status.overall_progress.max(status.mastery_percentage());
        }
        None => {}
    }

    if let Some(notes) = non_blank(refresh.preference_notes) {
        draft.learning_preferences.additional_notes = Some(notes);
    }

    if let Some(b) = refresh.behavioral_patterns {
        let patterns = &mut draft.behavioral_patterns;
        if let Some(v) = non_blank(b.system_usage_frequency) {
            patterns.system_usage_frequency = v;
        }
        if let Some(v) = non_blank(b.session_duration_engagement) {
            patterns.session_duration_engagement = v;
        }
        if let Some(v) = non_blank(b.motivational_triggers) {
            patterns.motivational_triggers = Some(v);
        }
        if let Some(v) = non_blank(b.additional_notes) {
            patterns.additional_notes = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockTextGenerator;
    use crate::profile::{CurrentLevel, ProficiencyLevel};
    use crate::test_support::sample_profile;
    use serde_json::json;

    fn updater(mock: MockTextGenerator) -> ProfileUpdater {
        ProfileUpdater::new(Arc::new(mock), &ProfileConfig::default(), Duration::from_secs(5))
    }

    fn hris_completion(level: ProficiencyLevel) -> SessionCompletion {
        SessionCompletion {
            id: "Session 2".to_string(),
            if_learned: true,
            desired_outcome_when_completed: vec![SkillOutcome {
                name: "HRIS Management".to_string(),
                level,
            }],
        }
    }

    #[tokio::test]
    async fn test_completion_promotes_skill_without_generation() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().times(0);
        let updater = updater(mock);

        let before = sample_profile();
        let after = updater
            .update(&before, &InteractionEvidence::default(), Some(&hris_completion(ProficiencyLevel::Intermediate)))
            .await
            .unwrap();

        let status = &after.cognitive_status;
        assert!(status.in_progress("HRIS Management").is_none());
        let hris = status.mastered_skills.iter().find(|s| s.name == "HRIS Management").unwrap();
        assert_eq!(hris.proficiency_level, ProficiencyLevel::Intermediate);
        // All tracked skills are now mastered
        assert_eq!(status.overall_progress, 100);
        // Caller's profile untouched
        assert_eq!(before, sample_profile());
    }

    #[tokio::test]
    async fn test_partial_completion_raises_current_level() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().times(0);
        let after = updater(mock)
            .update(
                &sample_profile(),
                &InteractionEvidence::default(),
                Some(&hris_completion(ProficiencyLevel::Beginner)),
            )
            .await
            .unwrap();
        let skill = after.cognitive_status.in_progress("HRIS Management").unwrap();
        assert_eq!(skill.current_proficiency_level, CurrentLevel::Beginner);
        assert_eq!(after.cognitive_status.overall_progress, 20);
    }

    #[tokio::test]
    async fn test_unlearned_completion_is_ignored() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().times(0);
        let mut completion = hris_completion(ProficiencyLevel::Advanced);
        completion.if_learned = false;
        let after = updater(mock)
            .update(&sample_profile(), &InteractionEvidence::default(), Some(&completion))
            .await
            .unwrap();
        assert_eq!(after, sample_profile());
    }

    #[tokio::test]
    async fn test_feedback_shifts_dimensions_and_merges_fields() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().times(1).returning(|_, _| {
            Ok(json!({
                "learner_information": null,
                "overall_progress": 30,
                "preference_notes": "Enjoys labs",
                "fslsm_signals": {"processing": -1.0, "perception": 0.0, "input": -0.5, "understanding": 0.0},
                "behavioral_patterns": {"session_duration_engagement": "45 min avg", "system_usage_frequency": null}
            }))
        });
        let before = sample_profile();
        let after = updater(mock)
            .update(
                &before,
                &InteractionEvidence::from_feedback(
                    "I loved the hands-on exercises and video walkthroughs. \
                     Step-by-step labs are way more effective for me than reading theory.",
                ),
                None,
            )
            .await
            .unwrap();

        let dims = after.dimensions();
        // keyword signal (-1) plus generated signal (-1) clamp to -1, times the 0.2 step
        assert!((dims.processing - -0.2).abs() < 1e-9);
        assert!(dims.input < 0.0);
        assert!(dims.understanding < 0.0);
        assert_eq!(after.cognitive_status.overall_progress, 30);
        assert_eq!(after.learning_preferences.additional_notes.as_deref(), Some("Enjoys labs"));
        assert_eq!(after.behavioral_patterns.session_duration_engagement, "45 min avg");
        // untouched fields carried over
        assert_eq!(after.behavioral_patterns.system_usage_frequency, "2 logins/week");
        assert_eq!(after.learner_information, before.learner_information);
    }

    #[tokio::test]
    async fn test_dimensions_clamp_at_bounds() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .returning(|_, _| Ok(json!({"fslsm_signals": {"input": 1.0}})));
        let updater = ProfileUpdater::new(
            Arc::new(mock),
            &ProfileConfig { fslsm_step: 0.5 },
            Duration::from_secs(5),
        );
        let mut profile = sample_profile();
        profile.learning_preferences.fslsm_dimensions.input = 0.9;
        let after = updater
            .update(&profile, &InteractionEvidence::from_feedback("More lecture notes please"), None)
            .await
            .unwrap();
        assert_eq!(after.dimensions().input, 1.0);
    }

    #[tokio::test]
    async fn test_out_of_range_progress_is_consistency_error() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .returning(|_, _| Ok(json!({"overall_progress": 140})));
        let err = updater(mock)
            .update(&sample_profile(), &InteractionEvidence::from_feedback("great week"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Consistency(_)));
    }

    #[tokio::test]
    async fn test_generation_failure_surfaces() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .returning(|_, _| Err(Error::Generation("provider down".into())));
        let err = updater(mock)
            .update(&sample_profile(), &InteractionEvidence::from_feedback("ok"), None)
            .await
            .unwrap_err();
        assert!(err.is_generation_failure());
    }

    #[tokio::test]
    async fn test_initialize_from_gaps_with_persona() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().times(1).returning(|_, _| {
            Ok(json!({
                "learner_information": "Admin professional moving into HR",
                "fslsm_dimensions": {"fslsm_processing": 0.9},
                "behavioral_patterns": {
                    "system_usage_frequency": "3 logins/week",
                    "session_duration_engagement": "30 min"
                }
            }))
        });
        let gaps = vec![
            SkillGap::new("HRIS Management", ProficiencyLevel::Intermediate, CurrentLevel::Unlearned),
            SkillGap::new("Communication", ProficiencyLevel::Intermediate, CurrentLevel::Advanced),
        ];
        let persona = crate::profile::fslsm::find_persona("Visual Learner").unwrap();
        let profile = updater(mock)
            .initialize("Become an HR Manager", "MBA grad", &gaps, Some(&persona))
            .await
            .unwrap();

        assert_eq!(profile.dimensions(), &persona.fslsm_dimensions);
        assert!(profile.cognitive_status.is_mastered("Communication"));
        assert!(profile.cognitive_status.in_progress("HRIS Management").is_some());
        assert_eq!(profile.cognitive_status.overall_progress, 50);
        assert_eq!(profile.learner_information, "Admin professional moving into HR");
    }

    #[tokio::test]
    async fn test_initialize_rejects_blank_goal_before_generating() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().times(0);
        let err = updater(mock).initialize("  ", "bg", &[], None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_initialize_falls_back_to_background() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate()
            .returning(|_, _| Ok(json!({"fslsm_dimensions": {"fslsm_input": -3.0}})));
        let profile = updater(mock)
            .initialize("Learn SQL", "Data clerk, 2 years", &[], None)
            .await
            .unwrap();
        assert_eq!(profile.learner_information, "Data clerk, 2 years");
        assert_eq!(profile.dimensions().input, -1.0);
    }
}
