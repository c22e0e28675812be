//! Feedback Simulator - role-plays the learner judging a path
//!
//! The generated answer is checked strictly: all three feedback dimensions
//! must be present and non-blank, or the call fails with `Error::Schema`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::generation::{generate_with_timeout, GenerationRole, Prompt, TextGenerator};
use crate::path::LearningPath;
use crate::profile::LearnerProfile;

const SIMULATOR_SYSTEM_PROMPT: &str = r#"You are simulating a real learner reviewing a proposed learning path.
Stay in character: use the learner's background, goal, learning style, patience and engagement habits.
Judge the path on three dimensions:
- progression: is the pacing and ordering right for this learner?
- engagement: would this learner stay motivated through it?
- personalization: does it fit how this learner likes to learn?
For each dimension give an honest assessment, and a concrete suggestion if something should change.
Leave a suggestion empty when nothing needs to change."#;

const FEEDBACK_FORMAT: &str = r#"{
    "feedback": {
        "progression": "Assessment of pacing and ordering",
        "engagement": "Assessment of motivational fit",
        "personalization": "Assessment of fit to learning style"
    },
    "suggestions": {
        "progression": "Concrete change, or empty string",
        "engagement": "Concrete change, or empty string",
        "personalization": "Concrete change, or empty string"
    }
}"#;

const ENRICHMENT_SYSTEM_PROMPT: &str = r#"You expand a learner profile into a realistic, detailed persona used to simulate that learner.
Keep every fact in the profile. Add plausible detail about patience, attention span, frustrations,
prior study habits and how the learner reacts to difficulty. Do not contradict the profile."#;

const GROUND_TRUTH_FORMAT: &str = r#"{
    "ground_truth_profile": {
        "learner_information": "...",
        "learning_goal": "...",
        "cognitive_status": {},
        "learning_preferences": {},
        "behavioral_patterns": {},
        "patience_level": "low|medium|high",
        "engagement_style": "...",
        "frustration_triggers": ["..."]
    }
}"#;

/// The fixed dimensions a path is judged on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackDimension {
    Progression,
    Engagement,
    Personalization,
}

impl FeedbackDimension {
    pub const ALL: [FeedbackDimension; 3] = [
        FeedbackDimension::Progression,
        FeedbackDimension::Engagement,
        FeedbackDimension::Personalization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackDimension::Progression => "progression",
            FeedbackDimension::Engagement => "engagement",
            FeedbackDimension::Personalization => "personalization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "progression" => Some(FeedbackDimension::Progression),
            "engagement" => Some(FeedbackDimension::Engagement),
            "personalization" | "personalisation" => Some(FeedbackDimension::Personalization),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedbackDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFeedback {
    pub progression: String,
    pub engagement: String,
    pub personalization: String,
}

impl PathFeedback {
    pub fn get(&self, dim: FeedbackDimension) -> &str {
        match dim {
            FeedbackDimension::Progression => &self.progression,
            FeedbackDimension::Engagement => &self.engagement,
            FeedbackDimension::Personalization => &self.personalization,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub used_ground_truth: bool,
    pub ground_truth_provided: bool,
    pub simulation_model: String,
}

/// One simulated review of a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub feedback: PathFeedback,
    #[serde(default)]
    pub suggestions: BTreeMap<FeedbackDimension, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_metadata: Option<SimulationMetadata>,
}

impl FeedbackReport {
    /// Suggestion text for a dimension, if non-blank
    pub fn suggestion(&self, dim: FeedbackDimension) -> Option<&str> {
        self.suggestions
            .get(&dim)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn active_suggestions(&self) -> Vec<(FeedbackDimension, &str)> {
        FeedbackDimension::ALL
            .iter()
            .filter_map(|d| self.suggestion(*d).map(|s| (*d, s)))
            .collect()
    }

    pub fn has_suggestions(&self) -> bool {
        FeedbackDimension::ALL.iter().any(|d| self.suggestion(*d).is_some())
    }

    /// Validate a generated answer into a report
    pub fn from_generated(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(Error::Schema("feedback answer is not an object".to_string()));
        };
        let feedback = match root.remove("feedback") {
            Some(Value::Object(map)) => map,
            _ => return Err(Error::Schema("missing 'feedback' object".to_string())),
        };

        let field = |map: &Map<String, Value>, dim: FeedbackDimension| -> Result<String> {
            map.get(dim.as_str())
                .and_then(text_of)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| Error::Schema(format!("feedback is missing '{}'", dim)))
        };
        let feedback = PathFeedback {
            progression: field(&feedback, FeedbackDimension::Progression)?,
            engagement: field(&feedback, FeedbackDimension::Engagement)?,
            personalization: field(&feedback, FeedbackDimension::Personalization)?,
        };

        let mut suggestions = BTreeMap::new();
        if let Some(Value::Object(map)) = root.remove("suggestions") {
            for (key, value) in map {
                match FeedbackDimension::parse(&key) {
                    Some(dim) => {
                        suggestions.insert(dim, text_of(&value).unwrap_or_default());
                    }
                    None => debug!("Dropping suggestion for unknown dimension '{}'", key),
                }
            }
        }

        Ok(Self {
            feedback,
            suggestions,
            simulation_metadata: None,
        })
    }
}

/// String content of a generated field; lists of strings are joined
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Null => Some(String::new()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    }
}

/// Enriched description of a learner used in place of the bare profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GroundTruth(Value);

impl GroundTruth {
    /// Accepts `{"ground_truth_profile": {...}}` or the profile object itself
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) if map.contains_key("ground_truth_profile") => {
                GroundTruth(map.remove("ground_truth_profile").unwrap_or(Value::Null))
            }
            other => GroundTruth(other),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl<'de> Deserialize<'de> for GroundTruth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(GroundTruth::from_value)
    }
}

pub struct FeedbackSimulator {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    use_ground_truth: bool,
    simulation_model: String,
}

impl FeedbackSimulator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        timeout: Duration,
        use_ground_truth: bool,
        simulation_model: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            timeout,
            use_ground_truth,
            simulation_model: simulation_model.into(),
        }
    }

    pub fn uses_ground_truth(&self) -> bool {
        self.use_ground_truth
    }

    /// Expand a profile into a ground-truth persona
    pub async fn enrich(&self, profile: &LearnerProfile) -> Result<GroundTruth> {
        let task = format!(
            "Create a ground truth profile for this learner:\n{}",
            serde_json::to_string(profile)?
        );
        let prompt = Prompt::new(GenerationRole::Simulator, ENRICHMENT_SYSTEM_PROMPT, task);
        let value = generate_with_timeout(self.generator.as_ref(), &prompt, GROUND_TRUTH_FORMAT, self.timeout).await?;
        let ground_truth = GroundTruth::from_value(value);
        if !ground_truth.as_value().is_object() {
            return Err(Error::Schema("ground truth profile is not an object".to_string()));
        }
        debug!("Enriched profile for '{}'", profile.learning_goal);
        Ok(ground_truth)
    }

    /// Judge `path` as the learner described by `profile`.
    ///
    /// A supplied ground truth is used as-is and skips enrichment.
    pub async fn evaluate(
        &self,
        profile: &LearnerProfile,
        path: &LearningPath,
        ground_truth: Option<&GroundTruth>,
    ) -> Result<FeedbackReport> {
        let enriched;
        let learner = match ground_truth {
            Some(gt) => Some(gt),
            None if self.use_ground_truth => {
                enriched = self.enrich(profile).await?;
                Some(&enriched)
            }
            None => None,
        };
        self.evaluate_as(profile, path, learner, ground_truth.is_some()).await
    }

    pub(crate) async fn evaluate_as(
        &self,
        profile: &LearnerProfile,
        path: &LearningPath,
        learner: Option<&GroundTruth>,
        ground_truth_provided: bool,
    ) -> Result<FeedbackReport> {
        let learner_json = match learner {
            Some(gt) => serde_json::to_string(gt.as_value())?,
            None => serde_json::to_string(profile)?,
        };
        let task = format!(
            "Review this learning path as the learner below.\n\n- Learner Profile: {}\n- Learning Path: {}",
            learner_json,
            serde_json::to_string(path)?
        );
        let prompt = Prompt::new(GenerationRole::Simulator, SIMULATOR_SYSTEM_PROMPT, task);
        let value = generate_with_timeout(self.generator.as_ref(), &prompt, FEEDBACK_FORMAT, self.timeout).await?;

        let mut report = FeedbackReport::from_generated(value)?;
        report.simulation_metadata = Some(SimulationMetadata {
            used_ground_truth: learner.is_some(),
            ground_truth_provided,
            simulation_model: self.simulation_model.clone(),
        });

        info!(
            "Simulated feedback on {} session(s): {} suggestion(s)",
            path.len(),
            report.active_suggestions().len()
        );
        Ok(report)
    }
}
