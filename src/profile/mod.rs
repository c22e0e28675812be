//! Learner profile model and validator
//!
//! A profile holds three views of one learner pursuing one goal:
//! - cognitive status: overall progress plus mastered / in-progress skills
//! - learning preferences: FSLSM dimensions (derived style text is computed)
//! - behavioral patterns: free-text usage and engagement observations
//!
//! Profiles are validated on construction and on deserialization, so a
//! `LearnerProfile` value obtained through either path satisfies every
//! invariant below.

pub mod fslsm;
pub mod signals;
pub mod updater;

pub use fslsm::{Dimension, FslsmDimensions, Persona};
pub use updater::{InteractionEvidence, ProfileUpdater, QuizResult, SessionCompletion};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Proficiency a skill can be required at or mastered at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ProficiencyLevel {
    /// Lenient parse used on generated content ("Intermediate ", "ADVANCED")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(ProficiencyLevel::Beginner),
            "intermediate" => Some(ProficiencyLevel::Intermediate),
            "advanced" => Some(ProficiencyLevel::Advanced),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProficiencyLevel::Beginner => write!(f, "beginner"),
            ProficiencyLevel::Intermediate => write!(f, "intermediate"),
            ProficiencyLevel::Advanced => write!(f, "advanced"),
        }
    }
}

/// Where a learner currently stands on a skill; `Unlearned` is lowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrentLevel {
    #[serde(alias = "unleared")]
    Unlearned,
    Beginner,
    Intermediate,
    Advanced,
}

impl CurrentLevel {
    /// The proficiency reached, if any
    pub fn attained(&self) -> Option<ProficiencyLevel> {
        match self {
            CurrentLevel::Unlearned => None,
            CurrentLevel::Beginner => Some(ProficiencyLevel::Beginner),
            CurrentLevel::Intermediate => Some(ProficiencyLevel::Intermediate),
            CurrentLevel::Advanced => Some(ProficiencyLevel::Advanced),
        }
    }

    pub fn meets(&self, required: ProficiencyLevel) -> bool {
        *self >= CurrentLevel::from(required)
    }
}

impl From<ProficiencyLevel> for CurrentLevel {
    fn from(level: ProficiencyLevel) -> Self {
        match level {
            ProficiencyLevel::Beginner => CurrentLevel::Beginner,
            ProficiencyLevel::Intermediate => CurrentLevel::Intermediate,
            ProficiencyLevel::Advanced => CurrentLevel::Advanced,
        }
    }
}

impl std::fmt::Display for CurrentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.attained() {
            Some(level) => write!(f, "{}", level),
            None => write!(f, "unlearned"),
        }
    }
}

/// Skill names compare trimmed and case-insensitively
pub fn skill_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasteredSkill {
    pub name: String,
    pub proficiency_level: ProficiencyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgressSkill {
    pub name: String,
    pub required_proficiency_level: ProficiencyLevel,
    pub current_proficiency_level: CurrentLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveStatus {
    /// Percentage in [0, 100]
    pub overall_progress: i64,
    #[serde(default)]
    pub mastered_skills: Vec<MasteredSkill>,
    #[serde(default)]
    pub in_progress_skills: Vec<InProgressSkill>,
}

impl CognitiveStatus {
    pub fn is_mastered(&self, name: &str) -> bool {
        let key = skill_key(name);
        self.mastered_skills.iter().any(|s| skill_key(&s.name) == key)
    }

    pub fn in_progress(&self, name: &str) -> Option<&InProgressSkill> {
        let key = skill_key(name);
        self.in_progress_skills.iter().find(|s| skill_key(&s.name) == key)
    }

    /// Raise a skill to at least `target`, moving it to mastered once it
    /// meets its required level. Returns true if the skill was promoted.
    pub fn advance_skill(&mut self, name: &str, target: ProficiencyLevel) -> bool {
        let key = skill_key(name);

        if let Some(mastered) = self.mastered_skills.iter_mut().find(|s| skill_key(&s.name) == key) {
            mastered.proficiency_level = mastered.proficiency_level.max(target);
            return false;
        }

        let Some(idx) = self.in_progress_skills.iter().position(|s| skill_key(&s.name) == key) else {
            // Outcome for a skill the profile never tracked: the learner has it now
            self.mastered_skills.push(MasteredSkill {
                name: name.trim().to_string(),
                proficiency_level: target,
            });
            return true;
        };

        let skill = &mut self.in_progress_skills[idx];
        skill.current_proficiency_level = skill.current_proficiency_level.max(CurrentLevel::from(target));
        if skill.current_proficiency_level.meets(skill.required_proficiency_level) {
            let skill = self.in_progress_skills.remove(idx);
            let attained = skill.current_proficiency_level.attained().unwrap_or(target);
            self.mastered_skills.push(MasteredSkill {
                name: skill.name,
                proficiency_level: attained,
            });
            return true;
        }
        false
    }

    /// Move every in-progress skill that already meets its requirement
    pub fn promote_ready(&mut self) -> usize {
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_progress_skills)
            .into_iter()
            .partition(|s| s.current_proficiency_level.meets(s.required_proficiency_level));
        self.in_progress_skills = pending;
        let promoted = ready.len();
        for skill in ready {
            if let Some(level) = skill.current_proficiency_level.attained() {
                self.mastered_skills.push(MasteredSkill {
                    name: skill.name,
                    proficiency_level: level,
                });
            }
        }
        promoted
    }

    /// Share of tracked skills that are mastered, as a percentage
    pub fn mastery_percentage(&self) -> i64 {
        let total = self.mastered_skills.len() + self.in_progress_skills.len();
        if total == 0 {
            return 0;
        }
        ((self.mastered_skills.len() * 100) / total) as i64
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !(0..=100).contains(&self.overall_progress) {
            return Err(format!("overall_progress {} outside [0, 100]", self.overall_progress));
        }

        let mut mastered = HashSet::new();
        for skill in &self.mastered_skills {
            if !mastered.insert(skill_key(&skill.name)) {
                return Err(format!("skill '{}' listed twice in mastered_skills", skill.name));
            }
        }

        let mut in_progress = HashSet::new();
        for skill in &self.in_progress_skills {
            let key = skill_key(&skill.name);
            if !in_progress.insert(key.clone()) {
                return Err(format!("skill '{}' listed twice in in_progress_skills", skill.name));
            }
            if mastered.contains(&key) {
                return Err(format!("skill '{}' is both mastered and in progress", skill.name));
            }
            if skill.current_proficiency_level.meets(skill.required_proficiency_level) {
                return Err(format!(
                    "skill '{}' reached {} but is still in progress",
                    skill.name, skill.current_proficiency_level
                ));
            }
        }
        Ok(())
    }
}

/// Stored preferences; `content_style` and `activity_type` appear on the
/// wire but are recomputed from the dimensions on every read.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LearningPreferences {
    #[serde(default)]
    pub fslsm_dimensions: FslsmDimensions,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

impl LearningPreferences {
    pub fn content_style(&self) -> String {
        self.fslsm_dimensions.content_style()
    }

    pub fn activity_type(&self) -> String {
        self.fslsm_dimensions.activity_type()
    }
}

impl Serialize for LearningPreferences {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LearningPreferences", 4)?;
        state.serialize_field("fslsm_dimensions", &self.fslsm_dimensions)?;
        state.serialize_field("additional_notes", &self.additional_notes)?;
        state.serialize_field("content_style", &self.content_style())?;
        state.serialize_field("activity_type", &self.activity_type())?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BehavioralPatterns {
    #[serde(default)]
    pub system_usage_frequency: String,
    #[serde(default)]
    pub session_duration_engagement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivational_triggers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

/// Root learner model for one learner / goal pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProfileRecord")]
pub struct LearnerProfile {
    pub learner_information: String,
    pub learning_goal: String,
    pub cognitive_status: CognitiveStatus,
    pub learning_preferences: LearningPreferences,
    pub behavioral_patterns: BehavioralPatterns,
}

/// Unchecked wire form, validated into a `LearnerProfile`
#[derive(Deserialize)]
struct ProfileRecord {
    learner_information: String,
    learning_goal: String,
    cognitive_status: CognitiveStatus,
    #[serde(default)]
    learning_preferences: LearningPreferences,
    #[serde(default)]
    behavioral_patterns: BehavioralPatterns,
}

impl TryFrom<ProfileRecord> for LearnerProfile {
    type Error = Error;

    fn try_from(r: ProfileRecord) -> Result<Self> {
        LearnerProfile::new(
            r.learner_information,
            r.learning_goal,
            r.cognitive_status,
            r.learning_preferences,
            r.behavioral_patterns,
        )
    }
}

impl LearnerProfile {
    /// Build a validated profile.
    ///
    /// In-progress skills that already meet their required level are
    /// promoted to mastered before validation.
    pub fn new(
        learner_information: String,
        learning_goal: String,
        mut cognitive_status: CognitiveStatus,
        learning_preferences: LearningPreferences,
        behavioral_patterns: BehavioralPatterns,
    ) -> Result<Self> {
        cognitive_status.promote_ready();
        let profile = Self {
            learner_information,
            learning_goal: learning_goal.trim().to_string(),
            cognitive_status,
            learning_preferences,
            behavioral_patterns,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Check every invariant, reporting the first violation
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(Error::Validation)
    }

    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        if self.learner_information.trim().is_empty() {
            return Err("learner_information must be non-empty".to_string());
        }
        if self.learning_goal.trim().is_empty() {
            return Err("learning_goal must be non-empty".to_string());
        }
        if let Some((dim, value)) = self.learning_preferences.fslsm_dimensions.out_of_range() {
            return Err(format!("{} = {} outside [-1, 1]", dim.field_name(), value));
        }
        self.cognitive_status.validate()
    }

    pub fn dimensions(&self) -> &FslsmDimensions {
        &self.learning_preferences.fslsm_dimensions
    }

    pub fn content_style(&self) -> String {
        self.learning_preferences.content_style()
    }

    pub fn activity_type(&self) -> String {
        self.learning_preferences.activity_type()
    }
}
