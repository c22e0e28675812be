//! Learning sessions, paths and skill gaps
//!
//! A path is an ordered list of sessions; order carries meaning
//! (prerequisites first). Paths are replaced wholesale by the scheduler and
//! the refinement loop, never patched in place.

pub mod scheduler;

pub use scheduler::PathScheduler;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::profile::{skill_key, CurrentLevel, ProficiencyLevel};

/// Prefix of generated session ids ("Session 1", "Session 2", ...)
pub const SESSION_ID_PREFIX: &str = "Session";

/// First id number handed out to a fresh path
pub const FIRST_SESSION_NUMBER: usize = 1;

/// A skill a session is meant to advance, and to what level
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillOutcome {
    pub name: String,
    pub level: ProficiencyLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningSession {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub summary: String,
    #[serde(default)]
    pub desired_outcome_when_completed: Vec<SkillOutcome>,
    /// Set by the learner outside this crate; read to decide what is still schedulable
    #[serde(default)]
    pub if_learned: bool,
}

impl LearningSession {
    pub fn targets(&self, skill: &str) -> bool {
        let key = skill_key(skill);
        self.desired_outcome_when_completed
            .iter()
            .any(|o| skill_key(&o.name) == key)
    }
}

pub fn session_id(number: usize) -> String {
    format!("{} {}", SESSION_ID_PREFIX, number)
}

/// Ordered sequence of sessions; serialized as a bare JSON array
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearningPath {
    pub sessions: Vec<LearningSession>,
}

/// Completion summary of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PathProgress {
    pub learned: usize,
    pub total: usize,
    pub percent: u8,
}

impl LearningPath {
    pub fn new(sessions: Vec<LearningSession>) -> Self {
        Self { sessions }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn completed(&self) -> impl Iterator<Item = &LearningSession> {
        self.sessions.iter().filter(|s| s.if_learned)
    }

    pub fn pending(&self) -> impl Iterator<Item = &LearningSession> {
        self.sessions.iter().filter(|s| !s.if_learned)
    }

    pub fn session(&self, id: &str) -> Option<&LearningSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn progress(&self) -> PathProgress {
        let learned = self.completed().count();
        let total = self.sessions.len();
        let percent = if total == 0 { 0 } else { (learned * 100 / total) as u8 };
        PathProgress { learned, total, percent }
    }

    /// Normalized names of every skill some session targets
    pub fn covered_skills(&self) -> HashSet<String> {
        self.sessions
            .iter()
            .flat_map(|s| s.desired_outcome_when_completed.iter())
            .map(|o| skill_key(&o.name))
            .collect()
    }

    /// Highest level any session targets for a skill
    pub fn highest_target(&self, skill: &str) -> Option<ProficiencyLevel> {
        let key = skill_key(skill);
        self.sessions
            .iter()
            .flat_map(|s| s.desired_outcome_when_completed.iter())
            .filter(|o| skill_key(&o.name) == key)
            .map(|o| o.level)
            .max()
    }
}

/// One skill the goal requires, as assessed against the learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillGap {
    pub name: String,
    #[serde(default = "default_is_gap")]
    pub is_gap: bool,
    #[serde(alias = "required_proficiency_level")]
    pub required_level: ProficiencyLevel,
    #[serde(default = "default_current_level", alias = "current_proficiency_level")]
    pub current_level: CurrentLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_confidence: Option<String>,
    /// Other skills in the same gap set this one builds on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
}

fn default_is_gap() -> bool {
    true
}

fn default_current_level() -> CurrentLevel {
    CurrentLevel::Unlearned
}

impl SkillGap {
    pub fn new(name: impl Into<String>, required_level: ProficiencyLevel, current_level: CurrentLevel) -> Self {
        Self {
            name: name.into(),
            is_gap: !current_level.meets(required_level),
            required_level,
            current_level,
            reason: None,
            level_confidence: None,
            prerequisites: Vec::new(),
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: &[&str]) -> Self {
        self.prerequisites = prerequisites.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Flagged as a gap and not already satisfied
    pub fn is_open(&self) -> bool {
        self.is_gap && !self.current_level.meets(self.required_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_path;

    #[test]
    fn test_session_wire_format() {
        let json = r#"{
            "id": "Session 2",
            "title": "Intermediate Data Analysis Techniques",
            "abstract": "Pivot tables and grouping",
            "if_learned": true,
            "desired_outcome_when_completed": [{"name": "Data Analysis", "level": "intermediate"}]
        }"#;
        let session: LearningSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.summary, "Pivot tables and grouping");
        assert!(session.if_learned);
        assert!(session.targets("data analysis"));

        let back = serde_json::to_value(&session).unwrap();
        assert_eq!(back["abstract"], "Pivot tables and grouping");
        assert_eq!(back["desired_outcome_when_completed"][0]["level"], "intermediate");
    }

    #[test]
    fn test_path_is_bare_array() {
        let path = sample_path();
        let json = serde_json::to_value(&path).unwrap();
        assert!(json.is_array());
        let back: LearningPath = serde_json::from_value(json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_progress() {
        let mut path = sample_path();
        assert_eq!(path.progress().learned, 0);
        path.sessions[0].if_learned = true;
        let progress = path.progress();
        assert_eq!(progress.learned, 1);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.percent, 33);
        assert_eq!(LearningPath::default().progress().percent, 0);
    }

    #[test]
    fn test_highest_target() {
        let path = sample_path();
        assert_eq!(path.highest_target("HRIS Management"), Some(ProficiencyLevel::Intermediate));
        assert_eq!(path.highest_target("Unknown"), None);
        assert!(path.covered_skills().contains("employment law"));
    }

    #[test]
    fn test_skill_gap_defaults() {
        let gap: SkillGap = serde_json::from_str(
            r#"{"name": "SQL", "required_level": "advanced", "current_level": "beginner", "reason": "Needed for reporting"}"#,
        )
        .unwrap();
        assert!(gap.is_gap);
        assert!(gap.is_open());
        assert!(gap.prerequisites.is_empty());

        let satisfied = SkillGap::new("Excel", ProficiencyLevel::Beginner, CurrentLevel::Intermediate);
        assert!(!satisfied.is_gap);
        assert!(!satisfied.is_open());
    }
}
