//! Shared fixtures for unit tests

use crate::path::{session_id, LearningPath, LearningSession, SkillOutcome};
use crate::profile::{
    BehavioralPatterns, CognitiveStatus, CurrentLevel, FslsmDimensions, InProgressSkill, LearnerProfile,
    LearningPreferences, MasteredSkill, ProficiencyLevel,
};

/// HR career changer: Communication mastered, HRIS Management still to learn
pub fn sample_profile() -> LearnerProfile {
    LearnerProfile::new(
        "MBA grad with admin background".to_string(),
        "Become an HR Manager".to_string(),
        CognitiveStatus {
            overall_progress: 20,
            mastered_skills: vec![MasteredSkill {
                name: "Communication".to_string(),
                proficiency_level: ProficiencyLevel::Advanced,
            }],
            in_progress_skills: vec![InProgressSkill {
                name: "HRIS Management".to_string(),
                required_proficiency_level: ProficiencyLevel::Intermediate,
                current_proficiency_level: CurrentLevel::Unlearned,
            }],
        },
        LearningPreferences {
            fslsm_dimensions: FslsmDimensions::default(),
            additional_notes: None,
        },
        BehavioralPatterns {
            system_usage_frequency: "2 logins/week".to_string(),
            session_duration_engagement: "20 min avg".to_string(),
            motivational_triggers: None,
            additional_notes: None,
        },
    )
    .expect("sample profile is valid")
}

fn session(number: usize, title: &str, outcomes: &[(&str, ProficiencyLevel)]) -> LearningSession {
    LearningSession {
        id: session_id(number),
        title: title.to_string(),
        summary: format!("{} for new HR managers", title),
        desired_outcome_when_completed: outcomes
            .iter()
            .map(|(name, level)| SkillOutcome {
                name: name.to_string(),
                level: *level,
            })
            .collect(),
        if_learned: false,
    }
}

/// Three unlearned sessions: law first, then HRIS up to intermediate
pub fn sample_path() -> LearningPath {
    LearningPath::new(vec![
        session(1, "Employment Law Foundations", &[("Employment Law", ProficiencyLevel::Beginner)]),
        session(2, "HRIS Basics", &[("HRIS Management", ProficiencyLevel::Beginner)]),
        session(3, "HRIS Administration", &[("HRIS Management", ProficiencyLevel::Intermediate)]),
    ])
}
