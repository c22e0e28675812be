//! Shared helpers for integration tests

#![allow(dead_code)]

use adaptive_learner::generation::{GenerationRole, Prompt, TextGenerator};
use adaptive_learner::profile::{
    BehavioralPatterns, CognitiveStatus, CurrentLevel, FslsmDimensions, InProgressSkill, LearningPreferences,
    MasteredSkill, ProficiencyLevel,
};
use adaptive_learner::{Config, Error, LearnerProfile, LearningPath, LearningService, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Generator that replays scripted answers, one queue per role
#[derive(Default)]
pub struct ScriptedGenerator {
    queues: Mutex<[VecDeque<Result<Value>>; 3]>,
    prompts: Mutex<Vec<Prompt>>,
}

fn slot(role: GenerationRole) -> usize {
    match role {
        GenerationRole::Profiler => 0,
        GenerationRole::Scheduler => 1,
        GenerationRole::Simulator => 2,
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, role: GenerationRole, answer: Result<Value>) -> &Self {
        self.queues.lock().unwrap()[slot(role)].push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls_for(&self, role: GenerationRole) -> usize {
        self.prompts.lock().unwrap().iter().filter(|p| p.role == role).count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &Prompt, _schema: &str) -> Result<Value> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.queues.lock().unwrap()[slot(prompt.role)]
            .pop_front()
            .unwrap_or_else(|| Err(Error::Generation(format!("no scripted answer for {}", prompt.role))))
    }
}

/// Service over a scripted generator, simulating against the bare profile
pub fn service(generator: Arc<ScriptedGenerator>) -> LearningService {
    let mut config = Config::default();
    config.refinement.use_ground_truth = false;
    config.refinement.max_iterations = 10;
    LearningService::new(generator, config)
}

pub fn profile_with(dims: FslsmDimensions) -> LearnerProfile {
    LearnerProfile::new(
        "Operations coordinator, 4 years".to_string(),
        "Become a data analyst".to_string(),
        CognitiveStatus {
            overall_progress: 10,
            mastered_skills: vec![MasteredSkill {
                name: "Excel".to_string(),
                proficiency_level: ProficiencyLevel::Intermediate,
            }],
            in_progress_skills: vec![
                InProgressSkill {
                    name: "SQL".to_string(),
                    required_proficiency_level: ProficiencyLevel::Intermediate,
                    current_proficiency_level: CurrentLevel::Unlearned,
                },
                InProgressSkill {
                    name: "Statistics".to_string(),
                    required_proficiency_level: ProficiencyLevel::Beginner,
                    current_proficiency_level: CurrentLevel::Unlearned,
                },
            ],
        },
        LearningPreferences {
            fslsm_dimensions: dims,
            additional_notes: None,
        },
        BehavioralPatterns {
            system_usage_frequency: "3 logins/week".to_string(),
            session_duration_engagement: "30 min".to_string(),
            motivational_triggers: Some("Career change".to_string()),
            additional_notes: None,
        },
    )
    .unwrap()
}

pub fn analyst_profile() -> LearnerProfile {
    profile_with(FslsmDimensions::default())
}

pub fn session_json(title: &str, outcomes: &[(&str, &str)]) -> Value {
    json!({
        "title": title,
        "abstract": format!("{} in practice", title),
        "desired_outcome_when_completed": outcomes
            .iter()
            .map(|(name, level)| json!({"name": name, "level": level}))
            .collect::<Vec<_>>()
    })
}

/// Path answer covering SQL to intermediate and Statistics to beginner
pub fn path_answer(prefix: &str) -> Value {
    json!({"learning_path": [
        session_json(&format!("{} Statistics", prefix), &[("Statistics", "beginner")]),
        session_json(&format!("{} SQL Basics", prefix), &[("SQL", "beginner")]),
        session_json(&format!("{} SQL Joins", prefix), &[("SQL", "intermediate")]),
    ]})
}

pub fn initial_path() -> LearningPath {
    serde_json::from_value(json!([
        {"id": "Session 1", "title": "SQL Basics", "abstract": "SELECT and WHERE", "if_learned": false,
         "desired_outcome_when_completed": [{"name": "SQL", "level": "beginner"}]},
        {"id": "Session 2", "title": "Descriptive Statistics", "abstract": "Mean, median, spread", "if_learned": false,
         "desired_outcome_when_completed": [{"name": "Statistics", "level": "beginner"}]},
        {"id": "Session 3", "title": "SQL Joins", "abstract": "Combining tables", "if_learned": false,
         "desired_outcome_when_completed": [{"name": "SQL", "level": "intermediate"}]}
    ]))
    .unwrap()
}

pub fn feedback_answer(suggestion: &str) -> Value {
    json!({
        "feedback": {
            "progression": "Statistics should come before SQL joins",
            "engagement": "Sessions feel dry",
            "personalization": "Not enough examples"
        },
        "suggestions": {
            "progression": suggestion,
            "engagement": "",
            "personalization": ""
        }
    })
}
