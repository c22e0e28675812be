//! Path Scheduler - turns skill gaps into an ordered learning path
//!
//! Session content (titles, abstracts, framing) is generated; everything the
//! path guarantees is enforced locally afterwards:
//! - every open gap is targeted by some session at its required level
//! - sessions on prerequisite skills come before sessions on dependents
//! - sessions sharing a skill go from lower to higher target level
//! - ids are sequential and `if_learned` starts false

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{session_id, LearningPath, LearningSession, SkillGap, SkillOutcome, FIRST_SESSION_NUMBER};
use crate::error::{Error, Result};
use crate::generation::{generate_with_timeout, GenerationRole, Prompt, TextGenerator};
use crate::profile::{skill_key, LearnerProfile, ProficiencyLevel};

const SCHEDULER_SYSTEM_PROMPT: &str = r#"You are the Learning Path Scheduler in an Intelligent Tutoring System.
You design a sequence of learning sessions that closes a learner's skill gaps for one goal.
Rules:
- Cover every listed skill gap at its required proficiency level.
- Follow the given skill order: foundational skills first, dependent skills later.
- Frame each session for the learner's content style and activity type.
- Proficiency levels are exactly one of: beginner, intermediate, advanced."#;

pub(crate) const SESSIONS_FORMAT: &str = r#"{
    "learning_path": [
        {
            "title": "Session title",
            "abstract": "Two or three sentences on what the session covers and how",
            "desired_outcome_when_completed": [
                {"name": "Skill name", "level": "beginner|intermediate|advanced"}
            ]
        }
    ]
}"#;

#[derive(Debug, Deserialize)]
struct OutcomeDraft {
    name: String,
    level: String,
}

/// A generated session before ids and guarantees are applied
#[derive(Debug, Deserialize)]
pub(crate) struct SessionDraft {
    title: String,
    #[serde(rename = "abstract", alias = "summary", default)]
    summary: String,
    #[serde(default)]
    desired_outcome_when_completed: Vec<OutcomeDraft>,
}

impl SessionDraft {
    fn into_session(self) -> Result<LearningSession> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Schema("session title is empty".to_string()));
        }
        let mut outcomes = Vec::with_capacity(self.desired_outcome_when_completed.len());
        for o in self.desired_outcome_when_completed {
            let level = ProficiencyLevel::parse(&o.level).ok_or_else(|| {
                Error::Schema(format!("unknown proficiency level '{}' for '{}'", o.level, o.name))
            })?;
            if o.name.trim().is_empty() {
                continue;
            }
            outcomes.push(SkillOutcome {
                name: o.name.trim().to_string(),
                level,
            });
        }
        Ok(LearningSession {
            id: String::new(),
            title,
            summary: self.summary.trim().to_string(),
            desired_outcome_when_completed: outcomes,
            if_learned: false,
        })
    }
}

/// Parse generated sessions, accepting `{"learning_path": [...]}` or a bare array
pub(crate) fn parse_sessions(value: Value) -> Result<Vec<LearningSession>> {
    let list = match value {
        Value::Object(mut map) => map
            .remove("learning_path")
            .ok_or_else(|| Error::Schema("missing 'learning_path'".to_string()))?,
        other => other,
    };
    let drafts: Vec<SessionDraft> = serde_json::from_value(list)?;
    if drafts.is_empty() {
        return Err(Error::Schema("no sessions generated".to_string()));
    }
    drafts.into_iter().map(SessionDraft::into_session).collect()
}

/// Order open gaps so prerequisites come first.
///
/// Kahn's algorithm over the `prerequisites` edges that stay inside the gap
/// set. Among ready skills the lower required level goes first, then input
/// order. Skills caught in a cycle are appended in input order.
pub fn prerequisite_order(gaps: &[&SkillGap]) -> Vec<usize> {
    let index: HashMap<String, usize> = gaps
        .iter()
        .enumerate()
        .map(|(i, g)| (skill_key(&g.name), i))
        .collect();

    let mut in_degree = vec![0usize; gaps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); gaps.len()];
    for (i, gap) in gaps.iter().enumerate() {
        let mut seen = HashSet::new();
        for prereq in &gap.prerequisites {
            if let Some(&p) = index.get(&skill_key(prereq)) {
                if p != i && seen.insert(p) {
                    dependents[p].push(i);
                    in_degree[i] += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<(ProficiencyLevel, usize)> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| (gaps[i].required_level, i))
        .collect();

    let mut order = Vec::with_capacity(gaps.len());
    while let Some((_, i)) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert((gaps[d].required_level, d));
            }
        }
    }

    if order.len() < gaps.len() {
        warn!("Prerequisite cycle among skill gaps; keeping input order for the rest");
        let placed: HashSet<usize> = order.iter().copied().collect();
        order.extend((0..gaps.len()).filter(|i| !placed.contains(i)));
    }
    order
}

/// Make every gap reach its required level somewhere in `sessions`
pub(crate) fn enforce_coverage(sessions: &mut Vec<LearningSession>, gaps: &[&SkillGap], max_sessions: usize) {
    for gap in gaps {
        let key = skill_key(&gap.name);
        let key = key.as_str();
        let best = sessions
            .iter()
            .enumerate()
            .flat_map(|(si, s)| {
                s.desired_outcome_when_completed
                    .iter()
                    .enumerate()
                    .filter(move |(_, o)| skill_key(&o.name) == key)
                    .map(move |(oi, o)| (o.level, si, oi))
            })
            .max();

        match best {
            Some((level, _, _)) if level >= gap.required_level => {}
            Some((_, si, oi)) => {
                debug!("Raising '{}' target to {}", gap.name, gap.required_level);
                sessions[si].desired_outcome_when_completed[oi].level = gap.required_level;
            }
            None if sessions.len() < max_sessions => {
                debug!("Adding a session for uncovered gap '{}'", gap.name);
                sessions.push(LearningSession {
                    id: String::new(),
                    title: format!("{} Fundamentals to {}", gap.name.trim(), gap.required_level),
                    summary: format!(
                        "Build {} up to the {} level.",
                        gap.name.trim(),
                        gap.required_level
                    ),
                    desired_outcome_when_completed: vec![SkillOutcome {
                        name: gap.name.trim().to_string(),
                        level: gap.required_level,
                    }],
                    if_learned: false,
                });
            }
            None => {
                if let Some(last) = sessions.last_mut() {
                    debug!("Folding uncovered gap '{}' into '{}'", gap.name, last.title);
                    last.desired_outcome_when_completed.push(SkillOutcome {
                        name: gap.name.trim().to_string(),
                        level: gap.required_level,
                    });
                }
            }
        }
    }
}

/// Stable-sort sessions by the earliest skill rank they address
fn order_sessions(sessions: &mut [LearningSession], rank: &HashMap<String, usize>) {
    sessions.sort_by_key(|s| {
        s.desired_outcome_when_completed
            .iter()
            .filter_map(|o| rank.get(&skill_key(&o.name)).copied())
            .min()
            .unwrap_or(usize::MAX)
    });
}

/// Reorder sessions so that, for each skill two sessions share, the lower
/// target level comes first. Unrelated sessions keep their input order;
/// sessions whose shared skills conflict are appended in input order.
pub(crate) fn level_order(sessions: &mut Vec<LearningSession>) {
    let levels: Vec<HashMap<String, ProficiencyLevel>> = sessions
        .iter()
        .map(|s| {
            let mut by_skill: HashMap<String, ProficiencyLevel> = HashMap::new();
            for outcome in &s.desired_outcome_when_completed {
                let level = by_skill.entry(skill_key(&outcome.name)).or_insert(outcome.level);
                *level = (*level).max(outcome.level);
            }
            by_skill
        })
        .collect();

    let n = sessions.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for a in 0..n {
        for b in 0..n {
            let earlier = levels[a]
                .iter()
                .any(|(skill, level)| levels[b].get(skill).is_some_and(|other| level < other));
            if earlier {
                dependents[a].push(b);
                in_degree[b] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }
    if order.len() < n {
        warn!("Conflicting skill levels across sessions; keeping input order for the rest");
        let placed: HashSet<usize> = order.iter().copied().collect();
        order.extend((0..n).filter(|i| !placed.contains(i)));
    }
    if order.iter().enumerate().all(|(pos, &i)| pos == i) {
        return;
    }

    debug!("Moved lower-level sessions ahead of higher-level ones on the same skill");
    let mut slots: Vec<Option<LearningSession>> = sessions.drain(..).map(Some).collect();
    sessions.extend(order.into_iter().filter_map(|i| slots[i].take()));
}

/// Assign sequential ids starting at `first`, skipping any in `taken`
pub(crate) fn assign_ids(sessions: &mut [LearningSession], first: usize, taken: &HashSet<String>) {
    let mut n = first;
    for session in sessions {
        while taken.contains(&session_id(n)) {
            n += 1;
        }
        session.id = session_id(n);
        session.if_learned = false;
        n += 1;
    }
}

pub struct PathScheduler {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl PathScheduler {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Build a fresh path of at most `session_count` sessions covering every open gap
    pub async fn schedule(
        &self,
        profile: &LearnerProfile,
        skill_gaps: &[SkillGap],
        session_count: usize,
    ) -> Result<LearningPath> {
        let open: Vec<&SkillGap> = skill_gaps.iter().filter(|g| g.is_open()).collect();
        if open.is_empty() {
            return Err(Error::EmptyGap);
        }
        let session_count = session_count.max(1);

        let sessions = self.generate_sessions(profile, &open, session_count, None).await?;
        let path = LearningPath::new(sessions);

        info!(
            "Scheduled {} session(s) for '{}' covering {} gap(s)",
            path.len(),
            profile.learning_goal,
            open.len()
        );
        Ok(path)
    }

    /// Rebuild a path around the sessions already learned.
    ///
    /// Completed sessions are kept verbatim and placed first; the profile's
    /// remaining in-progress skills get new sessions up to `new_count` in total.
    pub async fn reschedule(
        &self,
        existing: &LearningPath,
        profile: &LearnerProfile,
        new_count: usize,
    ) -> Result<LearningPath> {
        let completed: Vec<LearningSession> = existing.completed().cloned().collect();
        let remaining_slots = new_count.max(1).saturating_sub(completed.len());

        let remaining: Vec<SkillGap> = profile
            .cognitive_status
            .in_progress_skills
            .iter()
            .map(|s| SkillGap::new(s.name.clone(), s.required_proficiency_level, s.current_proficiency_level))
            .collect();
        let open: Vec<&SkillGap> = remaining.iter().filter(|g| g.is_open()).collect();

        if remaining_slots == 0 || open.is_empty() {
            info!(
                "Rescheduled '{}': keeping {} completed session(s), nothing new to add",
                profile.learning_goal,
                completed.len()
            );
            return Ok(LearningPath::new(completed));
        }

        let mut fresh = self
            .generate_sessions(profile, &open, remaining_slots, Some((existing, &completed)))
            .await?;

        let taken: HashSet<String> = completed.iter().map(|s| s.id.clone()).collect();
        assign_ids(&mut fresh, completed.len() + FIRST_SESSION_NUMBER, &taken);

        let mut sessions = completed;
        sessions.extend(fresh);
        let path = LearningPath::new(sessions);

        info!(
            "Rescheduled '{}': {} completed + {} new session(s)",
            profile.learning_goal,
            path.completed().count(),
            path.pending().count()
        );
        Ok(path)
    }

    async fn generate_sessions(
        &self,
        profile: &LearnerProfile,
        open: &[&SkillGap],
        count: usize,
        previous: Option<(&LearningPath, &[LearningSession])>,
    ) -> Result<Vec<LearningSession>> {
        let order = prerequisite_order(open);
        let ordered: Vec<&SkillGap> = order.iter().map(|&i| open[i]).collect();
        let rank: HashMap<String, usize> = ordered
            .iter()
            .enumerate()
            .map(|(r, g)| (skill_key(&g.name), r))
            .collect();

        let gap_lines = ordered
            .iter()
            .enumerate()
            .map(|(i, g)| {
                format!(
                    "{}. {} (current: {}, required: {})",
                    i + 1,
                    g.name.trim(),
                    g.current_level,
                    g.required_level
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut task = format!(
            "Schedule a learning path of at most {} sessions.\n\n\
             - Learning Goal: {}\n- Learner Information: {}\n\
             - Content Style: {}\n- Activity Type: {}\n\n\
             Skill gaps in the order they should be learned:\n{}",
            count,
            profile.learning_goal,
            profile.learner_information,
            profile.content_style(),
            profile.activity_type(),
            gap_lines
        );
        if let Some((existing, completed)) = previous {
            task.push_str(&format!(
                "\n\nThis is a reschedule. Current path: {}\n\
                 Sessions already completed (do not repeat them): {}",
                serde_json::to_string(existing)?,
                serde_json::to_string(completed)?
            ));
        }

        let prompt = Prompt::new(GenerationRole::Scheduler, SCHEDULER_SYSTEM_PROMPT, task);
        let value = generate_with_timeout(self.generator.as_ref(), &prompt, SESSIONS_FORMAT, self.timeout).await?;
        let mut sessions = parse_sessions(value)?;

        if sessions.len() > count {
            debug!("Truncating {} generated sessions to {}", sessions.len(), count);
            sessions.truncate(count);
        }
        enforce_coverage(&mut sessions, &ordered, count);
        order_sessions(&mut sessions, &rank);
        level_order(&mut sessions);
        assign_ids(&mut sessions, FIRST_SESSION_NUMBER, &HashSet::new());
        Ok(sessions)
    }
}
