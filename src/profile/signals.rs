//! Preference signal detection
//!
//! Scans free-text learner evidence for cues that point toward one pole of
//! an FSLSM dimension ("hands-on labs" → active, "long readings" → reflective).
//! The result is a direction and strength per dimension in [-1, 1]; how far a
//! profile actually moves is the updater's policy, not decided here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fslsm::Dimension;

/// Cue phrases for the two poles of one dimension
struct PoleCues {
    dimension: Dimension,
    negative: &'static [&'static str],
    positive: &'static [&'static str],
}

const CUES: &[PoleCues] = &[
    PoleCues {
        dimension: Dimension::Processing,
        negative: &[
            "hands-on", "hands on", "interactive", "exercise", "exercises", "lab", "labs",
            "practice", "practicing", "experiment", "experimenting", "trying things",
            "group work", "doing",
        ],
        positive: &[
            "reading", "read", "observe", "observing", "reflect", "reflecting", "think it through",
            "thinking it through", "watching others", "on my own pace", "quiet study",
        ],
    },
    PoleCues {
        dimension: Dimension::Perception,
        negative: &[
            "example", "examples", "real-world", "real world", "practical", "concrete",
            "case study", "case studies", "facts", "applied",
        ],
        positive: &[
            "theory", "theories", "theoretical", "concept", "concepts", "conceptual", "abstract",
            "principles", "why it works", "underlying ideas",
        ],
    },
    PoleCues {
        dimension: Dimension::Input,
        negative: &[
            "video", "videos", "diagram", "diagrams", "chart", "charts", "visual", "visuals",
            "walkthrough", "walkthroughs", "infographic", "illustration", "illustrations",
        ],
        positive: &[
            "text", "written", "lecture", "lectures", "articles", "documentation", "notes",
            "explanations in words", "podcast", "podcasts",
        ],
    },
    PoleCues {
        dimension: Dimension::Understanding,
        negative: &[
            "step-by-step", "step by step", "one step at a time", "sequential", "in order",
            "gradual", "gradually", "incremental", "structured",
        ],
        positive: &[
            "big picture", "big-picture", "overview", "overviews", "high-level", "high level",
            "holistic", "connections between", "whole picture",
        ],
    },
];

/// Words that flip the polarity of a cue that follows them within a clause
const NEGATORS: &[&str] = &[
    "than ", "instead of ", "rather than ", "not ", "no more ", "don't like ", "do not like ",
    "dislike ", "hate ", "less ", "fewer ", "too much ", "without ",
];

/// How far back from a cue a negator is still considered part of the same clause
const NEGATION_WINDOW: usize = 24;

struct Matcher {
    dimension: Dimension,
    negative: Regex,
    positive: Regex,
}

fn alternation(phrases: &[&str]) -> Regex {
    let body = phrases
        .iter()
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{})\b", body)).expect("hardcoded regex")
}

static MATCHERS: Lazy<Vec<Matcher>> = Lazy::new(|| {
    CUES.iter()
        .map(|c| Matcher {
            dimension: c.dimension,
            negative: alternation(c.negative),
            positive: alternation(c.positive),
        })
        .collect()
});

/// Per-dimension preference direction detected in evidence
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceSignals {
    pub processing: f64,
    pub perception: f64,
    pub input: f64,
    pub understanding: f64,
}

impl PreferenceSignals {
    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Processing => self.processing,
            Dimension::Perception => self.perception,
            Dimension::Input => self.input,
            Dimension::Understanding => self.understanding,
        }
    }

    pub fn set(&mut self, dim: Dimension, value: f64) {
        let value = if value.is_finite() { value.clamp(-1.0, 1.0) } else { 0.0 };
        match dim {
            Dimension::Processing => self.processing = value,
            Dimension::Perception => self.perception = value,
            Dimension::Input => self.input = value,
            Dimension::Understanding => self.understanding = value,
        }
    }

    /// Sum two signal sets, keeping each dimension in [-1, 1]
    pub fn combine(&self, other: &PreferenceSignals) -> PreferenceSignals {
        let mut out = PreferenceSignals::default();
        for dim in Dimension::ALL {
            out.set(dim, self.get(dim) + other.get(dim));
        }
        out
    }

    pub fn is_neutral(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.get(*d) == 0.0)
    }
}

fn is_negated(text: &str, cue_start: usize) -> bool {
    let mut from = cue_start.saturating_sub(NEGATION_WINDOW);
    while !text.is_char_boundary(from) {
        from += 1;
    }
    let window = &text[from..cue_start];
    // A negator only applies inside the cue's own clause
    let clause = window.rsplit(['.', '!', '?', ';', ',']).next().unwrap_or(window);
    NEGATORS.iter().any(|n| clause.contains(n))
}

/// Count cue hits for one pole, returning (toward_pole, away_from_pole)
fn count_hits(regex: &Regex, text: &str) -> (u32, u32) {
    let mut toward = 0;
    let mut away = 0;
    for m in regex.find_iter(text) {
        if is_negated(text, m.start()) {
            away += 1;
        } else {
            toward += 1;
        }
    }
    (toward, away)
}

/// Detect preference signals in one or more pieces of evidence text
pub fn detect<S: AsRef<str>>(texts: &[S]) -> PreferenceSignals {
    let text = texts
        .iter()
        .map(|t| t.as_ref().to_lowercase())
        .collect::<Vec<_>>()
        .join(". ");

    let mut signals = PreferenceSignals::default();
    for matcher in MATCHERS.iter() {
        let (neg_toward, neg_away) = count_hits(&matcher.negative, &text);
        let (pos_toward, pos_away) = count_hits(&matcher.positive, &text);

        let negative = (neg_toward + pos_away) as f64;
        let positive = (pos_toward + neg_away) as f64;
        let total = negative + positive;
        if total > 0.0 {
            signals.set(matcher.dimension, (positive - negative) / total);
        }
    }

    if !signals.is_neutral() {
        debug!("Detected preference signals: {:?}", signals);
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_visual_sequential_feedback() {
        let signals = detect(&[
            "I loved the hands-on exercises and video walkthroughs. \
             Step-by-step labs are way more effective for me than reading theory.",
        ]);
        assert!(signals.processing < 0.0, "{:?}", signals);
        assert!(signals.input < 0.0);
        assert!(signals.understanding < 0.0);
        // "than reading theory" counts against the intuitive pole
        assert!(signals.perception < 0.0);
    }

    #[test]
    fn test_reflective_verbal_global() {
        let signals = detect(&["I prefer reading the lecture notes and getting a big picture overview first."]);
        assert!(signals.processing > 0.0);
        assert!(signals.input > 0.0);
        assert!(signals.understanding > 0.0);
        assert_eq!(signals.perception, 0.0);
    }

    #[test]
    fn test_negation_flips_polarity() {
        let signals = detect(&["Please, no more videos."]);
        assert!(signals.input > 0.0);
    }

    #[test]
    fn test_negation_stays_in_clause() {
        // "not" belongs to the first clause only
        let signals = detect(&["It was not bad, the diagrams helped"]);
        assert!(signals.input < 0.0);
    }

    #[test]
    fn test_no_cues_is_neutral() {
        let signals = detect(&["The session was fine."]);
        assert!(signals.is_neutral());
        let empty: [&str; 0] = [];
        assert!(detect(&empty).is_neutral());
    }

    #[test]
    fn test_combine_clamps() {
        let a = PreferenceSignals { processing: 0.8, ..Default::default() };
        let b = PreferenceSignals { processing: 0.7, input: -0.2, ..Default::default() };
        let c = a.combine(&b);
        assert_eq!(c.processing, 1.0);
        assert_eq!(c.input, -0.2);
    }
}
