//! Felder-Silverman learning style dimensions
//!
//! Four independent bipolar axes in [-1, 1]. The human-readable
//! `content_style` and `activity_type` are pure functions of the axes and
//! are never stored on their own.

use serde::{Deserialize, Serialize};

/// Values at or beyond this magnitude select a non-neutral bucket
const BUCKET_THRESHOLD: f64 = 0.3;

/// One FSLSM axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// -1 active / hands-on, +1 reflective / observation
    Processing,
    /// -1 sensing / concrete, +1 intuitive / abstract
    Perception,
    /// -1 visual, +1 verbal
    Input,
    /// -1 sequential, +1 global
    Understanding,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Processing,
        Dimension::Perception,
        Dimension::Input,
        Dimension::Understanding,
    ];

    /// Field name used on the wire
    pub fn field_name(&self) -> &'static str {
        match self {
            Dimension::Processing => "fslsm_processing",
            Dimension::Perception => "fslsm_perception",
            Dimension::Input => "fslsm_input",
            Dimension::Understanding => "fslsm_understanding",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Processing => write!(f, "processing"),
            Dimension::Perception => write!(f, "perception"),
            Dimension::Input => write!(f, "input"),
            Dimension::Understanding => write!(f, "understanding"),
        }
    }
}

/// The four FSLSM values; 0.0 means neutral / unknown
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FslsmDimensions {
    #[serde(rename = "fslsm_processing", alias = "processing", default)]
    pub processing: f64,
    #[serde(rename = "fslsm_perception", alias = "perception", default)]
    pub perception: f64,
    #[serde(rename = "fslsm_input", alias = "input", default)]
    pub input: f64,
    #[serde(rename = "fslsm_understanding", alias = "understanding", default)]
    pub understanding: f64,
}

impl FslsmDimensions {
    pub fn new(processing: f64, perception: f64, input: f64, understanding: f64) -> Self {
        Self { processing, perception, input, understanding }
    }

    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Processing => self.processing,
            Dimension::Perception => self.perception,
            Dimension::Input => self.input,
            Dimension::Understanding => self.understanding,
        }
    }

    fn slot(&mut self, dim: Dimension) -> &mut f64 {
        match dim {
            Dimension::Processing => &mut self.processing,
            Dimension::Perception => &mut self.perception,
            Dimension::Input => &mut self.input,
            Dimension::Understanding => &mut self.understanding,
        }
    }

    /// Move one axis by `delta`, clamping the result into [-1, 1]
    pub fn shift(&mut self, dim: Dimension, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        let slot = self.slot(dim);
        *slot = (*slot + delta).clamp(-1.0, 1.0);
    }

    /// First axis that is NaN or outside [-1, 1], if any
    pub fn out_of_range(&self) -> Option<(Dimension, f64)> {
        Dimension::ALL
            .iter()
            .map(|d| (*d, self.get(*d)))
            .find(|(_, v)| !v.is_finite() || *v < -1.0 || *v > 1.0)
    }

    pub fn content_style(&self) -> String {
        derive_content_style(self)
    }

    pub fn activity_type(&self) -> String {
        derive_activity_type(self)
    }
}

/// Three-way bucket for one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Negative,
    Neutral,
    Positive,
}

fn bucket(value: f64) -> Bucket {
    if value <= -BUCKET_THRESHOLD {
        Bucket::Negative
    } else if value >= BUCKET_THRESHOLD {
        Bucket::Positive
    } else {
        Bucket::Neutral
    }
}

fn join_capitalized(first: &str, second: &str) -> String {
    let mut chars = first.chars();
    match chars.next() {
        Some(c) => format!("{}{}, {}", c.to_uppercase(), chars.as_str(), second),
        None => second.to_string(),
    }
}

/// Content style from perception + understanding
pub fn derive_content_style(dims: &FslsmDimensions) -> String {
    let perception = match bucket(dims.perception) {
        Bucket::Negative => "concrete examples and practical applications",
        Bucket::Positive => "conceptual and theoretical explanations",
        Bucket::Neutral => "a mix of practical and conceptual content",
    };
    let understanding = match bucket(dims.understanding) {
        Bucket::Negative => "presented in step-by-step sequences",
        Bucket::Positive => "with big-picture overviews first",
        Bucket::Neutral => "balancing sequential detail and big-picture context",
    };
    join_capitalized(perception, understanding)
}

/// Activity type from processing + input
pub fn derive_activity_type(dims: &FslsmDimensions) -> String {
    let processing = match bucket(dims.processing) {
        Bucket::Negative => "hands-on and interactive activities",
        Bucket::Positive => "reading and observation-based learning",
        Bucket::Neutral => "a balance of interactive and reflective activities",
    };
    let input = match bucket(dims.input) {
        Bucket::Negative => "with diagrams, charts, and videos",
        Bucket::Positive => "with text-based materials and lectures",
        Bucket::Neutral => "using both visual and verbal materials",
    };
    join_capitalized(processing, input)
}

/// A named starting point for a learner's FSLSM values
#[derive(Debug, Clone, Serialize)]
pub struct Persona {
    pub name: &'static str,
    pub description: &'static str,
    pub fslsm_dimensions: FslsmDimensions,
}

/// Built-in personas offered during onboarding
pub fn personas() -> Vec<Persona> {
    vec![
        Persona {
            name: "Hands-on Explorer",
            description: "Prefers active experimentation, concrete examples, visual aids, and step-by-step guidance.",
            fslsm_dimensions: FslsmDimensions::new(-0.7, -0.5, -0.5, -0.5),
        },
        Persona {
            name: "Reflective Reader",
            description: "Prefers observation-based learning, abstract concepts, text-heavy materials, and big-picture overviews.",
            fslsm_dimensions: FslsmDimensions::new(0.7, 0.5, 0.7, 0.5),
        },
        Persona {
            name: "Visual Learner",
            description: "Strongly prefers diagrams, videos, and visual aids with a slight preference for hands-on activities.",
            fslsm_dimensions: FslsmDimensions::new(-0.2, -0.3, -0.8, -0.3),
        },
        Persona {
            name: "Conceptual Thinker",
            description: "Prefers abstract theories, reflective analysis, and big-picture understanding.",
            fslsm_dimensions: FslsmDimensions::new(0.5, 0.7, 0.0, 0.7),
        },
        Persona {
            name: "Balanced Learner",
            description: "No strong preference, adapts to any learning style. A neutral starting point.",
            fslsm_dimensions: FslsmDimensions::default(),
        },
    ]
}

/// Case-insensitive persona lookup
pub fn find_persona(name: &str) -> Option<Persona> {
    let wanted = name.trim().to_lowercase();
    personas().into_iter().find(|p| p.name.to_lowercase() == wanted)
}
