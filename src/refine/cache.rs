//! Feedback cache keyed by (profile, path, ground truth) fingerprints

use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use tracing::debug;

use crate::path::LearningPath;
use crate::profile::LearnerProfile;
use crate::simulator::{FeedbackReport, GroundTruth};

/// SHA-256 over the canonical JSON form of a value
pub fn fingerprint<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    profile: String,
    path: String,
    ground_truth: Option<String>,
}

impl CacheKey {
    pub fn new(profile: &LearnerProfile, path: &LearningPath, ground_truth: Option<&GroundTruth>) -> Self {
        Self {
            profile: fingerprint(profile),
            path: fingerprint(path),
            ground_truth: ground_truth.map(fingerprint),
        }
    }

    fn same_pair(&self, other: &CacheKey) -> bool {
        self.profile == other.profile && self.path == other.path
    }
}

/// Bounded store of simulated feedback; capacity 0 disables caching
pub struct FeedbackCache {
    entries: Option<LruCache<CacheKey, FeedbackReport>>,
}

impl FeedbackCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    pub fn get(
        &mut self,
        profile: &LearnerProfile,
        path: &LearningPath,
        ground_truth: Option<&GroundTruth>,
    ) -> Option<FeedbackReport> {
        let entries = self.entries.as_mut()?;
        let hit = entries.get(&CacheKey::new(profile, path, ground_truth)).cloned();
        if hit.is_some() {
            debug!("Feedback cache hit");
        }
        hit
    }

    pub fn put(
        &mut self,
        profile: &LearnerProfile,
        path: &LearningPath,
        ground_truth: Option<&GroundTruth>,
        report: FeedbackReport,
    ) {
        if let Some(entries) = self.entries.as_mut() {
            entries.put(CacheKey::new(profile, path, ground_truth), report);
        }
    }

    /// Drop every feedback entry for `path`, whatever ground truth produced it;
    /// called whenever that path is replaced
    pub fn invalidate(&mut self, profile: &LearnerProfile, path: &LearningPath) -> bool {
        let Some(entries) = self.entries.as_mut() else {
            return false;
        };
        let target = CacheKey::new(profile, path, None);
        let stale: Vec<CacheKey> = entries
            .iter()
            .map(|(k, _)| k)
            .filter(|k| k.same_pair(&target))
            .cloned()
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        if !stale.is_empty() {
            debug!("Invalidated {} cached feedback report(s) for replaced path", stale.len());
        }
        !stale.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::PathFeedback;
    use serde_json::json;
    use crate::test_support::{sample_path, sample_profile};
    use std::collections::BTreeMap;

    fn report(text: &str) -> FeedbackReport {
        FeedbackReport {
            feedback: PathFeedback {
                progression: text.to_string(),
                engagement: text.to_string(),
                personalization: text.to_string(),
            },
            suggestions: BTreeMap::new(),
            simulation_metadata: None,
        }
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let path = sample_path();
        let mut other = sample_path();
        assert_eq!(fingerprint(&path), fingerprint(&other));
        other.sessions[0].title.push('!');
        assert_ne!(fingerprint(&path), fingerprint(&other));
        assert_eq!(fingerprint(&path).len(), 64);
    }

    #[test]
    fn test_put_get_invalidate() {
        let mut cache = FeedbackCache::new(4);
        let profile = sample_profile();
        let path = sample_path();
        assert!(cache.get(&profile, &path, None).is_none());

        cache.put(&profile, &path, None, report("ok"));
        assert_eq!(cache.get(&profile, &path, None), Some(report("ok")));

        let mut changed = profile.clone();
        changed.cognitive_status.overall_progress = 40;
        assert!(cache.get(&changed, &path, None).is_none());

        assert!(cache.invalidate(&profile, &path));
        assert!(!cache.invalidate(&profile, &path));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_bound_and_disabled() {
        let profile = sample_profile();
        let mut cache = FeedbackCache::new(1);
        let a = sample_path();
        let mut b = sample_path();
        b.sessions.pop();
        cache.put(&profile, &a, None, report("a"));
        cache.put(&profile, &b, None, report("b"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&profile, &a, None).is_none());

        let mut off = FeedbackCache::new(0);
        off.put(&profile, &a, None, report("a"));
        assert!(off.get(&profile, &a, None).is_none());
    }

    #[test]
    fn test_ground_truth_is_part_of_the_key() {
        let mut cache = FeedbackCache::new(4);
        let profile = sample_profile();
        let path = sample_path();
        let patient = GroundTruth::from_value(json!({"patience_level": "high"}));
        let impatient = GroundTruth::from_value(json!({"patience_level": "low"}));

        cache.put(&profile, &path, None, report("bare"));
        cache.put(&profile, &path, Some(&patient), report("patient"));
        assert_eq!(cache.get(&profile, &path, Some(&patient)), Some(report("patient")));
        assert_eq!(cache.get(&profile, &path, None), Some(report("bare")));
        assert!(cache.get(&profile, &path, Some(&impatient)).is_none());

        assert!(cache.invalidate(&profile, &path));
        assert!(cache.is_empty());
    }
}
