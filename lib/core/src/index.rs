use crate::cluster::{ClusterConfig, KMeans};
use crate::encoder::FeatureEncoder;
use crate::filter::Filter;
use crate::persistence::{self, INDEX_MAGIC};
use crate::profile::{ProfileRecord, UserMetadata, UserProfile};
use crate::{Error, Result, Vector};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Decimal places kept in similarity scores
pub const SCORE_PRECISION: i32 = 4;

/// A stored user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vector,
    pub metadata: UserMetadata,
}

/// One nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarUser {
    pub user_id: String,
    pub similarity_score: f32,
    pub metadata: UserMetadata,
}

/// A record that could not be indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of [`SimilarityIndex::add_batch`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub indexed: usize,
    pub failures: Vec<AddFailure>,
}

/// Peer groups keyed by cluster label
pub type PeerGroups = BTreeMap<usize, Vec<String>>;

#[derive(Serialize, Deserialize)]
struct IndexBlob {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// In-memory map of user id to embedding and metadata.
///
/// Entries keep their first insertion order; re-adding an id overwrites the
/// vector and metadata in place. The index performs no locking of its own,
/// callers serialise writers against readers.
pub struct SimilarityIndex {
    encoder: FeatureEncoder,
    cluster_config: ClusterConfig,
    entries: Vec<IndexEntry>,
    positions: AHashMap<String, usize>,
}

impl SimilarityIndex {
    pub fn new(encoder: FeatureEncoder) -> Self {
        Self {
            encoder,
            cluster_config: ClusterConfig::default(),
            entries: Vec::new(),
            positions: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn with_cluster_config(mut self, config: ClusterConfig) -> Self {
        self.cluster_config = config;
        self
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Mutable encoder access, for calibration and restore.
    /// Vectors already stored are not re-encoded.
    pub fn encoder_mut(&mut self) -> &mut FeatureEncoder {
        &mut self.encoder
    }

    pub fn cluster_config(&self) -> &ClusterConfig {
        &self.cluster_config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.positions.get(id).map(|&pos| &self.entries[pos])
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    /// Drop every entry, keeping the encoder
    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    /// Encode `record` and store it under `id`, replacing any prior entry.
    ///
    /// On error the index is left exactly as it was.
    pub fn add(&mut self, id: &str, record: &ProfileRecord) -> Result<()> {
        let entry = match self.prepare_entry(id, record) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Rejected profile {:?}: {}", id, e);
                return Err(e);
            }
        };

        match self.positions.get(id) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.positions.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
        debug!("Indexed user {}", id);
        Ok(())
    }

    fn prepare_entry(&self, id: &str, record: &ProfileRecord) -> Result<IndexEntry> {
        if id.trim().is_empty() {
            return Err(Error::InvalidProfile("empty user id".to_string()));
        }
        record.validate()?;

        let vector = self.encoder.encode_profile(record);
        if vector.dim() != self.encoder.dimension() {
            return Err(Error::InvalidDimension {
                expected: self.encoder.dimension(),
                actual: vector.dim(),
            });
        }

        Ok(IndexEntry {
            id: id.to_string(),
            vector,
            metadata: UserMetadata::from(record),
        })
    }

    /// Add every profile, collecting failures instead of stopping at them
    pub fn add_batch<'a, I>(&mut self, profiles: I) -> BatchReport
    where
        I: IntoIterator<Item = &'a UserProfile>,
    {
        let mut report = BatchReport::default();
        for profile in profiles {
            match self.add(&profile.id, &profile.record) {
                Ok(()) => report.indexed += 1,
                Err(e) => report.failures.push(AddFailure {
                    id: profile.id.clone(),
                    error: e.to_string(),
                }),
            }
        }

        if !report.failures.is_empty() {
            warn!(
                "Batch indexed {} profiles, {} rejected",
                report.indexed,
                report.failures.len()
            );
        }
        report
    }

    /// Top `k` users most similar to `id` by cosine similarity.
    ///
    /// The target never appears in its own results. Candidates are first
    /// restricted by `filter`, then ranked by descending score with ties in
    /// insertion order. Unknown ids and indexes with fewer than two users
    /// yield an empty list.
    pub fn nearest(&self, id: &str, k: usize, filter: Option<&dyn Filter>) -> Vec<SimilarUser> {
        if k == 0 || self.entries.len() < 2 {
            return Vec::new();
        }
        let target = match self.get(id) {
            Some(target) => target,
            None => return Vec::new(),
        };

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .filter(|candidate| candidate.id != target.id)
            .filter(|candidate| {
                filter
                    .map(|f| f.matches(&target.metadata, &candidate.metadata))
                    .unwrap_or(true)
            })
            .map(|candidate| {
                let score = round_score(target.vector.cosine_similarity(&candidate.vector));
                (score, candidate)
            })
            .collect();

        // Ranked on the reported score; stable sort keeps insertion order among equals
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(score, candidate)| SimilarUser {
                user_id: candidate.id.clone(),
                similarity_score: score,
                metadata: candidate.metadata.clone(),
            })
            .collect()
    }

    /// Partition all users into at most `num_groups` peer groups.
    ///
    /// Labels are numbered by first appearance in insertion order, and
    /// members are listed in insertion order. With fewer users than groups
    /// (or zero groups requested) everyone lands in group `0`.
    pub fn cluster_population(&self, num_groups: usize) -> PeerGroups {
        let mut groups = PeerGroups::new();

        if num_groups == 0 || self.entries.len() < num_groups {
            groups.insert(0, self.ids().map(str::to_string).collect());
            return groups;
        }

        let vectors: Vec<Vector> = self.entries.iter().map(|e| e.vector.clone()).collect();
        let clustering = KMeans::new(num_groups, self.cluster_config.clone()).fit(&vectors);

        let mut relabel: AHashMap<usize, usize> = AHashMap::new();
        for (entry, raw) in self.entries.iter().zip(&clustering.labels) {
            let next = relabel.len();
            let label = *relabel.entry(*raw).or_insert(next);
            groups.entry(label).or_default().push(entry.id.clone());
        }

        info!(
            "Clustered {} users into {} groups in {} iterations",
            self.entries.len(),
            groups.len(),
            clustering.iterations
        );
        groups
    }

    /// Write all vectors and metadata to `path` as one blob
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let blob = IndexBlob {
            dimension: self.encoder.dimension(),
            entries: self.entries.clone(),
        };
        persistence::write_blob(path, INDEX_MAGIC, &blob)?;
        info!("Index with {} users saved to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Replace all entries with the blob at `path`.
    ///
    /// Returns `Ok(false)` and changes nothing when no blob exists there.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let blob = match persistence::read_blob::<IndexBlob>(path, INDEX_MAGIC)? {
            Some(blob) => blob,
            None => return Ok(false),
        };

        if blob.dimension != self.encoder.dimension() {
            warn!(
                "Loaded index dimension {} differs from encoder dimension {}",
                blob.dimension,
                self.encoder.dimension()
            );
        }

        self.replace_entries(blob.entries)
            .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;
        info!("Index with {} users loaded from {}", self.entries.len(), path.display());
        Ok(true)
    }

    /// Swap in previously encoded entries wholesale, keeping their order.
    ///
    /// Fails without touching the index if an id repeats.
    pub fn replace_entries(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut positions = AHashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            if positions.insert(entry.id.clone(), pos).is_some() {
                return Err(Error::InvalidProfile(format!("duplicate user id {}", entry.id)));
            }
        }

        self.entries = entries;
        self.positions = positions;
        Ok(())
    }
}

/// Round to [`SCORE_PRECISION`] decimal places
#[inline]
fn round_score(score: f64) -> f32 {
    let factor = 10f64.powi(SCORE_PRECISION);
    ((score * factor).round() / factor) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MetadataFilter;
    use std::collections::BTreeMap;

    fn calibrated_index(records: &[(&str, ProfileRecord)]) -> SimilarityIndex {
        let population: Vec<ProfileRecord> = records.iter().map(|(_, r)| r.clone()).collect();
        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&population);
        let mut index = SimilarityIndex::new(encoder);
        for (id, record) in records {
            index.add(id, record).unwrap();
        }
        index
    }

    fn students() -> Vec<(&'static str, ProfileRecord)> {
        vec![
            (
                "ayse",
                ProfileRecord::new("analytical_introvert")
                    .with_interests(["chess", "reading", "coding"])
                    .with_institution("METU")
                    .with_department("CS"),
            ),
            (
                "mehmet",
                ProfileRecord::new("analytical")
                    .with_interests(["chess", "coding"])
                    .with_institution("METU")
                    .with_department("CS"),
            ),
            (
                "zeynep",
                ProfileRecord::new("creative_extrovert")
                    .with_interests(["music", "dance"])
                    .with_institution("METU")
                    .with_department("Arts"),
            ),
            (
                "can",
                ProfileRecord::new("leader")
                    .with_interests(["football", "music"])
                    .with_institution("ITU")
                    .with_department("EE"),
            ),
        ]
    }

    #[test]
    fn test_add_and_overwrite() {
        let mut index = calibrated_index(&students());
        assert_eq!(index.len(), 4);

        let replacement = ProfileRecord::new("leader").with_department("Math");
        index.add("mehmet", &replacement).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.ids().collect::<Vec<_>>(), vec!["ayse", "mehmet", "zeynep", "can"]);
        assert_eq!(index.get("mehmet").unwrap().metadata.department.as_deref(), Some("Math"));
    }

    #[test]
    fn test_rejected_add_leaves_index_intact() {
        let mut index = calibrated_index(&students());
        let before = index.entries().to_vec();

        let mut traits = BTreeMap::new();
        traits.insert("leader".to_string(), f64::NAN);
        assert!(index.add("mehmet", &ProfileRecord::new(traits)).is_err());
        assert!(index.add("  ", &ProfileRecord::new("leader")).is_err());

        assert_eq!(index.entries(), before.as_slice());
        assert_eq!(index.nearest("ayse", 1, None)[0].user_id, "mehmet");
    }

    #[test]
    fn test_add_batch_isolates_failures() {
        let mut index = SimilarityIndex::new(FeatureEncoder::default());
        let mut traits = BTreeMap::new();
        traits.insert("creative".to_string(), f64::NEG_INFINITY);
        let profiles = vec![
            UserProfile::new("a", ProfileRecord::new("leader")),
            UserProfile::new("b", ProfileRecord::new(traits)),
            UserProfile::new("c", ProfileRecord::new("creative")),
        ];

        let report = index.add_batch(&profiles);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "b");
        assert!(index.contains("a") && index.contains("c") && !index.contains("b"));
    }

    #[test]
    fn test_nearest_ranks_similar_first() {
        let index = calibrated_index(&students());
        let results = index.nearest("ayse", 3, None);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].user_id, "mehmet");
        assert!(results.iter().all(|r| r.user_id != "ayse"));
        assert!(results.windows(2).all(|w| w[0].similarity_score >= w[1].similarity_score));
        assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.similarity_score)));
    }

    #[test]
    fn test_nearest_respects_k_and_filter() {
        let index = calibrated_index(&students());
        assert_eq!(index.nearest("ayse", 1, None).len(), 1);
        assert!(index.nearest("ayse", 0, None).is_empty());
        assert_eq!(index.nearest("ayse", 10, None).len(), 3);

        let filter = MetadataFilter::same_department();
        let results = index.nearest("ayse", 10, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id, "mehmet");
        assert_eq!(results[0].metadata.department.as_deref(), Some("CS"));

        let lonely = MetadataFilter::same_department();
        assert!(index.nearest("can", 5, Some(&lonely)).is_empty());
    }

    #[test]
    fn test_nearest_degenerate_cases() {
        let index = calibrated_index(&students());
        assert!(index.nearest("nobody", 5, None).is_empty());

        let single = calibrated_index(&students()[..1]);
        assert!(single.nearest("ayse", 5, None).is_empty());

        let empty = SimilarityIndex::new(FeatureEncoder::default());
        assert!(empty.nearest("ayse", 5, None).is_empty());
    }

    #[test]
    fn test_ties_follow_insertion_order() {
        let mut index = SimilarityIndex::new(FeatureEncoder::default());
        index.add("target", &ProfileRecord::new("leader")).unwrap();
        index.add("second", &ProfileRecord::new("leader")).unwrap();
        index.add("first-but-later", &ProfileRecord::new("leader")).unwrap();
        index.add("other", &ProfileRecord::new("creative")).unwrap();

        let results = index.nearest("target", 3, None);
        let ids: Vec<&str> = results.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first-but-later", "other"]);
        assert_eq!(results[0].similarity_score, 1.0);
        assert_eq!(results[2].similarity_score, 0.0);
    }

    #[test]
    fn test_equal_rounded_scores_keep_insertion_order() {
        let names = &crate::encoder::PERSONALITY_DIMENSIONS[..5];
        let traits = |values: [f64; 5]| -> ProfileRecord {
            let map: BTreeMap<String, f64> = names
                .iter()
                .map(|n| n.to_string())
                .zip(values)
                .collect();
            ProfileRecord::new(map)
        };

        let mut index = SimilarityIndex::new(FeatureEncoder::default());
        index.add("target", &traits([1.0; 5])).unwrap();
        index.add("first", &traits([0.2, 0.3, 0.1, 0.1, 0.9])).unwrap();
        index.add("second", &traits([0.9, 0.1, 0.1, 0.3, 0.2])).unwrap();
        index.add("third", &traits([0.1, 0.9, 0.2, 0.1, 0.3])).unwrap();

        let results = index.nearest("target", 3, None);
        let ids: Vec<&str> = results.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert!(results
            .windows(2)
            .all(|w| w[0].similarity_score == w[1].similarity_score));
    }

    #[test]
    fn test_score_rounding() {
        assert_eq!(round_score(0.123456), 0.1235);
        assert_eq!(round_score(-0.99996), -1.0);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn test_cluster_small_population_single_group() {
        let index = calibrated_index(&students()[..3]);
        let groups = index.cluster_population(5);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&0], vec!["ayse", "mehmet", "zeynep"]);

        let everyone = calibrated_index(&students()).cluster_population(0);
        assert_eq!(everyone[&0].len(), 4);

        let empty = SimilarityIndex::new(FeatureEncoder::default()).cluster_population(3);
        assert_eq!(empty.get(&0), Some(&Vec::new()));
    }

    #[test]
    fn test_cluster_partition_is_complete_and_deterministic() {
        let index = calibrated_index(&students());
        let first = index.cluster_population(2);
        let second = index.cluster_population(2);
        assert_eq!(first, second);

        let mut members: Vec<String> = first.values().flatten().cloned().collect();
        members.sort();
        assert_eq!(members, vec!["ayse", "can", "mehmet", "zeynep"]);
        assert!(first.len() <= 2);
        // first inserted user always opens group 0
        assert!(first[&0].contains(&"ayse".to_string()));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let index = calibrated_index(&students());
        index.save(&path).unwrap();

        let mut restored = SimilarityIndex::new(index.encoder().clone());
        assert!(restored.load(&path).unwrap());
        assert_eq!(restored.entries(), index.entries());
        for id in index.ids() {
            assert_eq!(restored.nearest(id, 3, None), index.nearest(id, 3, None));
        }
    }

    #[test]
    fn test_load_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = calibrated_index(&students());
        assert!(!index.load(dir.path().join("absent.bin")).unwrap());
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_replace_entries_rejects_duplicates() {
        let mut index = calibrated_index(&students());
        let mut entries = index.entries()[..2].to_vec();
        entries.push(entries[0].clone());

        assert!(index.replace_entries(entries).is_err());
        assert_eq!(index.len(), 4);

        let kept = index.entries()[2..].to_vec();
        index.replace_entries(kept).unwrap();
        assert_eq!(index.ids().collect::<Vec<_>>(), vec!["zeynep", "can"]);
        assert_eq!(index.get("can").unwrap().id, "can");
    }

    #[test]
    fn test_load_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        calibrated_index(&students()[..2]).save(&path).unwrap();

        let mut index = calibrated_index(&students());
        assert!(index.load(&path).unwrap());
        assert_eq!(index.ids().collect::<Vec<_>>(), vec!["ayse", "mehmet"]);
        assert!(!index.contains("can"));
    }
}
