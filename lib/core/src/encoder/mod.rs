//! Profile feature encoder.
//!
//! Turns a [`ProfileRecord`] into a fixed-length [`Vector`]:
//!
//! ```text
//! [ personality (12) | interests tf-idf (H) | institution, department (2) ]
//! ```
//!
//! The encoder has a fit/transform lifecycle. [`FeatureEncoder::calibrate`]
//! learns the interest vocabulary and per-dimension scale statistics from a
//! population; [`FeatureEncoder::encode`] then maps single records. Before
//! calibration the encoder still produces well-formed vectors: the interest
//! segment is all zeros and no scaling is applied. The two readiness flags
//! live in [`CalibrationState`] and are persisted with it.

pub mod affiliation;
pub mod interests;
pub mod personality;
pub mod scaler;

use crate::persistence::{self, ENCODER_MAGIC};
use crate::profile::{Personality, ProfileRecord};
use crate::{Result, Vector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub use affiliation::{stable_bucket, AFFILIATION_DIM};
pub use interests::Vocabulary;
pub use personality::{PERSONALITY_DIM, PERSONALITY_DIMENSIONS};
pub use scaler::ScaleStats;

/// Default interest vocabulary size
pub const DEFAULT_MAX_INTEREST_FEATURES: usize = 50;

/// Configuration for a feature encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Width of the interest segment (vocabulary size cap)
    pub max_interest_features: usize,
    /// Subtract the population mean before scaling
    pub center: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_interest_features: DEFAULT_MAX_INTEREST_FEATURES,
            center: false,
        }
    }
}

/// Everything learned from a population
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    pub vocabulary: Vocabulary,
    pub scale: ScaleStats,
    pub vocabulary_fitted: bool,
    pub scale_fitted: bool,
}

#[derive(Serialize, Deserialize)]
struct EncoderBlob {
    config: EncoderConfig,
    state: CalibrationState,
}

/// Converts profile records into embeddings of a fixed dimension
#[derive(Debug, Clone, Default)]
pub struct FeatureEncoder {
    config: EncoderConfig,
    state: CalibrationState,
}

impl FeatureEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            state: CalibrationState::default(),
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    /// Embedding dimension, `P + H + A`
    #[inline]
    pub fn dimension(&self) -> usize {
        PERSONALITY_DIM + self.config.max_interest_features + AFFILIATION_DIM
    }

    #[inline]
    pub fn is_vocabulary_fitted(&self) -> bool {
        self.state.vocabulary_fitted
    }

    #[inline]
    pub fn is_scale_fitted(&self) -> bool {
        self.state.scale_fitted
    }

    /// Fit vocabulary and scale statistics on `population`.
    ///
    /// Replaces any previous calibration. Records that fail validation are
    /// skipped. An empty population leaves both flags false.
    pub fn calibrate(&mut self, population: &[ProfileRecord]) {
        info!("Calibrating encoder on {} profiles", population.len());

        let valid: Vec<&ProfileRecord> = population
            .iter()
            .filter(|record| match record.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping profile during calibration: {}", e);
                    false
                }
            })
            .collect();

        let mut state = CalibrationState::default();

        if let Some(vocabulary) = Vocabulary::fit(
            valid.iter().map(|record| record.interests.as_slice()),
            self.config.max_interest_features,
        ) {
            info!(
                "Interest vocabulary fitted: {} terms over {} documents",
                vocabulary.len(),
                vocabulary.documents()
            );
            state.vocabulary = vocabulary;
            state.vocabulary_fitted = true;
        }

        let batch: Vec<Vector> = valid
            .par_iter()
            .map(|record| self.encode_unscaled(&state, record))
            .collect();

        if let Some(scale) = ScaleStats::fit(&batch) {
            info!("Scaler fitted on {} embeddings", scale.samples());
            state.scale = scale;
            state.scale_fitted = true;
        }

        self.state = state;
    }

    /// Encode raw profile attributes.
    ///
    /// Always returns [`Self::dimension`] values. Missing optional fields
    /// contribute zeros.
    pub fn encode(
        &self,
        personality: Option<&Personality>,
        interests: &[String],
        institution: Option<&str>,
        department: Option<&str>,
    ) -> Vector {
        let mut vector = self.assemble(&self.state, personality, interests, institution, department);
        if self.state.scale_fitted {
            let start = self.dimension() - AFFILIATION_DIM;
            let mut raw_affiliation = [0.0f32; AFFILIATION_DIM];
            raw_affiliation.copy_from_slice(&vector.as_slice()[start..]);

            self.state.scale.transform(&mut vector, self.config.center);

            // Absent names stay exactly zero, centred or not
            for (slot, raw) in vector.as_mut_slice()[start..].iter_mut().zip(raw_affiliation) {
                if raw == 0.0 {
                    *slot = 0.0;
                }
            }
        }
        vector
    }

    pub fn encode_profile(&self, record: &ProfileRecord) -> Vector {
        self.encode(
            record.personality.as_ref(),
            &record.interests,
            record.institution.as_deref(),
            record.department.as_deref(),
        )
    }

    fn encode_unscaled(&self, state: &CalibrationState, record: &ProfileRecord) -> Vector {
        self.assemble(
            state,
            record.personality.as_ref(),
            &record.interests,
            record.institution.as_deref(),
            record.department.as_deref(),
        )
    }

    fn assemble(
        &self,
        state: &CalibrationState,
        personality: Option<&Personality>,
        interests: &[String],
        institution: Option<&str>,
        department: Option<&str>,
    ) -> Vector {
        let mut vector = Vector::zeros(self.dimension());
        let data = vector.as_mut_slice();

        let (personality_slots, rest) = data.split_at_mut(PERSONALITY_DIM);
        let (interest_slots, affiliation_slots) =
            rest.split_at_mut(self.config.max_interest_features);

        personality::encode_personality(personality, personality_slots);
        if state.vocabulary_fitted {
            state.vocabulary.transform_into(interests, interest_slots);
        }
        affiliation::encode_affiliation(institution, department, affiliation_slots);

        vector
    }

    /// Write configuration and calibration state to `path` as one blob
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let blob = EncoderBlob {
            config: self.config.clone(),
            state: self.state.clone(),
        };
        persistence::write_blob(path, ENCODER_MAGIC, &blob)?;
        info!("Encoder state saved to {}", path.display());
        Ok(())
    }

    /// Replace configuration and calibration state with the blob at `path`.
    ///
    /// Returns `Ok(false)` and changes nothing when no blob exists there.
    pub fn restore(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        match persistence::read_blob::<EncoderBlob>(path, ENCODER_MAGIC)? {
            Some(blob) => {
                self.config = blob.config;
                self.state = blob.state;
                info!(
                    "Encoder state restored from {} (vocabulary_fitted={}, scale_fitted={})",
                    path.display(),
                    self.state.vocabulary_fitted,
                    self.state.scale_fitted
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn population() -> Vec<ProfileRecord> {
        vec![
            ProfileRecord::new("analytical")
                .with_interests(["chess", "reading"])
                .with_institution("METU")
                .with_department("Physics"),
            ProfileRecord::new("creative_extrovert")
                .with_interests(["music", "chess"])
                .with_institution("METU"),
            ProfileRecord::new("leader").with_interests(["hiking"]),
            ProfileRecord::new("supporter"),
        ]
    }

    #[test]
    fn test_dimension_is_fixed() {
        let encoder = FeatureEncoder::default();
        assert_eq!(encoder.dimension(), 12 + 50 + 2);

        let narrow = FeatureEncoder::new(EncoderConfig {
            max_interest_features: 8,
            ..EncoderConfig::default()
        });
        assert_eq!(narrow.dimension(), 22);

        for record in population() {
            assert_eq!(encoder.encode_profile(&record).dim(), 64);
            assert_eq!(narrow.encode_profile(&record).dim(), 22);
        }
        assert_eq!(encoder.encode(None, &[], None, None).dim(), 64);
    }

    #[test]
    fn test_cold_start_output() {
        let encoder = FeatureEncoder::default();
        assert!(!encoder.is_vocabulary_fitted());
        assert!(!encoder.is_scale_fitted());

        let v = encoder.encode_profile(&population()[0]);
        assert_eq!(v[0], 1.0);
        assert!(v.as_slice()[PERSONALITY_DIM..PERSONALITY_DIM + 50]
            .iter()
            .all(|x| *x == 0.0));
        assert_eq!(v[62], stable_bucket(Some("METU")));
        assert_eq!(v[63], stable_bucket(Some("Physics")));
    }

    #[test]
    fn test_calibrate_sets_flags() {
        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&population());
        assert!(encoder.is_vocabulary_fitted());
        assert!(encoder.is_scale_fitted());
        assert_eq!(encoder.state().vocabulary.len(), 4);
        assert_eq!(encoder.state().scale.dim(), encoder.dimension());

        let v = encoder.encode_profile(&population()[0]);
        assert!(v.as_slice()[PERSONALITY_DIM..PERSONALITY_DIM + 50]
            .iter()
            .any(|x| *x > 0.0));
    }

    #[test]
    fn test_calibrate_empty_population() {
        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&population());
        encoder.calibrate(&[]);
        assert!(!encoder.is_vocabulary_fitted());
        assert!(!encoder.is_scale_fitted());
    }

    #[test]
    fn test_calibrate_without_interests() {
        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&[ProfileRecord::new("leader"), ProfileRecord::new("creative")]);
        assert!(!encoder.is_vocabulary_fitted());
        assert!(encoder.is_scale_fitted());
    }

    #[test]
    fn test_calibrate_skips_invalid_records() {
        let mut traits = BTreeMap::new();
        traits.insert("leader".to_string(), f64::INFINITY);
        let mut records = population();
        records.push(ProfileRecord::new(traits).with_interests(["poison"]));

        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&records);
        assert_eq!(encoder.state().scale.samples(), 4);
        assert_eq!(encoder.state().vocabulary.slot("poison"), None);
    }

    #[test]
    fn test_encode_is_pure() {
        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&population());
        for record in population() {
            let a = encoder.encode_profile(&record);
            let b = encoder.encode_profile(&record);
            let bits_a: Vec<u32> = a.as_slice().iter().map(|x| x.to_bits()).collect();
            let bits_b: Vec<u32> = b.as_slice().iter().map(|x| x.to_bits()).collect();
            assert_eq!(bits_a, bits_b);
        }
    }

    #[test]
    fn test_absent_affiliation_stays_zero_after_scaling() {
        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&population());
        let v = encoder.encode_profile(&ProfileRecord::new("leader").with_interests(["chess"]));
        assert_eq!(v[62], 0.0);
        assert_eq!(v[63], 0.0);
    }

    #[test]
    fn test_absent_affiliation_stays_zero_when_centred() {
        let mut encoder = FeatureEncoder::new(EncoderConfig {
            center: true,
            ..EncoderConfig::default()
        });
        encoder.calibrate(&population());

        let absent = encoder.encode_profile(&ProfileRecord::new("leader"));
        assert_eq!(absent[62], 0.0);
        assert_eq!(absent[63], 0.0);

        let present = encoder.encode_profile(
            &ProfileRecord::new("leader")
                .with_institution("METU")
                .with_department("Physics"),
        );
        assert_ne!(present[62], 0.0);
        assert_ne!(present[63], 0.0);
    }

    #[test]
    fn test_recalibration_replaces_state() {
        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&population());
        let first = encoder.state().clone();

        encoder.calibrate(&[ProfileRecord::new("leader").with_interests(["sailing"])]);
        assert_ne!(encoder.state(), &first);
        assert_eq!(encoder.state().vocabulary.terms().collect::<Vec<_>>(), vec!["sailing"]);

        encoder.calibrate(&population());
        assert_eq!(encoder.state(), &first);
    }

    #[test]
    fn test_persist_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoder.bin");

        let mut encoder = FeatureEncoder::new(EncoderConfig {
            max_interest_features: 10,
            center: true,
        });
        encoder.calibrate(&population());
        encoder.persist(&path).unwrap();

        let mut restored = FeatureEncoder::default();
        assert!(restored.restore(&path).unwrap());
        assert_eq!(restored.config(), encoder.config());
        assert_eq!(restored.state(), encoder.state());
        for record in population() {
            assert_eq!(restored.encode_profile(&record), encoder.encode_profile(&record));
        }
    }

    #[test]
    fn test_restore_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&population());
        let before = encoder.state().clone();

        assert!(!encoder.restore(dir.path().join("never-written.bin")).unwrap());
        assert_eq!(encoder.state(), &before);
    }

    #[test]
    fn test_restore_corrupt_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoder.bin");
        std::fs::write(&path, b"garbage").unwrap();

        let mut encoder = FeatureEncoder::default();
        encoder.calibrate(&population());
        let before = encoder.state().clone();
        assert!(encoder.restore(&path).is_err());
        assert_eq!(encoder.state(), &before);
    }
}
