use crate::snapshot::{SnapshotDescription, SnapshotManager};
use parking_lot::{RwLock, RwLockWriteGuard};
use peermatch_core::{
    BatchReport, ClusterConfig, EncoderConfig, Error, FeatureEncoder, Filter, PeerGroups, Result,
    SimilarUser, SimilarityIndex, UserProfile,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const ENCODER_FILE: &str = "encoder.bin";
pub const INDEX_FILE: &str = "index.bin";
pub const SNAPSHOT_DIR: &str = "snapshots";

/// Summary of the engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub users: usize,
    pub dimension: usize,
    pub vocabulary_terms: usize,
    pub vocabulary_fitted: bool,
    pub scale_fitted: bool,
}

/// Owns the encoder and index of one data directory.
///
/// Writers (calibration, adds, restores) take the lock exclusively, queries
/// share it, so every reader sees a consistent index.
pub struct StorageManager {
    index: Arc<RwLock<SimilarityIndex>>,
    data_dir: PathBuf,
    snapshots: Arc<SnapshotManager>,
}

impl StorageManager {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::with_config(data_dir, EncoderConfig::default(), ClusterConfig::default())
    }

    /// Open `data_dir`, restoring any saved encoder and index state.
    ///
    /// A restored encoder brings its own configuration; `encoder_config`
    /// only applies to a fresh directory.
    pub fn with_config<P: AsRef<Path>>(
        data_dir: P,
        encoder_config: EncoderConfig,
        cluster_config: ClusterConfig,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let snapshots = Arc::new(
            SnapshotManager::new(data_dir.join(SNAPSHOT_DIR))
                .map_err(|e| Error::Storage(e.to_string()))?,
        );

        let mut encoder = FeatureEncoder::new(encoder_config);
        if encoder.restore(data_dir.join(ENCODER_FILE))? {
            info!("Restored encoder calibration");
        }

        let mut index = SimilarityIndex::new(encoder).with_cluster_config(cluster_config);
        if index.load(data_dir.join(INDEX_FILE))? {
            info!("Restored {} indexed users", index.len());
        }

        Ok(Self {
            index: Arc::new(RwLock::new(index)),
            data_dir,
            snapshots,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Re-fit the encoder on `profiles` and rebuild the index from them.
    ///
    /// Users missing from `profiles` are dropped, which is how deletions
    /// reach the index. Both blobs are saved afterwards.
    pub fn calibrate(&self, profiles: &[UserProfile]) -> Result<BatchReport> {
        let mut index = self.index.write();
        let population: Vec<_> = profiles.iter().map(|p| p.record.clone()).collect();
        index.encoder_mut().calibrate(&population);
        index.clear();
        let report = index.add_batch(profiles);

        info!(
            "Rebuilt index: {} users indexed, {} rejected",
            report.indexed,
            report.failures.len()
        );
        let index = RwLockWriteGuard::downgrade(index);
        self.persist(&index)?;
        Ok(report)
    }

    /// Encode and add `profiles` with the current calibration, then save the index
    pub fn add_profiles(&self, profiles: &[UserProfile]) -> Result<BatchReport> {
        let mut index = self.index.write();
        if !index.encoder().is_vocabulary_fitted() || !index.encoder().is_scale_fitted() {
            warn!("Adding profiles before calibration; embeddings are uncalibrated");
        }
        let report = index.add_batch(profiles);

        // Saved before any other writer can get in
        let index = RwLockWriteGuard::downgrade(index);
        index.save(self.data_dir.join(INDEX_FILE))?;
        Ok(report)
    }

    pub fn nearest(&self, id: &str, k: usize, filter: Option<&dyn Filter>) -> Vec<SimilarUser> {
        self.index.read().nearest(id, k, filter)
    }

    pub fn cluster_population(&self, num_groups: usize) -> PeerGroups {
        self.index.read().cluster_population(num_groups)
    }

    pub fn status(&self) -> IndexStatus {
        let index = self.index.read();
        let encoder = index.encoder();
        IndexStatus {
            users: index.len(),
            dimension: encoder.dimension(),
            vocabulary_terms: encoder.state().vocabulary.len(),
            vocabulary_fitted: encoder.is_vocabulary_fitted(),
            scale_fitted: encoder.is_scale_fitted(),
        }
    }

    /// Persist encoder and index blobs
    pub fn save(&self) -> Result<()> {
        self.persist(&self.index.read())
    }

    fn persist(&self, index: &SimilarityIndex) -> Result<()> {
        index.encoder().persist(self.data_dir.join(ENCODER_FILE))?;
        index.save(self.data_dir.join(INDEX_FILE))?;
        Ok(())
    }

    pub fn create_snapshot(&self) -> Result<SnapshotDescription> {
        let (dimension, entries) = {
            let index = self.index.read();
            (index.encoder().dimension(), index.entries().to_vec())
        };
        self.snapshots
            .create(dimension, entries)
            .map_err(|e| Error::Storage(e.to_string()))
    }

    pub fn list_snapshots(&self) -> Result<Vec<SnapshotDescription>> {
        self.snapshots
            .list()
            .map_err(|e| Error::Storage(e.to_string()))
    }

    pub fn delete_snapshot(&self, name: &str) -> Result<bool> {
        self.snapshots
            .delete(name)
            .map_err(|e| Error::Storage(e.to_string()))
    }

    /// Replace the index with a snapshot's entries and save it.
    /// Returns the number of restored users.
    pub fn restore_snapshot(&self, name: &str) -> Result<usize> {
        let data = self
            .snapshots
            .load(name)
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut index = self.index.write();
        if data.dimension != index.encoder().dimension() {
            return Err(Error::InvalidDimension {
                expected: index.encoder().dimension(),
                actual: data.dimension,
            });
        }
        index.replace_entries(data.entries)?;

        let index = RwLockWriteGuard::downgrade(index);
        info!("Restored {} users from snapshot {}", index.len(), name);
        index.save(self.data_dir.join(INDEX_FILE))?;
        Ok(index.len())
    }
}
