// Portable index snapshots: gzip-compressed JSON with a SHA-256 checksum
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use peermatch_core::IndexEntry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_EXTENSION: &str = "snapshot";

/// Snapshot listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDescription {
    pub name: String,
    pub creation_time: Option<String>,
    pub size: u64,
    pub checksum: String,
}

/// Everything needed to rebuild an index without re-encoding
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSnapshotData {
    pub dimension: usize,
    pub created_at: i64,
    pub entries: Vec<IndexEntry>,
}

pub struct SnapshotManager {
    snapshot_dir: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_dir: P) -> Result<Self> {
        let snapshot_dir = snapshot_dir.as_ref().to_path_buf();
        fs::create_dir_all(&snapshot_dir)?;
        Ok(Self { snapshot_dir })
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Timestamped name; lexicographic order is chronological
    fn generate_snapshot_name(now: DateTime<Utc>) -> String {
        format!(
            "index-{}.{}",
            now.format("%Y-%m-%d-%H-%M-%S-%3f"),
            SNAPSHOT_EXTENSION
        )
    }

    /// Resolve a snapshot name inside the snapshot directory
    fn snapshot_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name.ends_with(&format!(".{}", SNAPSHOT_EXTENSION))
            && !name.contains(['/', '\\'])
            && !name.starts_with('.');
        if !valid {
            return Err(anyhow!("Invalid snapshot name '{}'", name));
        }
        Ok(self.snapshot_dir.join(name))
    }

    fn describe(path: &Path) -> Result<SnapshotDescription> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Snapshot path {:?} has no file name", path))?
            .to_string();

        let file_data = fs::read(path)?;
        let checksum = format!("{:x}", Sha256::digest(&file_data));

        let metadata = fs::metadata(path)?;
        let creation_time = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%dT%H:%M:%SZ").to_string());

        Ok(SnapshotDescription {
            name,
            creation_time,
            size: metadata.len(),
            checksum,
        })
    }

    /// Write a new snapshot of `entries`
    pub fn create(&self, dimension: usize, entries: Vec<IndexEntry>) -> Result<SnapshotDescription> {
        let now = Utc::now();
        let data = IndexSnapshotData {
            dimension,
            created_at: now.timestamp(),
            entries,
        };

        let snapshot_path = self.snapshot_dir.join(Self::generate_snapshot_name(now));
        let json_data = serde_json::to_vec(&data)?;

        let file = File::create(&snapshot_path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        encoder.write_all(&json_data)?;
        encoder.finish()?.flush()?;

        tracing::info!(
            "Snapshot {:?} created with {} users",
            snapshot_path,
            data.entries.len()
        );
        Self::describe(&snapshot_path)
    }

    /// All snapshots, newest first
    pub fn list(&self) -> Result<Vec<SnapshotDescription>> {
        if !self.snapshot_dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.snapshot_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some(SNAPSHOT_EXTENSION) {
                snapshots.push(Self::describe(&path)?);
            }
        }

        snapshots.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(snapshots)
    }

    pub fn load(&self, name: &str) -> Result<IndexSnapshotData> {
        let snapshot_path = self.snapshot_path(name)?;
        if !snapshot_path.exists() {
            return Err(anyhow!("Snapshot '{}' not found", name));
        }

        let file = File::open(&snapshot_path)?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let mut json_data = Vec::new();
        decoder.read_to_end(&mut json_data)?;

        let data: IndexSnapshotData = serde_json::from_slice(&json_data)?;
        Ok(data)
    }

    pub fn delete(&self, name: &str) -> Result<bool> {
        let snapshot_path = self.snapshot_path(name)?;
        if snapshot_path.exists() {
            fs::remove_file(&snapshot_path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peermatch_core::{UserMetadata, Vector};

    fn entry(id: &str) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            vector: Vector::new(vec![0.5, -1.25, 0.0]),
            metadata: UserMetadata {
                department: Some("CS".to_string()),
                institution: None,
                interests: vec!["chess".to_string()],
            },
        }
    }

    #[test]
    fn test_create_list_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().join("snapshots")).unwrap();

        let description = manager.create(3, vec![entry("a"), entry("b")]).unwrap();
        assert!(description.name.starts_with("index-"));
        assert_eq!(description.checksum.len(), 64);
        assert!(description.size > 0);

        let listed = manager.list().unwrap();
        assert_eq!(listed, vec![description.clone()]);

        let data = manager.load(&description.name).unwrap();
        assert_eq!(data.dimension, 3);
        assert_eq!(data.entries, vec![entry("a"), entry("b")]);

        assert!(manager.delete(&description.name).unwrap());
        assert!(!manager.delete(&description.name).unwrap());
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path()).unwrap();
        assert!(manager.load("../index.bin").is_err());
        assert!(manager.load("nested/x.snapshot").is_err());
        assert!(manager.load("missing.snapshot").is_err());
        assert!(manager.delete("encoder.bin").is_err());
    }

    #[test]
    fn test_names_sort_chronologically() {
        let early = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let late = DateTime::from_timestamp(1_700_000_001, 5_000_000).unwrap();
        assert!(
            SnapshotManager::generate_snapshot_name(early)
                < SnapshotManager::generate_snapshot_name(late)
        );
    }
}
