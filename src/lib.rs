//! # PeerMatch
//!
//! Matches people to compatible peers and peer groups from mixed profile data:
//! personality labels, free-text interests and institutional affiliation.
//!
//! ## How it works
//!
//! 1. A population of [`ProfileRecord`]s calibrates the [`FeatureEncoder`]
//!    (interest vocabulary with tf-idf weights, per-dimension scale).
//! 2. Every profile is encoded into a fixed-length [`Vector`] and added to the
//!    [`SimilarityIndex`].
//! 3. Queries run against the in-memory index: cosine nearest neighbours,
//!    optionally restricted by department or institution, and deterministic
//!    k-means peer groups.
//!
//! Encoder calibration and index contents persist as two independent,
//! versioned binary blobs.
//!
//! ## As a Library
//!
//! ```rust,no_run
//! use peermatch::prelude::*;
//!
//! let storage = StorageManager::new("./data").unwrap();
//! let profiles = vec![
//!     UserProfile::new("1", ProfileRecord::new("analytical").with_interests(["chess"])),
//!     UserProfile::new("2", ProfileRecord::new("creative").with_interests(["music"])),
//! ];
//! storage.calibrate(&profiles).unwrap();
//!
//! let filter = MetadataFilter::same_department();
//! let peers = storage.nearest("1", 5, Some(&filter));
//! let groups = storage.cluster_population(5);
//! ```
//!
//! ## Crate Structure
//!
//! - `peermatch-core` - encoder, index, clustering, blob persistence
//! - `peermatch-storage` - data directory management and index snapshots

// Re-export core types
pub use peermatch_core::{
    BatchReport, CalibrationState, ClusterConfig, EncoderConfig, Error, FeatureEncoder, Filter,
    FilterCondition, MetadataField, MetadataFilter, PeerGroups, Personality, ProfileRecord,
    Result, SimilarUser, SimilarityIndex, UserMetadata, UserProfile, Vector,
};

// Re-export storage
pub use peermatch_storage::{IndexStatus, SnapshotDescription, StorageManager};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ClusterConfig, EncoderConfig, Error, FeatureEncoder, Filter, MetadataFilter,
        Personality, ProfileRecord, Result, SimilarUser, SimilarityIndex, StorageManager,
        UserProfile,
    };
}
