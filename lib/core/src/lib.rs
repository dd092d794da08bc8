//! # PeerMatch Core
//!
//! Embedding, similarity and clustering engine for peer matching.
//!
//! This crate provides:
//!
//! - [`FeatureEncoder`] - turns a [`ProfileRecord`] into a fixed-length [`Vector`]
//!   (personality one-hot, interest tf-idf, institution/department buckets)
//! - [`SimilarityIndex`] - id → embedding map with cosine nearest-neighbour
//!   queries and k-means peer groups
//! - [`MetadataFilter`] - candidate restriction by department or institution
//!
//! ## Example
//!
//! ```rust
//! use peermatch_core::{FeatureEncoder, ProfileRecord, SimilarityIndex};
//!
//! let population = vec![
//!     ProfileRecord::new("analytical").with_interests(["chess", "reading"]),
//!     ProfileRecord::new("analytical").with_interests(["chess", "gaming"]),
//!     ProfileRecord::new("analytical").with_interests(["gaming", "reading"]),
//! ];
//!
//! let mut encoder = FeatureEncoder::default();
//! encoder.calibrate(&population);
//!
//! let mut index = SimilarityIndex::new(encoder);
//! for (i, record) in population.iter().enumerate() {
//!     index.add(&format!("user{}", i), record).unwrap();
//! }
//!
//! let peers = index.nearest("user0", 1, None);
//! assert_eq!(peers.len(), 1);
//! assert!(peers[0].similarity_score > 0.0);
//!
//! let groups = index.cluster_population(5);
//! assert_eq!(groups[&0].len(), 3);
//! ```

pub mod cluster;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod index;
pub mod persistence;
pub mod profile;
pub mod vector;

pub use cluster::{ClusterConfig, Clustering, KMeans};
pub use encoder::{CalibrationState, EncoderConfig, FeatureEncoder};
pub use error::{Error, Result};
pub use filter::{Filter, FilterCondition, MetadataField, MetadataFilter};
pub use index::{AddFailure, BatchReport, IndexEntry, PeerGroups, SimilarUser, SimilarityIndex};
pub use profile::{Personality, ProfileRecord, UserMetadata, UserProfile};
pub use vector::Vector;
