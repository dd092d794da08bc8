pub mod manager;
pub mod snapshot;

pub use manager::{IndexStatus, StorageManager};
pub use snapshot::{IndexSnapshotData, SnapshotDescription, SnapshotManager};
