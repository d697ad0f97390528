pub mod snapshot;

pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
