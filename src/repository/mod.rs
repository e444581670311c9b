//! Repository layer: the catalog store and its snapshot storage

pub mod catalog;
pub mod storage;

pub use catalog::{BookKey, CatalogStore};
pub use storage::{InMemoryStorage, JsonFileStorage, SnapshotStorage};
