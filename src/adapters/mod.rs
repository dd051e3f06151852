// Adapters layer: concrete implementations for external systems (SQLite, local files, image APIs).

pub mod image_sources;
pub mod sqlite;
pub mod storage;
