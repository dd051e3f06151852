pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::image_sources::SourceChain;
pub use adapters::sqlite::{OpenMode, SqliteCatalog};
pub use adapters::storage::LocalStorage;
pub use config::Settings;
pub use core::{
    enricher::{EnrichOptions, EnrichStats, Enricher},
    exporter::DatasetExporter,
    importer::{CsvImporter, ImportStats, VendorLayout},
};
pub use utils::error::{GroceryError, Result};
