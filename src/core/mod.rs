pub mod enricher;
pub mod exporter;
pub mod importer;
pub mod normalize;

pub use crate::domain::model::{Dataset, ImageRef, Product, Purchase, RowOutcome, StoreId};
pub use crate::domain::ports::{ImageLookup, ImageSource, Storage};
pub use crate::utils::error::Result;
