use crate::adapters::sqlite::SqliteCatalog;
use crate::domain::model::{Dataset, DatasetSummary};
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use chrono::Utc;

pub const DATASET_PATH: &str = "data/dataset.json";

/// Rebuilds the dashboard document from scratch on every run.
pub struct DatasetExporter<'a, S: Storage> {
    catalog: &'a SqliteCatalog,
    storage: S,
}

impl<'a, S: Storage> DatasetExporter<'a, S> {
    pub fn new(catalog: &'a SqliteCatalog, storage: S) -> Self {
        Self { catalog, storage }
    }

    pub async fn build(&self) -> Result<Dataset> {
        let counts = self.catalog.counts().await?;
        let stores = self.catalog.store_summaries().await?;
        let products = self.catalog.product_summaries().await?;

        Ok(Dataset {
            generated_at: Utc::now(),
            summary: DatasetSummary {
                product_count: counts.products,
                purchase_count: counts.purchases,
                with_image: counts.with_image,
                image_coverage: counts.coverage(),
                stores,
            },
            products,
        })
    }

    /// Write the document under the site directory and return it.
    pub async fn export(&self) -> Result<Dataset> {
        let dataset = self.build().await?;
        let json = serde_json::to_vec_pretty(&dataset)?;

        tracing::debug!("Writing dataset ({} bytes) to storage", json.len());
        self.storage.write_file(DATASET_PATH, &json).await?;

        tracing::info!(
            "📦 Exported {} products, {} purchases, image coverage {:.1}%",
            dataset.summary.product_count,
            dataset.summary.purchase_count,
            dataset.summary.image_coverage * 100.0
        );
        Ok(dataset)
    }
}
