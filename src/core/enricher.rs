use crate::adapters::sqlite::SqliteCatalog;
use crate::domain::model::ImageSourceKind;
use crate::domain::ports::ImageLookup;
use crate::utils::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOptions {
    /// Maximum products to look up; 0 means every product missing an image.
    pub limit: usize,
    /// Fixed wait between consecutive lookups.
    pub pacing: Duration,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            pacing: Duration::from_millis(120),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichStats {
    pub processed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub lookup_errors: usize,
    pub by_source: BTreeMap<ImageSourceKind, usize>,
    pub with_image: i64,
    pub total_products: i64,
}

impl EnrichStats {
    pub fn coverage(&self) -> f64 {
        if self.total_products == 0 {
            0.0
        } else {
            self.with_image as f64 / self.total_products as f64
        }
    }
}

pub struct Enricher<'a, L: ImageLookup> {
    catalog: &'a SqliteCatalog,
    lookup: L,
}

impl<'a, L: ImageLookup> Enricher<'a, L> {
    pub fn new(catalog: &'a SqliteCatalog, lookup: L) -> Self {
        Self { catalog, lookup }
    }

    /// One lookup per product lacking an image. A failed or empty lookup
    /// leaves the product untouched; nothing is retried.
    pub async fn run(&self, options: EnrichOptions) -> Result<EnrichStats> {
        let candidates = self.catalog.products_missing_image(options.limit).await?;
        tracing::info!(
            "🖼️ Enriching {} product(s) (limit {}, pacing {:?})",
            candidates.len(),
            options.limit,
            options.pacing
        );

        let mut stats = EnrichStats::default();

        for (index, product) in candidates.iter().enumerate() {
            if index > 0 && !options.pacing.is_zero() {
                tokio::time::sleep(options.pacing).await;
            }
            stats.processed += 1;

            match self.lookup.lookup(&product.name).await {
                Ok(Some(image)) => {
                    let source = image.source;
                    if self.catalog.set_image(product.id, &image).await? {
                        tracing::debug!("#{} '{}' -> {} ({})", product.id, product.name, image.url, source);
                        stats.updated += 1;
                        *stats.by_source.entry(source).or_insert(0) += 1;
                    } else {
                        stats.skipped += 1;
                    }
                }
                Ok(None) => {
                    tracing::debug!("#{} '{}': no acceptable image", product.id, product.name);
                    stats.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Lookup for '{}' failed: {}", product.name, e);
                    stats.lookup_errors += 1;
                    stats.skipped += 1;
                }
            }
        }

        let counts = self.catalog.counts().await?;
        stats.with_image = counts.with_image;
        stats.total_products = counts.products;

        tracing::info!(
            "✅ Enrichment done: {} processed, {} updated, {} skipped, coverage {}/{}",
            stats.processed,
            stats.updated,
            stats.skipped,
            stats.with_image,
            stats.total_products
        );
        Ok(stats)
    }
}
