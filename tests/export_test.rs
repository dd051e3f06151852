use anyhow::Result;
use async_trait::async_trait;
use grocery_etl::core::exporter::DATASET_PATH;
use grocery_etl::domain::model::{Dataset, ImageRef, ImageSourceKind, StoreId};
use grocery_etl::domain::ports::ImageLookup;
use grocery_etl::{
    CsvImporter, DatasetExporter, EnrichOptions, Enricher, GroceryError, LocalStorage, OpenMode,
    SqliteCatalog, VendorLayout,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const FRYS_HEADER: &str = "Producto,Tamaño/Cantidad,Precio,Precio Original / Notas,Fecha\n";

/// Finds an image only for names containing "milk".
struct MilkOnly;

#[async_trait]
impl ImageLookup for MilkOnly {
    async fn lookup(&self, product_name: &str) -> grocery_etl::Result<Option<ImageRef>> {
        Ok(product_name.to_lowercase().contains("milk").then(|| ImageRef {
            url: "https://img.test/milk.jpg".to_string(),
            source: ImageSourceKind::Wikipedia,
            confidence: 0.8,
        }))
    }
}

fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

async fn export_to(catalog: &SqliteCatalog, site_dir: &Path) -> Result<Dataset> {
    Ok(DatasetExporter::new(catalog, LocalStorage::new(site_dir))
        .export()
        .await?)
}

fn read_dataset(site_dir: &Path) -> Result<Dataset> {
    let bytes = std::fs::read(site_dir.join(DATASET_PATH))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn test_dataset_tracks_imports_and_enrichment() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let site_dir = temp_dir.path().join("site");
    let catalog =
        SqliteCatalog::open(temp_dir.path().join("grocery.db"), OpenMode::CreateIfMissing).await?;

    let frys = write_csv(
        temp_dir.path(),
        "frys.csv",
        &format!(
            "{}Whole Milk,1 gal,$3.49,,2024-05-02\nWhole Milk,1 gal,$3.29,,2024-05-09\nSourdough Bread,,$4.99,,2024-05-02\n",
            FRYS_HEADER
        ),
    );
    CsvImporter::new(&catalog, VendorLayout::for_store(StoreId::Frys))
        .import(&frys, StoreId::Frys)
        .await?;

    let first = export_to(&catalog, &site_dir).await?;
    assert_eq!(first.summary.product_count, 2);
    assert_eq!(first.summary.purchase_count, 3);
    assert_eq!(first.summary.with_image, 0);
    assert_eq!(first.summary.image_coverage, 0.0);

    Enricher::new(&catalog, MilkOnly)
        .run(EnrichOptions {
            limit: 0,
            pacing: Duration::ZERO,
        })
        .await?;

    let sprouts = write_csv(
        temp_dir.path(),
        "sprouts.csv",
        "Producto,Precio Actual\nWhole Milk,$3.99\nBlueberries,$2.99\n",
    );
    CsvImporter::new(&catalog, VendorLayout::for_store(StoreId::Sprouts))
        .import(&sprouts, StoreId::Sprouts)
        .await?;

    let returned = export_to(&catalog, &site_dir).await?;
    let written = read_dataset(&site_dir)?;

    assert_eq!(written.summary.stores, returned.summary.stores);
    assert_eq!(written.products, returned.products);

    let summary = &written.summary;
    assert_eq!(summary.product_count, 3);
    assert_eq!(summary.purchase_count, 5);
    assert_eq!(summary.with_image, 1);
    assert!((summary.image_coverage - 1.0 / 3.0).abs() < 1e-9);

    let stores: Vec<(&str, i64, i64)> = summary
        .stores
        .iter()
        .map(|s| (s.store.as_str(), s.purchase_count, s.product_count))
        .collect();
    assert_eq!(stores, vec![("frys", 3, 2), ("sprouts", 2, 2)]);

    let milk = written.products.iter().find(|p| p.key == "whole milk").unwrap();
    assert_eq!(milk.store, "frys");
    assert_eq!(milk.purchase_count, 3);
    assert_eq!(milk.min_price, Some(3.29));
    assert_eq!(milk.max_price, Some(3.99));
    assert_eq!(milk.image_url.as_deref(), Some("https://img.test/milk.jpg"));
    assert_eq!(milk.image_source.as_deref(), Some("wikipedia"));

    let bread = written.products.iter().find(|p| p.key == "sourdough bread").unwrap();
    assert_eq!(bread.purchase_count, 1);
    assert_eq!(bread.last_price, Some(4.99));
    assert_eq!(bread.last_purchased.as_deref(), Some("2024-05-02"));
    assert_eq!(bread.image_url, None);
    Ok(())
}

#[tokio::test]
async fn test_export_replaces_previous_document() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let site_dir = temp_dir.path().join("site");
    let catalog = SqliteCatalog::in_memory().await?;

    std::fs::create_dir_all(site_dir.join("data"))?;
    std::fs::write(site_dir.join(DATASET_PATH), b"stale")?;

    let dataset = export_to(&catalog, &site_dir).await?;
    let written = read_dataset(&site_dir)?;

    assert_eq!(dataset.summary.product_count, 0);
    assert_eq!(written.summary.image_coverage, 0.0);
    assert!(written.products.is_empty());
    assert!(!site_dir.join("data/dataset.json.tmp").exists());
    Ok(())
}

#[tokio::test]
async fn test_export_requires_existing_database() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let result = SqliteCatalog::open(temp_dir.path().join("missing.db"), OpenMode::Existing).await;

    assert!(matches!(result, Err(GroceryError::StoreUnavailable { .. })));
    assert!(!temp_dir.path().join("missing.db").exists());
    Ok(())
}
