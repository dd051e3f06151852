use anyhow::Result;
use async_trait::async_trait;
use grocery_etl::adapters::image_sources::{GenericKeywords, OpenFoodFacts, Openverse, Wikipedia};
use grocery_etl::config::toml_config::EnrichSettings;
use grocery_etl::domain::model::{ImageRef, ImageSourceKind, StoreId};
use grocery_etl::domain::ports::{ImageLookup, ImageSource};
use grocery_etl::{
    CsvImporter, EnrichOptions, Enricher, GroceryError, OpenMode, SourceChain, SqliteCatalog,
    VendorLayout,
};
use httpmock::prelude::*;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Answers every lookup with a fixed image and counts calls. Clones share
/// the counters.
#[derive(Clone, Default)]
struct CountingLookup {
    calls: Arc<AtomicUsize>,
    names: Arc<Mutex<Vec<String>>>,
    fail_on: Option<&'static str>,
}

impl CountingLookup {
    fn new() -> Self {
        Self::default()
    }

    fn failing_on(name: &'static str) -> Self {
        Self {
            fail_on: Some(name),
            ..Self::new()
        }
    }
}

#[async_trait]
impl ImageLookup for CountingLookup {
    async fn lookup(&self, product_name: &str) -> grocery_etl::Result<Option<ImageRef>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(product_name.to_string());

        if self.fail_on == Some(product_name) {
            return Err(GroceryError::LookupError {
                message: "service unavailable".to_string(),
            });
        }
        Ok(Some(ImageRef {
            url: format!("https://img.test/{}.jpg", product_name.to_lowercase()),
            source: ImageSourceKind::OpenFoodFacts,
            confidence: 0.9,
        }))
    }
}

async fn seeded_catalog(dir: &TempDir, names: &[&str]) -> Result<SqliteCatalog> {
    let csv_path = dir.path().join("seed.csv");
    let mut body = String::from("Producto,Precio\n");
    for name in names {
        body.push_str(&format!("{},$1.00\n", name));
    }
    std::fs::write(&csv_path, body)?;

    let catalog =
        SqliteCatalog::open(dir.path().join("grocery.db"), OpenMode::CreateIfMissing).await?;
    CsvImporter::new(&catalog, VendorLayout::for_store(StoreId::Frys))
        .import(&csv_path, StoreId::Frys)
        .await?;
    Ok(catalog)
}

fn no_pacing(limit: usize) -> EnrichOptions {
    EnrichOptions {
        limit,
        pacing: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_limit_above_candidates_touches_each_once() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = seeded_catalog(&temp_dir, &["Milk", "Bread", "Lemons"]).await?;
    let lookup = CountingLookup::new();

    let stats = Enricher::new(&catalog, lookup.clone()).run(no_pacing(5)).await?;

    assert_eq!(lookup.calls.load(Ordering::SeqCst), 3);
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.updated, 3);
    assert_eq!(stats.by_source.get(&ImageSourceKind::OpenFoodFacts), Some(&3));
    assert_eq!(stats.with_image, 3);
    assert_eq!(stats.total_products, 3);
    assert_eq!(stats.coverage(), 1.0);
    Ok(())
}

#[tokio::test]
async fn test_limit_caps_lookups_in_id_order() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = seeded_catalog(&temp_dir, &["Milk", "Bread", "Lemons", "Rice"]).await?;
    let lookup = CountingLookup::new();

    let stats = Enricher::new(&catalog, lookup.clone()).run(no_pacing(2)).await?;

    assert_eq!(stats.processed, 2);
    assert_eq!(*lookup.names.lock().unwrap(), vec!["Milk", "Bread"]);
    assert_eq!(catalog.products_missing_image(0).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_enriched_products_are_not_revisited() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = seeded_catalog(&temp_dir, &["Milk", "Bread"]).await?;

    let first = CountingLookup::new();
    Enricher::new(&catalog, first.clone()).run(no_pacing(0)).await?;
    let before: Vec<_> = catalog.products().await?.into_iter().map(|p| p.image).collect();

    let second = CountingLookup::new();
    let stats = Enricher::new(&catalog, second.clone()).run(no_pacing(0)).await?;
    let after: Vec<_> = catalog.products().await?.into_iter().map(|p| p.image).collect();

    assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    assert_eq!(stats.processed, 0);
    assert_eq!(before, after);
    assert!(after.iter().all(Option::is_some));
    Ok(())
}

#[tokio::test]
async fn test_failed_lookup_leaves_product_unenriched() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = seeded_catalog(&temp_dir, &["Milk", "Bread", "Lemons"]).await?;
    let lookup = CountingLookup::failing_on("Bread");

    let stats = Enricher::new(&catalog, lookup.clone()).run(no_pacing(0)).await?;

    assert_eq!(lookup.calls.load(Ordering::SeqCst), 3);
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.lookup_errors, 1);

    let missing = catalog.products_missing_image(0).await?;
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].name, "Bread");
    Ok(())
}

#[tokio::test]
async fn test_pacing_waits_between_lookups() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let catalog = seeded_catalog(&temp_dir, &["Milk", "Bread", "Lemons"]).await?;
    let lookup = CountingLookup::new();

    let started = Instant::now();
    Enricher::new(&catalog, lookup.clone())
        .run(EnrichOptions {
            limit: 0,
            pacing: Duration::from_millis(40),
        })
        .await?;

    // two gaps for three lookups
    assert!(started.elapsed() >= Duration::from_millis(80));
    Ok(())
}

#[tokio::test]
async fn test_openfoodfacts_best_match_is_accepted() -> Result<()> {
    let server = MockServer::start();
    let search_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/cgi/search.pl")
            .query_param("json", "1")
            .query_param("search_terms", "Greek Yogurt");
        then.status(200).json_body(serde_json::json!({
            "products": [
                {"product_name": "Chocolate Cookies", "image_front_url": "https://img.test/cookies.jpg"},
                {"product_name": "Greek Yogurt", "image_front_small_url": "https://img.test/yogurt-small.jpg",
                 "image_front_url": "https://img.test/yogurt.jpg"},
                {"product_name": "Greek Yogurt Plain"}
            ]
        }));
    });

    let source = OpenFoodFacts::new(Client::new(), server.base_url(), Duration::from_secs(2));
    let chain = SourceChain::new(vec![Box::new(source)]);
    let image = chain.lookup("Greek Yogurt").await?.unwrap();

    search_mock.assert();
    assert_eq!(image.url, "https://img.test/yogurt-small.jpg");
    assert_eq!(image.source, ImageSourceKind::OpenFoodFacts);
    assert_eq!(image.confidence, 0.95);
    Ok(())
}

#[tokio::test]
async fn test_weak_match_falls_through_to_next_source() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/cgi/search.pl");
        then.status(200).json_body(serde_json::json!({
            "products": [
                {"product_name": "Zzz Qqq Xxx Www Vvv", "image_url": "https://img.test/unrelated.jpg"}
            ]
        }));
    });
    let wiki_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/w/api.php")
            .query_param("generator", "search")
            .query_param("gsrsearch", "Mango");
        then.status(200).json_body(serde_json::json!({
            "query": {"pages": {
                "123": {"title": "Mango", "thumbnail": {"source": "https://img.test/mango.jpg"}},
                "456": {"title": "Mango Airlines"}
            }}
        }));
    });

    let client = Client::new();
    let chain = SourceChain::new(vec![
        Box::new(OpenFoodFacts::new(client.clone(), server.base_url(), Duration::from_secs(2))),
        Box::new(Wikipedia::new(client, server.base_url(), Duration::from_secs(2))),
        Box::new(GenericKeywords),
    ]);
    let image = chain.lookup("Mango").await?.unwrap();

    wiki_mock.assert();
    assert_eq!(image.source, ImageSourceKind::Wikipedia);
    assert_eq!(image.url, "https://img.test/mango.jpg");
    assert_eq!(image.confidence, 0.8);
    Ok(())
}

#[tokio::test]
async fn test_openverse_server_errors_fall_back_to_generic() -> Result<()> {
    let server = MockServer::start();
    let openverse_mock = server.mock(|when, then| {
        when.method(GET).path("/v1/images/");
        then.status(503);
    });

    let source = Openverse::new(Client::new(), server.base_url(), Duration::from_secs(2));
    assert!(source.search("Organic Lemons 2 lb").await.is_err());

    let chain = SourceChain::new(vec![
        Box::new(Openverse::new(Client::new(), server.base_url(), Duration::from_secs(2))),
        Box::new(GenericKeywords),
    ]);
    let image = chain.lookup("Organic Lemons 2 lb").await?.unwrap();

    // one call per query variant, for each of the two searches
    openverse_mock.assert_hits(4);
    assert_eq!(image.source, ImageSourceKind::Generic);
    assert_eq!(image.confidence, 0.35);
    Ok(())
}

#[tokio::test]
async fn test_chain_from_settings_against_mock_server() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/cgi/search.pl");
        then.status(200).json_body(serde_json::json!({"products": []}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/images/");
        then.status(200).json_body(serde_json::json!({
            "results": [{"title": "Fresh Strawberries", "url": "https://img.test/strawberries.jpg"}]
        }));
    });

    let settings = EnrichSettings {
        openfoodfacts_url: server.base_url(),
        openverse_url: server.base_url(),
        wikipedia_url: server.base_url(),
        ..EnrichSettings::default()
    };
    let chain = SourceChain::from_settings(&settings)?;
    assert_eq!(chain.len(), 4);

    let temp_dir = TempDir::new()?;
    let catalog = seeded_catalog(&temp_dir, &["Strawberries"]).await?;
    let stats = Enricher::new(&catalog, chain).run(no_pacing(0)).await?;

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.by_source.get(&ImageSourceKind::Openverse), Some(&1));

    let product = catalog.product_by_key("strawberries").await?.unwrap();
    let image = product.image.unwrap();
    assert_eq!(image.url, "https://img.test/strawberries.jpg");
    assert_eq!(image.source, ImageSourceKind::Openverse);
    Ok(())
}
