//! External image lookups: OpenFoodFacts, Openverse, Wikipedia thumbnails
//! and a fixed keyword table as last resort.

use crate::config::toml_config::EnrichSettings;
use crate::core::normalize::{match_score, query_variants, search_name, similarity};
use crate::domain::model::{ImageRef, ImageSourceKind};
use crate::domain::ports::{Candidate, ImageLookup, ImageSource};
use crate::utils::error::{GroceryError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Acceptance threshold and confidence mapping for one source:
/// `confidence = min(cap, base + slope * score)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptRule {
    pub min_score: f64,
    pub base: f64,
    pub slope: f64,
    pub cap: f64,
}

impl AcceptRule {
    pub fn confidence(&self, score: f64) -> Option<f64> {
        if score < self.min_score {
            return None;
        }
        let raw = (self.base + self.slope * score).min(self.cap);
        Some((raw * 1000.0).round() / 1000.0)
    }
}

pub const OPENFOODFACTS_RULE: AcceptRule = AcceptRule {
    min_score: 0.42,
    base: 0.55,
    slope: 0.4,
    cap: 0.95,
};

pub const OPENVERSE_RULE: AcceptRule = AcceptRule {
    min_score: 0.33,
    base: 0.38,
    slope: 0.35,
    cap: 0.82,
};

pub const WIKIPEDIA_RULE: AcceptRule = AcceptRule {
    min_score: 0.45,
    base: 0.45,
    slope: 0.35,
    cap: 0.85,
};

pub const GENERIC_CONFIDENCE: f64 = 0.35;

/// Keep the higher-scoring candidate.
fn keep_best(best: &mut Option<Candidate>, candidate: Candidate) {
    if best.as_ref().map_or(true, |b| candidate.score > b.score) {
        *best = Some(candidate);
    }
}

/// Run `fetch` for every query variant, tolerating per-variant failures. Errors
/// only when every variant failed.
async fn search_variants<F, Fut>(
    kind: ImageSourceKind,
    product_name: &str,
    mut fetch: F,
) -> Result<Option<Candidate>>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<(String, String)>>>,
{
    let mut best = None;
    let mut last_error = None;
    let mut any_ok = false;

    for variant in query_variants(product_name) {
        match fetch(variant.clone()).await {
            Ok(hits) => {
                any_ok = true;
                for (title, url) in hits {
                    let score = match_score(product_name, &title);
                    keep_best(
                        &mut best,
                        Candidate {
                            url,
                            matched_name: title,
                            score,
                        },
                    );
                }
            }
            Err(e) => {
                tracing::debug!("{} query '{}' failed: {}", kind, variant, e);
                last_error = Some(e);
            }
        }
    }

    match (any_ok, last_error) {
        (false, Some(e)) => Err(e),
        _ => Ok(best),
    }
}

#[derive(Debug, Deserialize)]
struct OffSearchResponse {
    #[serde(default)]
    products: Vec<OffProduct>,
}

#[derive(Debug, Deserialize)]
struct OffProduct {
    product_name: Option<String>,
    image_front_small_url: Option<String>,
    image_front_url: Option<String>,
    image_url: Option<String>,
}

pub struct OpenFoodFacts {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OpenFoodFacts {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    async fn fetch(&self, query: String) -> Result<Vec<(String, String)>> {
        let url = format!("{}/cgi/search.pl", self.base_url.trim_end_matches('/'));
        let response: OffSearchResponse = self
            .client
            .get(url)
            .query(&[
                ("search_terms", query.as_str()),
                ("search_simple", "1"),
                ("action", "process"),
                ("json", "1"),
                ("page_size", "8"),
            ])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .products
            .into_iter()
            .filter_map(|p| {
                let name = p.product_name.map(|n| n.trim().to_string())?;
                let image = p.image_front_small_url.or(p.image_front_url).or(p.image_url)?;
                (!name.is_empty()).then_some((name, image))
            })
            .collect())
    }
}

#[async_trait]
impl ImageSource for OpenFoodFacts {
    fn kind(&self) -> ImageSourceKind {
        ImageSourceKind::OpenFoodFacts
    }

    async fn search(&self, product_name: &str) -> Result<Option<Candidate>> {
        search_variants(self.kind(), product_name, |q| self.fetch(q)).await
    }

    fn accept(&self, candidate: &Candidate) -> Option<f64> {
        OPENFOODFACTS_RULE.confidence(candidate.score)
    }
}

#[derive(Debug, Deserialize)]
struct OpenverseResponse {
    #[serde(default)]
    results: Vec<OpenverseImage>,
}

#[derive(Debug, Deserialize)]
struct OpenverseImage {
    title: Option<String>,
    url: Option<String>,
}

pub struct Openverse {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl Openverse {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    async fn fetch(&self, query: String) -> Result<Vec<(String, String)>> {
        let url = format!("{}/v1/images/", self.base_url.trim_end_matches('/'));
        let response: OpenverseResponse = self
            .client
            .get(url)
            .query(&[
                ("q", query.as_str()),
                ("page_size", "8"),
                ("license_type", "commercial"),
                ("extension", "jpg"),
                ("extension", "jpeg"),
                ("extension", "png"),
            ])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .results
            .into_iter()
            .filter_map(|item| {
                let title = item.title.map(|t| t.trim().to_string())?;
                let url = item.url?;
                (!title.is_empty() && !url.is_empty()).then_some((title, url))
            })
            .collect())
    }
}

#[async_trait]
impl ImageSource for Openverse {
    fn kind(&self) -> ImageSourceKind {
        ImageSourceKind::Openverse
    }

    async fn search(&self, product_name: &str) -> Result<Option<Candidate>> {
        search_variants(self.kind(), product_name, |q| self.fetch(q)).await
    }

    fn accept(&self, candidate: &Candidate) -> Option<f64> {
        OPENVERSE_RULE.confidence(candidate.score)
    }
}

#[derive(Debug, Deserialize)]
struct WikiResponse {
    query: Option<WikiQuery>,
}

#[derive(Debug, Deserialize)]
struct WikiQuery {
    #[serde(default)]
    pages: HashMap<String, WikiPage>,
}

#[derive(Debug, Deserialize)]
struct WikiPage {
    #[serde(default)]
    title: String,
    thumbnail: Option<WikiThumbnail>,
}

#[derive(Debug, Deserialize)]
struct WikiThumbnail {
    source: Option<String>,
}

/// Page thumbnails from the MediaWiki search generator. Only the raw product
/// name is queried, and titles are scored without normalisation.
pub struct Wikipedia {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl Wikipedia {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ImageSource for Wikipedia {
    fn kind(&self) -> ImageSourceKind {
        ImageSourceKind::Wikipedia
    }

    async fn search(&self, product_name: &str) -> Result<Option<Candidate>> {
        let url = format!("{}/w/api.php", self.base_url.trim_end_matches('/'));
        let response: WikiResponse = self
            .client
            .get(url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("generator", "search"),
                ("gsrlimit", "3"),
                ("prop", "pageimages|info"),
                ("inprop", "url"),
                ("piprop", "thumbnail"),
                ("pithumbsize", "400"),
                ("gsrsearch", product_name),
            ])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut best = None;
        let pages = response.query.map(|q| q.pages).unwrap_or_default();
        for page in pages.into_values() {
            let Some(url) = page.thumbnail.and_then(|t| t.source) else {
                continue;
            };
            let score = similarity(product_name, &page.title);
            keep_best(
                &mut best,
                Candidate {
                    url,
                    matched_name: page.title,
                    score,
                },
            );
        }
        Ok(best)
    }

    fn accept(&self, candidate: &Candidate) -> Option<f64> {
        WIKIPEDIA_RULE.confidence(candidate.score)
    }
}

const GENERIC_KEYWORD_IMAGES: &[(&str, &str)] = &[
    ("banana", "https://upload.wikimedia.org/wikipedia/commons/8/8a/Banana-Single.jpg"),
    ("apple", "https://upload.wikimedia.org/wikipedia/commons/1/15/Red_Apple.jpg"),
    ("tomato", "https://upload.wikimedia.org/wikipedia/commons/8/89/Tomato_je.jpg"),
    ("onion", "https://upload.wikimedia.org/wikipedia/commons/2/25/Onion_on_White.JPG"),
    ("potato", "https://upload.wikimedia.org/wikipedia/commons/6/60/Patates.jpg"),
    ("cucumber", "https://upload.wikimedia.org/wikipedia/commons/9/96/ARS_cucumber.jpg"),
    ("bell pepper", "https://upload.wikimedia.org/wikipedia/commons/8/85/Assorted_peppers.jpg"),
    ("pepper", "https://upload.wikimedia.org/wikipedia/commons/8/85/Assorted_peppers.jpg"),
    ("strawberry", "https://upload.wikimedia.org/wikipedia/commons/2/29/PerfectStrawberry.jpg"),
    ("blueberries", "https://upload.wikimedia.org/wikipedia/commons/1/13/Blueberries.jpg"),
    ("blueberry", "https://upload.wikimedia.org/wikipedia/commons/1/13/Blueberries.jpg"),
    ("avocado", "https://upload.wikimedia.org/wikipedia/commons/c/c9/Avocado_Hass_-_single_and_halved.jpg"),
    ("lemon", "https://upload.wikimedia.org/wikipedia/commons/c/c6/Lemon-Whole-Split.jpg"),
    ("orange", "https://upload.wikimedia.org/wikipedia/commons/c/c4/Orange-Fruit-Pieces.jpg"),
    ("cilantro", "https://upload.wikimedia.org/wikipedia/commons/2/2f/Coriandrum_sativum_-_K%C3%B6hler%E2%80%93s_Medizinal-Pflanzen-193.jpg"),
    ("parsley", "https://upload.wikimedia.org/wikipedia/commons/0/0f/Petroselinum_crispum2.jpg"),
    ("carrot", "https://upload.wikimedia.org/wikipedia/commons/7/70/Carrot_on_White.JPG"),
    ("eggplant", "https://upload.wikimedia.org/wikipedia/commons/f/fb/Aubergine.jpg"),
    ("squash", "https://upload.wikimedia.org/wikipedia/commons/5/59/Cucurbita_moschata_Butternut_20051011_203.jpg"),
    ("chayote", "https://upload.wikimedia.org/wikipedia/commons/f/f1/Chayote_BNC.jpg"),
    ("grapes", "https://upload.wikimedia.org/wikipedia/commons/b/bb/Table_grapes_on_white.jpg"),
    ("mango", "https://upload.wikimedia.org/wikipedia/commons/9/90/Hapus_Mango.jpg"),
    ("corn", "https://upload.wikimedia.org/wikipedia/commons/7/72/Maize_stalk.jpg"),
    ("milk", "https://upload.wikimedia.org/wikipedia/commons/a/a4/Milk_glass.jpg"),
    ("bread", "https://upload.wikimedia.org/wikipedia/commons/d/d1/Loaf_of_bread.jpg"),
    ("cheese", "https://upload.wikimedia.org/wikipedia/commons/4/44/Cheese_platter.jpg"),
    ("yogurt", "https://upload.wikimedia.org/wikipedia/commons/3/37/Yogurt.jpg"),
    ("butter", "https://upload.wikimedia.org/wikipedia/commons/0/0e/Butter_on_spoon.jpg"),
    ("rice", "https://upload.wikimedia.org/wikipedia/commons/6/6f/Rice_grains_%28IRRI%29.jpg"),
    ("pasta", "https://upload.wikimedia.org/wikipedia/commons/4/4f/Fusilli_pasta.jpg"),
    ("tortilla", "https://upload.wikimedia.org/wikipedia/commons/2/2c/Flour_tortillas.jpg"),
    ("beans", "https://upload.wikimedia.org/wikipedia/commons/5/5f/Black_beans.jpg"),
    ("shrimp", "https://upload.wikimedia.org/wikipedia/commons/8/82/Shrimps.jpg"),
    ("tuna", "https://upload.wikimedia.org/wikipedia/commons/d/d7/Thunnus_albacares.jpg"),
    ("chicken", "https://upload.wikimedia.org/wikipedia/commons/3/32/Chicken_breast.png"),
    ("beef", "https://upload.wikimedia.org/wikipedia/commons/9/91/Raw_beef.png"),
    ("pork", "https://upload.wikimedia.org/wikipedia/commons/0/01/Pork_meat.jpg"),
    ("honey", "https://upload.wikimedia.org/wikipedia/commons/5/52/Honey_%28food%29.jpg"),
    ("vinegar", "https://upload.wikimedia.org/wikipedia/commons/0/06/White_vinegar.jpg"),
    ("kombucha", "https://upload.wikimedia.org/wikipedia/commons/3/3e/Kombucha_Mature.jpg"),
    ("salt", "https://upload.wikimedia.org/wikipedia/commons/5/5d/Salt_shaker_on_white_background.jpg"),
    ("sugar", "https://upload.wikimedia.org/wikipedia/commons/7/70/Sugar_cubes.jpg"),
];

/// Offline fallback: a stock photo for common produce and staples, matched by
/// substring on the cleaned product name. Table order matters ("bell pepper"
/// before "pepper").
pub struct GenericKeywords;

#[async_trait]
impl ImageSource for GenericKeywords {
    fn kind(&self) -> ImageSourceKind {
        ImageSourceKind::Generic
    }

    async fn search(&self, product_name: &str) -> Result<Option<Candidate>> {
        let cleaned = search_name(product_name);
        Ok(GENERIC_KEYWORD_IMAGES
            .iter()
            .find(|(keyword, _)| cleaned.contains(keyword))
            .map(|(keyword, url)| Candidate {
                url: url.to_string(),
                matched_name: keyword.to_string(),
                score: GENERIC_CONFIDENCE,
            }))
    }

    fn accept(&self, _candidate: &Candidate) -> Option<f64> {
        Some(GENERIC_CONFIDENCE)
    }
}

/// Sources tried in order; the first accepted candidate wins.
pub struct SourceChain {
    sources: Vec<Box<dyn ImageSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn ImageSource>>) -> Self {
        Self { sources }
    }

    /// Build the configured sources, in configured order, sharing one client.
    pub fn from_settings(settings: &EnrichSettings) -> Result<Self> {
        let client = Client::builder().user_agent(&settings.user_agent).build()?;

        let sources = settings
            .sources
            .iter()
            .map(|kind| -> Box<dyn ImageSource> {
                match kind {
                    ImageSourceKind::OpenFoodFacts => Box::new(OpenFoodFacts::new(
                        client.clone(),
                        settings.openfoodfacts_url.as_str(),
                        settings.timeout(),
                    )),
                    ImageSourceKind::Openverse => Box::new(Openverse::new(
                        client.clone(),
                        settings.openverse_url.as_str(),
                        settings.openverse_timeout(),
                    )),
                    ImageSourceKind::Wikipedia => Box::new(Wikipedia::new(
                        client.clone(),
                        settings.wikipedia_url.as_str(),
                        settings.timeout(),
                    )),
                    ImageSourceKind::Generic => Box::new(GenericKeywords),
                }
            })
            .collect();

        Ok(Self::new(sources))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl ImageLookup for SourceChain {
    async fn lookup(&self, product_name: &str) -> Result<Option<ImageRef>> {
        let mut failures = Vec::new();

        for source in &self.sources {
            match source.search(product_name).await {
                Ok(Some(candidate)) => match source.accept(&candidate) {
                    Some(confidence) => {
                        tracing::debug!(
                            "{} matched '{}' as '{}' (score {:.3})",
                            source.kind(),
                            product_name,
                            candidate.matched_name,
                            candidate.score
                        );
                        return Ok(Some(ImageRef {
                            url: candidate.url,
                            source: source.kind(),
                            confidence,
                        }));
                    }
                    None => tracing::debug!(
                        "{} best match for '{}' too weak (score {:.3})",
                        source.kind(),
                        product_name,
                        candidate.score
                    ),
                },
                Ok(None) => {}
                Err(e) => failures.push(format!("{}: {}", source.kind(), e)),
            }
        }

        if !failures.is_empty() && failures.len() == self.sources.len() {
            return Err(GroceryError::LookupError {
                message: failures.join("; "),
            });
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_rule_threshold_and_cap() {
        assert_eq!(OPENFOODFACTS_RULE.confidence(0.41), None);
        assert_eq!(OPENFOODFACTS_RULE.confidence(0.5), Some(0.75));
        assert_eq!(OPENFOODFACTS_RULE.confidence(1.0), Some(0.95));
        assert_eq!(OPENVERSE_RULE.confidence(1.0), Some(0.73));
        assert_eq!(WIKIPEDIA_RULE.confidence(1.0), Some(0.8));
    }

    #[test]
    fn test_brand_prefixed_title_is_accepted() {
        let score = match_score("Whole Milk", "Kroger Whole Milk Vitamin D");
        assert_eq!(OPENFOODFACTS_RULE.confidence(score), Some(0.766));
    }

    #[tokio::test]
    async fn test_generic_keywords_prefers_longer_keyword() {
        let hit = GenericKeywords
            .search("Red Bell Pepper 1 ea")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.matched_name, "bell pepper");

        let miss = GenericKeywords.search("Dish Soap").await.unwrap();
        assert!(miss.is_none());
    }

    struct Failing;

    #[async_trait]
    impl ImageSource for Failing {
        fn kind(&self) -> ImageSourceKind {
            ImageSourceKind::Openverse
        }

        async fn search(&self, _product_name: &str) -> Result<Option<Candidate>> {
            Err(GroceryError::LookupError {
                message: "offline".to_string(),
            })
        }

        fn accept(&self, _candidate: &Candidate) -> Option<f64> {
            None
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_generic() {
        let chain = SourceChain::new(vec![Box::new(Failing), Box::new(GenericKeywords)]);
        let image = chain.lookup("Hass Avocado").await.unwrap().unwrap();
        assert_eq!(image.source, ImageSourceKind::Generic);
        assert_eq!(image.confidence, GENERIC_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_chain_reports_error_when_every_source_fails() {
        let chain = SourceChain::new(vec![Box::new(Failing)]);
        assert!(chain.lookup("Hass Avocado").await.is_err());

        let empty = SourceChain::new(vec![]);
        assert!(empty.is_empty());
        assert_eq!(empty.lookup("Hass Avocado").await.unwrap(), None);
    }
}
