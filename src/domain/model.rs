use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::GroceryError;

/// The vendors whose CSV exports we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreId {
    Frys,
    Sprouts,
}

impl StoreId {
    pub const ALL: [StoreId; 2] = [StoreId::Frys, StoreId::Sprouts];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Frys => "frys",
            StoreId::Sprouts => "sprouts",
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreId {
    type Err = GroceryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "frys" | "fry's" => Ok(StoreId::Frys),
            "sprouts" => Ok(StoreId::Sprouts),
            other => Err(GroceryError::InvalidConfigValueError {
                field: "store".to_string(),
                value: other.to_string(),
                reason: "Known stores: frys, sprouts".to_string(),
            }),
        }
    }
}

/// Where an image reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSourceKind {
    OpenFoodFacts,
    Openverse,
    Wikipedia,
    Generic,
}

impl ImageSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSourceKind::OpenFoodFacts => "openfoodfacts",
            ImageSourceKind::Openverse => "openverse",
            ImageSourceKind::Wikipedia => "wikipedia",
            ImageSourceKind::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openfoodfacts" => Some(ImageSourceKind::OpenFoodFacts),
            "openverse" => Some(ImageSourceKind::Openverse),
            "wikipedia" => Some(ImageSourceKind::Wikipedia),
            "generic" => Some(ImageSourceKind::Generic),
            _ => None,
        }
    }
}

impl fmt::Display for ImageSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub source: ImageSourceKind,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub key: String,
    pub store: StoreId,
    pub size_text: Option<String>,
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Purchase {
    pub id: i64,
    pub product_id: i64,
    pub store: StoreId,
    pub date: NaiveDate,
    pub price: f64,
    pub original_price: Option<f64>,
    pub quantity: f64,
    pub size_text: Option<String>,
    pub notes: Option<String>,
    pub raw_product_name: String,
    pub source_file: String,
}

/// A CSV row that passed validation and is ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub raw_name: String,
    pub key: String,
    pub size_text: Option<String>,
    pub price: f64,
    pub original_price: Option<f64>,
    pub notes: Option<String>,
    pub quantity: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingName,
    MissingPrice,
    InvalidDate(String),
    InvalidQuantity(String),
    Unreadable(String),
}

impl SkipReason {
    /// Stable label used when aggregating skip counts.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::MissingName => "missing_name",
            SkipReason::MissingPrice => "missing_price",
            SkipReason::InvalidDate(_) => "invalid_date",
            SkipReason::InvalidQuantity(_) => "invalid_quantity",
            SkipReason::Unreadable(_) => "unreadable",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingName => f.write_str("product name is empty"),
            SkipReason::MissingPrice => f.write_str("price is missing or not a $ amount"),
            SkipReason::InvalidDate(v) => write!(f, "unrecognised date '{}'", v),
            SkipReason::InvalidQuantity(v) => write!(f, "unrecognised quantity '{}'", v),
            SkipReason::Unreadable(msg) => write!(f, "row could not be read: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Imported { product_id: i64, new_product: bool },
    Duplicate { product_id: i64 },
    Skipped(SkipReason),
}

/// Whether re-importing the same purchase should insert it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Skip rows whose purchase already exists for the same source file.
    #[default]
    NaturalKey,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CatalogCounts {
    pub products: i64,
    pub purchases: i64,
    pub with_image: i64,
}

impl CatalogCounts {
    pub fn coverage(&self) -> f64 {
        if self.products == 0 {
            0.0
        } else {
            self.with_image as f64 / self.products as f64
        }
    }
}

/// The document consumed by the static dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub generated_at: DateTime<Utc>,
    pub summary: DatasetSummary,
    pub products: Vec<ProductSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub product_count: i64,
    pub purchase_count: i64,
    pub with_image: i64,
    pub image_coverage: f64,
    pub stores: Vec<StoreSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub store: String,
    pub purchase_count: i64,
    pub product_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub key: String,
    pub store: String,
    pub size_text: Option<String>,
    pub image_url: Option<String>,
    pub image_source: Option<String>,
    pub image_confidence: Option<f64>,
    pub purchase_count: i64,
    pub last_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub last_purchased: Option<String>,
}
