use crate::adapters::sqlite::{ImportSession, SqliteCatalog};
use crate::core::normalize;
use crate::domain::model::{DedupPolicy, ParsedRow, RowOutcome, SkipReason, StoreId};
use crate::utils::error::{GroceryError, Result};
use crate::utils::validation::{validate_non_empty_list, Validate};
use chrono::{Datelike, NaiveDate, Utc};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];

/// Column aliases for one vendor's export. The first alias present in the
/// header wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorLayout {
    pub name: Vec<String>,
    pub price: Vec<String>,
    #[serde(default)]
    pub size: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub date: Vec<String>,
    #[serde(default)]
    pub quantity: Vec<String>,
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl VendorLayout {
    pub fn for_store(store: StoreId) -> Self {
        match store {
            StoreId::Frys => Self {
                name: columns(&["Producto"]),
                price: columns(&["Precio", "Precio Actual"]),
                size: columns(&["Tamaño/Cantidad", "Tamaño / Cantidad"]),
                notes: columns(&["Precio Original / Notas"]),
                date: columns(&["Fecha"]),
                quantity: columns(&["Cantidad"]),
            },
            StoreId::Sprouts => Self {
                name: columns(&["Producto"]),
                price: columns(&["Precio Actual", "Precio"]),
                size: columns(&["Tamaño / Cantidad", "Tamaño/Cantidad"]),
                notes: columns(&["Precio Original / Notas"]),
                date: columns(&["Fecha"]),
                quantity: columns(&["Cantidad"]),
            },
        }
    }

    /// Map the layout onto a concrete header row.
    pub fn resolve(&self, headers: &StringRecord) -> Result<ColumnIndex> {
        let headers: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();
        let find = |aliases: &[String]| {
            aliases.iter().find_map(|alias| {
                let alias = alias.trim().to_lowercase();
                headers.iter().position(|h| *h == alias)
            })
        };

        let name = find(&self.name).ok_or_else(|| GroceryError::LayoutError {
            message: format!("no product name column (expected one of {:?})", self.name),
        })?;
        let price = find(&self.price).ok_or_else(|| GroceryError::LayoutError {
            message: format!("no price column (expected one of {:?})", self.price),
        })?;

        Ok(ColumnIndex {
            name,
            price,
            size: find(&self.size),
            notes: find(&self.notes),
            date: find(&self.date),
            quantity: find(&self.quantity),
        })
    }
}

impl Validate for VendorLayout {
    fn validate(&self) -> Result<()> {
        validate_non_empty_list("vendors.name", &self.name)?;
        validate_non_empty_list("vendors.price", &self.price)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    pub name: usize,
    pub price: usize,
    pub size: Option<usize>,
    pub notes: Option<usize>,
    pub date: Option<usize>,
    pub quantity: Option<usize>,
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `%Y` also accepts a two-digit year, so short years are rejected there and
/// left for `%y`.
fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(text, fmt)
            .ok()
            .filter(|date| date.year() >= 1000)
    })
}

/// Validate one CSV record into a typed row. `default_date` is used when the
/// export has no date column or the cell is blank.
pub fn parse_row(
    record: &StringRecord,
    columns: &ColumnIndex,
    default_date: NaiveDate,
) -> std::result::Result<ParsedRow, SkipReason> {
    let raw_name = cell(record, Some(columns.name)).ok_or(SkipReason::MissingName)?;
    let key = normalize::product_key(raw_name);
    if key.is_empty() {
        return Err(SkipReason::MissingName);
    }

    let price_text = cell(record, Some(columns.price)).unwrap_or_default();
    let price = normalize::parse_price(price_text).ok_or(SkipReason::MissingPrice)?;

    let date = match cell(record, columns.date) {
        Some(text) => parse_date(text).ok_or_else(|| SkipReason::InvalidDate(text.to_string()))?,
        None => default_date,
    };

    let quantity = match cell(record, columns.quantity) {
        Some(text) => normalize::parse_quantity(text)
            .ok_or_else(|| SkipReason::InvalidQuantity(text.to_string()))?,
        None => 1.0,
    };

    let notes_text = cell(record, columns.notes);
    let original_price = notes_text.and_then(normalize::parse_price);
    let notes = match notes_text {
        Some(text) => Some(text.to_string()),
        None if normalize::is_estimate(price_text) => Some(price_text.to_string()),
        None => None,
    };

    Ok(ParsedRow {
        raw_name: raw_name.to_string(),
        key,
        size_text: cell(record, columns.size).map(str::to_string),
        price,
        original_price,
        notes,
        quantity,
        date,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub rows_read: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub new_products: usize,
    pub skip_reasons: BTreeMap<&'static str, usize>,
}

impl ImportStats {
    pub fn record(&mut self, outcome: &RowOutcome) {
        self.rows_read += 1;
        match outcome {
            RowOutcome::Imported { new_product, .. } => {
                self.imported += 1;
                if *new_product {
                    self.new_products += 1;
                }
            }
            RowOutcome::Duplicate { .. } => self.duplicates += 1,
            RowOutcome::Skipped(reason) => {
                self.skipped += 1;
                *self.skip_reasons.entry(reason.label()).or_insert(0) += 1;
            }
        }
    }
}

pub struct CsvImporter<'a> {
    catalog: &'a SqliteCatalog,
    layout: VendorLayout,
    policy: DedupPolicy,
}

impl<'a> CsvImporter<'a> {
    pub fn new(catalog: &'a SqliteCatalog, layout: VendorLayout) -> Self {
        Self {
            catalog,
            layout,
            policy: DedupPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DedupPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Import one vendor export. Bad rows are skipped and counted; only an
    /// unreadable file, a header that does not match the layout or a store
    /// failure aborts the run (and rolls back every row of it).
    pub async fn import(&self, csv_path: &Path, store: StoreId) -> Result<ImportStats> {
        let file = File::open(csv_path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::None)
            .from_reader(file);

        let columns = self.layout.resolve(reader.headers()?)?;
        tracing::debug!("Resolved columns for {}: {:?}", store, columns);

        let source_file = csv_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| csv_path.display().to_string());
        let today = Utc::now().date_naive();

        let mut session = self.catalog.begin_import(store, &source_file).await?;
        let mut stats = ImportStats::default();

        for (index, record) in reader.records().enumerate() {
            // header is line 1
            let line = index + 2;
            let outcome = match record {
                Ok(record) => match parse_row(&record, &columns, today) {
                    Ok(row) => self.write_row(&mut session, &row).await?,
                    Err(reason) => RowOutcome::Skipped(reason),
                },
                Err(e) => RowOutcome::Skipped(SkipReason::Unreadable(e.to_string())),
            };

            if let RowOutcome::Skipped(reason) = &outcome {
                tracing::warn!("⚠️ Skipping line {} of {}: {}", line, source_file, reason);
            }
            stats.record(&outcome);
        }

        session.commit().await?;

        tracing::info!(
            "📥 Imported {} from {}: {} rows read, {} imported, {} duplicates, {} skipped",
            store,
            source_file,
            stats.rows_read,
            stats.imported,
            stats.duplicates,
            stats.skipped
        );
        Ok(stats)
    }

    async fn write_row(&self, session: &mut ImportSession, row: &ParsedRow) -> Result<RowOutcome> {
        let (product_id, new_product) = session.resolve_product(row).await?;

        if self.policy == DedupPolicy::NaturalKey
            && !new_product
            && session.purchase_exists(product_id, row).await?
        {
            tracing::debug!("Purchase of '{}' already recorded", row.raw_name);
            return Ok(RowOutcome::Duplicate { product_id });
        }

        session.insert_purchase(product_id, row).await?;
        Ok(RowOutcome::Imported {
            product_id,
            new_product,
        })
    }
}
