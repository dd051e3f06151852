//! SQLite-backed grocery catalog.
//!
//! The schema is fixed: `stores`, `products` (unique on the normalised key) and
//! `purchases`. A single pooled connection is used; the tool never has more
//! than one writer.

use crate::domain::model::{
    CatalogCounts, ImageRef, ImageSourceKind, ParsedRow, Product, ProductSummary, Purchase,
    StoreId, StoreSummary,
};
use crate::utils::error::{GroceryError, Result};
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stores (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        canonical_key TEXT UNIQUE NOT NULL,
        display_name TEXT NOT NULL,
        origin_store_id INTEGER NOT NULL,
        size_text TEXT,
        image_url TEXT,
        image_source TEXT,
        image_confidence REAL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(origin_store_id) REFERENCES stores(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchases (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        store_id INTEGER NOT NULL,
        product_id INTEGER NOT NULL,
        source_file TEXT NOT NULL,
        raw_product_name TEXT NOT NULL,
        purchased_on TEXT NOT NULL,
        current_price REAL NOT NULL,
        original_price REAL,
        quantity REAL NOT NULL DEFAULT 1,
        notes TEXT,
        size_text TEXT,
        currency TEXT NOT NULL DEFAULT 'USD',
        imported_at TEXT NOT NULL,
        FOREIGN KEY(store_id) REFERENCES stores(id),
        FOREIGN KEY(product_id) REFERENCES products(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_purchases_store ON purchases(store_id)",
    "CREATE INDEX IF NOT EXISTS idx_purchases_product ON purchases(product_id)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the database file (and parent directories) when missing.
    CreateIfMissing,
    /// Fail with `StoreUnavailable` when the file does not exist.
    Existing,
}

#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
    path: Option<PathBuf>,
}

impl SqliteCatalog {
    pub async fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let unavailable = |reason: String| GroceryError::StoreUnavailable {
            path: path.display().to_string(),
            reason,
        };

        if mode == OpenMode::Existing && !path.is_file() {
            return Err(unavailable("database file does not exist".to_string()));
        }

        if mode == OpenMode::CreateIfMissing {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(mode == OpenMode::CreateIfMissing)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let catalog = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        catalog.migrate().await?;
        tracing::debug!("Opened catalog at {}", path.display());
        Ok(catalog)
    }

    /// Throwaway catalog for tests; lives as long as its single connection.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let catalog = Self { pool, path: None };
        catalog.migrate().await?;
        Ok(catalog)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Start an import; every row of one CSV file is written in one transaction.
    pub async fn begin_import(&self, store: StoreId, source_file: &str) -> Result<ImportSession> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO stores(name) VALUES (?)")
            .bind(store.as_str())
            .execute(&mut *tx)
            .await?;
        let store_id: i64 = sqlx::query_scalar("SELECT id FROM stores WHERE name = ?")
            .bind(store.as_str())
            .fetch_one(&mut *tx)
            .await?;

        Ok(ImportSession {
            tx,
            store_id,
            source_file: source_file.to_string(),
            imported_at: Utc::now().to_rfc3339(),
        })
    }

    pub async fn counts(&self) -> Result<CatalogCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM products) AS products,
                (SELECT COUNT(*) FROM purchases) AS purchases,
                (SELECT COUNT(*) FROM products
                    WHERE image_url IS NOT NULL AND image_url <> '') AS with_image
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogCounts {
            products: row.try_get("products")?,
            purchases: row.try_get("purchases")?,
            with_image: row.try_get("with_image")?,
        })
    }

    pub async fn products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.display_name, p.canonical_key, s.name AS store, p.size_text,
                   p.image_url, p.image_source, p.image_confidence
            FROM products p
            JOIN stores s ON s.id = p.origin_store_id
            ORDER BY p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    pub async fn product_by_key(&self, key: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.display_name, p.canonical_key, s.name AS store, p.size_text,
                   p.image_url, p.image_source, p.image_confidence
            FROM products p
            JOIN stores s ON s.id = p.origin_store_id
            WHERE p.canonical_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    /// Products with no image reference, oldest first. `limit == 0` means all.
    pub async fn products_missing_image(&self, limit: usize) -> Result<Vec<Product>> {
        let limit = if limit == 0 { -1 } else { limit as i64 };
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.display_name, p.canonical_key, s.name AS store, p.size_text,
                   p.image_url, p.image_source, p.image_confidence
            FROM products p
            JOIN stores s ON s.id = p.origin_store_id
            WHERE p.image_url IS NULL OR p.image_url = ''
            ORDER BY p.id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    /// Attach an image to a product that has none yet. Returns `false` when the
    /// product already carries an image (or does not exist); the existing
    /// reference is never overwritten.
    pub async fn set_image(&self, product_id: i64, image: &ImageRef) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET image_url = ?, image_source = ?, image_confidence = ?, updated_at = ?
            WHERE id = ? AND (image_url IS NULL OR image_url = '')
            "#,
        )
        .bind(&image.url)
        .bind(image.source.as_str())
        .bind(image.confidence)
        .bind(Utc::now().to_rfc3339())
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn purchases(&self) -> Result<Vec<Purchase>> {
        let rows = sqlx::query(
            r#"
            SELECT pu.id, pu.product_id, s.name AS store, pu.purchased_on, pu.current_price,
                   pu.original_price, pu.quantity, pu.size_text, pu.notes,
                   pu.raw_product_name, pu.source_file
            FROM purchases pu
            JOIN stores s ON s.id = pu.store_id
            ORDER BY pu.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Purchase> {
                let date: String = row.try_get("purchased_on")?;
                Ok(Purchase {
                    id: row.try_get("id")?,
                    product_id: row.try_get("product_id")?,
                    store: parse_store(row)?,
                    date: parse_date(&date)?,
                    price: row.try_get("current_price")?,
                    original_price: row.try_get("original_price")?,
                    quantity: row.try_get("quantity")?,
                    size_text: row.try_get("size_text")?,
                    notes: row.try_get("notes")?,
                    raw_product_name: row.try_get("raw_product_name")?,
                    source_file: row.try_get("source_file")?,
                })
            })
            .collect()
    }

    pub async fn product_summaries(&self) -> Result<Vec<ProductSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.display_name, p.canonical_key, s.name AS store, p.size_text,
                   p.image_url, p.image_source, p.image_confidence,
                   COUNT(pu.id) AS purchase_count,
                   MIN(pu.current_price) AS min_price,
                   MAX(pu.current_price) AS max_price,
                   MAX(pu.purchased_on) AS last_purchased,
                   (SELECT x.current_price FROM purchases x
                     WHERE x.product_id = p.id
                     ORDER BY x.purchased_on DESC, x.id DESC
                     LIMIT 1) AS last_price
            FROM products p
            JOIN stores s ON s.id = p.origin_store_id
            LEFT JOIN purchases pu ON pu.product_id = p.id
            GROUP BY p.id
            ORDER BY p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ProductSummary> {
                Ok(ProductSummary {
                    id: row.try_get("id")?,
                    name: row.try_get("display_name")?,
                    key: row.try_get("canonical_key")?,
                    store: row.try_get("store")?,
                    size_text: row.try_get("size_text")?,
                    image_url: row
                        .try_get::<Option<String>, _>("image_url")?
                        .filter(|url| !url.is_empty()),
                    image_source: row.try_get("image_source")?,
                    image_confidence: row.try_get("image_confidence")?,
                    purchase_count: row.try_get("purchase_count")?,
                    last_price: row.try_get("last_price")?,
                    min_price: row.try_get("min_price")?,
                    max_price: row.try_get("max_price")?,
                    last_purchased: row.try_get("last_purchased")?,
                })
            })
            .collect()
    }

    pub async fn store_summaries(&self) -> Result<Vec<StoreSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.name AS store,
                   COUNT(pu.id) AS purchase_count,
                   COUNT(DISTINCT pu.product_id) AS product_count
            FROM stores s
            LEFT JOIN purchases pu ON pu.store_id = s.id
            GROUP BY s.id
            ORDER BY s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<StoreSummary> {
                Ok(StoreSummary {
                    store: row.try_get("store")?,
                    purchase_count: row.try_get("purchase_count")?,
                    product_count: row.try_get("product_count")?,
                })
            })
            .collect()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Writes for one CSV import. Dropping the session without `commit` rolls
/// everything back.
pub struct ImportSession {
    tx: Transaction<'static, Sqlite>,
    store_id: i64,
    source_file: String,
    imported_at: String,
}

impl ImportSession {
    /// Find the product for `row.key`, creating it when absent. Returns the id
    /// and whether it was created.
    pub async fn resolve_product(&mut self, row: &ParsedRow) -> Result<(i64, bool)> {
        let existing = sqlx::query("SELECT id, size_text FROM products WHERE canonical_key = ?")
            .bind(&row.key)
            .fetch_optional(&mut *self.tx)
            .await?;

        if let Some(existing) = existing {
            let id: i64 = existing.try_get("id")?;
            let size: Option<String> = existing.try_get("size_text")?;
            if size.is_none() && row.size_text.is_some() {
                sqlx::query("UPDATE products SET size_text = ?, updated_at = ? WHERE id = ?")
                    .bind(&row.size_text)
                    .bind(&self.imported_at)
                    .bind(id)
                    .execute(&mut *self.tx)
                    .await?;
            }
            return Ok((id, false));
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (canonical_key, display_name, origin_store_id, size_text,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&row.key)
        .bind(&row.raw_name)
        .bind(self.store_id)
        .bind(&row.size_text)
        .bind(&self.imported_at)
        .bind(&self.imported_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok((id, true))
    }

    /// Natural-key check used by `DedupPolicy::NaturalKey`.
    pub async fn purchase_exists(&mut self, product_id: i64, row: &ParsedRow) -> Result<bool> {
        let found = sqlx::query(
            r#"
            SELECT 1 FROM purchases
            WHERE store_id = ? AND product_id = ? AND source_file = ? AND raw_product_name = ?
              AND purchased_on = ?
              AND current_price = ?
              AND IFNULL(original_price, -1) = IFNULL(?, -1)
              AND IFNULL(size_text, '') = IFNULL(?, '')
            LIMIT 1
            "#,
        )
        .bind(self.store_id)
        .bind(product_id)
        .bind(&self.source_file)
        .bind(&row.raw_name)
        .bind(format_date(row.date))
        .bind(row.price)
        .bind(row.original_price)
        .bind(&row.size_text)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(found.is_some())
    }

    pub async fn insert_purchase(&mut self, product_id: i64, row: &ParsedRow) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO purchases (
                store_id, product_id, source_file, raw_product_name, purchased_on,
                current_price, original_price, quantity, notes, size_text, imported_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(self.store_id)
        .bind(product_id)
        .bind(&self.source_file)
        .bind(&row.raw_name)
        .bind(format_date(row.date))
        .bind(row.price)
        .bind(row.original_price)
        .bind(row.quantity)
        .bind(&row.notes)
        .bind(&row.size_text)
        .bind(&self.imported_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| GroceryError::ValidationError {
        message: format!("stored purchase date '{}' is invalid: {}", text, e),
    })
}

fn parse_store(row: &SqliteRow) -> Result<StoreId> {
    let name: String = row.try_get("store")?;
    name.parse()
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    let image_url: Option<String> = row.try_get("image_url")?;
    let image_source: Option<String> = row.try_get("image_source")?;
    let confidence: Option<f64> = row.try_get("image_confidence")?;

    let image = match (image_url, image_source.as_deref().and_then(ImageSourceKind::parse)) {
        (Some(url), Some(source)) if !url.is_empty() => Some(ImageRef {
            url,
            source,
            confidence: confidence.unwrap_or(0.0),
        }),
        _ => None,
    };

    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("display_name")?,
        key: row.try_get("canonical_key")?,
        store: parse_store(row)?,
        size_text: row.try_get("size_text")?,
        image,
    })
}
