use crate::core::importer::VendorLayout;
use crate::domain::model::{ImageSourceKind, StoreId};
use crate::utils::error::{GroceryError, Result};
use crate::utils::validation::{validate_path, validate_range, validate_url, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub vendors: VendorSettings,
    pub enrich: EnrichSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "data/grocery.db".to_string(),
        }
    }
}

/// Per-vendor column overrides; unset vendors use the built-in layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorSettings {
    pub frys: Option<VendorLayout>,
    pub sprouts: Option<VendorLayout>,
}

impl VendorSettings {
    pub fn layout(&self, store: StoreId) -> VendorLayout {
        let configured = match store {
            StoreId::Frys => &self.frys,
            StoreId::Sprouts => &self.sprouts,
        };
        configured
            .clone()
            .unwrap_or_else(|| VendorLayout::for_store(store))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichSettings {
    pub limit: usize,
    pub sleep_ms: u64,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub openverse_timeout_secs: u64,
    pub sources: Vec<ImageSourceKind>,
    pub openfoodfacts_url: String,
    pub openverse_url: String,
    pub wikipedia_url: String,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            limit: 0,
            sleep_ms: 120,
            user_agent: concat!("grocery-etl/", env!("CARGO_PKG_VERSION"), " (personal grocery catalog)")
                .to_string(),
            timeout_secs: 4,
            openverse_timeout_secs: 8,
            sources: vec![
                ImageSourceKind::OpenFoodFacts,
                ImageSourceKind::Openverse,
                ImageSourceKind::Wikipedia,
                ImageSourceKind::Generic,
            ],
            openfoodfacts_url: "https://world.openfoodfacts.org".to_string(),
            openverse_url: "https://api.openverse.org".to_string(),
            wikipedia_url: "https://en.wikipedia.org".to_string(),
        }
    }
}

impl EnrichSettings {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn openverse_timeout(&self) -> Duration {
        Duration::from_secs(self.openverse_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub site_dir: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            site_dir: "site".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| GroceryError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse settings, expanding `${VAR}` from the environment first.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| GroceryError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| GroceryError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_path("database.path", &self.database.path)?;
        validate_path("export.site_dir", &self.export.site_dir)?;

        for store in StoreId::ALL {
            self.vendors.layout(store).validate()?;
        }

        let enrich = &self.enrich;
        validate_range("enrich.timeout_secs", enrich.timeout_secs, 1, 120)?;
        validate_range(
            "enrich.openverse_timeout_secs",
            enrich.openverse_timeout_secs,
            1,
            120,
        )?;
        validate_range("enrich.sleep_ms", enrich.sleep_ms, 0, 60_000)?;

        if enrich.sources.is_empty() {
            return Err(GroceryError::MissingConfigError {
                field: "enrich.sources".to_string(),
            });
        }
        for source in &enrich.sources {
            match source {
                ImageSourceKind::OpenFoodFacts => {
                    validate_url("enrich.openfoodfacts_url", &enrich.openfoodfacts_url)?
                }
                ImageSourceKind::Openverse => {
                    validate_url("enrich.openverse_url", &enrich.openverse_url)?
                }
                ImageSourceKind::Wikipedia => {
                    validate_url("enrich.wikipedia_url", &enrich.wikipedia_url)?
                }
                ImageSourceKind::Generic => {}
            }
        }

        if enrich.user_agent.trim().is_empty() {
            return Err(GroceryError::InvalidConfigValueError {
                field: "enrich.user_agent".to_string(),
                value: enrich.user_agent.clone(),
                reason: "User agent cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}
