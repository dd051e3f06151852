pub mod toml_config;

#[cfg(feature = "cli")]
use crate::domain::model::StoreId;
#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

pub use toml_config::Settings;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "grocery-etl")]
#[command(about = "Import grocery receipts into SQLite, attach product images, export the dashboard")]
pub struct CliConfig {
    /// SQLite database path (overrides database.path)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Optional TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Import a vendor CSV export
    Import(ImportArgs),
    /// Look up images for products that have none
    Enrich(EnrichArgs),
    /// Regenerate the dashboard dataset
    Export(ExportArgs),
    /// Print catalog counts and image coverage
    Stats,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// Path to the CSV file
    #[arg(long)]
    pub csv: PathBuf,

    /// Store the export came from
    #[arg(long, value_parser = parse_store)]
    pub store: StoreId,

    /// Insert every row even if an identical purchase from the same file exists
    #[arg(long)]
    pub allow_duplicates: bool,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Args)]
pub struct EnrichArgs {
    /// Maximum products to look up (0 = all missing)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Pause between lookups in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Static site directory (overrides export.site_dir)
    #[arg(long)]
    pub site_dir: Option<String>,
}

#[cfg(feature = "cli")]
fn parse_store(value: &str) -> std::result::Result<StoreId, String> {
    value.parse().map_err(|e: crate::utils::error::GroceryError| e.to_string())
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Load the config file (if any) and fold command-line overrides into it.
    pub fn settings(&self) -> crate::utils::error::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(db) = &self.db {
            settings.database.path = db.clone();
        }

        match &self.command {
            Command::Enrich(args) => {
                if let Some(limit) = args.limit {
                    settings.enrich.limit = limit;
                }
                if let Some(sleep_ms) = args.sleep_ms {
                    settings.enrich.sleep_ms = sleep_ms;
                }
            }
            Command::Export(args) => {
                if let Some(site_dir) = &args.site_dir {
                    settings.export.site_dir = site_dir.clone();
                }
            }
            Command::Import(_) | Command::Stats => {}
        }

        Ok(settings)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_command() {
        let cli = CliConfig::try_parse_from([
            "grocery-etl",
            "--db",
            "/tmp/g.db",
            "import",
            "--csv",
            "receipts/frys.csv",
            "--store",
            "FRYS",
        ])
        .unwrap();

        match &cli.command {
            Command::Import(args) => {
                assert_eq!(args.store, StoreId::Frys);
                assert!(!args.allow_duplicates);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.settings().unwrap().database.path, "/tmp/g.db");
    }

    #[test]
    fn test_unknown_store_is_rejected() {
        let result = CliConfig::try_parse_from([
            "grocery-etl",
            "import",
            "--csv",
            "a.csv",
            "--store",
            "costco",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_enrich_overrides() {
        let cli = CliConfig::try_parse_from([
            "grocery-etl",
            "enrich",
            "--limit",
            "5",
            "--sleep-ms",
            "0",
            "--verbose",
        ])
        .unwrap();

        let settings = cli.settings().unwrap();
        assert!(cli.verbose);
        assert_eq!(settings.enrich.limit, 5);
        assert_eq!(settings.enrich.sleep_ms, 0);
        assert_eq!(settings.database.path, "data/grocery.db");
    }
}
