use clap::Parser;
use grocery_etl::config::{Command, ImportArgs};
use grocery_etl::core::exporter::DATASET_PATH;
use grocery_etl::domain::model::DedupPolicy;
use grocery_etl::utils::error::ErrorSeverity;
use grocery_etl::utils::{logger, validation::Validate};
use grocery_etl::{
    CliConfig, CsvImporter, DatasetExporter, EnrichOptions, Enricher, LocalStorage, OpenMode,
    Result, Settings, SourceChain, SqliteCatalog,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting grocery-etl");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let settings = match cli.settings().and_then(|s| s.validate().map(|_| s)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cli.command, &settings).await {
        tracing::error!(
            "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
            command_name(&cli.command),
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Import(_) => "import",
        Command::Enrich(_) => "enrich",
        Command::Export(_) => "export",
        Command::Stats => "stats",
    }
}

/// Flag overrides are already folded into `settings`.
async fn run(command: &Command, settings: &Settings) -> Result<()> {
    match command {
        Command::Import(args) => import(args, settings).await,
        Command::Enrich(_) => enrich(settings).await,
        Command::Export(_) => export(settings).await,
        Command::Stats => stats(settings).await,
    }
}

async fn import(args: &ImportArgs, settings: &Settings) -> Result<()> {
    let catalog = SqliteCatalog::open(&settings.database.path, OpenMode::CreateIfMissing).await?;
    let policy = if args.allow_duplicates {
        DedupPolicy::Append
    } else {
        DedupPolicy::NaturalKey
    };

    let importer =
        CsvImporter::new(&catalog, settings.vendors.layout(args.store)).with_policy(policy);
    let stats = importer.import(&args.csv, args.store).await?;
    let counts = catalog.counts().await?;

    println!("Rows read: {}", stats.rows_read);
    println!("Imported: {}", stats.imported);
    println!("Duplicates: {}", stats.duplicates);
    println!("Skipped: {}", stats.skipped);
    for (reason, count) in &stats.skip_reasons {
        println!("  {}: {}", reason, count);
    }
    println!("New products: {}", stats.new_products);
    println!("Products total: {}", counts.products);
    println!("Purchases total: {}", counts.purchases);
    println!("Database: {}", settings.database.path);

    catalog.close().await;
    Ok(())
}

async fn enrich(settings: &Settings) -> Result<()> {
    let catalog = SqliteCatalog::open(&settings.database.path, OpenMode::Existing).await?;
    let chain = SourceChain::from_settings(&settings.enrich)?;
    tracing::debug!("Image lookup chain has {} source(s)", chain.len());

    let options = EnrichOptions {
        limit: settings.enrich.limit,
        pacing: settings.enrich.pacing(),
    };
    let stats = Enricher::new(&catalog, chain).run(options).await?;

    println!("Processed: {}", stats.processed);
    println!("Updated: {}", stats.updated);
    println!("Skipped: {}", stats.skipped);
    println!("Lookup errors: {}", stats.lookup_errors);
    println!(
        "Coverage: {}/{} ({:.1}%)",
        stats.with_image,
        stats.total_products,
        stats.coverage() * 100.0
    );
    let by_source: Vec<String> = stats
        .by_source
        .iter()
        .map(|(source, count)| format!("{}={}", source, count))
        .collect();
    println!("By source: {}", by_source.join(", "));

    catalog.close().await;
    Ok(())
}

async fn export(settings: &Settings) -> Result<()> {
    let catalog = SqliteCatalog::open(&settings.database.path, OpenMode::Existing).await?;
    let storage = LocalStorage::new(&settings.export.site_dir);
    let output = storage.full_path(DATASET_PATH);

    let dataset = DatasetExporter::new(&catalog, storage).export().await?;

    println!("Products: {}", dataset.summary.product_count);
    println!("Purchases: {}", dataset.summary.purchase_count);
    println!(
        "Image coverage: {}/{} ({:.1}%)",
        dataset.summary.with_image,
        dataset.summary.product_count,
        dataset.summary.image_coverage * 100.0
    );
    println!("📁 Dataset saved to: {}", output.display());

    catalog.close().await;
    Ok(())
}

async fn stats(settings: &Settings) -> Result<()> {
    let catalog = SqliteCatalog::open(&settings.database.path, OpenMode::Existing).await?;
    let counts = catalog.counts().await?;

    println!("Products: {}", counts.products);
    println!("Purchases: {}", counts.purchases);
    println!(
        "Coverage: {}/{} ({:.1}%)",
        counts.with_image,
        counts.products,
        counts.coverage() * 100.0
    );

    catalog.close().await;
    Ok(())
}
