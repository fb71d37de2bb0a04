use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eventlake::config::{RuntimeConfig, StorageBackend};
use eventlake::{
    generator, load_as_text, report, timed, AggregatePipeline, DatasetScanner, EventSpec,
    Predicate, ScanRequest,
};
use opendal::Operator;
use std::path::PathBuf;
use tracing::info;

/// Generate, scan and aggregate a partitioned Parquet event dataset
#[derive(Parser)]
#[command(name = "eventlake")]
#[command(version)]
#[command(about = "Generate, scan and aggregate a partitioned Parquet event dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Root directory of the filesystem backend (overrides config file)
    #[arg(short, long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the synthetic event dataset
    Generate {
        /// Number of events (overrides generator.rows)
        #[arg(long, value_name = "N")]
        rows: Option<usize>,

        /// Replace an existing dataset
        #[arg(long)]
        overwrite: bool,
    },
    /// Filtered, projected read of the dataset
    Scan {
        /// Equality filter, repeatable
        #[arg(long = "filter", value_name = "COL=VALUE", default_values = ["country=US", "event_date=2025-01-02"])]
        filters: Vec<String>,

        /// Scan every row, ignoring --filter
        #[arg(long)]
        all: bool,

        #[arg(long, value_delimiter = ',', default_values = ["event_id", "user_id", "value"])]
        columns: Vec<String>,

        /// Rows to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Sum of value per user_id through persisted partial aggregates
    Aggregate {
        /// Equality filter, repeatable
        #[arg(long = "filter", value_name = "COL=VALUE", default_values = ["country=IN"])]
        filters: Vec<String>,

        /// Aggregate every row, ignoring --filter
        #[arg(long)]
        all: bool,

        /// Rows to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Load columns and convert them to text
    Normalize {
        #[arg(long, value_delimiter = ',', default_values = ["event_id", "user_id", "value"])]
        columns: Vec<String>,

        /// Rows to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate (overwriting), scan, aggregate and normalize with defaults
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority) and re-validate
    apply_cli_overrides(&mut config, &cli)?;
    config.validate().context("Invalid configuration")?;

    // Step 3: Initialize tracing early so storage setup logs show up
    eventlake::init_tracing(&config.logging);

    // Step 4: Resolve and create the filesystem root
    prepare_fs_root(&mut config)?;
    display_startup_info(&config);

    let op = eventlake::init_storage(&config.storage).context("Failed to initialize storage")?;

    match cli.command {
        Commands::Generate { rows, overwrite } => {
            if let Some(rows) = rows {
                config.generator.rows = rows;
            }
            let overwrite = overwrite || config.generator.overwrite;
            run_generate(&op, &config, overwrite).await
        }
        Commands::Scan {
            filters,
            all,
            columns,
            limit,
        } => {
            let predicate = parse_filters(&filters, all)?;
            run_scan(&op, &config, predicate, columns, limit).await
        }
        Commands::Aggregate {
            filters,
            all,
            limit,
        } => {
            let predicate = parse_filters(&filters, all)?;
            run_aggregate(&op, &config, predicate, limit).await
        }
        Commands::Normalize { columns, limit } => {
            run_normalize(&op, &config, columns, limit).await
        }
        Commands::Run => run_all(&op, &config).await,
    }
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) -> Result<()> {
    // Override data directory (only valid for fs backend)
    if let Some(dir) = &cli.data_dir {
        if config.storage.backend != StorageBackend::Fs {
            anyhow::bail!(
                "--data-dir flag only works with filesystem backend, but backend is '{}'.\n\
                Either remove --data-dir flag or set backend to 'fs' in config file.",
                config.storage.backend
            );
        }

        let fs_config = config.storage.fs.get_or_insert_with(Default::default);
        fs_config.path = dir.to_string_lossy().to_string();
    }

    // Override log level
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    Ok(())
}

fn prepare_fs_root(config: &mut RuntimeConfig) -> Result<()> {
    if config.storage.backend != StorageBackend::Fs {
        return Ok(());
    }
    let fs_config = config
        .storage
        .fs
        .as_mut()
        .ok_or_else(|| anyhow::anyhow!("filesystem backend requires storage.fs configuration"))?;

    let mut root = PathBuf::from(&fs_config.path);
    if root.is_relative() {
        root = std::env::current_dir()
            .context("Failed to resolve current directory")?
            .join(root);
    }
    if !root.exists() {
        info!("Creating data directory: {}", root.display());
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create data directory: {}", root.display()))?;
    }
    fs_config.path = root.to_string_lossy().to_string();
    Ok(())
}

fn display_startup_info(config: &RuntimeConfig) {
    info!("╭─────────────────────────────────────────────────");
    info!("│ eventlake v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!("│ Storage backend: {}", config.storage.backend);

    match config.storage.backend {
        StorageBackend::Fs => {
            if let Some(fs) = &config.storage.fs {
                info!("│ Data directory: {}", fs.path);
            }
        }
        StorageBackend::S3 => {
            if let Some(s3) = &config.storage.s3 {
                info!("│ S3 bucket: {}", s3.bucket);
                info!("│ S3 region: {}", s3.region);
            }
        }
        StorageBackend::Memory => {}
    }

    info!("│ Dataset path: {}", config.dataset.path);
    info!("│ Chunk rows: {}", config.scan.chunk_rows);
    info!("│ Aggregate output: {}", config.pipeline.output_path);
    info!("╰─────────────────────────────────────────────────");
}

fn parse_filters(filters: &[String], all: bool) -> Result<Predicate> {
    if all {
        return Ok(Predicate::all());
    }
    Predicate::parse(filters).context("Invalid --filter")
}

async fn run_generate(op: &Operator, config: &RuntimeConfig, overwrite: bool) -> Result<()> {
    let spec = EventSpec::try_from(&config.generator).context("Invalid generator settings")?;
    let summary = timed(
        "generate",
        generator::generate(
            op,
            &config.dataset.path,
            &spec,
            overwrite,
            config.dataset.row_group_size,
        ),
    )
    .await
    .with_context(|| format!("Failed to generate dataset at '{}'", config.dataset.path))?;

    println!(
        "Generated {} rows in {} partitions under '{}'",
        summary.rows, summary.partitions, config.dataset.path
    );
    Ok(())
}

async fn run_scan(
    op: &Operator,
    config: &RuntimeConfig,
    predicate: Predicate,
    columns: Vec<String>,
    limit: usize,
) -> Result<()> {
    let scanner = DatasetScanner::new(op.clone(), config.dataset.path.clone());
    let title = format!("Scan where {}", predicate);
    let request = ScanRequest::new(columns, predicate, config.scan.chunk_rows);

    let output = timed("scan", scanner.to_table(request))
        .await
        .context("Scan failed")?;

    info!(
        files_read = output.stats.files_read,
        directories_pruned = output.stats.directories_pruned,
        rows_matched = output.stats.rows_matched,
        "Scan complete"
    );
    report::print_preview(&title, &output.batch, limit)?;
    Ok(())
}

async fn run_aggregate(
    op: &Operator,
    config: &RuntimeConfig,
    predicate: Predicate,
    limit: usize,
) -> Result<()> {
    let scanner = DatasetScanner::new(op.clone(), config.dataset.path.clone());
    let title = format!("Sum of value per user_id where {}", predicate);
    let mut pipeline =
        AggregatePipeline::new(scanner, config.pipeline.output_path.clone(), config.scan.chunk_rows)
            .with_row_group_size(config.dataset.row_group_size);

    let run = timed("aggregate", pipeline.run(predicate))
        .await
        .context("Aggregation failed")?;

    let batch = run.final_aggregate.to_record_batch()?;
    report::print_preview(&title, &batch, limit)?;
    println!(
        "Total value: {} across {} artifacts",
        run.final_aggregate.total()?,
        run.artifacts.len()
    );
    Ok(())
}

async fn run_normalize(
    op: &Operator,
    config: &RuntimeConfig,
    columns: Vec<String>,
    limit: usize,
) -> Result<()> {
    let table = timed(
        "normalize",
        load_as_text(op, &config.dataset.path, &columns, config.scan.chunk_rows),
    )
    .await
    .context("Normalization failed")?;

    report::print_preview("Normalized columns", &table.batch, limit)?;
    println!("{}", report::format_column_types(&table.column_types));
    Ok(())
}

async fn run_all(op: &Operator, config: &RuntimeConfig) -> Result<()> {
    let default_columns = || {
        ["event_id", "user_id", "value"]
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
    };

    run_generate(op, config, true).await?;

    let scan_filter = parse_filters(
        &["country=US".to_string(), "event_date=2025-01-02".to_string()],
        false,
    )?;
    run_scan(op, config, scan_filter, default_columns(), 10).await?;

    let aggregate_filter = parse_filters(&["country=IN".to_string()], false)?;
    run_aggregate(op, config, aggregate_filter, 10).await?;

    run_normalize(op, config, default_columns(), 10).await
}
