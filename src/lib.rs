pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod dimensions;
pub mod documents;
pub mod error;
pub mod export;
pub mod facts;
pub mod io_utils;
pub mod loader;
pub mod pipeline;
pub mod preview;
pub mod queries;
pub mod reconcile;
pub mod relational;
pub mod table;
pub mod tables;
pub mod yaml_provider;

use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, CommonArgs, Commands},
    config::PipelineConfig,
    export::{LoadManifest, MANIFEST_FILE},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("climate_etl", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Prepare(args) => {
            let config = resolve_config(&args.common)?;
            handle_prepare(&config, args.documents)
        }
        Commands::Load(args) => {
            let config = resolve_config(&args.common)?;
            handle_load(&config, args.manifest)
        }
        Commands::Query(args) => {
            let config = resolve_config(&args.common)?;
            handle_query(&config, &args.only)
        }
        Commands::Run(args) => {
            let config = resolve_config(&args.common)?;
            handle_prepare(&config, args.documents)?;
            handle_load(&config, None)?;
            handle_query(&config, &args.only)
        }
        Commands::Preview(args) => {
            let config = resolve_config(&args.common)?;
            preview::execute(&args.table, args.rows, &config)
        }
    }
}

fn resolve_config(common: &CommonArgs) -> Result<PipelineConfig> {
    let config = PipelineConfig::resolve(common.config.as_deref(), common.overrides())?;
    debug!("Effective configuration: {config:?}");
    Ok(config)
}

fn handle_prepare(config: &PipelineConfig, documents: bool) -> Result<()> {
    info!(
        "Preparing tables from {:?}, {:?} and {:?}",
        config.inputs.co2, config.inputs.energy, config.inputs.socioeconomic
    );
    let outcome = pipeline::prepare(config, documents)?;
    if !outcome.reconcile.is_noop() {
        info!(
            "Reconciliation reassigned {} country(ies) and added {} sentinel country(ies)",
            outcome.reconcile.countries_reassigned.len(),
            outcome.reconcile.countries_added.len()
        );
    }
    Ok(())
}

fn handle_load(config: &PipelineConfig, manifest: Option<PathBuf>) -> Result<()> {
    let manifest_path = manifest.unwrap_or_else(|| config.output_dir.join(MANIFEST_FILE));
    let manifest = LoadManifest::load(&manifest_path)?;
    info!(
        "Loading {} table(s) from {:?} into {:?}",
        manifest.entries.len(),
        manifest_path,
        config.database
    );
    let report = loader::load_into(&config.database, &manifest)?;
    if !report.failed.is_empty() {
        warn!(
            "{} table(s) failed to load: {}",
            report.failed.len(),
            report
                .failed
                .iter()
                .map(|kind| kind.table_name())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

fn handle_query(config: &PipelineConfig, only: &[usize]) -> Result<()> {
    if !config.database.exists() {
        anyhow::bail!(
            "Database {:?} does not exist; run the load step first",
            config.database
        );
    }
    let conn = loader::open_database(&config.database)
        .with_context(|| format!("Opening {:?} for queries", config.database))?;
    let results = queries::run_battery(&conn, &config.queries, only, &config.results_dir);
    info!(
        "{} query result(s) written to {:?}",
        results.len(),
        config.results_dir
    );
    Ok(())
}
