//! Stage driver for the `prepare` step.
//!
//! Stages run in a fixed order: dimensions, facts, reconciliation, export.
//! Each table is built independently; a stage that fails (missing input file,
//! missing column, unparseable cell) is logged against its table and the run
//! continues with the remaining stages.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::{
    config::PipelineConfig,
    dataset::{ReadOptions, TabularDataset},
    dimensions::{self, CountryKeys},
    documents,
    error::PipelineError,
    export::{self, LoadManifest},
    facts, io_utils,
    reconcile::{self, ReconcileReport},
    tables::{TableKind, TableSet},
};

/// Raw inputs, read in fixed order. An input that could not be read is `None`.
#[derive(Debug, Default)]
pub struct Inputs {
    pub co2: Option<TabularDataset>,
    pub energy: Option<TabularDataset>,
    pub socioeconomic: Option<TabularDataset>,
}

impl Inputs {
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let options = ReadOptions {
            delimiter: config.delimiter_byte(),
            encoding: io_utils::resolve_encoding(config.input_encoding.as_deref())?,
        };
        Ok(Self {
            co2: read_input("co2", &config.inputs.co2, &options),
            energy: read_input("energy", &config.inputs.energy, &options),
            socioeconomic: read_input("socioeconomic", &config.inputs.socioeconomic, &options),
        })
    }
}

fn read_input(label: &str, path: &Path, options: &ReadOptions) -> Option<TabularDataset> {
    if !path.exists() {
        warn!("Input '{label}' not found at {path:?}; dependent tables will be skipped");
        return None;
    }
    match TabularDataset::load(path, options) {
        Ok(dataset) => {
            info!(
                "Read {} row(s) x {} column(s) from {:?}",
                dataset.len(),
                dataset.columns().len(),
                path
            );
            Some(dataset)
        }
        Err(err) => {
            error!("Failed to read input '{label}' from {path:?}: {err:#}");
            None
        }
    }
}

fn need<'a>(input: &'a Option<TabularDataset>, label: &str) -> Result<&'a TabularDataset> {
    input
        .as_ref()
        .ok_or_else(|| PipelineError::MissingInput(label.to_string()).into())
}

fn dimension<'a>(tables: &'a TableSet, kind: TableKind) -> Result<&'a TabularDataset> {
    tables
        .get(kind)
        .ok_or_else(|| PipelineError::MissingInput(kind.table_name().to_string()).into())
}

fn stage<F>(tables: &mut TableSet, kind: TableKind, build: F)
where
    F: FnOnce(&TableSet) -> Result<TabularDataset>,
{
    match build(tables) {
        Ok(table) => {
            info!("Built '{kind}' with {} row(s)", table.len());
            tables.insert(kind, table);
        }
        Err(err) => error!("Failed to build '{kind}': {err:#}"),
    }
}

/// Key ownership for truncated country codes, claimed in the order the
/// country builder reads the emissions and energy inputs.
fn country_keys(inputs: &Inputs) -> CountryKeys {
    let available = [inputs.co2.as_ref(), inputs.energy.as_ref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    CountryKeys::from_inputs(&available).unwrap_or_else(|err| {
        warn!("Could not derive country keys from the inputs: {err:#}");
        CountryKeys::default()
    })
}

/// Builds every dimension and fact table that its inputs allow.
pub fn build_tables(inputs: &Inputs) -> TableSet {
    let co2 = &inputs.co2;
    let energy = &inputs.energy;
    let socio = &inputs.socioeconomic;
    let keys = country_keys(inputs);
    let mut tables = TableSet::new();

    stage(&mut tables, TableKind::Regions, |_| {
        dimensions::build_regions(need(socio, "socioeconomic")?)
    });
    stage(&mut tables, TableKind::Countries, |_| {
        dimensions::build_countries(
            need(co2, "co2")?,
            need(energy, "energy")?,
            need(socio, "socioeconomic")?,
        )
    });
    stage(&mut tables, TableKind::GasTypes, |_| dimensions::gas_types());
    stage(&mut tables, TableKind::Gases, |_| dimensions::gases());
    stage(&mut tables, TableKind::PollutantSources, |_| {
        dimensions::pollutant_sources()
    });
    stage(&mut tables, TableKind::EnergySources, |_| {
        dimensions::energy_sources()
    });

    stage(&mut tables, TableKind::EconomicIndicators, |_| {
        facts::economic_indicators(need(co2, "co2")?, need(energy, "energy")?, &keys)
    });
    stage(&mut tables, TableKind::Demographics, |_| {
        facts::demographics(need(co2, "co2")?, need(energy, "energy")?, &keys)
    });
    stage(&mut tables, TableKind::TotalGhgEmissions, |_| {
        facts::total_ghg_emissions(need(co2, "co2")?, &keys)
    });
    stage(&mut tables, TableKind::TradeEmissions, |built| {
        facts::trade_emissions(
            need(co2, "co2")?,
            dimension(built, TableKind::Gases)?,
            &keys,
        )
    });
    stage(&mut tables, TableKind::PollutantEmissions, |built| {
        facts::pollutant_emissions(
            need(co2, "co2")?,
            dimension(built, TableKind::PollutantSources)?,
            dimension(built, TableKind::Gases)?,
            &keys,
        )
    });
    stage(&mut tables, TableKind::EnergyActivities, |built| {
        facts::energy_activities(
            need(energy, "energy")?,
            dimension(built, TableKind::EnergySources)?,
            &keys,
        )
    });

    tables
}

#[derive(Debug)]
pub struct PrepareOutcome {
    pub tables: TableSet,
    pub reconcile: ReconcileReport,
    pub manifest: LoadManifest,
    pub documents: Vec<PathBuf>,
}

fn written(label: &str, path: PathBuf, outcome: Result<usize>) -> Option<PathBuf> {
    match outcome {
        Ok(count) => {
            info!("✓ {count} {label} document(s) written to {path:?}");
            Some(path)
        }
        Err(err) => {
            error!("Failed to write {label} documents: {err:#}");
            None
        }
    }
}

/// Writes the country collection and the source collections, returning the
/// files that were written.
fn write_collections(tables: &TableSet, dir: &Path) -> Vec<PathBuf> {
    let countries = dir.join(documents::COUNTRIES_FILE);
    let mut paths = Vec::new();
    paths.extend(written(
        "country",
        countries.clone(),
        documents::write_documents(tables, &countries),
    ));
    for (kind, file) in documents::SOURCE_COLLECTIONS {
        let path = dir.join(file);
        let outcome = documents::write_source_documents(tables, kind, &path);
        paths.extend(written(kind.table_name(), path, outcome));
    }
    paths
}

/// Runs build, reconcile and export, plus the document output when asked.
pub fn prepare(config: &PipelineConfig, with_documents: bool) -> Result<PrepareOutcome> {
    let inputs = Inputs::load(config)?;
    let mut tables = build_tables(&inputs);
    let report = reconcile::reconcile(&mut tables).context("Reconciling foreign keys")?;
    let manifest = export::export_tables(&tables, &config.output_dir)?;
    info!(
        "Prepared {} of {} table(s) in {:?}",
        manifest.entries.len(),
        TableKind::ALL.len(),
        config.output_dir
    );

    let documents = if with_documents {
        write_collections(&tables, &config.output_dir)
    } else {
        Vec::new()
    };

    Ok(PrepareOutcome {
        tables,
        reconcile: report,
        manifest,
        documents,
    })
}
