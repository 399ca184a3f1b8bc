//! Fact reshapers.
//!
//! Simple projections (economic indicators, demographics, total GHG, trade)
//! select key and measure columns and deduplicate or aggregate. The per-source
//! facts (pollutant emissions, energy activity) melt wide per-source columns
//! into long rows and rejoin the correlated measures on
//! `(iso_code, year, source_id)`.

use anyhow::Result;
use itertools::Itertools;
use log::{debug, warn};

use crate::{
    data::{ColumnType, Value},
    dataset::TabularDataset,
    dimensions::{CO2_GAS_NAME, CountryKeys, lookup_id},
    error::PipelineError,
    relational::concat,
    tables::TableKind,
};

const ISO_CODE: &str = "iso_code";
const YEAR: &str = "year";
const KEY_COLUMNS: [&str; 2] = [ISO_CODE, YEAR];

/// Wide emission columns per pollutant source: (name, emission, cumulative).
pub const POLLUTANT_COLUMNS: &[(&str, &str, &str)] = &[
    ("Cement", "cement_co2", "cumulative_cement_co2"),
    ("Coal", "coal_co2", "cumulative_coal_co2"),
    ("Oil", "oil_co2", "cumulative_oil_co2"),
    ("Gas", "gas_co2", "cumulative_gas_co2"),
    ("Flaring", "flaring_co2", "cumulative_flaring_co2"),
    ("Other Industry", "other_industry_co2", "cumulative_other_co2"),
    ("Land Use Change", "co2_including_luc", "cumulative_co2_including_luc"),
];

/// Wide energy columns per source: (name, consumption, production, generation).
pub const ENERGY_COLUMNS: &[(&str, &str, Option<&str>, &str)] = &[
    ("Biofuel", "biofuel_consumption", None, "biofuel_electricity"),
    ("Coal", "coal_consumption", Some("coal_production"), "coal_electricity"),
    ("Gas", "gas_consumption", Some("gas_production"), "gas_electricity"),
    ("Hydro", "hydro_consumption", None, "hydro_electricity"),
    ("Nuclear", "nuclear_consumption", None, "nuclear_electricity"),
    ("Oil", "oil_consumption", Some("oil_production"), "oil_electricity"),
    ("Solar", "solar_consumption", None, "solar_electricity"),
    ("Wind", "wind_consumption", None, "wind_electricity"),
    (
        "Other Renewables",
        "other_renewable_consumption",
        None,
        "other_renewable_electricity",
    ),
];

/// Projects `(iso_code, year, measures...)`, drops rows missing a key and
/// types the year as integer and the measures as float.
///
/// Country codes are cut to the key width here, before any deduplication or
/// aggregation. Rows whose truncated code belongs to a different raw code
/// are dropped.
fn keyed(
    dataset: &TabularDataset,
    measures: &[&str],
    keys: &CountryKeys,
) -> Result<TabularDataset> {
    let mut columns = KEY_COLUMNS.to_vec();
    columns.extend_from_slice(measures);
    let mut casts = vec![(ISO_CODE, ColumnType::String), (YEAR, ColumnType::Integer)];
    casts.extend(measures.iter().map(|m| (*m, ColumnType::Float)));

    let mut keys = keys.clone();
    let mut shadowed = Vec::new();
    let projected = dataset
        .select(&columns)?
        .drop_nulls(&KEY_COLUMNS)?
        .map_column(ISO_CODE, |cell| {
            let raw = cell?.as_display();
            let key = keys.claim(&raw);
            if key.is_none() {
                shadowed.push(raw);
            }
            key.map(Value::Text)
        })?;
    if !shadowed.is_empty() {
        let codes = shadowed.iter().unique().collect::<Vec<_>>();
        warn!(
            "Dropping {} row(s) of '{}' for {} code(s) whose truncated key belongs to another country: {}",
            shadowed.len(),
            dataset.name(),
            codes.len(),
            codes.iter().join(", ")
        );
    }
    projected.drop_nulls(&[ISO_CODE])?.cast(&casts)
}

/// GDP per (country, year). When the inputs disagree the CO2 value wins.
pub fn economic_indicators(
    co2: &TabularDataset,
    energy: &TabularDataset,
    keys: &CountryKeys,
) -> Result<TabularDataset> {
    let parts = [co2, energy]
        .into_iter()
        .map(|dataset| keyed(dataset, &["gdp"], keys)?.drop_nulls(&[]))
        .collect::<Result<Vec<_>>>()?;
    concat(TableKind::EconomicIndicators.table_name(), parts)?.distinct_by(&KEY_COLUMNS)
}

/// Population per (country, year), averaged across inputs and rounded to the
/// nearest integer with ties to even.
pub fn demographics(
    co2: &TabularDataset,
    energy: &TabularDataset,
    keys: &CountryKeys,
) -> Result<TabularDataset> {
    let parts = [co2, energy]
        .into_iter()
        .map(|dataset| keyed(dataset, &["population"], keys)?.drop_nulls(&[]))
        .collect::<Result<Vec<_>>>()?;
    concat(TableKind::Demographics.table_name(), parts)?
        .group_mean(&KEY_COLUMNS, "population")?
        .map_column("population", |cell| {
            cell.and_then(|value| value.as_f64())
                .map(|mean| Value::Integer(mean.round_ties_even() as i64))
        })
}

pub fn total_ghg_emissions(co2: &TabularDataset, keys: &CountryKeys) -> Result<TabularDataset> {
    let measures = ["total_ghg", "total_ghg_excluding_lucf"];
    keyed(co2, &measures, keys)?.drop_all_null(&measures)
}

pub fn trade_emissions(
    co2: &TabularDataset,
    gases: &TabularDataset,
    keys: &CountryKeys,
) -> Result<TabularDataset> {
    let gas_id = lookup_id(gases, "gas_id", CO2_GAS_NAME)?;
    let measures = ["trade_co2", "consumption_co2"];
    keyed(co2, &measures, keys)?
        .drop_all_null(&measures)?
        .with_constant("gas_id", Some(Value::Integer(gas_id)))
        .reorder(TableKind::TradeEmissions.columns())
}

/// Resolves a source name, logging and skipping names the dimension lacks.
fn resolve_source(dimension: &TabularDataset, id_column: &str, name: &str) -> Option<i64> {
    match lookup_id(dimension, id_column, name) {
        Ok(id) => Some(id),
        Err(err) => {
            warn!("{err}; skipping its columns");
            None
        }
    }
}

/// Keeps `column` if the raw input has it, otherwise logs a warning.
fn present<'a>(
    dataset: &TabularDataset,
    column: &'a str,
    measure: &str,
    vars: &mut Vec<(&'a str, Value)>,
    id: i64,
) {
    if dataset.has_column(column) {
        vars.push((column, Value::Integer(id)));
    } else {
        warn!(
            "{measure} column '{column}' not found in '{}'; skipping",
            dataset.name()
        );
    }
}

fn measure_columns<'a>(groups: &[&[(&'a str, Value)]]) -> Vec<&'a str> {
    groups
        .iter()
        .flat_map(|vars| vars.iter().map(|(column, _)| *column))
        .collect()
}

pub fn pollutant_emissions(
    co2: &TabularDataset,
    sources: &TabularDataset,
    gases: &TabularDataset,
    keys: &CountryKeys,
) -> Result<TabularDataset> {
    let gas_id = lookup_id(gases, "gas_id", CO2_GAS_NAME)?;
    let id_column = "pollutant_source_id";

    let mut emission_vars = Vec::new();
    let mut cumulative_vars = Vec::new();
    for &(name, emission, cumulative) in POLLUTANT_COLUMNS {
        let Some(id) = resolve_source(sources, id_column, name) else {
            continue;
        };
        present(co2, emission, "Emission", &mut emission_vars, id);
        present(co2, cumulative, "Cumulative emission", &mut cumulative_vars, id);
    }
    if emission_vars.is_empty() {
        return Err(PipelineError::NoMeasureColumns {
            dataset: co2.name().to_string(),
            measure: "emission".to_string(),
        }
        .into());
    }

    let measures = measure_columns(&[emission_vars.as_slice(), cumulative_vars.as_slice()]);
    let base = keyed(co2, &measures, keys)?;
    debug!(
        "Melting {} emission and {} cumulative column(s) over {} row(s)",
        emission_vars.len(),
        cumulative_vars.len(),
        base.len()
    );

    let emission = base.melt(&KEY_COLUMNS, &emission_vars, id_column, "emission")?;
    let cumulative = base.melt(
        &KEY_COLUMNS,
        &cumulative_vars,
        id_column,
        "cumulative_emission",
    )?;

    emission
        .left_join(&cumulative, &[ISO_CODE, YEAR, id_column])?
        .drop_nulls(&["emission", "cumulative_emission"])?
        .with_constant("gas_id", Some(Value::Integer(gas_id)))
        .reorder(TableKind::PollutantEmissions.columns())
}

pub fn energy_activities(
    energy: &TabularDataset,
    sources: &TabularDataset,
    keys: &CountryKeys,
) -> Result<TabularDataset> {
    let id_column = "energy_source_id";

    let mut consumption_vars = Vec::new();
    let mut production_vars = Vec::new();
    let mut generation_vars = Vec::new();
    for &(name, consumption, production, generation) in ENERGY_COLUMNS {
        let Some(id) = resolve_source(sources, id_column, name) else {
            continue;
        };
        present(energy, consumption, "Consumption", &mut consumption_vars, id);
        if let Some(production) = production {
            present(energy, production, "Production", &mut production_vars, id);
        }
        present(energy, generation, "Generation", &mut generation_vars, id);
    }
    if consumption_vars.is_empty() {
        return Err(PipelineError::NoMeasureColumns {
            dataset: energy.name().to_string(),
            measure: "consumption".to_string(),
        }
        .into());
    }

    let measures = measure_columns(&[
        consumption_vars.as_slice(),
        production_vars.as_slice(),
        generation_vars.as_slice(),
    ]);
    let base = keyed(energy, &measures, keys)?;

    let consumption = base.melt(&KEY_COLUMNS, &consumption_vars, id_column, "consumption")?;
    let production = base.melt(&KEY_COLUMNS, &production_vars, id_column, "production")?;
    let generation = base.melt(&KEY_COLUMNS, &generation_vars, id_column, "generation")?;

    let on = [ISO_CODE, YEAR, id_column];
    consumption
        .left_join(&production, &on)?
        .left_join(&generation, &on)?
        .drop_nulls(&["consumption"])?
        .reorder(TableKind::EnergyActivities.columns())
}
