//! Dimension builders.
//!
//! Regions and countries are derived from the raw inputs; gas types, gases
//! and the pollutant/energy source lists are fixed enumerations. Source
//! identifiers are looked up by name downstream, so the numbers below are
//! only stable within one run's output.

use std::collections::HashMap;

use anyhow::Result;
use itertools::Itertools;
use log::warn;

use crate::{
    data::{Value, truncate_chars},
    dataset::{TabularDataset, int, text},
    error::PipelineError,
    relational::concat,
    tables::TableKind,
};

pub const CODE_WIDTH: usize = 4;
pub const NAME_WIDTH: usize = 50;

pub const SENTINEL_REGION_CODE: &str = "WLD";
pub const SENTINEL_REGION_NAME: &str = "World";

pub const GAS_TYPES: &[(i64, &str)] = &[(1, "Greenhouse Gas")];

pub const GASES: &[(i64, i64, &str)] = &[
    (1, 1, "CO2"),
    (2, 1, "Methane"),
    (3, 1, "Nitrous Oxide"),
];

pub const CO2_GAS_NAME: &str = "CO2";

pub const POLLUTANT_SOURCES: &[(i64, &str)] = &[
    (1, "Cement"),
    (2, "Coal"),
    (3, "Oil"),
    (4, "Gas"),
    (5, "Flaring"),
    (6, "Other Industry"),
    (7, "Land Use Change"),
];

pub const ENERGY_SOURCES: &[(i64, &str)] = &[
    (1, "Biofuel"),
    (2, "Coal"),
    (3, "Gas"),
    (4, "Hydro"),
    (5, "Nuclear"),
    (6, "Oil"),
    (7, "Solar"),
    (8, "Wind"),
    (9, "Other Renewables"),
];

/// Regions from the socioeconomic input, plus the sentinel.
pub fn build_regions(socio: &TabularDataset) -> Result<TabularDataset> {
    let regions = socio
        .select(&["region_code", "region_name"])?
        .rename(&[("region_name", "name")])
        .truncate_column("region_code", CODE_WIDTH)?
        .truncate_column("name", NAME_WIDTH)?
        .drop_nulls(&[])?
        .distinct_by(&["region_code"])?;
    ensure_sentinel_region(regions)
}

/// Appends `WLD`/"World" unless some row already uses that code.
pub fn ensure_sentinel_region(mut regions: TabularDataset) -> Result<TabularDataset> {
    let has_sentinel = regions
        .column_values("region_code")?
        .any(|code| code.and_then(Value::as_str) == Some(SENTINEL_REGION_CODE));
    if !has_sentinel {
        regions.push_row(vec![text(SENTINEL_REGION_CODE), text(SENTINEL_REGION_NAME)])?;
    }
    Ok(regions)
}

/// Countries named by the emissions and energy inputs, with region codes
/// taken from the socioeconomic input. Countries without a region get `WLD`.
pub fn build_countries(
    co2: &TabularDataset,
    energy: &TabularDataset,
    socio: &TabularDataset,
) -> Result<TabularDataset> {
    let pairs = |dataset: &TabularDataset| -> Result<TabularDataset> {
        dataset.select(&["iso_code", "country"])?.drop_nulls(&[])
    };
    let countries = concat("countries", vec![pairs(co2)?, pairs(energy)?])?
        .distinct()
        .rename(&[("country", "name")]);

    let region_mapping = socio
        .select(&["country_code", "region_code"])?
        .rename(&[("country_code", "iso_code")])
        .distinct();

    let joined = countries.left_join(&region_mapping, &["iso_code"])?;

    let region_idx = joined.require_column("region_code")?;
    let iso_idx = joined.require_column("iso_code")?;
    let missing = joined
        .rows()
        .iter()
        .filter(|row| row[region_idx].is_none())
        .filter_map(|row| row[iso_idx].as_ref().map(Value::as_display))
        .unique()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        warn!(
            "{} country(ies) without a region code, assigning '{}': {}",
            missing.len(),
            SENTINEL_REGION_CODE,
            missing.iter().join(", ")
        );
    }

    joined
        .fill_null("region_code", Value::from(SENTINEL_REGION_CODE))?
        .truncate_column("iso_code", CODE_WIDTH)?
        .truncate_column("region_code", CODE_WIDTH)?
        .truncate_column("name", NAME_WIDTH)?
        .drop_nulls(&["iso_code", "name"])?
        .distinct_by(&["iso_code"])?
        .reorder(TableKind::Countries.columns())
}

/// Maps raw country codes onto `CODE_WIDTH`-character keys.
///
/// Several raw codes can truncate to the same key (`OWID_WRL` and `OWID_KOS`
/// both become `OWID`). The first raw code seen owns the key, in the same
/// order [`build_countries`] reads its inputs, so the country row and the
/// fact rows agree on which entity a key names. Rows of the other codes have
/// no key and are dropped by the fact reshapers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryKeys {
    owners: HashMap<String, String>,
}

impl CountryKeys {
    /// Claims keys for every `(iso_code, country)` pair of `inputs`, in order.
    pub fn from_inputs(inputs: &[&TabularDataset]) -> Result<Self> {
        let mut keys = Self::default();
        for dataset in inputs {
            let pairs = dataset.select(&["iso_code", "country"])?.drop_nulls(&[])?;
            for code in pairs.column_values("iso_code")?.flatten() {
                keys.claim(&code.as_display());
            }
        }
        Ok(keys)
    }

    /// Returns the key for `raw`, claiming it when no code owns it yet, or
    /// `None` when a different raw code already owns the truncated key.
    pub fn claim(&mut self, raw: &str) -> Option<String> {
        let key = truncate_chars(raw, CODE_WIDTH);
        let owner = self
            .owners
            .entry(key.clone())
            .or_insert_with(|| raw.to_string());
        (owner == raw).then_some(key)
    }

    pub fn owner(&self, key: &str) -> Option<&str> {
        self.owners.get(key).map(String::as_str)
    }
}

fn id_name_table(kind: TableKind, entries: &[(i64, &str)]) -> Result<TabularDataset> {
    TabularDataset::from_rows(
        kind.table_name(),
        kind.columns().to_vec(),
        entries
            .iter()
            .map(|(id, name)| vec![int(*id), text(name)])
            .collect(),
    )
}

pub fn gas_types() -> Result<TabularDataset> {
    id_name_table(TableKind::GasTypes, GAS_TYPES)
}

pub fn gases() -> Result<TabularDataset> {
    TabularDataset::from_rows(
        TableKind::Gases.table_name(),
        TableKind::Gases.columns().to_vec(),
        GASES
            .iter()
            .map(|(id, type_id, name)| vec![int(*id), int(*type_id), text(name)])
            .collect(),
    )
}

pub fn pollutant_sources() -> Result<TabularDataset> {
    id_name_table(TableKind::PollutantSources, POLLUTANT_SOURCES)
}

pub fn energy_sources() -> Result<TabularDataset> {
    id_name_table(TableKind::EnergySources, ENERGY_SOURCES)
}

/// Finds the identifier of the row whose `name` column equals `name`.
pub fn lookup_id(
    dimension: &TabularDataset,
    id_column: &str,
    name: &str,
) -> Result<i64, PipelineError> {
    let id_idx = dimension.require_column(id_column)?;
    let name_idx = dimension.require_column("name")?;
    dimension
        .rows()
        .iter()
        .find(|row| row[name_idx].as_ref().and_then(Value::as_str) == Some(name))
        .and_then(|row| row[id_idx].as_ref().and_then(Value::as_i64))
        .ok_or_else(|| PipelineError::UnresolvedSource {
            dimension: dimension.name().to_string(),
            name: name.to_string(),
        })
}
