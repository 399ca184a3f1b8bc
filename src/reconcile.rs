//! Foreign-key reconciliation across the built tables.
//!
//! Fact inputs enumerate countries the socioeconomic input does not know, and
//! regions may be missing when their builder failed. This pass patches the
//! table set so every reference resolves:
//!
//! 1. `regions` always holds the `WLD` sentinel.
//! 2. Countries pointing at an unknown region are moved to `WLD`.
//! 3. Fact country codes unknown to `countries` get a sentinel country row
//!    `(code, WLD, code)`. The reshapers already cut codes to the key width.
//!
//! Running the pass on its own output changes nothing.

use std::collections::HashSet;

use anyhow::Result;
use itertools::Itertools;
use log::warn;

use crate::{
    data::Value,
    dataset::{TabularDataset, text},
    dimensions::{SENTINEL_REGION_CODE, ensure_sentinel_region},
    tables::{TableKind, TableSet},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub sentinel_region_inserted: bool,
    pub countries_reassigned: Vec<String>,
    pub countries_added: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        !self.sentinel_region_inserted
            && self.countries_reassigned.is_empty()
            && self.countries_added.is_empty()
    }
}

fn text_set(table: &TabularDataset, column: &str) -> Result<HashSet<String>> {
    Ok(table
        .column_values(column)?
        .filter_map(|cell| cell.map(Value::as_display))
        .collect())
}

pub fn reconcile(tables: &mut TableSet) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let any_fact = TableKind::FACTS.iter().any(|kind| tables.contains(*kind));

    let countries = match tables.take(TableKind::Countries) {
        Some(countries) => Some(countries),
        None if any_fact => {
            warn!("Country table unavailable; rebuilding it from fact references");
            Some(TabularDataset::new(
                TableKind::Countries.table_name(),
                TableKind::Countries.columns().to_vec(),
            ))
        }
        None => None,
    };

    let regions = match tables.take(TableKind::Regions) {
        Some(regions) => Some(regions),
        None if countries.is_some() => {
            warn!("Region table unavailable; creating it with the sentinel region only");
            Some(TabularDataset::new(
                TableKind::Regions.table_name(),
                TableKind::Regions.columns().to_vec(),
            ))
        }
        None => None,
    };

    let region_codes = match regions {
        Some(regions) => {
            let before = regions.len();
            let regions = ensure_sentinel_region(regions)?;
            report.sentinel_region_inserted = regions.len() != before;
            let codes = text_set(&regions, "region_code")?;
            tables.insert(TableKind::Regions, regions);
            codes
        }
        None => HashSet::new(),
    };

    let Some(countries) = countries else {
        return Ok(report);
    };

    let iso_idx = countries.require_column("iso_code")?;
    let region_idx = countries.require_column("region_code")?;
    report.countries_reassigned = countries
        .rows()
        .iter()
        .filter(|row| {
            row[region_idx]
                .as_ref()
                .is_none_or(|code| !region_codes.contains(&code.as_display()))
        })
        .filter_map(|row| row[iso_idx].as_ref().map(Value::as_display))
        .collect();
    if !report.countries_reassigned.is_empty() {
        warn!(
            "{} country(ies) reference an unknown region, assigning '{}': {}",
            report.countries_reassigned.len(),
            SENTINEL_REGION_CODE,
            report.countries_reassigned.iter().join(", ")
        );
    }
    let mut countries = countries.map_column("region_code", |cell| match cell {
        Some(code) if region_codes.contains(&code.as_display()) => Some(code),
        _ => Some(Value::from(SENTINEL_REGION_CODE)),
    })?;

    let mut known = text_set(&countries, "iso_code")?;
    for kind in TableKind::FACTS {
        let Some(fact) = tables.get(kind) else {
            continue;
        };
        for code in fact.column_values("iso_code")?.flatten() {
            let code = code.as_display();
            if known.insert(code.clone()) {
                countries.push_row(vec![text(&code), text(SENTINEL_REGION_CODE), text(&code)])?;
                report.countries_added.push(code);
            }
        }
    }
    if !report.countries_added.is_empty() {
        warn!(
            "{} country code(s) referenced by facts were missing, added under '{}': {}",
            report.countries_added.len(),
            SENTINEL_REGION_CODE,
            report.countries_added.iter().join(", ")
        );
    }
    tables.insert(TableKind::Countries, countries);
    Ok(report)
}
