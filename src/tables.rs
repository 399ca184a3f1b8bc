//! Logical tables of the target schema and the in-memory set holding them.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::dataset::TabularDataset;

/// Tables in load order: every dimension precedes the tables that
/// reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Regions,
    Countries,
    GasTypes,
    Gases,
    PollutantSources,
    EnergySources,
    EconomicIndicators,
    Demographics,
    TotalGhgEmissions,
    TradeEmissions,
    PollutantEmissions,
    EnergyActivities,
}

impl TableKind {
    pub const ALL: [TableKind; 12] = [
        TableKind::Regions,
        TableKind::Countries,
        TableKind::GasTypes,
        TableKind::Gases,
        TableKind::PollutantSources,
        TableKind::EnergySources,
        TableKind::EconomicIndicators,
        TableKind::Demographics,
        TableKind::TotalGhgEmissions,
        TableKind::TradeEmissions,
        TableKind::PollutantEmissions,
        TableKind::EnergyActivities,
    ];

    pub const FACTS: [TableKind; 6] = [
        TableKind::EconomicIndicators,
        TableKind::Demographics,
        TableKind::TotalGhgEmissions,
        TableKind::TradeEmissions,
        TableKind::PollutantEmissions,
        TableKind::EnergyActivities,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            TableKind::Regions => "regions",
            TableKind::Countries => "countries",
            TableKind::GasTypes => "gas_types",
            TableKind::Gases => "gases",
            TableKind::PollutantSources => "pollutant_sources",
            TableKind::EnergySources => "energy_sources",
            TableKind::EconomicIndicators => "economic_indicators",
            TableKind::Demographics => "demographics",
            TableKind::TotalGhgEmissions => "total_ghg_emissions",
            TableKind::TradeEmissions => "trade_emissions",
            TableKind::PollutantEmissions => "pollutant_emissions",
            TableKind::EnergyActivities => "energy_activities",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.csv", self.table_name())
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table_name() == name)
    }

    pub fn is_dimension(self) -> bool {
        !Self::FACTS.contains(&self)
    }

    /// Output column order of the table.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Regions => &["region_code", "name"],
            TableKind::Countries => &["iso_code", "region_code", "name"],
            TableKind::GasTypes => &["gas_type_id", "name"],
            TableKind::Gases => &["gas_id", "gas_type_id", "name"],
            TableKind::PollutantSources => &["pollutant_source_id", "name"],
            TableKind::EnergySources => &["energy_source_id", "name"],
            TableKind::EconomicIndicators => &["iso_code", "year", "gdp"],
            TableKind::Demographics => &["iso_code", "year", "population"],
            TableKind::TotalGhgEmissions => {
                &["iso_code", "year", "total_ghg", "total_ghg_excluding_lucf"]
            }
            TableKind::TradeEmissions => {
                &["iso_code", "gas_id", "year", "trade_co2", "consumption_co2"]
            }
            TableKind::PollutantEmissions => &[
                "iso_code",
                "gas_id",
                "pollutant_source_id",
                "year",
                "emission",
                "cumulative_emission",
            ],
            TableKind::EnergyActivities => &[
                "iso_code",
                "energy_source_id",
                "year",
                "production",
                "generation",
                "consumption",
            ],
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Tables produced by one pipeline run. A kind without an entry failed to
/// build and is treated as unavailable for loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSet {
    tables: BTreeMap<TableKind, TabularDataset>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: TableKind, table: TabularDataset) {
        self.tables.insert(kind, table.with_name(kind.table_name()));
    }

    pub fn get(&self, kind: TableKind) -> Option<&TabularDataset> {
        self.tables.get(&kind)
    }

    pub fn take(&mut self, kind: TableKind) -> Option<TabularDataset> {
        self.tables.remove(&kind)
    }

    pub fn contains(&self, kind: TableKind) -> bool {
        self.tables.contains_key(&kind)
    }

    /// Present tables in load order.
    pub fn iter(&self) -> impl Iterator<Item = (TableKind, &TabularDataset)> {
        self.tables.iter().map(|(kind, table)| (*kind, table))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
