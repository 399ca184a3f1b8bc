//! Document collections for a document store.
//!
//! Each country becomes one nested document with its region, its emissions
//! by pollutant source, its energy consumption by source and its economic
//! indicators. The pollutant and energy source lists are written as their own
//! small collections. Output is JSON Lines, one document per line.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    data::Value,
    dataset::TabularDataset,
    dimensions::{SENTINEL_REGION_CODE, SENTINEL_REGION_NAME},
    error::PipelineError,
    tables::{TableKind, TableSet},
};

pub const COUNTRIES_FILE: &str = "countries.jsonl";

/// Source dimensions exported as standalone collections.
pub const SOURCE_COLLECTIONS: [(TableKind, &str); 2] = [
    (TableKind::PollutantSources, "pollutant_sources.jsonl"),
    (TableKind::EnergySources, "energy_sources.jsonl"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRef {
    pub region_code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmissionEntry {
    pub year: i64,
    pub pollutant_source: String,
    pub emission: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyEntry {
    pub year: i64,
    pub energy_source: String,
    pub consumption: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorEntry {
    pub year: i64,
    pub gdp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub region: RegionRef,
    pub emissions: Vec<EmissionEntry>,
    pub energy: Vec<EnergyEntry>,
    pub economic_indicators: Vec<IndicatorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDocument {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
}

impl CountryDocument {
    fn placeholder(iso_code: &str) -> Self {
        Self {
            id: iso_code.to_string(),
            name: iso_code.to_string(),
            region: RegionRef {
                region_code: SENTINEL_REGION_CODE.to_string(),
                name: SENTINEL_REGION_NAME.to_string(),
            },
            emissions: Vec::new(),
            energy: Vec::new(),
            economic_indicators: Vec::new(),
        }
    }
}

fn display(cell: &Option<Value>) -> Option<String> {
    cell.as_ref().map(Value::as_display)
}

fn id_names(table: Option<&TabularDataset>, id_column: &str) -> Result<HashMap<i64, String>> {
    let Some(table) = table else {
        return Ok(HashMap::new());
    };
    let id_idx = table.require_column(id_column)?;
    let name_idx = table.require_column("name")?;
    Ok(table
        .rows()
        .iter()
        .filter_map(|row| {
            let id = row[id_idx].as_ref()?.as_i64()?;
            Some((id, display(&row[name_idx])?))
        })
        .collect())
}

/// Collects documents keyed by ISO code while preserving first-seen order.
struct DocumentSet {
    order: Vec<String>,
    documents: HashMap<String, CountryDocument>,
}

impl DocumentSet {
    fn entry(&mut self, iso_code: &str) -> &mut CountryDocument {
        if !self.documents.contains_key(iso_code) {
            self.order.push(iso_code.to_string());
        }
        self.documents
            .entry(iso_code.to_string())
            .or_insert_with(|| CountryDocument::placeholder(iso_code))
    }

    fn into_vec(mut self) -> Vec<CountryDocument> {
        self.order
            .iter()
            .filter_map(|iso| self.documents.remove(iso))
            .collect()
    }
}

/// Fact rows as `(iso_code, year, source_or_none, measure)`.
fn fact_rows<'a>(
    table: &'a TabularDataset,
    source_column: Option<&str>,
    measure: &str,
) -> Result<impl Iterator<Item = (String, i64, Option<i64>, f64)> + 'a> {
    let iso_idx = table.require_column("iso_code")?;
    let year_idx = table.require_column("year")?;
    let source_idx = source_column
        .map(|column| table.require_column(column))
        .transpose()?;
    let measure_idx = table.require_column(measure)?;
    Ok(table.rows().iter().filter_map(move |row| {
        let iso = display(&row[iso_idx])?;
        let year = row[year_idx].as_ref()?.as_i64()?;
        let source = match source_idx {
            Some(idx) => Some(row[idx].as_ref()?.as_i64()?),
            None => None,
        };
        let value = row[measure_idx].as_ref()?.as_f64()?;
        Some((iso, year, source, value))
    }))
}

pub fn build_documents(tables: &TableSet) -> Result<Vec<CountryDocument>> {
    let mut set = DocumentSet {
        order: Vec::new(),
        documents: HashMap::new(),
    };

    let region_names: HashMap<String, String> = match tables.get(TableKind::Regions) {
        Some(regions) => {
            let code_idx = regions.require_column("region_code")?;
            let name_idx = regions.require_column("name")?;
            regions
                .rows()
                .iter()
                .filter_map(|row| Some((display(&row[code_idx])?, display(&row[name_idx])?)))
                .collect()
        }
        None => HashMap::new(),
    };

    if let Some(countries) = tables.get(TableKind::Countries) {
        let iso_idx = countries.require_column("iso_code")?;
        let region_idx = countries.require_column("region_code")?;
        let name_idx = countries.require_column("name")?;
        for row in countries.rows() {
            let Some(iso) = display(&row[iso_idx]) else {
                continue;
            };
            let region_code =
                display(&row[region_idx]).unwrap_or_else(|| SENTINEL_REGION_CODE.to_string());
            let region_name = region_names
                .get(&region_code)
                .cloned()
                .unwrap_or_else(|| SENTINEL_REGION_NAME.to_string());
            let document = set.entry(&iso);
            document.name = display(&row[name_idx]).unwrap_or_else(|| iso.clone());
            document.region = RegionRef {
                region_code,
                name: region_name,
            };
        }
    }

    if let Some(emissions) = tables.get(TableKind::PollutantEmissions) {
        let sources = id_names(tables.get(TableKind::PollutantSources), "pollutant_source_id")?;
        for (iso, year, source, emission) in
            fact_rows(emissions, Some("pollutant_source_id"), "emission")?
        {
            let pollutant_source = source
                .and_then(|id| sources.get(&id).cloned())
                .unwrap_or_default();
            set.entry(&iso).emissions.push(EmissionEntry {
                year,
                pollutant_source,
                emission,
            });
        }
    }

    if let Some(activities) = tables.get(TableKind::EnergyActivities) {
        let sources = id_names(tables.get(TableKind::EnergySources), "energy_source_id")?;
        for (iso, year, source, consumption) in
            fact_rows(activities, Some("energy_source_id"), "consumption")?
        {
            let energy_source = source
                .and_then(|id| sources.get(&id).cloned())
                .unwrap_or_default();
            set.entry(&iso).energy.push(EnergyEntry {
                year,
                energy_source,
                consumption,
            });
        }
    }

    if let Some(indicators) = tables.get(TableKind::EconomicIndicators) {
        for (iso, year, _, gdp) in fact_rows(indicators, None, "gdp")? {
            set.entry(&iso)
                .economic_indicators
                .push(IndicatorEntry { year, gdp });
        }
    }

    Ok(set.into_vec())
}

/// `{_id, name}` documents for a source dimension, in table order.
pub fn build_source_documents(tables: &TableSet, kind: TableKind) -> Result<Vec<SourceDocument>> {
    let table = tables
        .get(kind)
        .ok_or_else(|| PipelineError::MissingInput(kind.table_name().to_string()))?;
    let id_column = kind.columns()[0];
    let id_idx = table.require_column(id_column)?;
    let name_idx = table.require_column("name")?;
    Ok(table
        .rows()
        .iter()
        .filter_map(|row| {
            Some(SourceDocument {
                id: row[id_idx].as_ref()?.as_i64()?,
                name: display(&row[name_idx])?,
            })
        })
        .collect())
}

/// Writes one JSON document per line and returns the number written.
pub fn write_json_lines<T: Serialize>(documents: &[T], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Creating directory {parent:?}"))?;
    }
    let file = File::create(path).with_context(|| format!("Creating {path:?}"))?;
    let mut writer = BufWriter::new(file);
    for (idx, document) in documents.iter().enumerate() {
        serde_json::to_writer(&mut writer, document)
            .with_context(|| format!("Serializing document {} for {path:?}", idx + 1))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(documents.len())
}

pub fn write_documents(tables: &TableSet, path: &Path) -> Result<usize> {
    write_json_lines(&build_documents(tables)?, path)
}

pub fn write_source_documents(tables: &TableSet, kind: TableKind, path: &Path) -> Result<usize> {
    write_json_lines(&build_source_documents(tables, kind)?, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{float, int, text};
    use crate::dimensions;

    fn table(kind: TableKind, rows: Vec<crate::dataset::Row>) -> TabularDataset {
        TabularDataset::from_rows(kind.table_name(), kind.columns().to_vec(), rows)
            .expect("table")
    }

    fn sample() -> TableSet {
        let mut set = TableSet::new();
        set.insert(
            TableKind::Regions,
            table(
                TableKind::Regions,
                vec![vec![text("LAC"), text("Latin America")], vec![text("WLD"), text("World")]],
            ),
        );
        set.insert(
            TableKind::Countries,
            table(TableKind::Countries, vec![vec![text("BRA"), text("LAC"), text("Brazil")]]),
        );
        set.insert(
            TableKind::PollutantSources,
            dimensions::pollutant_sources().expect("sources"),
        );
        set.insert(
            TableKind::EnergySources,
            dimensions::energy_sources().expect("sources"),
        );
        set.insert(
            TableKind::PollutantEmissions,
            table(
                TableKind::PollutantEmissions,
                vec![vec![text("BRA"), int(1), int(2), int(2020), float(10.5), float(100.0)]],
            ),
        );
        set.insert(
            TableKind::EnergyActivities,
            table(
                TableKind::EnergyActivities,
                vec![vec![text("KOS"), int(4), int(2020), None, float(1.0), float(2.5)]],
            ),
        );
        set.insert(
            TableKind::EconomicIndicators,
            table(
                TableKind::EconomicIndicators,
                vec![vec![text("BRA"), int(2020), float(1.5e12)]],
            ),
        );
        set
    }

    #[test]
    fn documents_nest_facts_under_their_country() {
        let documents = build_documents(&sample()).expect("documents");
        assert_eq!(documents.len(), 2);
        let brazil = &documents[0];
        assert_eq!(brazil.id, "BRA");
        assert_eq!(brazil.region.name, "Latin America");
        assert_eq!(brazil.emissions[0].pollutant_source, "Coal");
        assert_eq!(brazil.economic_indicators.len(), 1);
    }

    #[test]
    fn unknown_countries_use_code_and_sentinel_region() {
        let documents = build_documents(&sample()).expect("documents");
        let kosovo = &documents[1];
        assert_eq!(kosovo.name, "KOS");
        assert_eq!(kosovo.region.region_code, "WLD");
        assert_eq!(kosovo.energy[0].energy_source, "Hydro");
    }

    #[test]
    fn json_lines_use_document_id_field() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("countries.jsonl");
        let count = write_documents(&sample(), &path).expect("write");
        assert_eq!(count, 2);
        let contents = fs::read_to_string(&path).expect("read");
        let first: serde_json::Value =
            serde_json::from_str(contents.lines().next().expect("line")).expect("json");
        assert_eq!(first["_id"], "BRA");
        assert_eq!(first["region"]["region_code"], "LAC");
        assert_eq!(first["emissions"][0]["year"], 2020);
    }

    #[test]
    fn source_collections_list_ids_and_names() {
        let dir = tempfile::tempdir().expect("temp dir");
        let set = sample();
        let path = dir.path().join(SOURCE_COLLECTIONS[1].1);
        let count = write_source_documents(&set, TableKind::EnergySources, &path).expect("write");
        assert_eq!(count, 9);

        let contents = fs::read_to_string(&path).expect("read");
        let first: serde_json::Value =
            serde_json::from_str(contents.lines().next().expect("line")).expect("json");
        assert_eq!(first["_id"], 1);
        assert_eq!(first["name"], "Biofuel");

        let pollutants =
            build_source_documents(&set, TableKind::PollutantSources).expect("pollutants");
        assert_eq!(pollutants[6].name, "Land Use Change");
    }

    #[test]
    fn source_collection_requires_its_table() {
        let err = build_source_documents(&TableSet::new(), TableKind::EnergySources)
            .expect_err("missing table");
        assert!(err.to_string().contains("energy_sources"));
    }
}
