//! SQLite loader for exported tables.
//!
//! The schema is dropped and recreated on every load. Tables are loaded in
//! manifest order, each inside its own transaction, so a rejected table rolls
//! back alone and the remaining tables still load.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use log::{debug, error, info};
use rusqlite::{Connection, params_from_iter};

use crate::{
    error::PipelineError,
    export::{LoadManifest, ManifestEntry},
    io_utils,
    tables::TableKind,
};

const DROP_SCHEMA: &str = "
    DROP TABLE IF EXISTS energy_activities;
    DROP TABLE IF EXISTS pollutant_emissions;
    DROP TABLE IF EXISTS trade_emissions;
    DROP TABLE IF EXISTS total_ghg_emissions;
    DROP TABLE IF EXISTS demographics;
    DROP TABLE IF EXISTS economic_indicators;
    DROP TABLE IF EXISTS energy_sources;
    DROP TABLE IF EXISTS pollutant_sources;
    DROP TABLE IF EXISTS gases;
    DROP TABLE IF EXISTS gas_types;
    DROP TABLE IF EXISTS countries;
    DROP TABLE IF EXISTS regions;
";

const CREATE_SCHEMA: &str = "
    CREATE TABLE regions (
        region_code VARCHAR(4) PRIMARY KEY,
        name VARCHAR(50) NOT NULL
    );

    CREATE TABLE countries (
        iso_code VARCHAR(4) PRIMARY KEY,
        region_code VARCHAR(4) NOT NULL REFERENCES regions(region_code),
        name VARCHAR(50) NOT NULL
    );

    CREATE TABLE gas_types (
        gas_type_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );

    CREATE TABLE gases (
        gas_id INTEGER PRIMARY KEY,
        gas_type_id INTEGER NOT NULL REFERENCES gas_types(gas_type_id),
        name TEXT NOT NULL
    );

    CREATE TABLE pollutant_sources (
        pollutant_source_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );

    CREATE TABLE energy_sources (
        energy_source_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );

    CREATE TABLE economic_indicators (
        iso_code VARCHAR(4) NOT NULL REFERENCES countries(iso_code),
        year INTEGER NOT NULL,
        gdp REAL NOT NULL
    );

    CREATE TABLE demographics (
        iso_code VARCHAR(4) NOT NULL REFERENCES countries(iso_code),
        year INTEGER NOT NULL,
        population INTEGER NOT NULL
    );

    CREATE TABLE total_ghg_emissions (
        iso_code VARCHAR(4) NOT NULL REFERENCES countries(iso_code),
        year INTEGER NOT NULL,
        total_ghg REAL,
        total_ghg_excluding_lucf REAL
    );

    CREATE TABLE trade_emissions (
        iso_code VARCHAR(4) NOT NULL REFERENCES countries(iso_code),
        gas_id INTEGER NOT NULL REFERENCES gases(gas_id),
        year INTEGER NOT NULL,
        trade_co2 REAL,
        consumption_co2 REAL
    );

    CREATE TABLE pollutant_emissions (
        iso_code VARCHAR(4) NOT NULL REFERENCES countries(iso_code),
        gas_id INTEGER NOT NULL REFERENCES gases(gas_id),
        pollutant_source_id INTEGER NOT NULL REFERENCES pollutant_sources(pollutant_source_id),
        year INTEGER NOT NULL,
        emission REAL NOT NULL,
        cumulative_emission REAL NOT NULL
    );

    CREATE TABLE energy_activities (
        iso_code VARCHAR(4) NOT NULL REFERENCES countries(iso_code),
        energy_source_id INTEGER NOT NULL REFERENCES energy_sources(energy_source_id),
        year INTEGER NOT NULL,
        production REAL,
        generation REAL,
        consumption REAL NOT NULL
    );
";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<(TableKind, usize)>,
    pub failed: Vec<TableKind>,
}

impl LoadReport {
    pub fn rows_for(&self, kind: TableKind) -> Option<usize> {
        self.loaded
            .iter()
            .find(|(loaded, _)| *loaded == kind)
            .map(|(_, rows)| *rows)
    }
}

pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Creating database directory {parent:?}"))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("Opening SQLite database {path:?}"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

pub fn recreate_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(DROP_SCHEMA)
        .context("Dropping existing schema")?;
    conn.execute_batch(CREATE_SCHEMA)
        .context("Creating schema")?;
    Ok(())
}

fn load_table(conn: &mut Connection, manifest: &LoadManifest, entry: &ManifestEntry) -> Result<usize> {
    let path = manifest.entry_path(entry);
    let kind = entry.table;
    let mut reader = io_utils::open_csv_reader_from_path(&path, io_utils::DEFAULT_CSV_DELIMITER)?;
    let headers = io_utils::reader_headers(&mut reader, encoding_rs::UTF_8)?;
    ensure!(
        headers.iter().map(String::as_str).eq(kind.columns().iter().copied()),
        "Columns {:?} in {:?} do not match table '{}' ({:?})",
        headers,
        path,
        kind,
        kind.columns()
    );

    let placeholders = (1..=headers.len())
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        kind.table_name(),
        kind.columns().join(", "),
        placeholders
    );
    debug!("{sql}");

    let tx = conn.transaction()?;
    let mut rows = 0usize;
    {
        let mut stmt = tx.prepare(&sql)?;
        for (idx, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
            stmt.execute(params_from_iter(
                record
                    .iter()
                    .map(|field| (!field.is_empty()).then_some(field)),
            ))
            .with_context(|| format!("Inserting row {} of {path:?}", idx + 2))?;
            rows += 1;
        }
    }
    tx.commit()?;
    Ok(rows)
}

/// Recreates the schema and loads every manifest entry in order.
pub fn load_manifest(conn: &mut Connection, manifest: &LoadManifest) -> Result<LoadReport> {
    recreate_schema(conn)?;
    let mut report = LoadReport::default();
    for entry in &manifest.entries {
        match load_table(conn, manifest, entry) {
            Ok(rows) => {
                info!("✓ Loaded {rows} row(s) into '{}'", entry.table);
                report.loaded.push((entry.table, rows));
            }
            Err(source) => {
                let err = PipelineError::Load {
                    table: entry.table.table_name().to_string(),
                    source,
                };
                error!("{}", err.chain());
                report.failed.push(entry.table);
            }
        }
    }
    info!(
        "Loaded {} table(s); {} failed",
        report.loaded.len(),
        report.failed.len()
    );
    Ok(report)
}

pub fn load_into(db_path: &Path, manifest: &LoadManifest) -> Result<LoadReport> {
    let mut conn = open_database(db_path)?;
    load_manifest(&mut conn, manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::{TabularDataset, float, int, text},
        export,
        tables::TableSet,
    };

    fn table(kind: TableKind, rows: Vec<crate::dataset::Row>) -> TabularDataset {
        TabularDataset::from_rows(kind.table_name(), kind.columns().to_vec(), rows)
            .expect("table")
    }

    fn exported(dir: &Path, set: &TableSet) -> LoadManifest {
        export::export_tables(set, dir).expect("export")
    }

    #[test]
    fn loads_tables_and_maps_empty_fields_to_null() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut set = TableSet::new();
        set.insert(
            TableKind::Regions,
            table(TableKind::Regions, vec![vec![text("WLD"), text("World")]]),
        );
        set.insert(
            TableKind::Countries,
            table(
                TableKind::Countries,
                vec![vec![text("BRA"), text("WLD"), text("Brazil")]],
            ),
        );
        set.insert(
            TableKind::TotalGhgEmissions,
            table(
                TableKind::TotalGhgEmissions,
                vec![vec![text("BRA"), int(2020), None, float(1.5)]],
            ),
        );
        let manifest = exported(dir.path(), &set);
        let mut conn = Connection::open_in_memory().expect("db");
        conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
        let report = load_manifest(&mut conn, &manifest).expect("load");
        assert!(report.failed.is_empty());
        assert_eq!(report.rows_for(TableKind::TotalGhgEmissions), Some(1));

        let (total, excluding): (Option<f64>, f64) = conn
            .query_row(
                "SELECT total_ghg, total_ghg_excluding_lucf FROM total_ghg_emissions",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("query");
        assert_eq!(total, None);
        assert_eq!(excluding, 1.5);
    }

    #[test]
    fn rejected_table_rolls_back_without_stopping_siblings() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut set = TableSet::new();
        set.insert(
            TableKind::Regions,
            table(TableKind::Regions, vec![vec![text("WLD"), text("World")]]),
        );
        // Unknown region violates the foreign key.
        set.insert(
            TableKind::Countries,
            table(
                TableKind::Countries,
                vec![
                    vec![text("BRA"), text("WLD"), text("Brazil")],
                    vec![text("ARG"), text("LAC"), text("Argentina")],
                ],
            ),
        );
        set.insert(
            TableKind::GasTypes,
            table(TableKind::GasTypes, vec![vec![int(1), text("Greenhouse Gas")]]),
        );
        let manifest = exported(dir.path(), &set);
        let mut conn = Connection::open_in_memory().expect("db");
        conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
        let report = load_manifest(&mut conn, &manifest).expect("load");
        assert_eq!(report.failed, vec![TableKind::Countries]);
        assert_eq!(report.rows_for(TableKind::GasTypes), Some(1));
        let countries: i64 = conn
            .query_row("SELECT COUNT(*) FROM countries", [], |row| row.get(0))
            .expect("count");
        assert_eq!(countries, 0);

        let entry = manifest.get(TableKind::Countries).expect("countries entry");
        let source = load_table(&mut conn, &manifest, entry).expect_err("foreign key");
        let message = PipelineError::Load {
            table: "countries".to_string(),
            source,
        }
        .chain();
        assert!(message.starts_with("loading table 'countries' failed: "), "{message}");
        assert!(message.contains("FOREIGN KEY constraint failed"), "{message}");
    }
}
