//! The numbered analytical queries run against the loaded database.
//!
//! Every query is read-only. Results are printed as a console table and
//! persisted to `<results_dir>/query<N>.csv`; a failing query is logged and
//! the remaining queries still run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info};
use rusqlite::{Connection, ToSql, types::ValueRef};

use crate::{config::QueryParams, error::PipelineError, io_utils, table};

pub const RENEWABLE_SOURCES: [&str; 5] = ["Hydro", "Solar", "Wind", "Biofuel", "Other Renewables"];
pub const NON_RENEWABLE_SOURCES: [&str; 3] = ["Coal", "Oil", "Gas"];

pub const QUERY_NUMBERS: [usize; 5] = [1, 2, 3, 4, 5];

const EMISSION_TREND: &str = "
    SELECT pe.year AS year,
           ps.name AS pollutant_source,
           SUM(pe.emission) AS total_emission
    FROM pollutant_emissions pe
    JOIN pollutant_sources ps ON ps.pollutant_source_id = pe.pollutant_source_id
    WHERE pe.iso_code = ?1 AND pe.year BETWEEN ?2 AND ?3
    GROUP BY pe.year, ps.name
    ORDER BY pe.year, ps.name";

const PER_CAPITA_RANKING: &str = "
    SELECT c.name AS country,
           e.total_emission AS total_emission,
           d.population AS population,
           e.total_emission / d.population AS emission_per_capita
    FROM (
        SELECT iso_code, year, SUM(emission) AS total_emission
        FROM pollutant_emissions
        WHERE year = ?1
        GROUP BY iso_code, year
    ) e
    JOIN demographics d ON d.iso_code = e.iso_code AND d.year = e.year
    JOIN countries c ON c.iso_code = e.iso_code
    WHERE d.population > 0
    ORDER BY emission_per_capita DESC, c.name
    LIMIT ?2";

const ENERGY_MIX: &str = "
    SELECT c.name AS country,
           SUM(CASE WHEN es.name IN (?2, ?3, ?4, ?5, ?6) THEN ea.consumption ELSE 0.0 END)
               AS renewable_consumption,
           SUM(CASE WHEN es.name IN (?7, ?8, ?9) THEN ea.consumption ELSE 0.0 END)
               AS non_renewable_consumption
    FROM energy_activities ea
    JOIN energy_sources es ON es.energy_source_id = ea.energy_source_id
    JOIN countries c ON c.iso_code = ea.iso_code
    WHERE ea.year = ?1
    GROUP BY c.iso_code, c.name
    ORDER BY renewable_consumption DESC, c.name
    LIMIT ?10";

const REGIONAL_EMISSIONS: &str = "
    SELECT r.name AS region,
           ps.name AS pollutant_source,
           SUM(pe.emission) AS total_emission
    FROM pollutant_emissions pe
    JOIN countries c ON c.iso_code = pe.iso_code
    JOIN regions r ON r.region_code = c.region_code
    JOIN pollutant_sources ps ON ps.pollutant_source_id = pe.pollutant_source_id
    WHERE pe.year = ?1
    GROUP BY r.name, ps.name
    ORDER BY r.name, total_emission DESC";

const EMISSION_REDUCTION: &str = "
    SELECT c.name AS country,
           f.total AS emission_from,
           t.total AS emission_to,
           t.total - f.total AS reduction
    FROM (
        SELECT iso_code, SUM(emission) AS total
        FROM pollutant_emissions WHERE year = ?1 GROUP BY iso_code
    ) f
    JOIN (
        SELECT iso_code, SUM(emission) AS total
        FROM pollutant_emissions WHERE year = ?2 GROUP BY iso_code
    ) t ON t.iso_code = f.iso_code
    JOIN countries c ON c.iso_code = f.iso_code
    WHERE t.total < f.total
    ORDER BY reduction ASC, c.name
    LIMIT ?3";

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub number: usize,
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(v) => Cell::Integer(v),
            ValueRef::Real(v) => Cell::Real(v),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Cell::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }

    /// Full-precision rendering for result files.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Integer(v) => v.to_string(),
            Cell::Real(v) => v.to_string(),
            Cell::Text(v) => v.clone(),
        }
    }

    /// Two-decimal rendering for the console.
    pub fn to_display(&self) -> String {
        match self {
            Cell::Real(v) => format!("{v:.2}"),
            other => other.to_field(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(v) => Some(*v as f64),
            Cell::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl QueryResult {
    pub fn render(&self) -> String {
        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().map(Cell::to_display).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        table::render_table(&self.headers, &rows)
    }

    pub fn save(&self, results_dir: &Path) -> Result<PathBuf> {
        let path = results_dir.join(format!("query{}.csv", self.number));
        let mut writer = io_utils::open_csv_writer(&path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Cell::to_field))?;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing {path:?}"))?;
        Ok(path)
    }
}

fn run_sql(
    conn: &Connection,
    number: usize,
    title: &str,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let headers = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let width = headers.len();
    let rows = stmt
        .query_map(params, |row| {
            (0..width)
                .map(|idx| row.get_ref(idx).map(Cell::from_sql))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(QueryResult {
        number,
        title: title.to_string(),
        headers,
        rows,
    })
}

pub fn run_query(conn: &Connection, number: usize, params: &QueryParams) -> Result<QueryResult> {
    let ranking_limit = params.ranking_limit as i64;
    let energy_limit = params.energy_limit as i64;
    let reduction_limit = params.reduction_limit as i64;
    match number {
        1 => run_sql(
            conn,
            1,
            &format!(
                "Emission trend by pollutant source for {} ({}-{})",
                params.trend_country, params.trend_start_year, params.trend_end_year
            ),
            EMISSION_TREND,
            &[
                &params.trend_country,
                &params.trend_start_year,
                &params.trend_end_year,
            ],
        ),
        2 => run_sql(
            conn,
            2,
            &format!(
                "Top {} countries by emission per capita in {}",
                params.ranking_limit, params.ranking_year
            ),
            PER_CAPITA_RANKING,
            &[&params.ranking_year, &ranking_limit],
        ),
        3 => {
            let [r1, r2, r3, r4, r5] = RENEWABLE_SOURCES;
            let [n1, n2, n3] = NON_RENEWABLE_SOURCES;
            run_sql(
                conn,
                3,
                &format!(
                    "Renewable vs non-renewable energy consumption in {} (top {})",
                    params.energy_year, params.energy_limit
                ),
                ENERGY_MIX,
                &[
                    &params.energy_year,
                    &r1,
                    &r2,
                    &r3,
                    &r4,
                    &r5,
                    &n1,
                    &n2,
                    &n3,
                    &energy_limit,
                ],
            )
        }
        4 => run_sql(
            conn,
            4,
            &format!(
                "Emissions by region and pollutant source in {}",
                params.regional_year
            ),
            REGIONAL_EMISSIONS,
            &[&params.regional_year],
        ),
        5 => run_sql(
            conn,
            5,
            &format!(
                "Top {} emission reductions ({} to {})",
                params.reduction_limit, params.reduction_from_year, params.reduction_to_year
            ),
            EMISSION_REDUCTION,
            &[
                &params.reduction_from_year,
                &params.reduction_to_year,
                &reduction_limit,
            ],
        ),
        other => anyhow::bail!(
            "Unknown query number {other}; expected one of {:?}",
            QUERY_NUMBERS
        ),
    }
}

/// Runs the selected queries (all when `only` is empty), printing and saving
/// each result. Returns the results that succeeded.
pub fn run_battery(
    conn: &Connection,
    params: &QueryParams,
    only: &[usize],
    results_dir: &Path,
) -> Vec<QueryResult> {
    let selected = if only.is_empty() {
        QUERY_NUMBERS.to_vec()
    } else {
        only.to_vec()
    };
    let mut results = Vec::new();
    for number in selected {
        let outcome = run_query(conn, number, params).and_then(|result| {
            let path = result.save(results_dir)?;
            Ok((result, path))
        });
        match outcome {
            Ok((result, path)) => {
                println!("\nQuery {}: {}", result.number, result.title);
                print!("{}", result.render());
                info!("✓ {} row(s) saved to {:?}", result.rows.len(), path);
                results.push(result);
            }
            Err(source) => {
                let err = PipelineError::Query { number, source };
                error!("{}", err.chain());
            }
        }
    }
    results
}
