mod common;

use climate_etl::{
    export::{LoadManifest, MANIFEST_FILE},
    loader, pipeline,
    queries::{self, Cell},
    tables::TableKind,
};
use common::{TestWorkspace, read_csv};

fn prepared_database(workspace: &TestWorkspace) -> (climate_etl::config::PipelineConfig, rusqlite::Connection) {
    let config = workspace.fixture_config("run");
    let outcome = pipeline::prepare(&config, false).expect("prepare");
    let report = loader::load_into(&config.database, &outcome.manifest).expect("load");
    assert!(report.failed.is_empty(), "failed tables: {:?}", report.failed);
    let conn = loader::open_database(&config.database).expect("open db");
    (config, conn)
}

#[test]
fn every_exported_table_loads_with_matching_row_counts() {
    let workspace = TestWorkspace::new();
    let config = workspace.fixture_config("run");
    let outcome = pipeline::prepare(&config, false).expect("prepare");
    let report = loader::load_into(&config.database, &outcome.manifest).expect("load");

    for entry in &outcome.manifest.entries {
        assert_eq!(report.rows_for(entry.table), Some(entry.rows), "{}", entry.table);
    }
    let conn = loader::open_database(&config.database).expect("open db");
    let null_production: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM energy_activities WHERE production IS NULL",
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert!(null_production > 0);
}

#[test]
fn loading_twice_rebuilds_from_scratch() {
    let workspace = TestWorkspace::new();
    let (config, _) = prepared_database(&workspace);
    let manifest = LoadManifest::load(&config.output_dir.join(MANIFEST_FILE)).expect("manifest");
    let report = loader::load_into(&config.database, &manifest).expect("reload");
    assert_eq!(report.rows_for(TableKind::Countries), Some(4));

    let conn = loader::open_database(&config.database).expect("open db");
    let countries: i64 = conn
        .query_row("SELECT COUNT(*) FROM countries", [], |row| row.get(0))
        .expect("count");
    assert_eq!(countries, 4);
}

#[test]
fn a_missing_table_file_does_not_stop_later_tables() {
    let workspace = TestWorkspace::new();
    let config = workspace.fixture_config("run");
    let outcome = pipeline::prepare(&config, false).expect("prepare");
    std::fs::remove_file(config.output_dir.join("gas_types.csv")).expect("remove");

    let report = loader::load_into(&config.database, &outcome.manifest).expect("load");
    // Everything that references gases is rejected along with it.
    assert_eq!(
        report.failed,
        vec![
            TableKind::GasTypes,
            TableKind::Gases,
            TableKind::TradeEmissions,
            TableKind::PollutantEmissions,
        ]
    );
    assert_eq!(report.rows_for(TableKind::Demographics), Some(6));
    assert_eq!(report.rows_for(TableKind::EnergyActivities), Some(13));
}

#[test]
fn per_capita_ranking_pairs_emissions_with_the_same_country() {
    let workspace = TestWorkspace::new();
    let (config, conn) = prepared_database(&workspace);
    let result = queries::run_query(&conn, 2, &config.queries).expect("query 2");
    let names: Vec<_> = result.rows.iter().map(|row| row[0].clone()).collect();
    assert_eq!(
        names,
        vec![
            Cell::Text("World".into()),
            Cell::Text("Argentina".into()),
            Cell::Text("Brazil".into()),
        ]
    );
    assert_eq!(result.rows[0][1].as_f64(), Some(16000.0));
    assert_eq!(result.rows[0][2], Cell::Integer(7_800_000_000));
}

#[test]
fn energy_mix_ranks_by_renewable_consumption() {
    let workspace = TestWorkspace::new();
    let (config, conn) = prepared_database(&workspace);
    let result = queries::run_query(&conn, 3, &config.queries).expect("query 3");
    assert_eq!(
        result.headers,
        ["country", "renewable_consumption", "non_renewable_consumption"]
    );
    assert_eq!(
        result.rows[0],
        vec![Cell::Text("Norway".into()), Cell::Real(1524.0), Cell::Real(201.0)]
    );
    assert_eq!(
        result.rows[1],
        vec![Cell::Text("Brazil".into()), Cell::Real(585.0), Cell::Real(650.0)]
    );
}

#[test]
fn reduction_query_lists_only_countries_that_decreased() {
    let workspace = TestWorkspace::new();
    let (config, conn) = prepared_database(&workspace);
    let result = queries::run_query(&conn, 5, &config.queries).expect("query 5");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0][0], Cell::Text("Brazil".into()));
    assert_eq!(result.rows[0][3].as_f64(), Some(-40.0));
}

#[test]
fn battery_persists_one_file_per_query() {
    let workspace = TestWorkspace::new();
    let (config, conn) = prepared_database(&workspace);
    let results = queries::run_battery(&conn, &config.queries, &[], &config.results_dir);
    assert_eq!(results.len(), 5);
    for number in queries::QUERY_NUMBERS {
        let path = config.results_dir.join(format!("query{number}.csv"));
        assert!(path.exists(), "{path:?}");
    }
    let (headers, rows) = read_csv(&config.results_dir.join("query1.csv"));
    assert_eq!(headers, ["year", "pollutant_source", "total_emission"]);
    assert_eq!(rows[0], ["2010", "Cement", "20"]);
}
