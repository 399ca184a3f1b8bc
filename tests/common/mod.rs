#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use climate_etl::config::{InputPaths, PipelineConfig};
use tempfile::{TempDir, tempdir};

pub const CO2_FIXTURE: &str = "co2.csv";
pub const ENERGY_FIXTURE: &str = "energy.csv";
pub const SOCIO_FIXTURE: &str = "pip.csv";

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Configuration reading the bundled fixtures and writing every output
    /// under `subdir` of this workspace.
    pub fn fixture_config(&self, subdir: &str) -> PipelineConfig {
        let root = self.path().join(subdir);
        PipelineConfig {
            inputs: InputPaths {
                co2: fixture_path(CO2_FIXTURE),
                energy: fixture_path(ENERGY_FIXTURE),
                socioeconomic: fixture_path(SOCIO_FIXTURE),
            },
            output_dir: root.join("tables"),
            database: root.join("climate.db"),
            results_dir: root.join("results"),
            ..PipelineConfig::default()
        }
    }
}

/// Reads a CSV file into its header and rows.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .unwrap_or_else(|err| panic!("open {path:?}: {err}"));
    let headers = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| {
            record
                .expect("record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect();
    (headers, rows)
}
