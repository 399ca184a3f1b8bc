//! Pipeline configuration.
//!
//! Every field has a default, so a YAML file only needs the keys it changes.
//! Command-line flags are applied on top of the file through
//! [`PipelineConfig::apply_overrides`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::yaml_provider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputPaths {
    pub co2: PathBuf,
    pub energy: PathBuf,
    pub socioeconomic: PathBuf,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self {
            co2: PathBuf::from("data/owid-co2-data.csv"),
            energy: PathBuf::from("data/owid-energy-data.csv"),
            socioeconomic: PathBuf::from("data/pip_dataset.csv"),
        }
    }
}

/// Parameters of the numbered analytical queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub trend_country: String,
    pub trend_start_year: i64,
    pub trend_end_year: i64,
    pub ranking_year: i64,
    pub ranking_limit: usize,
    pub energy_year: i64,
    pub energy_limit: usize,
    pub regional_year: i64,
    pub reduction_from_year: i64,
    pub reduction_to_year: i64,
    pub reduction_limit: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            trend_country: "BRA".to_string(),
            trend_start_year: 2000,
            trend_end_year: 2020,
            ranking_year: 2020,
            ranking_limit: 5,
            energy_year: 2020,
            energy_limit: 10,
            regional_year: 2020,
            reduction_from_year: 2010,
            reduction_to_year: 2020,
            reduction_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inputs: InputPaths,
    pub output_dir: PathBuf,
    pub database: PathBuf,
    pub results_dir: PathBuf,
    pub delimiter: Option<char>,
    pub input_encoding: Option<String>,
    pub queries: QueryParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: InputPaths::default(),
            output_dir: PathBuf::from("output"),
            database: PathBuf::from("output/climate.db"),
            results_dir: PathBuf::from("results"),
            delimiter: None,
            input_encoding: None,
            queries: QueryParams::default(),
        }
    }
}

/// Values supplied on the command line; `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub co2: Option<PathBuf>,
    pub energy: Option<PathBuf>,
    pub socioeconomic: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub delimiter: Option<u8>,
    pub input_encoding: Option<String>,
}

impl PipelineConfig {
    /// Reads a YAML file. Relative paths in it, and the defaults it leaves
    /// out, are taken relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading configuration from {path:?}"))?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.inputs.co2,
            &mut self.inputs.energy,
            &mut self.inputs.socioeconomic,
            &mut self.output_dir,
            &mut self.database,
            &mut self.results_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Reads `path` when given, otherwise starts from the defaults.
    pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(path) = overrides.co2 {
            self.inputs.co2 = path;
        }
        if let Some(path) = overrides.energy {
            self.inputs.energy = path;
        }
        if let Some(path) = overrides.socioeconomic {
            self.inputs.socioeconomic = path;
        }
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
        if let Some(path) = overrides.database {
            self.database = path;
        }
        if let Some(dir) = overrides.results_dir {
            self.results_dir = dir;
        }
        if let Some(delimiter) = overrides.delimiter {
            self.delimiter = Some(delimiter as char);
        }
        if overrides.input_encoding.is_some() {
            self.input_encoding = overrides.input_encoding;
        }
    }

    pub fn delimiter_byte(&self) -> Option<u8> {
        self.delimiter.and_then(|c| u8::try_from(c).ok())
    }
}
