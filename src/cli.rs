use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Overrides;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reshape CO2, energy and socioeconomic datasets into a relational schema, load it and run SDG 13 analyses",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build, reconcile and export every dimension and fact table
    Prepare(PrepareArgs),
    /// Load exported tables into a SQLite database following the manifest
    Load(LoadArgs),
    /// Run the numbered analytical queries against the database
    Query(QueryArgs),
    /// Prepare, load and query in one go
    Run(RunArgs),
    /// Preview the first rows of an exported table
    Preview(PreviewArgs),
}

/// Options shared by every pipeline step. Values given here override the
/// configuration file.
#[derive(Debug, Clone, Args, Default)]
pub struct CommonArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// OWID CO2 dataset
    #[arg(long)]
    pub co2: Option<PathBuf>,
    /// OWID energy dataset
    #[arg(long)]
    pub energy: Option<PathBuf>,
    /// Socioeconomic (poverty and inequality) dataset with region codes
    #[arg(long)]
    pub socioeconomic: Option<PathBuf>,
    /// Directory receiving exported tables and the manifest
    #[arg(short, long = "output-dir")]
    pub output_dir: Option<PathBuf>,
    /// SQLite database file
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Directory receiving query result files
    #[arg(long = "results-dir")]
    pub results_dir: Option<PathBuf>,
    /// Input delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

impl CommonArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            co2: self.co2.clone(),
            energy: self.energy.clone(),
            socioeconomic: self.socioeconomic.clone(),
            output_dir: self.output_dir.clone(),
            database: self.database.clone(),
            results_dir: self.results_dir.clone(),
            delimiter: self.delimiter,
            input_encoding: self.input_encoding.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Also write country and source documents as JSON Lines
    #[arg(long)]
    pub documents: bool,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Manifest to load (defaults to <output-dir>/manifest.yml)
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Run only these query numbers (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<usize>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Also write country and source documents as JSON Lines
    #[arg(long)]
    pub documents: bool,
    /// Run only these query numbers (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<usize>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Table name (such as `countries`) or path to a CSV file
    pub table: String,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_delimiter_accepts_names_and_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("::").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn query_only_splits_on_commas() {
        let cli = Cli::try_parse_from(["climate-etl", "query", "--only", "1,3"]).expect("parse");
        match cli.command {
            Commands::Query(args) => assert_eq!(args.only, vec![1, 3]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
