//! YAML persistence for the pipeline configuration and the load manifest.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

fn read_to_string(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Opening YAML file {path:?}"))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .with_context(|| format!("Reading YAML file {path:?}"))?;
    Ok(buf)
}

fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Creating directory {parent:?}"))?;
    }
    let mut file = File::create(path).with_context(|| format!("Creating YAML file {path:?}"))?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(())
}

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = read_to_string(path)?;
    serde_yaml::from_str(&raw).with_context(|| format!("Parsing YAML from {path:?}"))
}

pub fn save_to_path<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let serialized = to_string(data)?;
    write_string(path, &serialized)
}

pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).context("Serializing YAML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        years: Vec<i64>,
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("sample.yml");
        let sample = Sample {
            name: "BRA".into(),
            years: vec![2010, 2020],
        };
        save_to_path(&path, &sample).expect("save");
        let loaded: Sample = load_from_path(&path).expect("load");
        assert_eq!(loaded, sample);
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.yml");
        fs::write(&path, "name: [unterminated").expect("write");
        let err = load_from_path::<Sample>(&path).expect_err("parse error");
        assert!(format!("{err:#}").contains("broken.yml"));
    }
}
