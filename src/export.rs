//! Export adapter: one CSV per table plus an ordered load manifest.
//!
//! The manifest lists tables in load order (dimensions before the facts that
//! reference them) with row counts and SHA-256 digests, and is written next
//! to the tables as `manifest.yml`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{tables::TableKind, tables::TableSet, yaml_provider};

pub const MANIFEST_FILE: &str = "manifest.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub table: TableKind,
    pub file: String,
    pub rows: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadManifest {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl LoadManifest {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            generated_at: Utc::now(),
            entries: Vec::new(),
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// Registers a table, keeping entries in load order.
    pub fn register(&mut self, entry: ManifestEntry) {
        self.entries.retain(|existing| existing.table != entry.table);
        self.entries.push(entry);
        self.entries.sort_by_key(|entry| entry.table);
    }

    pub fn entry_path(&self, entry: &ManifestEntry) -> PathBuf {
        self.base_dir.join(&entry.file)
    }

    pub fn get(&self, table: TableKind) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.table == table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut manifest: LoadManifest = yaml_provider::load_from_path(path)
            .with_context(|| format!("Loading manifest from {path:?}"))?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        manifest.entries.sort_by_key(|entry| entry.table);
        Ok(manifest)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = self.base_dir.join(MANIFEST_FILE);
        yaml_provider::save_to_path(&path, self)
            .with_context(|| format!("Writing manifest to {path:?}"))?;
        Ok(path)
    }
}

pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Reading {path:?} for digest"))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn export_one(kind: TableKind, tables: &TableSet, output_dir: &Path) -> Result<ManifestEntry> {
    let table = tables
        .get(kind)
        .with_context(|| format!("Table '{kind}' is not available"))?;
    let file = kind.file_name();
    let path = output_dir.join(&file);
    let rows = table
        .write_csv(&path)
        .with_context(|| format!("Writing table '{kind}' to {path:?}"))?;
    let sha256 = file_digest(&path)?;
    Ok(ManifestEntry {
        table: kind,
        file,
        rows,
        sha256,
    })
}

/// Writes every available table. A table that fails to write is logged and
/// left out of the manifest.
pub fn export_tables(tables: &TableSet, output_dir: &Path) -> Result<LoadManifest> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating output directory {output_dir:?}"))?;
    let mut manifest = LoadManifest::new(output_dir);
    for (kind, _) in tables.iter() {
        match export_one(kind, tables, output_dir) {
            Ok(entry) => {
                info!("✓ {} row(s) written to {}", entry.rows, entry.file);
                manifest.register(entry);
            }
            Err(err) => error!("Failed to export table '{kind}': {err:#}"),
        }
    }
    let path = manifest.save()?;
    info!(
        "Manifest with {} table(s) written to {:?}",
        manifest.entries.len(),
        path
    );
    Ok(manifest)
}
