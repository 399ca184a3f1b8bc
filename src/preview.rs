use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::{
    config::PipelineConfig,
    dataset::{ReadOptions, TabularDataset},
    table,
    tables::TableKind,
};

/// Resolves a table name against the output directory; anything else is
/// treated as a file path.
pub fn resolve_target(target: &str, config: &PipelineConfig) -> PathBuf {
    match TableKind::from_table_name(target) {
        Some(kind) => config.output_dir.join(kind.file_name()),
        None => PathBuf::from(target),
    }
}

pub fn execute(target: &str, rows: usize, config: &PipelineConfig) -> Result<()> {
    let path = resolve_target(target, config);
    let dataset = TabularDataset::load(&path, &ReadOptions::default())
        .with_context(|| format!("Previewing {path:?}"))?;
    let shown = dataset.display_rows(Some(rows));
    table::print_table(dataset.columns(), &shown);
    info!(
        "Displayed {} of {} row(s) from {:?}",
        shown.len(),
        dataset.len(),
        path
    );
    Ok(())
}
