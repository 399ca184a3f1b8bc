//! Error taxonomy for the pipeline stages.
//!
//! Missing inputs and unresolvable references are recovered by the stage
//! runner (skipped artifact or sentinel substitution); load and query errors
//! abort only their own unit of work.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("column '{column}' not found in dataset '{dataset}'")]
    MissingColumn { dataset: String, column: String },

    #[error("input '{0}' is not available")]
    MissingInput(String),

    #[error("source '{name}' is not present in dimension '{dimension}'")]
    UnresolvedSource { dimension: String, name: String },

    #[error("no usable {measure} columns found in dataset '{dataset}'")]
    NoMeasureColumns { dataset: String, measure: String },

    #[error("loading table '{table}' failed")]
    Load {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("query {number} failed")]
    Query {
        number: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// One-line rendering with the full cause chain, for log output.
    pub fn chain(self) -> String {
        format!("{:#}", anyhow::Error::from(self))
    }
}
