use crate::schema::CanonicalField;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Unmapped required field(s): {}", format_fields(.0))]
    UnmappedRequiredField(Vec<CanonicalField>),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Invalid grouping dimension: {0}")]
    InvalidGroupingDimension(String),

    #[error("Conflicting mapping: '{field}' is fed by columns {columns:?}")]
    ConflictingMapping {
        field: CanonicalField,
        columns: Vec<String>,
    },

    #[error("Semantic matcher error: {0}")]
    Matcher(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn format_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, InsightError>;
