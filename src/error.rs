// ❗ Error taxonomy for the ingestion pipeline
//
// FormatError      - the file itself is unusable (fatal to the import)
// RowValidationError - one row failed (collected, batch continues)
// StoreError       - the storage collaborator failed (fatal to the batch)
// ImportError      - what an operator sees when an import does not go through

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::Platform;

/// Invalid operator input (platform names, dates)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("unknown platform '{0}' (expected bolt, uber or heetch)")]
    UnknownPlatform(String),

    #[error("{0} is not a Monday; weeks start on Monday")]
    NotMonday(NaiveDate),

    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("invalid amount '{0}': {1}")]
    InvalidAmount(String, &'static str),
}

/// The file is structurally unrecognized or unreadable
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("file is not valid UTF-8 text")]
    InvalidUtf8,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unrecognized export: header row matches neither Bolt nor Uber (found: {found})")]
    UnrecognizedHeaders { found: String },

    #[error("{platform} export is missing required column(s): {}", .missing.join(", "))]
    MissingColumns {
        platform: Platform,
        missing: Vec<String>,
    },

    #[error("unreadable PDF: {0}")]
    Pdf(String),

    #[error("no driver lines found in {platform} export")]
    NoRows { platform: Platform },
}

/// One row that could not be turned into a canonical record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{platform} line {line}: {field} '{value}' {reason}")]
pub struct RowValidationError {
    pub line: usize,
    pub platform: Platform,
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl RowValidationError {
    pub fn new(line: usize, platform: Platform, field: &str, value: &str, reason: &str) -> Self {
        RowValidationError {
            line,
            platform,
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure of the storage collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt stored value in {field}: '{value}'")]
    Corrupt { field: String, value: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Why an import did not go through
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Format(#[from] FormatError),

    /// Zero rows found - most likely the wrong file was selected
    #[error("no driver rows found in the {platform} file; check that the right export was selected")]
    EmptyImport { platform: Platform },

    /// Rows were found but none survived validation - most likely an export
    /// in another language (column names and number formats are locale-dependent)
    #[error("all {total} {platform} rows failed validation; check the export language")]
    AllRowsInvalid {
        platform: Platform,
        total: usize,
        errors: Vec<RowValidationError>,
    },

    /// Storage failed; nothing was marked as uploaded
    #[error("submission failed, nothing was imported: {0}")]
    Submission(#[from] StoreError),
}

impl ImportError {
    /// Per-row errors carried by this failure, if any
    pub fn row_errors(&self) -> &[RowValidationError] {
        match self {
            ImportError::AllRowsInvalid { errors, .. } => errors,
            _ => &[],
        }
    }
}
