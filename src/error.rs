use thiserror::Error;

use crate::models::BillSource;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Could not read the selected file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("Could not read document: {0}")]
    Document(String),

    #[error("Unsupported file type: {0}. Choose a .csv, .xlsx, .xls or .docx bill export")]
    UnsupportedFormat(String),

    #[error("Legacy Word (.doc) files are not supported. Save the file as .docx or export the bill as .csv and try again")]
    LegacyWordDocument,

    #[error("Unrecognized format: this file is not a WeChat Pay or Alipay bill export")]
    UnrecognizedSource,

    #[error("No header found: could not locate the {0} bill header row")]
    HeaderNotFound(BillSource),

    #[error("The {platform} bill header is missing the required \"{column}\" column")]
    MissingColumn {
        platform: BillSource,
        column: &'static str,
    },

    #[error("No valid records found in the {platform} bill ({skipped} skipped)")]
    NoValidRecords { platform: BillSource, skipped: usize },

    #[error("Please select at least one record to import")]
    NothingSelected,

    #[error("None of the selected records has a readable transaction time")]
    NothingToCommit,

    #[error("An import is already {0}; cancel it or wait for it to finish")]
    Busy(&'static str),

    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        phase: &'static str,
        action: &'static str,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
