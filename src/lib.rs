//! Import pipeline for WeChat Pay and Alipay bill exports.
//!
//! A selected file flows through decode → route → detect → extract →
//! categorize into a reviewable preview, and the reviewed selection is
//! committed to a ledger in one batch.

pub mod categorizer;
pub mod commit;
pub mod db;
pub mod decode;
pub mod detect;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod fmt;
pub mod importer;
pub mod models;
pub mod reviewer;
pub mod router;
pub mod settings;
#[cfg(feature = "spreadsheet")]
pub mod spreadsheet;
#[cfg(feature = "docx")]
pub mod wordprocessing;
pub mod worker;

pub use commit::{CategoryRepository, CommitBatch, CommitSummary, LedgerSink};
pub use error::{ImportError, Result};
pub use importer::{import_document, ParseOutcome};
pub use models::{BillSource, Category, Direction, ImportStats, ParsedRecord, RawDocument};
pub use reviewer::{ImportState, PreviewState, ReviewSession};
pub use settings::ImportSettings;
pub use worker::ImportController;
