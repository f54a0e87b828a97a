use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{ImportError, Result};
use crate::fmt::yuan;
use crate::models::{Category, Direction, LedgerTransaction, ParsedRecord};
use crate::reviewer::PreviewState;
use crate::settings::ImportSettings;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Host ledger persistence. A batch is written all-or-nothing. The return
/// value lists the indices into `batch.transactions` that were actually
/// stored; anything missing was already in the ledger.
pub trait LedgerSink {
    fn insert_batch(&mut self, batch: &CommitBatch) -> Result<Vec<usize>>;
}

pub trait CategoryRepository {
    fn categories(&self) -> Result<Vec<Category>>;

    /// Make sure an "uncategorized" category exists for each direction.
    /// Calling it repeatedly must not create duplicates.
    fn ensure_fallback_categories(&mut self) -> Result<()>;

    fn categories_for(&self, direction: Direction) -> Result<Vec<Category>> {
        Ok(self
            .categories()?
            .into_iter()
            .filter(|c| c.is_enabled && c.kind.applies_to(direction))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Record mapping
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日"];

/// First matching pattern wins; a bare date means midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// `[微信] 美团 | 外卖订单 | 备注`. The item is left out when it just repeats
/// the counterparty.
pub fn synthesize_note(record: &ParsedRecord, settings: &ImportSettings) -> String {
    let counterparty = record.counterparty.trim();
    let item = record.item.trim();
    let note = record.note.trim();

    let mut parts: Vec<&str> = Vec::new();
    if !counterparty.is_empty() {
        parts.push(counterparty);
    }
    if !item.is_empty() && item != counterparty {
        parts.push(item);
    }
    if !note.is_empty() {
        parts.push(note);
    }
    let body = parts.join(&settings.note_separator);

    if !settings.source_tag_enabled {
        return body;
    }
    let tag = record.source.tag();
    if body.is_empty() {
        tag.to_string()
    } else {
        format!("{tag} {body}")
    }
}

pub fn to_transaction(record: &ParsedRecord, settings: &ImportSettings) -> Option<LedgerTransaction> {
    let occurred_at = parse_timestamp(&record.timestamp_text)?;
    let order_id = Some(record.order_id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    Some(LedgerTransaction {
        direction: record.direction,
        amount: record.amount,
        category_id: record.suggested_category_id,
        occurred_at,
        note: synthesize_note(record, settings),
        source: record.source,
        order_id,
    })
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CommitBatch {
    pub transactions: Vec<LedgerTransaction>,
    /// Selected records left out for an unreadable timestamp.
    pub excluded: usize,
    pub file_name: String,
    pub checksum: String,
}

impl CommitBatch {
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.transactions.iter().map(|t| t.occurred_at).min()?;
        let last = self.transactions.iter().map(|t| t.occurred_at).max()?;
        Some((first, last))
    }
}

/// Totals cover stored transactions only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitSummary {
    pub imported_count: usize,
    pub total_inbound: Decimal,
    pub total_outbound: Decimal,
    /// Money moved in either direction.
    pub total_amount: Decimal,
    pub excluded: usize,
    /// Transactions the ledger already held.
    pub duplicates: usize,
}

pub fn prepare_batch(preview: &PreviewState, settings: &ImportSettings) -> Result<CommitBatch> {
    let mut transactions = Vec::new();
    let mut excluded = 0usize;
    let mut selected = 0usize;
    for record in preview.selected() {
        selected += 1;
        match to_transaction(record, settings) {
            Some(txn) => transactions.push(txn),
            None => {
                excluded += 1;
                warn!(
                    timestamp = %record.timestamp_text,
                    order_id = %record.order_id,
                    "excluding record with unreadable transaction time"
                );
            }
        }
    }
    if selected == 0 {
        return Err(ImportError::NothingSelected);
    }
    if transactions.is_empty() {
        return Err(ImportError::NothingToCommit);
    }
    Ok(CommitBatch {
        transactions,
        excluded,
        file_name: preview.file_name.clone(),
        checksum: preview.checksum.clone(),
    })
}

/// Map the selected records and hand them to the ledger in one batch.
pub fn commit<L: LedgerSink + ?Sized>(
    preview: &PreviewState,
    settings: &ImportSettings,
    ledger: &mut L,
) -> Result<CommitSummary> {
    let batch = prepare_batch(preview, settings)?;
    let stored = ledger.insert_batch(&batch)?;

    let mut total_inbound = Decimal::ZERO;
    let mut total_outbound = Decimal::ZERO;
    let mut imported_count = 0usize;
    for txn in stored.iter().filter_map(|&i| batch.transactions.get(i)) {
        imported_count += 1;
        match txn.direction {
            Direction::Inbound => total_inbound += txn.amount,
            Direction::Outbound => total_outbound += txn.amount,
        }
    }
    let summary = CommitSummary {
        imported_count,
        total_inbound,
        total_outbound,
        total_amount: total_inbound + total_outbound,
        excluded: batch.excluded,
        duplicates: batch.transactions.len().saturating_sub(imported_count),
    };
    info!(
        file = %batch.file_name,
        imported = summary.imported_count,
        excluded = summary.excluded,
        duplicates = summary.duplicates,
        inbound = %yuan(summary.total_inbound),
        outbound = %yuan(summary.total_outbound),
        "committed bill import"
    );
    Ok(summary)
}
