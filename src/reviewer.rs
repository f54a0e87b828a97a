use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::commit::CommitSummary;
use crate::error::{ImportError, Result};
use crate::importer::ParseOutcome;
use crate::models::{BillSource, Category, ImportStats, ParsedRecord};

/// Everything the reviewer edits between parsing and commit.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewState {
    pub records: Vec<ParsedRecord>,
    pub source: BillSource,
    pub categories: Vec<Category>,
    pub skipped: usize,
    pub dropped: usize,
    pub file_name: String,
    pub checksum: String,
}

impl PreviewState {
    pub fn from_outcome(outcome: ParseOutcome, categories: Vec<Category>) -> Self {
        Self {
            records: outcome.extraction.records,
            source: outcome.extraction.source,
            categories,
            skipped: outcome.extraction.skipped,
            dropped: outcome.extraction.dropped,
            file_name: outcome.file_name,
            checksum: outcome.checksum,
        }
    }

    pub fn selected(&self) -> impl Iterator<Item = &ParsedRecord> {
        self.records.iter().filter(|r| r.is_selected)
    }

    pub fn stats(&self) -> ImportStats {
        ImportStats::compute(&self.records)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportState {
    Idle,
    Parsing { file_name: String },
    Preview(PreviewState),
    Importing { file_name: String },
    /// Totals cover the rows the ledger stored, duplicates excluded.
    Success {
        imported_count: usize,
        total_inbound: Decimal,
        total_outbound: Decimal,
        total_amount: Decimal,
    },
    Error { message: String },
}

impl ImportState {
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Parsing { .. } => "parsing",
            Self::Preview(_) => "previewing",
            Self::Importing { .. } => "importing",
            Self::Success { .. } => "finished",
            Self::Error { .. } => "failed",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Parsing { .. } | Self::Importing { .. })
    }
}

/// Owns the one active `ImportState`. Every transition replaces the state
/// wholesale; only record edits inside Preview touch it in place.
#[derive(Debug)]
pub struct ReviewSession {
    state: ImportState,
}

impl Default for ReviewSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewSession {
    pub fn new() -> Self {
        Self { state: ImportState::Idle }
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    fn transition(&mut self, next: ImportState) -> ImportState {
        debug!(from = self.state.phase(), to = next.phase(), "import state transition");
        std::mem::replace(&mut self.state, next)
    }

    fn reject(&self, action: &'static str) -> ImportError {
        ImportError::InvalidTransition {
            phase: self.state.phase(),
            action,
        }
    }

    fn fail(&mut self, err: &ImportError) {
        warn!(phase = self.state.phase(), error = %err, "import failed");
        self.transition(ImportState::Error { message: err.to_string() });
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    pub fn begin_parse(&mut self, file_name: &str) -> Result<()> {
        match &self.state {
            ImportState::Idle => {
                self.transition(ImportState::Parsing {
                    file_name: file_name.to_string(),
                });
                Ok(())
            }
            state if state.is_in_flight() => Err(ImportError::Busy(state.phase())),
            _ => Err(self.reject("select a file")),
        }
    }

    /// A failed parse leaves nothing behind: no partial preview survives.
    pub fn finish_parse(&mut self, outcome: Result<ParseOutcome>, categories: Vec<Category>) -> Result<()> {
        if !matches!(self.state, ImportState::Parsing { .. }) {
            return Err(self.reject("finish parsing"));
        }
        match outcome {
            Ok(outcome) => {
                self.transition(ImportState::Preview(PreviewState::from_outcome(outcome, categories)));
            }
            Err(err) => self.fail(&err),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Preview edits
    // -----------------------------------------------------------------------

    fn preview_mut(&mut self, action: &'static str) -> Result<&mut PreviewState> {
        let phase = self.state.phase();
        match &mut self.state {
            ImportState::Preview(preview) => Ok(preview),
            _ => Err(ImportError::InvalidTransition { phase, action }),
        }
    }

    fn record_mut(&mut self, index: usize, action: &'static str) -> Result<&mut ParsedRecord> {
        let preview = self.preview_mut(action)?;
        let len = preview.records.len();
        preview
            .records
            .get_mut(index)
            .ok_or_else(|| ImportError::Other(format!("No record at position {index} (have {len})")))
    }

    pub fn toggle_one(&mut self, index: usize) -> Result<()> {
        let record = self.record_mut(index, "toggle a record")?;
        record.is_selected = !record.is_selected;
        Ok(())
    }

    pub fn toggle_all(&mut self, selected: bool) -> Result<()> {
        let preview = self.preview_mut("toggle all records")?;
        for record in &mut preview.records {
            record.is_selected = selected;
        }
        Ok(())
    }

    /// Overrides the suggestion; `None` leaves the record uncategorized.
    pub fn change_category(&mut self, index: usize, category_id: Option<i64>) -> Result<()> {
        let record = self.record_mut(index, "change a category")?;
        record.suggested_category_id = category_id;
        Ok(())
    }

    /// Recomputed from the full record list on every call.
    pub fn stats(&self) -> Option<ImportStats> {
        match &self.state {
            ImportState::Preview(preview) => Some(preview.stats()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Hands the preview over to the commit stage. With nothing selected the
    /// session moves to Error and the ledger must not be touched.
    pub fn begin_commit(&mut self) -> Result<PreviewState> {
        let (selected, file_name) = match &self.state {
            ImportState::Preview(preview) => (preview.selected().count(), preview.file_name.clone()),
            _ => return Err(self.reject("import")),
        };
        if selected == 0 {
            let err = ImportError::NothingSelected;
            self.fail(&err);
            return Err(err);
        }
        match self.transition(ImportState::Importing { file_name }) {
            ImportState::Preview(preview) => Ok(preview),
            _ => Err(ImportError::Other("preview vanished during commit".to_string())),
        }
    }

    pub fn finish_commit(&mut self, result: Result<CommitSummary>) -> Result<()> {
        if !matches!(self.state, ImportState::Importing { .. }) {
            return Err(self.reject("finish importing"));
        }
        match result {
            Ok(summary) => {
                info!(
                    imported = summary.imported_count,
                    excluded = summary.excluded,
                    duplicates = summary.duplicates,
                    "import committed"
                );
                self.transition(ImportState::Success {
                    imported_count: summary.imported_count,
                    total_inbound: summary.total_inbound,
                    total_outbound: summary.total_outbound,
                    total_amount: summary.total_amount,
                });
            }
            Err(err) => self.fail(&err),
        }
        Ok(())
    }

    /// Back to Idle from anywhere, dropping any records and source.
    pub fn reset(&mut self) {
        self.transition(ImportState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::{ExtractorKind, Extraction};
    use crate::models::{CategoryKind, Direction};
    use crate::router::ContainerKind;
    use std::str::FromStr;

    fn record(amount: &str) -> ParsedRecord {
        ParsedRecord {
            timestamp_text: "2024-03-01 12:00:00".to_string(),
            direction: Direction::Outbound,
            counterparty: "美团".to_string(),
            item: "外卖".to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            payment_channel: "零钱".to_string(),
            raw_status: "支付成功".to_string(),
            order_id: String::new(),
            merchant_order_id: String::new(),
            note: String::new(),
            source: BillSource::WeChatPay,
            suggested_category_id: Some(1),
            is_selected: true,
        }
    }

    fn outcome(records: Vec<ParsedRecord>, skipped: usize) -> ParseOutcome {
        ParseOutcome {
            file_name: "bill.csv".to_string(),
            checksum: "abc".to_string(),
            container: ContainerKind::DelimitedText,
            encoding: None,
            truncated: false,
            extraction: Extraction {
                records,
                source: BillSource::WeChatPay,
                total_inbound: Decimal::ZERO,
                total_outbound: Decimal::ZERO,
                skipped,
                dropped: 0,
            },
        }
    }

    fn categories() -> Vec<Category> {
        vec![Category {
            id: 1,
            name: "餐饮".to_string(),
            kind: CategoryKind::Expense,
            is_enabled: true,
        }]
    }

    fn previewing(records: Vec<ParsedRecord>) -> ReviewSession {
        let mut session = ReviewSession::new();
        session.begin_parse("bill.csv").unwrap();
        session.finish_parse(Ok(outcome(records, 0)), categories()).unwrap();
        session
    }

    #[test]
    fn test_refund_row_scenario_reaches_preview() {
        let text = "\
交易时间,交易类型,交易对方,商品,收/支,金额(元),支付方式,当前状态,交易单号,商户单号,备注
2024-03-01 12:00:00,商户消费,美团,外卖,支出,¥25.00,零钱,支付成功,1,/,/
2024-03-02 12:00:00,商户消费,京东,耳机,支出,¥100.00,零钱,支付成功,2,/,/
2024-03-03 12:00:00,商户消费,拼多多,拖鞋,支出,¥19.90,零钱,已全额退款,3,/,/
";
        let extraction = ExtractorKind::WeChatPay.extract(text, 100).unwrap();
        let parsed = ParseOutcome {
            extraction,
            ..outcome(Vec::new(), 0)
        };
        let mut session = ReviewSession::new();
        session.begin_parse("bill.csv").unwrap();
        session.finish_parse(Ok(parsed), categories()).unwrap();

        let ImportState::Preview(preview) = session.state() else {
            panic!("expected preview, got {:?}", session.state());
        };
        assert_eq!(preview.records.len(), 2);
        assert_eq!(preview.skipped, 1);
        let stats = session.stats().unwrap();
        assert_eq!(stats.total_outbound, Decimal::from_str("125.00").unwrap());
    }

    #[test]
    fn test_parse_failure_discards_preview() {
        let mut session = ReviewSession::new();
        session.begin_parse("bank.csv").unwrap();
        session
            .finish_parse(Err(ImportError::UnrecognizedSource), categories())
            .unwrap();
        match session.state() {
            ImportState::Error { message } => assert!(message.starts_with("Unrecognized format")),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(session.stats().is_none());
    }

    #[test]
    fn test_commit_with_nothing_selected_fails() {
        let mut session = previewing(vec![record("25.00"), record("100.00")]);
        session.toggle_all(false).unwrap();
        let err = session.begin_commit().unwrap_err();
        assert!(matches!(err, ImportError::NothingSelected));
        match session.state() {
            ImportState::Error { message } => assert!(message.contains("select at least one")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_stats_follow_edits() {
        let mut session = previewing(vec![record("25.00"), record("100.00")]);
        session.toggle_one(1).unwrap();
        let stats = session.stats().unwrap();
        assert_eq!(stats.selected_records, 1);
        assert_eq!(stats.total_outbound, Decimal::from_str("25.00").unwrap());
        session.toggle_all(true).unwrap();
        assert_eq!(session.stats().unwrap().selected_records, 2);
    }

    #[test]
    fn test_change_category_overrides_suggestion() {
        let mut session = previewing(vec![record("25.00")]);
        session.change_category(0, Some(7)).unwrap();
        session.change_category(0, None).unwrap();
        let ImportState::Preview(preview) = session.state() else { panic!() };
        assert_eq!(preview.records[0].suggested_category_id, None);
        assert!(session.toggle_one(5).is_err());
    }

    #[test]
    fn test_commit_round_trip() {
        let mut session = previewing(vec![record("25.00"), record("100.00")]);
        let preview = session.begin_commit().unwrap();
        assert_eq!(preview.records.len(), 2);
        assert_eq!(session.state().phase(), "importing");
        let summary = CommitSummary {
            imported_count: 2,
            total_inbound: Decimal::ZERO,
            total_outbound: Decimal::from_str("125.00").unwrap(),
            total_amount: Decimal::from_str("125.00").unwrap(),
            excluded: 0,
            duplicates: 0,
        };
        session.finish_commit(Ok(summary)).unwrap();
        assert!(matches!(session.state(), ImportState::Success { imported_count: 2, .. }));
        session.reset();
        assert_eq!(session.state(), &ImportState::Idle);
    }

    #[test]
    fn test_commit_failure_becomes_error() {
        let mut session = previewing(vec![record("25.00")]);
        session.begin_commit().unwrap();
        session
            .finish_commit(Err(ImportError::Other("disk full".to_string())))
            .unwrap();
        assert_eq!(
            session.state(),
            &ImportState::Error {
                message: "disk full".to_string()
            }
        );
    }

    #[test]
    fn test_select_while_busy_is_rejected() {
        let mut session = ReviewSession::new();
        session.begin_parse("a.csv").unwrap();
        assert!(matches!(session.begin_parse("b.csv"), Err(ImportError::Busy("parsing"))));
        assert_eq!(
            session.state(),
            &ImportState::Parsing {
                file_name: "a.csv".to_string()
            }
        );
    }

    #[test]
    fn test_select_from_preview_requires_reset() {
        let mut session = previewing(vec![record("25.00")]);
        assert!(matches!(
            session.begin_parse("b.csv"),
            Err(ImportError::InvalidTransition { phase: "previewing", .. })
        ));
        session.reset();
        session.begin_parse("b.csv").unwrap();
    }

    #[test]
    fn test_edits_outside_preview_are_rejected() {
        let mut session = ReviewSession::new();
        assert!(session.toggle_all(true).is_err());
        assert!(session.begin_commit().is_err());
        assert!(session.finish_commit(Err(ImportError::NothingToCommit)).is_err());
        assert!(session.finish_parse(Err(ImportError::UnrecognizedSource), Vec::new()).is_err());
        assert_eq!(session.state(), &ImportState::Idle);
    }
}
