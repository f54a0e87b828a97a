use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::categorizer::{suggest_category, RuleTables};
use crate::decode::TextEncoding;
use crate::detect::detect_source;
use crate::error::{ImportError, Result};
use crate::models::{BillSource, Category, Direction, ParsedRecord, RawDocument};
use crate::router::{normalize, ContainerKind};
use crate::settings::ImportSettings;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a bill amount such as `¥1,234.56`. Only strictly positive values
/// are accepted; direction comes from its own column.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    let noise = NOISE.get_or_init(|| Regex::new(r"[¥￥元,，\s]").expect("static pattern"));
    let cleaned = noise.replace_all(raw, "");
    let digits = cleaned.strip_prefix('+').unwrap_or(&*cleaned);
    let amount = Decimal::from_str(digits).ok()?;
    (amount > Decimal::ZERO).then_some(amount)
}

/// Trim a cell. Exports pad ids with tabs and use `/` for "no value".
fn clean(cell: &str) -> String {
    let trimmed = cell.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if trimmed == "/" {
        String::new()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tokenized {
    pub rows: Vec<Vec<String>>,
    /// Records the CSV reader could not read.
    pub malformed: usize,
}

/// Split normalized text into rows of cells. Quoted cells keep their commas
/// and newlines; short or ragged rows are kept as-is.
pub fn tokenize(text: &str, max_rows: usize) -> Tokenized {
    tokenize_bytes(text.as_bytes(), max_rows)
}

fn tokenize_bytes(bytes: &[u8], max_rows: usize) -> Tokenized {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut tokenized = Tokenized::default();
    for result in rdr.records().take(max_rows) {
        match result {
            Ok(record) => tokenized.rows.push(record.iter().map(clean).collect()),
            Err(e) => {
                warn!(error = %e, "unreadable bill line");
                tokenized.malformed += 1;
            }
        }
    }
    tokenized
}

const TIME_LABELS: &[&str] = &["交易时间", "交易创建时间", "付款时间"];
const AMOUNT_LABELS: &[&str] = &["金额"];

fn has_label(row: &[String], labels: &[&str]) -> bool {
    row.iter().any(|cell| labels.iter().any(|l| cell.contains(l)))
}

fn find_header(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter()
        .position(|row| has_label(row, TIME_LABELS) && has_label(row, AMOUNT_LABELS))
}

// ---------------------------------------------------------------------------
// Skip lists
// ---------------------------------------------------------------------------

/// Status text marking a line that never moved money.
const STATUS_SKIPS: &[&str] = &[
    "已全额退款",
    "已退款",
    "退款成功",
    "交易关闭",
    "已关闭",
    "已取消",
    "交易取消",
];

/// Type text marking wallet top-ups and transfers between the user's own accounts.
const TYPE_SKIPS: &[&str] = &["零钱充值", "零钱提现", "零钱通", "转入零钱", "余额宝", "信用卡还款"];

fn skipped_by(cell: &str, list: &[&str]) -> bool {
    !cell.is_empty() && list.iter().any(|s| cell.contains(s))
}

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct ColumnMap {
    time: usize,
    direction: usize,
    amount: usize,
    kind: Option<usize>,
    counterparty: Option<usize>,
    item: Option<usize>,
    channel: Option<usize>,
    status: Option<usize>,
    order_id: Option<usize>,
    merchant_order_id: Option<usize>,
    note: Option<usize>,
}

/// WeChat Pay export order:
/// 交易时间, 交易类型, 交易对方, 商品, 收/支, 金额(元), 支付方式, 当前状态, 交易单号, 商户单号, 备注
const WECHAT_COLUMNS: ColumnMap = ColumnMap {
    time: 0,
    kind: Some(1),
    counterparty: Some(2),
    item: Some(3),
    direction: 4,
    amount: 5,
    channel: Some(6),
    status: Some(7),
    order_id: Some(8),
    merchant_order_id: Some(9),
    note: Some(10),
};

fn column_for(header: &[String], labels: &[&str]) -> Option<usize> {
    labels
        .iter()
        .find_map(|label| header.iter().position(|cell| cell.contains(label)))
}

fn required_column(header: &[String], column: &'static str, labels: &[&str]) -> Result<usize> {
    column_for(header, labels).ok_or(ImportError::MissingColumn {
        platform: BillSource::Alipay,
        column,
    })
}

fn alipay_columns(header: &[String]) -> Result<ColumnMap> {
    Ok(ColumnMap {
        time: required_column(header, "交易时间", TIME_LABELS)?,
        direction: required_column(header, "收/支", &["收/支"])?,
        amount: required_column(header, "金额", &["金额（元）", "金额(元)", "金额"])?,
        kind: column_for(header, &["交易分类", "交易类型"]),
        counterparty: column_for(header, &["交易对方"]),
        item: column_for(header, &["商品说明", "商品名称"]),
        channel: column_for(header, &["收/付款方式", "支付方式"]),
        status: column_for(header, &["交易状态"]),
        order_id: column_for(header, &["交易订单号", "交易号"]),
        merchant_order_id: column_for(header, &["商家订单号", "商户订单号"]),
        note: column_for(header, &["备注"]),
    })
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub records: Vec<ParsedRecord>,
    pub source: BillSource,
    pub total_inbound: Decimal,
    pub total_outbound: Decimal,
    /// Lines excluded by the status or type skip lists.
    pub skipped: usize,
    /// Lines dropped for an unusable amount, an ambiguous direction or
    /// malformed quoting.
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtractorKind {
    WeChatPay,
    Alipay,
}

impl ExtractorKind {
    pub fn for_source(source: BillSource) -> Option<Self> {
        match source {
            BillSource::WeChatPay => Some(Self::WeChatPay),
            BillSource::Alipay => Some(Self::Alipay),
            BillSource::Unknown => None,
        }
    }

    pub fn source(&self) -> BillSource {
        match self {
            Self::WeChatPay => BillSource::WeChatPay,
            Self::Alipay => BillSource::Alipay,
        }
    }

    fn columns(&self, header: &[String]) -> Result<ColumnMap> {
        match self {
            Self::WeChatPay => Ok(WECHAT_COLUMNS),
            Self::Alipay => alipay_columns(header),
        }
    }

    pub fn extract(&self, text: &str, max_rows: usize) -> Result<Extraction> {
        let source = self.source();
        let Tokenized { rows, malformed } = tokenize(text, max_rows);
        let header_idx = find_header(&rows).ok_or(ImportError::HeaderNotFound(source))?;
        let columns = self.columns(&rows[header_idx])?;
        debug!(source = source.key(), header_line = header_idx, ?columns, "located bill header");

        let mut extraction = Extraction {
            records: Vec::new(),
            source,
            total_inbound: Decimal::ZERO,
            total_outbound: Decimal::ZERO,
            skipped: 0,
            dropped: malformed,
        };

        for row in &rows[header_idx + 1..] {
            if row.iter().all(|c| c.is_empty()) {
                continue;
            }
            let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).cloned().unwrap_or_default();

            let status = cell(columns.status);
            let kind = cell(columns.kind);
            if skipped_by(&status, STATUS_SKIPS) || skipped_by(&kind, TYPE_SKIPS) {
                extraction.skipped += 1;
                continue;
            }

            let amount = cell(Some(columns.amount));
            let direction = cell(Some(columns.direction));
            let (Some(amount), Some(direction)) = (parse_amount(&amount), Direction::from_label(&direction))
            else {
                extraction.dropped += 1;
                continue;
            };

            match direction {
                Direction::Inbound => extraction.total_inbound += amount,
                Direction::Outbound => extraction.total_outbound += amount,
            }
            extraction.records.push(ParsedRecord {
                timestamp_text: cell(Some(columns.time)),
                direction,
                counterparty: cell(columns.counterparty),
                item: cell(columns.item),
                amount,
                payment_channel: cell(columns.channel),
                raw_status: status,
                order_id: cell(columns.order_id),
                merchant_order_id: cell(columns.merchant_order_id),
                note: cell(columns.note),
                source,
                suggested_category_id: None,
                is_selected: true,
            });
        }

        if extraction.records.is_empty() {
            return Err(ImportError::NoValidRecords {
                platform: source,
                skipped: extraction.skipped,
            });
        }
        Ok(extraction)
    }
}

// ---------------------------------------------------------------------------
// import_document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub file_name: String,
    pub checksum: String,
    pub container: ContainerKind,
    pub encoding: Option<TextEncoding>,
    /// Input was cut at `max_input_bytes`; rows past the cut are missing.
    pub truncated: bool,
    pub extraction: Extraction,
}

/// Decode, route, detect and extract one document, then attach category
/// suggestions. Any failure discards the whole attempt.
pub fn import_document(
    doc: &RawDocument,
    settings: &ImportSettings,
    rules: &RuleTables,
    categories: &[Category],
) -> Result<ParseOutcome> {
    let normalized = normalize(doc, settings)?;
    let source = detect_source(&normalized.text, settings.detect_scan_lines);
    let extractor = ExtractorKind::for_source(source).ok_or(ImportError::UnrecognizedSource)?;
    let mut extraction = extractor.extract(&normalized.text, settings.max_rows)?;

    for record in &mut extraction.records {
        record.suggested_category_id = suggest_category(record, rules, categories);
    }

    info!(
        file = %doc.file_name,
        source = source.key(),
        container = normalized.kind.key(),
        records = extraction.records.len(),
        skipped = extraction.skipped,
        dropped = extraction.dropped,
        truncated = normalized.truncated,
        "parsed bill export"
    );

    Ok(ParseOutcome {
        file_name: doc.file_name.clone(),
        checksum: doc.checksum(),
        container: normalized.kind,
        encoding: normalized.encoding,
        truncated: normalized.truncated,
        extraction,
    })
}
