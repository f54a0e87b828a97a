use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// A selected file as handed over by the picker: bytes plus whatever the
/// picker knew about it.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
    pub file_name: String,
}

impl RawDocument {
    pub fn new(bytes: Vec<u8>, mime: Option<&str>, file_name: &str) -> Self {
        Self {
            bytes,
            mime: mime.map(str::to_string),
            file_name: file_name.to_string(),
        }
    }

    /// Read `path` up to one byte past `max_bytes`. The extra byte lets the
    /// decoder tell a file cut at the cap from one that fits exactly.
    pub fn open(path: &Path, mime: Option<&str>, max_bytes: usize) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut bytes = Vec::new();
        file.take(max_bytes.saturating_add(1) as u64).read_to_end(&mut bytes)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        Ok(Self {
            bytes,
            mime: mime.map(str::to_string),
            file_name,
        })
    }

    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillSource {
    WeChatPay,
    Alipay,
    Unknown,
}

impl BillSource {
    pub fn key(&self) -> &'static str {
        match self {
            Self::WeChatPay => "wechat",
            Self::Alipay => "alipay",
            Self::Unknown => "unknown",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::WeChatPay => "WeChat Pay",
            Self::Alipay => "Alipay",
            Self::Unknown => "Unknown",
        }
    }

    /// Short tag prepended to committed notes.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::WeChatPay => "[微信]",
            Self::Alipay => "[支付宝]",
            Self::Unknown => "[导入]",
        }
    }
}

impl fmt::Display for BillSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Resolve the `收/支` column. Anything else (`/`, `不计收支`, blank) is ambiguous.
    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "收入" => Some(Self::Inbound),
            "支出" => Some(Self::Outbound),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Inbound => "income",
            Self::Outbound => "expense",
        }
    }
}

/// One bill line normalized out of either platform's export.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub timestamp_text: String,
    pub direction: Direction,
    pub counterparty: String,
    pub item: String,
    pub amount: Decimal,
    pub payment_channel: String,
    pub raw_status: String,
    pub order_id: String,
    pub merchant_order_id: String,
    pub note: String,
    pub source: BillSource,
    pub suggested_category_id: Option<i64>,
    pub is_selected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportStats {
    pub total_records: usize,
    pub selected_records: usize,
    pub total_inbound: Decimal,
    pub total_outbound: Decimal,
}

impl ImportStats {
    /// Inbound/outbound totals cover selected records only.
    pub fn compute(records: &[ParsedRecord]) -> Self {
        let mut stats = Self {
            total_records: records.len(),
            ..Self::default()
        };
        for record in records.iter().filter(|r| r.is_selected) {
            stats.selected_records += 1;
            match record.direction {
                Direction::Inbound => stats.total_inbound += record.amount,
                Direction::Outbound => stats.total_outbound += record.amount,
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryKind {
    Income,
    Expense,
    Both,
}

impl CategoryKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Both => "both",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn applies_to(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (Self::Both, _) | (Self::Income, Direction::Inbound) | (Self::Expense, Direction::Outbound)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: CategoryKind,
    pub is_enabled: bool,
}

/// Host ledger shape produced by the commit stage.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub direction: Direction,
    pub amount: Decimal,
    pub category_id: Option<i64>,
    pub occurred_at: NaiveDateTime,
    pub note: String,
    pub source: BillSource,
    pub order_id: Option<String>,
}
