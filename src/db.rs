use std::path::Path;
use std::str::FromStr;

use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::categorizer::UNCATEGORIZED;
use crate::commit::{CategoryRepository, CommitBatch, LedgerSink};
use crate::error::{ImportError, Result};
use crate::models::{Category, CategoryKind};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    is_enabled INTEGER DEFAULT 1,
    UNIQUE (name, kind)
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    filename TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER,
    excluded_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    direction TEXT NOT NULL,
    amount TEXT NOT NULL,
    category_id INTEGER,
    occurred_at TEXT NOT NULL,
    note TEXT,
    source TEXT NOT NULL,
    order_id TEXT,
    import_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id),
    FOREIGN KEY (import_id) REFERENCES imports(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_order
    ON transactions (source, order_id) WHERE order_id IS NOT NULL;
";

// (name, kind)
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    // Income
    ("工资", "income"),
    ("红包", "income"),
    ("理财收益", "income"),
    ("退款", "income"),
    ("转账", "income"),
    ("其他收入", "income"),
    // Expenses
    ("餐饮", "expense"),
    ("交通", "expense"),
    ("购物", "expense"),
    ("居住", "expense"),
    ("通讯", "expense"),
    ("娱乐", "expense"),
    ("医疗", "expense"),
    ("教育", "expense"),
    ("人情", "expense"),
    ("其他支出", "expense"),
    // Either way
    ("其他", "both"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for (name, kind) in DEFAULT_CATEGORIES {
            conn.execute(
                "INSERT INTO categories (name, kind) VALUES (?1, ?2)",
                rusqlite::params![name, kind],
            )?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteLedger
// ---------------------------------------------------------------------------

/// Ledger and category store backed by one SQLite file.
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn set_category_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE categories SET is_enabled = ?1 WHERE id = ?2",
            rusqlite::params![enabled, id],
        )?;
        Ok(())
    }

    /// Sum of stored amounts for one direction.
    pub fn total_for(&self, direction: &str) -> Result<Decimal> {
        let mut stmt = self
            .conn
            .prepare("SELECT amount FROM transactions WHERE direction = ?1")?;
        let amounts = stmt
            .query_map([direction], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        amounts.iter().try_fold(Decimal::ZERO, |acc, raw| {
            Decimal::from_str(raw)
                .map(|amount| acc + amount)
                .map_err(|e| ImportError::Other(format!("Stored amount {raw:?} is unreadable: {e}")))
        })
    }
}

impl CategoryRepository for SqliteLedger {
    fn categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, kind, is_enabled FROM categories ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, name, kind, is_enabled)| match CategoryKind::from_key(&kind) {
                Some(kind) => Some(Category {
                    id,
                    name,
                    kind,
                    is_enabled,
                }),
                None => {
                    warn!(id, kind = %kind, "skipping category with unknown kind");
                    None
                }
            })
            .collect())
    }

    fn ensure_fallback_categories(&mut self) -> Result<()> {
        for kind in [CategoryKind::Expense, CategoryKind::Income] {
            let created = self.conn.execute(
                "INSERT OR IGNORE INTO categories (name, kind) VALUES (?1, ?2)",
                rusqlite::params![UNCATEGORIZED, kind.key()],
            )?;
            if created > 0 {
                debug!(kind = kind.key(), "created fallback category");
            }
        }
        Ok(())
    }
}

impl LedgerSink for SqliteLedger {
    /// Writes the batch in one transaction. Transactions whose
    /// `(source, order_id)` is already stored are skipped.
    fn insert_batch(&mut self, batch: &CommitBatch) -> Result<Vec<usize>> {
        let tx = self.conn.transaction()?;
        let range = batch.date_range();
        tx.execute(
            "INSERT INTO imports (filename, record_count, excluded_count, date_range_start, date_range_end, checksum) VALUES (?1, 0, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                batch.file_name,
                batch.excluded as i64,
                range.map(|(first, _)| first.to_string()),
                range.map(|(_, last)| last.to_string()),
                batch.checksum,
            ],
        )?;
        let import_id = tx.last_insert_rowid();

        let mut stored = Vec::new();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO transactions (direction, amount, category_id, occurred_at, note, source, order_id, import_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (idx, txn) in batch.transactions.iter().enumerate() {
                let changed = stmt.execute(rusqlite::params![
                    txn.direction.key(),
                    txn.amount.to_string(),
                    txn.category_id,
                    txn.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    txn.note,
                    txn.source.key(),
                    txn.order_id,
                    import_id,
                ])?;
                if changed > 0 {
                    stored.push(idx);
                }
            }
        }

        tx.execute(
            "UPDATE imports SET record_count = ?1 WHERE id = ?2",
            rusqlite::params![stored.len() as i64, import_id],
        )?;
        tx.commit()?;
        Ok(stored)
    }
}
