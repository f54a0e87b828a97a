use std::fmt;

use tracing::debug;

use crate::decode::{decode, TextEncoding};
use crate::error::{ImportError, Result};
use crate::models::RawDocument;
use crate::settings::ImportSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    DelimitedText,
    Spreadsheet,
    LegacySpreadsheet,
    WordDocument,
}

impl ContainerKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::DelimitedText => "csv",
            Self::Spreadsheet => "xlsx",
            Self::LegacySpreadsheet => "xls",
            Self::WordDocument => "docx",
        }
    }

    fn from_extension(ext: &str) -> Result<Option<Self>> {
        match ext {
            "csv" => Ok(Some(Self::DelimitedText)),
            "xlsx" => Ok(Some(Self::Spreadsheet)),
            "xls" => Ok(Some(Self::LegacySpreadsheet)),
            "docx" => Ok(Some(Self::WordDocument)),
            "doc" => Err(ImportError::LegacyWordDocument),
            _ => Ok(None),
        }
    }

    fn from_mime(mime: &str) -> Result<Option<Self>> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" | "text/comma-separated-values" | "application/csv" => {
                Ok(Some(Self::DelimitedText))
            }
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Ok(Some(Self::Spreadsheet))
            }
            "application/vnd.ms-excel" => Ok(Some(Self::LegacySpreadsheet)),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Ok(Some(Self::WordDocument))
            }
            "application/msword" => Err(ImportError::LegacyWordDocument),
            _ => Ok(None),
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Extension wins over MIME; MIME is only consulted when the extension is
/// missing or unknown.
pub fn container_kind(doc: &RawDocument) -> Result<ContainerKind> {
    let ext = doc.extension();
    if let Some(kind) = ext.as_deref().map(ContainerKind::from_extension).transpose()?.flatten() {
        return Ok(kind);
    }
    if let Some(kind) = doc.mime.as_deref().map(ContainerKind::from_mime).transpose()?.flatten() {
        return Ok(kind);
    }
    let described = ext
        .map(|e| format!(".{e}"))
        .or_else(|| doc.mime.clone())
        .unwrap_or_else(|| doc.file_name.clone());
    Err(ImportError::UnsupportedFormat(described))
}

/// Line-oriented, comma-separated text ready for source detection.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedText {
    pub text: String,
    pub kind: ContainerKind,
    /// Only set for delimited text; container formats carry their own encoding.
    pub encoding: Option<TextEncoding>,
    /// Delimited text was cut at `max_input_bytes`.
    pub truncated: bool,
}

pub fn normalize(doc: &RawDocument, settings: &ImportSettings) -> Result<NormalizedText> {
    let kind = container_kind(doc)?;
    debug!(file = %doc.file_name, kind = kind.key(), bytes = doc.bytes.len(), "routing document");
    let (text, encoding, truncated) = match kind {
        ContainerKind::DelimitedText => {
            let decoded = decode(&doc.bytes, settings.max_input_bytes);
            (decoded.text, Some(decoded.encoding), decoded.truncated)
        }
        ContainerKind::Spreadsheet | ContainerKind::LegacySpreadsheet => {
            (spreadsheet_text(kind, doc, settings)?, None, false)
        }
        ContainerKind::WordDocument => (document_text(doc, settings)?, None, false),
    };
    Ok(NormalizedText {
        text,
        kind,
        encoding,
        truncated,
    })
}

#[cfg(feature = "spreadsheet")]
fn spreadsheet_text(kind: ContainerKind, doc: &RawDocument, settings: &ImportSettings) -> Result<String> {
    let rows = if kind == ContainerKind::Spreadsheet {
        crate::spreadsheet::read_xlsx(&doc.bytes, settings.max_rows)?
    } else {
        crate::spreadsheet::read_xls(&doc.bytes, settings.max_rows)?
    };
    rows_to_lines(rows, settings.max_rows)
}

#[cfg(not(feature = "spreadsheet"))]
fn spreadsheet_text(kind: ContainerKind, _doc: &RawDocument, _settings: &ImportSettings) -> Result<String> {
    Err(ImportError::UnsupportedFormat(format!(".{}", kind.key())))
}

#[cfg(feature = "docx")]
fn document_text(doc: &RawDocument, settings: &ImportSettings) -> Result<String> {
    let rows = crate::wordprocessing::read_docx(&doc.bytes, settings.max_rows)?;
    rows_to_lines(rows, settings.max_rows)
}

#[cfg(not(feature = "docx"))]
fn document_text(_doc: &RawDocument, _settings: &ImportSettings) -> Result<String> {
    Err(ImportError::UnsupportedFormat(".docx".to_string()))
}

/// Write table rows as newline-terminated CSV. Cells holding commas, quotes
/// or newlines are quoted with embedded quotes doubled.
pub fn rows_to_lines<I>(rows: I, max_rows: usize) -> Result<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in rows.into_iter().take(max_rows) {
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ImportError::Other(format!("Failed to flush normalized rows: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ImportError::Other(e.to_string()))
}
