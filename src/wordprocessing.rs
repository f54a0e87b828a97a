use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{ImportError, Result};

const DOCUMENT_PART: &str = "word/document.xml";

pub fn read_docx(bytes: &[u8], max_rows: usize) -> Result<Vec<Vec<String>>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ImportError::Document(format!("Failed to open DOCX: {e}")))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ImportError::Document(format!("Missing {DOCUMENT_PART}: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    document_rows(&xml, max_rows)
}

/// Table rows become rows of cells; paragraphs outside any table become
/// single-cell rows so preamble lines such as the bill title survive.
pub fn document_rows(xml: &str, max_rows: usize) -> Result<Vec<Vec<String>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut table_depth = 0usize;
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<String> = None;
    let mut paragraph = String::new();
    let mut in_text = false;

    while rows.len() < max_rows {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:tr" if table_depth == 1 => row = Some(Vec::new()),
                b"w:tc" if table_depth == 1 => cell = Some(String::new()),
                b"w:p" => paragraph.clear(),
                b"w:t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => paragraph.push(' '),
                b"w:br" | b"w:cr" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| ImportError::Document(format!("Bad text run: {e}")))?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    let text = paragraph.trim().to_string();
                    paragraph.clear();
                    if let Some(current) = cell.as_mut() {
                        if !text.is_empty() {
                            if !current.is_empty() {
                                current.push('\n');
                            }
                            current.push_str(&text);
                        }
                    } else if table_depth == 0 && !text.is_empty() {
                        rows.push(vec![text]);
                    }
                }
                b"w:tc" if table_depth == 1 => {
                    if let (Some(current), Some(cells)) = (cell.take(), row.as_mut()) {
                        cells.push(current);
                    }
                }
                b"w:tr" if table_depth == 1 => {
                    if let Some(cells) = row.take() {
                        if cells.iter().any(|c| !c.is_empty()) {
                            rows.push(cells);
                        }
                    }
                }
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ImportError::Document(format!(
                    "Malformed document XML at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }
    Ok(rows)
}
