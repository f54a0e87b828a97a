use std::io::{Cursor, Read, Seek};

use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{ImportError, Result};

pub fn read_xlsx(bytes: &[u8], max_rows: usize) -> Result<Vec<Vec<String>>> {
    let workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ImportError::Spreadsheet(format!("Failed to open XLSX: {e}")))?;
    let range = first_sheet(workbook)?;
    Ok(range_rows(&range, max_rows))
}

pub fn read_xls(bytes: &[u8], max_rows: usize) -> Result<Vec<Vec<String>>> {
    let workbook: Xls<_> = Xls::new(Cursor::new(bytes))
        .map_err(|e| ImportError::Spreadsheet(format!("Failed to open XLS: {e}")))?;
    let range = first_sheet(workbook)?;
    Ok(range_rows(&range, max_rows))
}

/// Bill exports keep everything on the first sheet.
fn first_sheet<RS, R>(mut workbook: R) -> Result<Range<Data>>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => Ok(range),
        Some(Err(e)) => Err(ImportError::Spreadsheet(format!("Failed to read first sheet: {e}"))),
        None => Err(ImportError::Spreadsheet("Workbook has no sheets".to_string())),
    }
}

pub fn range_rows(range: &Range<Data>, max_rows: usize) -> Vec<Vec<String>> {
    range
        .rows()
        .take(max_rows)
        .map(|row| row.iter().map(cell_text).collect())
        .collect()
}

/// Unreadable cells (error values, unknown kinds) come out blank.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.replacen('T', " ", 1),
        _ => String::new(),
    }
}

pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = (serial.fract() * 86_400.0).round() as i64;
    Some(base + Duration::days(days) + Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excel_serial_to_datetime() {
        let dt = excel_serial_to_datetime(45667.5).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2025-01-10 12:00:00");
        assert!(excel_serial_to_datetime(-1.0).is_none());
    }

    #[test]
    fn test_range_rows_flattens_cells() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 2));
        range.set_value((0, 0), Data::String("交易时间".to_string()));
        range.set_value((0, 1), Data::String("金额".to_string()));
        range.set_value((0, 2), Data::String("单号".to_string()));
        range.set_value((1, 0), Data::DateTimeIso("2024-03-01T12:30:00".to_string()));
        range.set_value((1, 1), Data::Float(25.5));
        range.set_value((1, 2), Data::Int(4200001234));
        range.set_value((2, 0), Data::String(" 2024-03-02 08:00:00 ".to_string()));
        range.set_value((2, 1), Data::Float(100.0));
        let rows = range_rows(&range, 100);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["2024-03-01 12:30:00", "25.5", "4200001234"]);
        assert_eq!(rows[2], vec!["2024-03-02 08:00:00", "100", ""]);
    }

    #[test]
    fn test_error_cells_are_blank() {
        let mut range: Range<Data> = Range::new((0, 0), (0, 1));
        range.set_value((0, 0), Data::Error(calamine::CellErrorType::Div0));
        range.set_value((0, 1), Data::String("ok".to_string()));
        assert_eq!(range_rows(&range, 10), vec![vec!["".to_string(), "ok".to_string()]]);
    }

    #[test]
    fn test_row_cap() {
        let mut range: Range<Data> = Range::new((0, 0), (49, 0));
        for i in 0..50 {
            range.set_value((i, 0), Data::Int(i as i64));
        }
        assert_eq!(range_rows(&range, 10).len(), 10);
    }

    #[test]
    fn test_garbage_bytes_fail_cleanly() {
        let err = read_xlsx(b"not a workbook", 10).unwrap_err();
        assert!(matches!(err, ImportError::Spreadsheet(_)));
        let err = read_xls(b"not a workbook either", 10).unwrap_err();
        assert!(matches!(err, ImportError::Spreadsheet(_)));
    }

    #[test]
    fn test_read_xlsx_first_sheet() {
        let bytes = crate::fixtures::xlsx(&[&["交易时间", "金额"], &["2024-03-01 12:00:00", "25.5"]]);
        let rows = read_xlsx(&bytes, 10).unwrap();
        assert_eq!(rows, vec![vec!["交易时间", "金额"], vec!["2024-03-01 12:00:00", "25.5"]]);
    }
}
