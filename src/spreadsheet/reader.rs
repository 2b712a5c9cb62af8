//! 원시 행 읽기
//!
//! - CSV: csv 크레이트 (헤더 없음, 가변 폭)
//! - xlsx/xlsm/xls/ods: calamine (첫 번째 워크시트)

use std::path::Path;

use calamine::{open_workbook_auto, DataType, Reader};

use super::error::SheetError;
use super::{RawRow, SheetFormat};

/// 파일에서 원시 행 읽기
///
/// 모든 행은 가장 넓은 행의 폭으로 `None` 패딩됩니다.
pub fn read_raw_rows(path: &Path) -> Result<Vec<RawRow>, SheetError> {
    if !path.exists() {
        return Err(SheetError::NotFound(path.to_path_buf()));
    }

    let format = SheetFormat::from_path(path).ok_or_else(|| {
        SheetError::Unsupported(
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string(),
        )
    })?;

    let rows = match format {
        SheetFormat::Csv => read_csv(path)?,
        _ => read_workbook(path)?,
    };

    Ok(pad_rows(rows))
}

/// CSV 읽기
fn read_csv(path: &Path) -> Result<Vec<RawRow>, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| SheetError::read(path, e))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| SheetError::read(path, e))?;
        rows.push(record.iter().map(normalize_text).collect());
    }

    Ok(rows)
}

/// 워크북 첫 시트 읽기
fn read_workbook(path: &Path) -> Result<Vec<RawRow>, SheetError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| SheetError::read(path, e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SheetError::read(path, "workbook has no worksheets"))?
        .map_err(|e| SheetError::read(path, e))?;

    // calamine은 앞쪽 빈 행/열을 잘라내므로 원래 위치로 복원
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<RawRow> = vec![Vec::new(); row_offset];
    for cells in range.rows() {
        let mut row: RawRow = vec![None; col_offset];
        row.extend(cells.iter().map(normalize_cell));
        rows.push(row);
    }

    Ok(rows)
}

/// 날짜 셀 출력 형식
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// calamine 셀 → 문자열
///
/// 날짜 서식 셀은 시리얼 값 대신 `YYYY-MM-DD HH:MM:SS`로, 경과 시간 셀은
/// `HH:MM:SS`로 변환합니다.
fn normalize_cell(cell: &DataType) -> Option<String> {
    match cell {
        DataType::Empty | DataType::Error(_) => None,
        DataType::DateTime(_) => match cell.as_datetime() {
            Some(datetime) => Some(datetime.format(DATETIME_FORMAT).to_string()),
            None => normalize_text(&cell.to_string()),
        },
        DataType::Duration(_) => match cell.as_duration() {
            Some(duration) => Some(format_duration(duration)),
            None => normalize_text(&cell.to_string()),
        },
        other => normalize_text(&other.to_string()),
    }
}

fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn normalize_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// 가장 넓은 행 기준으로 패딩
fn pad_rows(mut rows: Vec<RawRow>) -> Vec<RawRow> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, None);
    }
    rows
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_csv_pads_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "Report,,\nSl,Name,Pay\n1, Rahim ,100\n2,Karim\n").unwrap();

        let rows = read_raw_rows(&path).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.len() == 3));
        assert_eq!(rows[0], vec![Some("Report".to_string()), None, None]);
        assert_eq!(rows[2][1].as_deref(), Some("Rahim"));
        assert_eq!(rows[3][2], None);
    }

    #[test]
    fn test_missing_file() {
        let err = read_raw_rows(Path::new("/nonexistent/data.csv")).unwrap_err();
        assert!(matches!(err, SheetError::NotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let err = read_raw_rows(&path).unwrap_err();
        assert!(matches!(err, SheetError::Unsupported(ext) if ext == "txt"));
    }

    #[test]
    fn test_corrupt_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, "not a zip archive").unwrap();

        let err = read_raw_rows(&path).unwrap_err();
        assert!(matches!(err, SheetError::Read { .. }));
    }

    /// C4에서 시작하고 날짜 서식 컬럼이 있는 워크북
    pub(crate) const OFFSET_WORKBOOK: &str =
        concat!(env!("CARGO_MANIFEST_DIR"), "/src/spreadsheet/testdata/offset_dates.xlsx");

    #[test]
    fn test_read_workbook_restores_offset() {
        let rows = read_raw_rows(Path::new(OFFSET_WORKBOOK)).unwrap();

        assert_eq!(rows.len(), 8);
        assert!(rows.iter().all(|r| r.len() == 6));
        assert!(rows[..3].iter().all(|r| r.iter().all(Option::is_none)));
        assert!(rows.iter().all(|r| r[0].is_none() && r[1].is_none()));
        assert!(rows[4].iter().all(Option::is_none));

        assert_eq!(rows[3][2].as_deref(), Some("Agent Report"));
        assert_eq!(rows[5][2].as_deref(), Some("Sl"));
        assert_eq!(rows[6][2].as_deref(), Some("10234"));
        assert_eq!(rows[6][3].as_deref(), Some("Rahim Uddin"));
        assert_eq!(rows[6][4].as_deref(), Some("2024-01-01 00:00:00"));
        assert_eq!(rows[7][4].as_deref(), Some("2024-02-01 12:00:00"));
        assert_eq!(rows[7][5].as_deref(), Some("9800"));
    }

    #[test]
    fn test_date_cells_are_formatted() {
        assert_eq!(
            normalize_cell(&DataType::DateTime(45292.0)).as_deref(),
            Some("2024-01-01 00:00:00")
        );
        assert_eq!(
            normalize_cell(&DataType::DateTime(45292.5)).as_deref(),
            Some("2024-01-01 12:00:00")
        );
        assert_eq!(
            normalize_cell(&DataType::Duration(1.5)).as_deref(),
            Some("36:00:00")
        );
        assert_eq!(
            normalize_cell(&DataType::DateTimeIso("2024-03-05T08:30:00".to_string())).as_deref(),
            Some("2024-03-05T08:30:00")
        );
        assert_eq!(normalize_cell(&DataType::Float(15200.0)).as_deref(), Some("15200"));
    }

    #[test]
    fn test_pad_rows_empty() {
        assert!(pad_rows(vec![]).is_empty());
    }
}
