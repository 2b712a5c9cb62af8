//! 레코드 구조화
//!
//! 감지된 헤더를 기준으로 원시 행을 컬럼 이름 → 값 레코드로 변환합니다.

use serde::{Deserialize, Serialize};

use super::error::SheetError;
use super::header::find_header_row;
use super::RawRow;

// ============================================================================
// Record
// ============================================================================

/// 스프레드시트 한 행에 해당하는 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 파일 ID (`file_1`, `file_2`, ...)
    pub file_id: String,
    /// 원본 파일 이름
    pub filename: String,
    /// 헤더 아래 데이터 영역에서의 인덱스 (0-based, 건너뛴 행 포함)
    pub row_index: usize,
    /// 시트 전체 기준 행 인덱스 (0-based)
    pub original_row: usize,
    /// 컬럼 순서를 유지한 (컬럼, 값) 목록
    pub fields: Vec<(String, String)>,
}

impl Record {
    /// 컬럼 값 조회
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// 컬럼 존재 여부
    pub fn has_column(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    /// 컬럼 값 설정
    ///
    /// 같은 이름의 컬럼이 이미 있으면 위치는 유지하고 값만 덮어씁니다.
    pub fn set(&mut self, column: &str, value: String) {
        match self.fields.iter_mut().find(|(name, _)| name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    /// 값이 있는 필드만 순회
    pub fn non_empty_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// 컬럼 이름 목록
    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// 임베딩/표시용 텍스트
    pub fn content(&self) -> String {
        let mut lines = vec![format!("Record from {}:", self.filename)];
        lines.extend(
            self.non_empty_fields()
                .map(|(name, value)| format!("{}: {}", name, value.trim())),
        );
        lines.join("\n")
    }
}

// ============================================================================
// File Report
// ============================================================================

/// 처리된 시트 요약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSummary {
    pub file_id: String,
    pub filename: String,
    pub columns: Vec<String>,
    /// 헤더 행 인덱스 (0-based)
    pub header_row: usize,
    pub rows_deleted_above_header: usize,
    pub row_count: usize,
    pub column_count: usize,
}

/// 파일별 처리 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileReport {
    Success(SheetSummary),
    Error {
        file_id: String,
        filename: String,
        error: String,
    },
}

impl FileReport {
    pub fn file_id(&self) -> &str {
        match self {
            FileReport::Success(summary) => &summary.file_id,
            FileReport::Error { file_id, .. } => file_id,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            FileReport::Success(summary) => &summary.filename,
            FileReport::Error { filename, .. } => filename,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileReport::Success(_))
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// 원시 행에서 레코드 추출
///
/// 헤더 위의 행은 버리고, 헤더 아래의 빈 행은 건너뜁니다.
pub fn extract_sheet(
    rows: &[RawRow],
    file_id: &str,
    filename: &str,
) -> Result<(SheetSummary, Vec<Record>), SheetError> {
    let header_row =
        find_header_row(rows).ok_or_else(|| SheetError::HeaderNotDetected(filename.to_string()))?;

    let headers: Vec<String> = rows[header_row]
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Column_{}", i + 1),
        })
        .collect();

    let mut records = Vec::new();

    for (row_index, row) in rows[header_row + 1..].iter().enumerate() {
        let is_blank = row
            .iter()
            .all(|cell| cell.as_deref().map_or(true, |v| v.trim().is_empty()));
        if is_blank {
            continue;
        }

        let mut record = Record {
            file_id: file_id.to_string(),
            filename: filename.to_string(),
            row_index,
            original_row: header_row + 1 + row_index,
            fields: Vec::with_capacity(headers.len()),
        };

        for (col, header) in headers.iter().enumerate() {
            let value = row
                .get(col)
                .and_then(|cell| cell.as_deref())
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            record.set(header, value);
        }

        // 헤더 범위 밖에만 값이 있는 행은 제외
        if record.non_empty_fields().next().is_some() {
            records.push(record);
        } else {
            tracing::debug!("Skipping row {} in {}: no mapped values", row_index, filename);
        }
    }

    let summary = SheetSummary {
        file_id: file_id.to_string(),
        filename: filename.to_string(),
        column_count: headers.len(),
        columns: headers,
        header_row,
        rows_deleted_above_header: header_row,
        row_count: records.len(),
    };

    Ok((summary, records))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> RawRow {
        cells
            .iter()
            .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
            .collect()
    }

    fn agent_sheet() -> Vec<RawRow> {
        vec![
            row(&["Agent Commission Statement", "", "", ""]),
            row(&["", "", "", ""]),
            row(&["Sl", "Agent Name", "", "Commission"]),
            row(&["10234", " Rahim Uddin ", "", "500"]),
            row(&["", "", "", ""]),
            row(&["10235", "Karim", "", ""]),
            row(&["", "", "", "x"]),
        ]
    }

    #[test]
    fn test_extract_sheet_summary() {
        let (summary, records) = extract_sheet(&agent_sheet(), "file_1", "agents.csv").unwrap();

        assert_eq!(summary.header_row, 2);
        assert_eq!(summary.rows_deleted_above_header, 2);
        assert_eq!(summary.columns, vec!["Sl", "Agent Name", "Column_3", "Commission"]);
        assert_eq!(summary.column_count, 4);
        // 빈 행 제외, 마지막 행은 Commission 값이 있으므로 포함
        assert_eq!(summary.row_count, 3);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_record_positions() {
        let (_, records) = extract_sheet(&agent_sheet(), "file_1", "agents.csv").unwrap();

        assert_eq!(records[0].row_index, 0);
        assert_eq!(records[0].original_row, 3);
        // 빈 행도 인덱스를 소비함
        assert_eq!(records[1].row_index, 2);
        assert_eq!(records[1].original_row, 5);
    }

    #[test]
    fn test_record_values_trimmed() {
        let (_, records) = extract_sheet(&agent_sheet(), "file_1", "agents.csv").unwrap();

        assert_eq!(records[0].get("Agent Name"), Some("Rahim Uddin"));
        assert_eq!(records[1].get("Commission"), Some(""));
        assert_eq!(records[0].get("Missing"), None);
    }

    #[test]
    fn test_record_content() {
        let (_, records) = extract_sheet(&agent_sheet(), "file_1", "agents.csv").unwrap();

        assert_eq!(
            records[0].content(),
            "Record from agents.csv:\nSl: 10234\nAgent Name: Rahim Uddin\nCommission: 500"
        );
    }

    #[test]
    fn test_duplicate_columns_keep_last_value() {
        let rows = vec![
            row(&["Name", "Pay", "Pay"]),
            row(&["A", "1", "2"]),
        ];
        let (summary, records) = extract_sheet(&rows, "file_1", "dup.csv").unwrap();

        assert_eq!(summary.column_count, 3);
        assert_eq!(records[0].fields.len(), 2);
        assert_eq!(records[0].get("Pay"), Some("2"));
    }

    #[test]
    fn test_header_not_detected() {
        let rows = vec![row(&["", "", ""])];
        let err = extract_sheet(&rows, "file_1", "empty.csv").unwrap_err();
        assert!(matches!(err, SheetError::HeaderNotDetected(_)));
        assert_eq!(err.to_string(), "Could not detect header row in empty.csv");
    }

    #[test]
    fn test_file_report_serialization() {
        let report = FileReport::Error {
            file_id: "file_2".to_string(),
            filename: "bad.xlsx".to_string(),
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["filename"], "bad.xlsx");
        assert_eq!(report.file_id(), "file_2");
        assert!(!report.is_success());
    }
}
