//! 스프레드시트 모듈 - 엑셀/CSV 파일을 레코드로 변환
//!
//! - reader: 원시 행 읽기 (csv, calamine)
//! - header: 3행 연속 패턴 기반 헤더 감지
//! - record: 헤더 기준 레코드 구조화

mod error;
mod header;
mod reader;
mod record;

use std::path::Path;

pub use error::SheetError;
pub use header::{find_header_row, has_mixed_values, is_null_cell};
pub use reader::read_raw_rows;
pub use record::{extract_sheet, FileReport, Record, SheetSummary};

/// 원시 행 (빈 셀은 `None`)
pub type RawRow = Vec<Option<String>>;

// ============================================================================
// Sheet Format
// ============================================================================

/// 지원하는 스프레드시트 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetFormat {
    Csv,
    Xlsx,
    Xlsm,
    Xls,
    Ods,
}

impl SheetFormat {
    /// 확장자로 형식 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Some(SheetFormat::Csv),
            "xlsx" => Some(SheetFormat::Xlsx),
            "xlsm" => Some(SheetFormat::Xlsm),
            "xls" => Some(SheetFormat::Xls),
            "ods" => Some(SheetFormat::Ods),
            _ => None,
        }
    }

    /// 파일 경로에서 형식 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 표시용 라벨
    pub fn label(&self) -> &'static str {
        match self {
            SheetFormat::Csv => "CSV",
            SheetFormat::Xlsx => "XLSX",
            SheetFormat::Xlsm => "XLSM",
            SheetFormat::Xls => "XLS",
            SheetFormat::Ods => "ODS",
        }
    }
}

/// 파일 하나를 읽어 요약과 레코드 반환
pub fn process_sheet(path: &Path, file_id: &str) -> Result<(SheetSummary, Vec<Record>), SheetError> {
    let filename = file_name(path);
    let rows = read_raw_rows(path)?;
    extract_sheet(&rows, file_id, &filename)
}

/// 경로의 파일 이름 (표시용)
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
