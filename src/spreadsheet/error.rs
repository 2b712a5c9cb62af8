//! 스프레드시트 처리 에러 타입

use std::path::PathBuf;

use thiserror::Error;

/// 시트 읽기/구조화 에러
///
/// 파일 단위 에러는 배치 전체를 중단시키지 않고 `FileReport::Error`로 기록됩니다.
#[derive(Debug, Error)]
pub enum SheetError {
    /// 파일이 존재하지 않음
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// 지원하지 않는 확장자
    #[error("Unsupported spreadsheet format: {0}")]
    Unsupported(String),

    /// 파일 읽기/파싱 실패
    #[error("Error reading file {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// 헤더 행 감지 실패
    #[error("Could not detect header row in {0}")]
    HeaderNotDetected(String),
}

impl SheetError {
    pub(crate) fn read(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}
