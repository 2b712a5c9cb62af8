//! 헤더 행 감지
//!
//! 스프레드시트 상단의 제목/메모 행을 건너뛰고 실제 컬럼 헤더를 찾습니다.
//!
//! 1. 빈 셀과 값이 있는 셀이 섞인 행이 3개 연속되면, 그 첫 행을 헤더로 봅니다.
//! 2. 없으면 처음 10개 행 중 값이 50% 이상 채워진 첫 행을 사용합니다.

use super::RawRow;

/// 폴백 감지 시 검사할 최대 행 수
const FALLBACK_SCAN_ROWS: usize = 10;

/// 연속 패턴 길이
const PATTERN_LENGTH: usize = 3;

/// 셀이 비어있는지 확인
///
/// 공백 문자열, `nan`, `none`(대소문자 무시)도 빈 셀로 취급합니다.
pub fn is_null_cell(cell: &Option<String>) -> bool {
    match cell {
        None => true,
        Some(value) => {
            let value = value.trim();
            value.is_empty()
                || value.eq_ignore_ascii_case("nan")
                || value.eq_ignore_ascii_case("none")
        }
    }
}

/// 행에 빈 셀과 값이 있는 셀이 모두 존재하는지 확인
pub fn has_mixed_values(row: &[Option<String>]) -> bool {
    let mut has_null = false;
    let mut has_value = false;

    for cell in row {
        if is_null_cell(cell) {
            has_null = true;
        } else {
            has_value = true;
        }

        if has_null && has_value {
            return true;
        }
    }

    false
}

/// 헤더 행 인덱스 찾기 (0-based)
pub fn find_header_row(rows: &[RawRow]) -> Option<usize> {
    if let Some(index) = rows
        .windows(PATTERN_LENGTH)
        .position(|window| window.iter().all(|row| has_mixed_values(row)))
    {
        tracing::info!(
            "Found header pattern at rows {}, {}, {}",
            index,
            index + 1,
            index + 2
        );
        return Some(index);
    }

    // 폴백: 값이 절반 이상 채워진 첫 행
    for (index, row) in rows.iter().take(FALLBACK_SCAN_ROWS).enumerate() {
        if row.is_empty() {
            continue;
        }

        let filled = row
            .iter()
            .filter(|cell| cell.as_deref().is_some_and(|v| !v.trim().is_empty()))
            .count();

        if filled * 2 >= row.len() {
            tracing::info!("Using fallback header detection at row {}", index);
            return Some(index);
        }
    }

    None
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

    #[test]
    fn test_is_null_cell() {
        assert!(is_null_cell(&None));
        assert!(is_null_cell(&Some("   ".to_string())));
        assert!(is_null_cell(&Some("NaN".to_string())));
        assert!(is_null_cell(&Some("None".to_string())));
        assert!(!is_null_cell(&Some("0".to_string())));
    }

    #[test]
    fn test_has_mixed_values() {
        assert!(has_mixed_values(&row(&["a", ""])));
        assert!(!has_mixed_values(&row(&["a", "b"])));
        assert!(!has_mixed_values(&row(&["", ""])));
        assert!(!has_mixed_values(&[]));
    }

    #[test]
    fn test_sequential_pattern() {
        let rows = vec![
            row(&["Monthly Report", "", "", ""]),
            row(&["", "", "", ""]),
            row(&["Sl", "Agent Name", "", "Commission"]),
            row(&["1", "Rahim", "", "500"]),
            row(&["2", "Karim", "", "700"]),
        ];
        // 0행도 섞여 있지만 1행이 전부 비어 있으므로 2행부터 패턴 성립
        assert_eq!(find_header_row(&rows), Some(2));
    }

    #[test]
    fn test_fallback_detection() {
        let rows = vec![
            row(&["", "", ""]),
            row(&["Sl", "Name", "Pay"]),
            row(&["1", "Rahim", "100"]),
        ];
        assert_eq!(find_header_row(&rows), Some(1));
    }

    #[test]
    fn test_fallback_half_filled() {
        let rows = vec![row(&["Sl", "", "Pay", ""]), row(&["1", "x", "2", "y"])];
        // 3행 패턴 없음, 0행은 2/4 = 50%로 폴백 조건 충족
        assert_eq!(find_header_row(&rows), Some(0));
    }

    #[test]
    fn test_no_header() {
        let rows = vec![row(&["", "", ""]), row(&["", "", "x"])];
        assert_eq!(find_header_row(&rows), None);
        assert_eq!(find_header_row(&[]), None);
    }
}
