//! 질문 해석
//!
//! 질문에서 레코드 ID, 이름, 요청 필드를 뽑아냅니다.
//! 예: "What is the net pay of 10234 - Rahim Uddin?"

use std::sync::OnceLock;

use regex::Regex;

use crate::spreadsheet::Record;

/// 질문 문구 → 후보 컬럼 이름 (순서대로 검사)
pub const FIELD_MAPPINGS: &[(&str, &[&str])] = &[
    ("ac no", &["Ac No", "Account No", "Account Number"]),
    ("organization", &["Organization", "Org", "Company"]),
    ("designation", &["Designation", "Position", "Title"]),
    ("job duration", &["Job Duration", "Duration", "Service"]),
    ("total business", &["Total Business", "Total Premium", "Business"]),
    ("commission", &["Commission", "Com"]),
    ("pf", &["PF", "Provident Fund"]),
    ("allowance", &["Allowance", "Allow"]),
    ("net pay", &["Net Pay", "Net", "Pay"]),
    ("tds", &["TDS", "Tax"]),
    ("total premium", &["Total Premium", "Premium", "Total PR"]),
    ("agent name", &["Agent Name", "Name"]),
    ("sl", &["Sl", "Serial", "ID"]),
];

/// 독립된 4~6자리 숫자
const RECORD_ID_PATTERN: &str = r"\b(\d{4,6})\b";

/// 이름 앞의 `"{숫자} - "`
const ID_DASH_PATTERN: &str = r"(\d+)\s*-\s*";

static RECORD_ID_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
static ID_DASH_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

/// 정규식을 한 번만 컴파일
fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!("Invalid pattern {:?}: {}", pattern, e);
            None
        }
    })
    .as_ref()
}

/// 레코드 ID 추출 (독립된 4~6자리 숫자)
pub fn extract_record_id(question: &str) -> Option<String> {
    compiled(&RECORD_ID_REGEX, RECORD_ID_PATTERN)?
        .captures(question)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// ID 뒤의 이름 추출
///
/// `"{id} - "` 다음부터 `?` 전까지의 텍스트입니다.
pub fn extract_name(question: &str, record_id: &str) -> Option<String> {
    let dash = compiled(&ID_DASH_REGEX, ID_DASH_PATTERN)?
        .captures_iter(question)
        .find(|caps| caps.get(1).is_some_and(|m| m.as_str().ends_with(record_id)))?
        .get(0)?;

    let rest = &question[dash.end()..];
    let name = rest.split('?').next().unwrap_or_default().trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// 질문이 묻는 필드를 레코드 컬럼으로 해석
///
/// 질문에 들어 있는 첫 문구 중 후보 컬럼이 레코드에 존재하는 것을 고릅니다.
/// 컬럼이 존재하기만 하면 값이 비어 있어도 선택됩니다.
pub fn requested_field(question: &str, record: &Record) -> Option<&'static str> {
    let question = question.to_lowercase();

    FIELD_MAPPINGS
        .iter()
        .filter(|(phrase, _)| question.contains(phrase))
        .find_map(|(_, columns)| columns.iter().copied().find(|col| record.has_column(col)))
}

/// 질문 의도
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryIntent {
    /// ID로 특정 레코드 조회
    Lookup { record_id: String, name: Option<String> },
    /// 자유 질문 (검색)
    Search,
}

impl QueryIntent {
    pub fn parse(question: &str) -> Self {
        match extract_record_id(question) {
            Some(record_id) => {
                let name = extract_name(question, &record_id);
                QueryIntent::Lookup { record_id, name }
            }
            None => QueryIntent::Search,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, &str)]) -> Record {
        Record {
            file_id: "file_1".to_string(),
            filename: "agents.xlsx".to_string(),
            row_index: 0,
            original_row: 4,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_extract_record_id() {
        assert_eq!(extract_record_id("net pay of 10234?"), Some("10234".to_string()));
        assert_eq!(extract_record_id("id 1234 and 567890"), Some("1234".to_string()));
        assert_eq!(extract_record_id("only 123 here"), None);
        // 7자리는 독립된 4~6자리가 아님
        assert_eq!(extract_record_id("phone 0171234"), None);
        assert_eq!(extract_record_id("who works in Dhaka?"), None);
    }

    #[test]
    fn test_extract_name() {
        assert_eq!(
            extract_name("What is the PF of 10234 - Rahim Uddin?", "10234"),
            Some("Rahim Uddin".to_string())
        );
        assert_eq!(
            extract_name("10234-Karim", "10234"),
            Some("Karim".to_string())
        );
        assert_eq!(extract_name("What is the PF of 10234?", "10234"), None);
        assert_eq!(extract_name("10234 - ?", "10234"), None);
        // 앞쪽의 다른 "숫자 -"는 건너뜀
        assert_eq!(
            extract_name("Q3 2024 - 2025: net pay of 10234 - Salma?", "10234"),
            Some("Salma".to_string())
        );
    }

    #[test]
    fn test_patterns_compile_once() {
        let first = compiled(&RECORD_ID_REGEX, RECORD_ID_PATTERN).unwrap();
        let second = compiled(&RECORD_ID_REGEX, RECORD_ID_PATTERN).unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(compiled(&ID_DASH_REGEX, ID_DASH_PATTERN).is_some());
    }

    #[test]
    fn test_requested_field_first_matching_phrase() {
        let rec = record(&[("Sl", "10234"), ("Net Pay", "5000"), ("Organization", "Dhaka")]);

        assert_eq!(requested_field("What is the net pay of 10234?", &rec), Some("Net Pay"));
        assert_eq!(requested_field("ORGANIZATION of 10234", &rec), Some("Organization"));
        assert_eq!(requested_field("tell me about 10234", &rec), None);
    }

    #[test]
    fn test_requested_field_skips_absent_columns() {
        // "commission" 후보가 없으면 다음 문구로 넘어감
        let rec = record(&[("Sl", "10234"), ("Tax", "120")]);
        assert_eq!(requested_field("commission and tds for 10234", &rec), Some("Tax"));
    }

    #[test]
    fn test_parse_intent() {
        assert_eq!(
            QueryIntent::parse("Designation of 20001 - Salma?"),
            QueryIntent::Lookup {
                record_id: "20001".to_string(),
                name: Some("Salma".to_string())
            }
        );
        assert_eq!(QueryIntent::parse("Which agents are in Sylhet?"), QueryIntent::Search);
    }
}
