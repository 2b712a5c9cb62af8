//! 답변 텍스트 구성

use serde::Serialize;

use crate::spreadsheet::Record;

/// 답변 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// 특정 필드 값
    FieldValue,
    /// 레코드 전체
    RecordDump,
    RecordNotFound,
    NoData,
    /// 검색된 레코드 텍스트
    Retrieved,
    /// LLM 생성 답변
    Generated,
    NoMatch,
}

/// 질문에 대한 답변
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub kind: AnswerKind,
    /// 근거 파일 이름
    pub sources: Vec<String>,
}

impl Answer {
    fn new(text: String, kind: AnswerKind) -> Self {
        Self {
            text,
            kind,
            sources: vec![],
        }
    }

    fn with_source(mut self, filename: &str) -> Self {
        self.sources.push(filename.to_string());
        self
    }

    /// 데이터 없음
    pub fn no_data() -> Self {
        Self::new(
            "No data available. Please process files first.".to_string(),
            AnswerKind::NoData,
        )
    }

    /// 관련 레코드 없음
    pub fn no_match() -> Self {
        Self::new(
            "No relevant information found for your query.".to_string(),
            AnswerKind::NoMatch,
        )
    }

    /// 필드 값 답변
    pub fn field_value(record_id: &str, name: Option<&str>, field: &str, value: &str, record: &Record) -> Self {
        let text = format!(
            "The {} of {}{} is {}.\n\n(Source: {})",
            field,
            record_id,
            name_suffix(name),
            value,
            record.filename
        );
        Self::new(text, AnswerKind::FieldValue).with_source(&record.filename)
    }

    /// 레코드 전체 답변
    ///
    /// `missing_field`는 해석은 되었지만 값이 비어 있는 필드입니다.
    pub fn record_dump(record_id: &str, name: Option<&str>, record: &Record, missing_field: Option<&str>) -> Self {
        let mut text = format!("Found record for {}{}:\n\n", record_id, name_suffix(name));
        for (column, value) in record.non_empty_fields() {
            text.push_str(&format!("• {}: {}\n", column, value));
        }
        text.push_str(&format!("\n(Source: {})", record.filename));

        if let Some(field) = missing_field {
            text.push_str(&format!(
                "\n\nNote: The requested field '{}' was not found in this record.",
                field
            ));
        }

        Self::new(text, AnswerKind::RecordDump).with_source(&record.filename)
    }

    /// 레코드를 찾지 못함
    pub fn record_not_found(record_id: &str, name: Option<&str>) -> Self {
        let with_name = name
            .map(|n| format!(" with name {}", n))
            .unwrap_or_default();
        Self::new(
            format!("No record found for ID {}{} in the loaded data.", record_id, with_name),
            AnswerKind::RecordNotFound,
        )
    }

    /// 검색된 레코드 텍스트로 답변
    pub fn retrieved(contexts: &[String], sources: Vec<String>) -> Self {
        if contexts.is_empty() {
            return Self::no_match();
        }
        Self {
            text: format!(
                "Based on the data, here's what I found:\n\n{}",
                contexts.join("\n\n")
            ),
            kind: AnswerKind::Retrieved,
            sources,
        }
    }

    /// LLM 생성 답변
    pub fn generated(text: String, sources: Vec<String>) -> Self {
        Self {
            text: text.trim().to_string(),
            kind: AnswerKind::Generated,
            sources,
        }
    }
}

fn name_suffix(name: Option<&str>) -> String {
    name.map(|n| format!(" - {}", n)).unwrap_or_default()
}

/// 레코드 텍스트에서 파일 이름 추출 ("Record from {filename}:")
pub fn source_of(content: &str) -> Option<String> {
    content
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("Record from "))
        .and_then(|rest| rest.strip_suffix(':'))
        .map(str::to_string)
}

/// 중복 없이 순서대로 파일 이름 수집
pub fn collect_sources<'a>(contents: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for source in contents.into_iter().filter_map(|c| source_of(c)) {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}
