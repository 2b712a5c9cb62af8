//! Query 모듈 - 질문 해석과 답변 구성
//!
//! - Intent: 레코드 ID / 이름 / 요청 필드 추출
//! - Answer: 정해진 형식의 답변 텍스트

mod answer;
mod intent;

pub use answer::{collect_sources, source_of, Answer, AnswerKind};
pub use intent::{extract_name, extract_record_id, requested_field, QueryIntent, FIELD_MAPPINGS};

use crate::knowledge::{find_exact_record, StoredRecord};

/// ID 조회 질문에 답변
///
/// 레코드를 찾으면 요청 필드 값, 값이 없으면 레코드 전체를 돌려줍니다.
pub fn answer_lookup(
    records: &[StoredRecord],
    question: &str,
    record_id: &str,
    name: Option<&str>,
) -> Answer {
    let Some(found) = find_exact_record(records, record_id, name) else {
        return Answer::record_not_found(record_id, name);
    };

    let record = &found.record;
    let field = requested_field(question, record);

    match field.and_then(|f| record.get(f).map(|v| (f, v.trim()))) {
        Some((field, value)) if !value.is_empty() => {
            Answer::field_value(record_id, name, field, value, record)
        }
        _ => Answer::record_dump(record_id, name, record, field),
    }
}
