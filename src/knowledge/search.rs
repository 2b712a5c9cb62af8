//! 레코드 직접 검색
//!
//! - 키워드 검색: 벡터 인덱스를 쓸 수 없을 때의 폴백
//! - 정확 조회: ID(및 이름)가 포함된 레코드 찾기

use super::store::StoredRecord;

/// 키워드 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub record_id: i64,
    /// 질문 단어가 포함된 필드 수
    pub score: usize,
    pub content: String,
}

/// 키워드 검색
///
/// 질문을 소문자 공백 단위로 나누고, 질문 단어 중 하나라도 포함한 필드마다
/// 1점을 줍니다. 점수가 0인 레코드는 제외하고, 동점은 로드 순서를 유지합니다.
pub fn keyword_search(records: &[StoredRecord], question: &str, limit: usize) -> Vec<KeywordMatch> {
    let question = question.to_lowercase();
    let words: Vec<&str> = question.split_whitespace().collect();
    if words.is_empty() {
        return vec![];
    }

    let mut matches: Vec<KeywordMatch> = records
        .iter()
        .filter_map(|stored| {
            let score = stored
                .record
                .non_empty_fields()
                .filter(|(_, value)| {
                    let value = value.trim().to_lowercase();
                    words.iter().any(|word| value.contains(word))
                })
                .count();

            (score > 0).then(|| KeywordMatch {
                record_id: stored.id,
                score,
                content: stored.record.content(),
            })
        })
        .collect();

    // sort_by는 안정 정렬
    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches.truncate(limit);
    matches
}

/// ID와 (선택적으로) 이름으로 레코드 찾기
///
/// 어떤 필드든 ID를 부분 문자열로 포함하고, 이름이 주어지면 어떤 필드든
/// 이름을 대소문자 무시로 포함하는 첫 레코드를 반환합니다.
pub fn find_exact_record<'a>(
    records: &'a [StoredRecord],
    search_id: &str,
    search_name: Option<&str>,
) -> Option<&'a StoredRecord> {
    tracing::info!("Searching for ID: {}, Name: {:?}", search_id, search_name);

    let name_lower = search_name.map(str::to_lowercase);

    let found = records.iter().find(|stored| {
        let mut id_found = false;
        let mut name_found = name_lower.is_none();

        for (_, value) in &stored.record.fields {
            let value = value.trim();
            if value.contains(search_id) {
                id_found = true;
            }
            if let Some(name) = &name_lower {
                if value.to_lowercase().contains(name.as_str()) {
                    name_found = true;
                }
            }
        }

        id_found && name_found
    });

    match found {
        Some(stored) => tracing::info!("Found matching record in {}", stored.record.filename),
        None => tracing::info!("No record found for ID: {}", search_id),
    }

    found
}

// ============================================================================
// Tests
// ============================================================================
