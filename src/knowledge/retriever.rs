//! 시맨틱 검색기 - 임베딩 + 벡터 저장소
//!
//! 레코드 텍스트를 임베딩해 벡터 저장소에 넣고, 질문과 가장 가까운
//! 레코드를 찾습니다. 벡터 검색이 불가능할 때는 키워드 검색으로 대체합니다.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::embedding::EmbeddingProvider;

use super::search::keyword_search;
use super::store::StoredRecord;
use super::vector::{VectorEntry, VectorStore};

/// 임베딩 배치 크기
const INDEX_BATCH_SIZE: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// 검색 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// 벡터 유사도 검색
    Vector,
    /// 키워드 매칭 (폴백)
    Keyword,
}

/// 검색된 컨텍스트
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub record_id: i64,
    pub content: String,
    /// 벡터: 코사인 유사도, 키워드: 매칭 필드 수
    pub score: f32,
    pub method: SearchMethod,
}

// ============================================================================
// Retriever
// ============================================================================

/// 시맨틱 검색기
pub struct Retriever {
    vector: Box<dyn VectorStore>,
    embedder: Box<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(vector: Box<dyn VectorStore>, embedder: Box<dyn EmbeddingProvider>) -> Self {
        Self { vector, embedder }
    }

    /// 벡터 인덱스 재구축
    ///
    /// 기존 벡터를 모두 지우고 레코드마다 임베딩을 저장합니다.
    ///
    /// # Returns
    /// 저장된 벡터 수
    pub async fn index(&self, records: &[StoredRecord]) -> Result<usize> {
        self.vector.clear().await.context("Failed to clear vector index")?;

        let mut total = 0;
        for batch in records.chunks(INDEX_BATCH_SIZE) {
            let contents: Vec<String> = batch.iter().map(|s| s.record.content()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&contents)
                .await
                .context("Failed to embed records")?;

            let entries: Vec<VectorEntry> = batch
                .iter()
                .zip(contents)
                .zip(embeddings)
                .map(|((stored, content), embedding)| VectorEntry {
                    record_id: stored.id,
                    file_id: stored.record.file_id.clone(),
                    content,
                    embedding,
                })
                .collect();

            total += self
                .vector
                .insert_batch(&entries)
                .await
                .context("Failed to insert vectors")?;
        }

        tracing::info!(
            "Built vector index with {} records ({})",
            total,
            self.embedder.name()
        );
        Ok(total)
    }

    /// 벡터 인덱스 비우기
    pub async fn clear(&self) -> Result<()> {
        self.vector.clear().await
    }

    /// 인덱스된 벡터 수
    pub async fn count(&self) -> Result<usize> {
        self.vector.count().await
    }

    /// 인덱스가 주어진 레코드와 정확히 같은 ID 집합을 담고 있는지
    pub async fn covers(&self, records: &[StoredRecord]) -> Result<bool> {
        let mut expected: Vec<i64> = records.iter().map(|s| s.id).collect();
        expected.sort_unstable();
        Ok(self.vector.record_ids().await? == expected)
    }

    /// 벡터 검색
    pub async fn search(&self, question: &str, limit: usize) -> Result<Vec<RetrievedContext>> {
        let query_embedding = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;

        let results = self.vector.search(&query_embedding, limit).await?;

        Ok(results
            .into_iter()
            .map(|r| RetrievedContext {
                record_id: r.record_id,
                content: r.content,
                score: r.similarity,
                method: SearchMethod::Vector,
            })
            .collect())
    }

    /// 임베딩 프로바이더 이름
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }
}

/// 키워드 검색 결과를 컨텍스트로 변환
pub fn keyword_contexts(records: &[StoredRecord], question: &str, limit: usize) -> Vec<RetrievedContext> {
    keyword_search(records, question, limit)
        .into_iter()
        .map(|m| RetrievedContext {
            record_id: m.record_id,
            content: m.content,
            score: m.score as f32,
            method: SearchMethod::Keyword,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
