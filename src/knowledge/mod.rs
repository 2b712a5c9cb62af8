//! Knowledge 모듈 - 레코드 저장소 + 검색
//!
//! - SQLite: 파일 보고서와 레코드 저장
//! - LanceDB: 레코드 임베딩 벡터 검색 (ANN)
//! - Search: 키워드 폴백 검색, ID 정확 조회
//! - Retriever: 임베딩 + 벡터 저장소 결합

mod store;
mod vector;
mod lance;
mod search;
mod retriever;

// Re-exports
pub use store::{get_data_dir, RecordStore, StoreStats, StoredRecord};
pub use vector::{
    cosine_similarity, MemoryVectorStore, SearchResult, VectorEntry, VectorStore,
    EMBEDDING_DIMENSION,
};
pub use lance::LanceVectorStore;
pub use search::{find_exact_record, keyword_search, KeywordMatch};
pub use retriever::{keyword_contexts, RetrievedContext, Retriever, SearchMethod};

#[cfg(test)]
pub(crate) use retriever::tests::{FailingEmbedding, VocabEmbedding};
