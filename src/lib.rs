//! excel-rag - 엑셀/CSV 스프레드시트 질의응답 RAG 시스템
//!
//! 스프레드시트의 헤더 행을 자동으로 찾아 레코드로 구조화하고,
//! ID 정확 조회 + LanceDB 벡터 검색 + Gemini 답변 생성으로 질문에 답합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod knowledge;
pub mod query;
pub mod server;
pub mod session;
pub mod spreadsheet;

// Re-exports
pub use config::AppConfig;
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use generation::{GeminiGenerator, GenerationProvider};
pub use knowledge::{
    get_data_dir, LanceVectorStore, MemoryVectorStore, RecordStore, Retriever, SearchMethod,
    StoredRecord, VectorStore,
};
pub use query::{Answer, AnswerKind};
pub use session::{is_summary_request, RagSession};
pub use spreadsheet::{process_sheet, FileReport, Record, SheetError, SheetSummary};
