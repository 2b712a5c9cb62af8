//! RAG 세션 - 파일 처리, 질문 답변, 대화 기록
//!
//! 흐름:
//! 1. `process_files`: 시트 읽기 → 헤더 감지 → 레코드 저장 → 벡터 인덱스 구축
//! 2. `query`: ID 질문은 정확 조회, 나머지는 벡터 검색 (실패 시 키워드) → LLM
//!
//! API 키가 없으면 벡터 검색과 LLM 없이 키워드 검색만 사용합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::AppConfig;
use crate::embedding::GeminiEmbedding;
use crate::generation::{build_prompt, ChatRole, ChatTurn, GeminiGenerator, GenerationProvider};
use crate::knowledge::{
    keyword_contexts, LanceVectorStore, RecordStore, RetrievedContext, Retriever, SearchMethod,
    StoredRecord,
};
use crate::query::{answer_lookup, collect_sources, Answer, QueryIntent};
use crate::spreadsheet::{file_name, process_sheet, FileReport, Record};

/// 데이터 요약을 요청하는 문구
const SUMMARY_REQUESTS: [&str; 3] = ["show all data", "show data summary", "debug data"];

/// 요약에 보여줄 샘플 ID 수
const SAMPLE_ID_RECORDS: usize = 5;

/// 요약 요청 여부 (대소문자 무시, 정확히 일치)
pub fn is_summary_request(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    SUMMARY_REQUESTS.contains(&text.as_str())
}

/// 세션 상태
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub file_count: usize,
    pub failed_file_count: usize,
    pub record_count: usize,
    /// 벡터 검색 사용 가능 여부
    pub vector_search: bool,
    pub indexed_count: usize,
    pub embedder: Option<String>,
    pub generator: Option<String>,
    pub history_len: usize,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

// ============================================================================
// RagSession
// ============================================================================

/// 스프레드시트 RAG 세션
pub struct RagSession {
    config: AppConfig,
    store: RecordStore,
    records: Vec<StoredRecord>,
    reports: Vec<FileReport>,
    retriever: Option<Retriever>,
    generator: Option<Box<dyn GenerationProvider>>,
    /// 벡터 인덱스가 현재 레코드와 일치하는지
    vector_ready: bool,
    history: Vec<ChatTurn>,
}

impl RagSession {
    /// 설정으로 세션 열기
    ///
    /// 저장된 레코드를 불러오고, API 키가 있으면 Gemini + LanceDB를 연결합니다.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let store = RecordStore::open(&config.records_db_path())?;
        let (retriever, generator) = build_providers(&config).await?;
        Self::with_components(config, store, retriever, generator).await
    }

    /// 구성 요소를 직접 지정하여 열기
    pub async fn with_components(
        config: AppConfig,
        store: RecordStore,
        retriever: Option<Retriever>,
        generator: Option<Box<dyn GenerationProvider>>,
    ) -> Result<Self> {
        let records = store.load_records()?;
        let reports = store.list_reports()?;

        let mut session = Self {
            config,
            store,
            records,
            reports,
            retriever,
            generator,
            vector_ready: false,
            history: Vec::new(),
        };

        if !session.records.is_empty() {
            tracing::info!(
                "Restored {} records from {} files",
                session.records.len(),
                session.reports.len()
            );
        }

        session.restore_index().await;
        Ok(session)
    }

    /// 저장된 벡터 인덱스 복원
    ///
    /// 인덱스의 레코드 ID 집합이 현재 레코드와 같을 때만 재사용하고,
    /// 다르면 재구축합니다.
    async fn restore_index(&mut self) {
        self.vector_ready = false;
        let Some(retriever) = &self.retriever else {
            return;
        };

        if !self.records.is_empty() {
            match retriever.covers(&self.records).await {
                Ok(true) => {
                    tracing::debug!("Reusing vector index with {} entries", self.records.len());
                    self.vector_ready = true;
                    return;
                }
                Ok(false) => tracing::info!("Vector index is out of date, rebuilding"),
                Err(e) => tracing::warn!("Failed to read vector index: {:#}", e),
            }
        }

        self.rebuild_index().await;
    }

    /// 벡터 인덱스 재구축 (실패 시 키워드 검색으로 전환)
    async fn rebuild_index(&mut self) {
        self.vector_ready = false;
        let Some(retriever) = &self.retriever else {
            return;
        };

        if self.records.is_empty() {
            if let Err(e) = retriever.clear().await {
                tracing::warn!("Failed to clear vector index: {:#}", e);
            }
            return;
        }

        match retriever.index(&self.records).await {
            Ok(_) => self.vector_ready = true,
            Err(e) => {
                tracing::error!("Error building vector index: {:#}", e);
                tracing::warn!("Falling back to keyword search");
            }
        }
    }

    // ========================================================================
    // File Processing
    // ========================================================================

    /// 파일 처리
    ///
    /// 입력 순서대로 `file_1`, `file_2`, ... ID를 부여하고 기존 데이터를
    /// 새 결과로 교체합니다. 파일별 실패는 보고서에 기록되고 나머지 처리를
    /// 막지 않습니다. 저장에 실패하면 이전 데이터가 그대로 유지됩니다.
    pub async fn process_files(&mut self, paths: &[PathBuf]) -> Result<Vec<FileReport>> {
        let inputs = paths.to_vec();
        let loads = tokio::task::spawn_blocking(move || {
            inputs
                .iter()
                .enumerate()
                .map(|(i, path)| parse_file(path, &format!("file_{}", i + 1)))
                .collect::<Vec<_>>()
        })
        .await
        .context("File processing task failed")?;

        self.store
            .replace_all(&loads)
            .context("Failed to store processed files")?;

        self.reports = loads.into_iter().map(|(report, _)| report).collect();
        self.records = self.store.load_records()?;
        tracing::info!("Total records loaded: {}", self.records.len());

        self.rebuild_index().await;
        Ok(self.reports.clone())
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// 질문에 답하고 대화 기록에 추가
    pub async fn query(&mut self, question: &str) -> Answer {
        let answer = self.answer(question).await;

        self.history.push(ChatTurn {
            role: ChatRole::User,
            content: question.to_string(),
        });
        self.history.push(ChatTurn {
            role: ChatRole::Assistant,
            content: answer.text.clone(),
        });

        answer
    }

    /// 질문에 답하기 (기록 없음)
    pub async fn answer(&self, question: &str) -> Answer {
        if self.records.is_empty() {
            return Answer::no_data();
        }

        match QueryIntent::parse(question) {
            QueryIntent::Lookup { record_id, name } => {
                answer_lookup(&self.records, question, &record_id, name.as_deref())
            }
            QueryIntent::Search => self.answer_search(question).await,
        }
    }

    async fn answer_search(&self, question: &str) -> Answer {
        let contexts = self.retrieve(question).await;
        if contexts.is_empty() {
            return Answer::no_match();
        }

        let texts: Vec<String> = contexts.iter().map(|c| c.content.clone()).collect();

        if let Some(generator) = &self.generator {
            let prompt = build_prompt(question, &texts, &self.history);
            match generator.generate(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Answer::generated(text, collect_sources(&texts));
                }
                Ok(_) => tracing::warn!("{} returned an empty answer", generator.name()),
                Err(e) => tracing::error!("Generation error: {:#}", e),
            }
        }

        // 키워드 폴백은 가장 높은 점수의 레코드 하나만 보여줌
        let shown = match contexts[0].method {
            SearchMethod::Vector => &texts[..],
            SearchMethod::Keyword => &texts[..1],
        };
        Answer::retrieved(shown, collect_sources(shown))
    }

    /// 관련 레코드 검색
    async fn retrieve(&self, question: &str) -> Vec<RetrievedContext> {
        let limit = self.config.retrieval.search_limit;

        if let (true, Some(retriever)) = (self.vector_ready, &self.retriever) {
            match retriever.search(question, limit).await {
                Ok(contexts) => return contexts,
                Err(e) => tracing::error!("Vector search error: {:#}", e),
            }
        }

        keyword_contexts(&self.records, question, limit)
    }

    // ========================================================================
    // Summary / State
    // ========================================================================

    /// 로드된 데이터 요약
    pub fn data_summary(&self) -> String {
        if self.records.is_empty() {
            return "No data loaded.".to_string();
        }

        let mut summary = format!("**Total Records Loaded: {}**\n\n", self.records.len());

        // 파일 로드 순서로 그룹화
        let mut groups: Vec<(&str, Vec<&StoredRecord>)> = Vec::new();
        for stored in &self.records {
            match groups.iter_mut().find(|(id, _)| *id == stored.record.file_id) {
                Some((_, group)) => group.push(stored),
                None => groups.push((stored.record.file_id.as_str(), vec![stored])),
            }
        }

        for (_, group) in &groups {
            let first = &group[0].record;
            summary.push_str(&format!(
                "**File: {}** ({} records)\n",
                first.filename,
                group.len()
            ));
            summary.push_str(&format!("Columns: {}\n", first.columns().join(", ")));

            let sample_ids: Vec<&str> = group
                .iter()
                .take(SAMPLE_ID_RECORDS)
                .filter_map(|stored| {
                    stored
                        .record
                        .fields
                        .iter()
                        .map(|(_, value)| value.trim())
                        .find(|value| value.len() >= 4 && value.chars().all(|c| c.is_ascii_digit()))
                })
                .collect();

            if !sample_ids.is_empty() {
                summary.push_str(&format!("Sample IDs: {}\n", sample_ids.join(", ")));
            }

            summary.push('\n');
        }

        summary
    }

    pub fn reports(&self) -> &[FileReport] {
        &self.reports
    }

    pub fn records(&self) -> &[StoredRecord] {
        &self.records
    }

    /// 저장소에서 레코드 조회
    pub fn get_record(&self, id: i64) -> Result<Option<StoredRecord>> {
        self.store.get_record(id)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 벡터 검색 사용 가능 여부
    pub fn vector_search_enabled(&self) -> bool {
        self.vector_ready
    }

    /// 대화 기록만 초기화
    pub fn reset_chat(&mut self) {
        self.history.clear();
    }

    /// 모든 데이터와 대화 기록 삭제
    pub async fn clear_all(&mut self) -> Result<()> {
        self.store.clear()?;
        self.records.clear();
        self.reports.clear();
        self.history.clear();
        self.rebuild_index().await;
        tracing::info!("All data cleared");
        Ok(())
    }

    /// API 키 변경 (프로바이더 재연결 + 인덱스 재구축)
    pub async fn set_api_key(&mut self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            anyhow::bail!("API key must not be empty");
        }

        self.config.api_key = Some(api_key.to_string());
        let (retriever, generator) = build_providers(&self.config).await?;
        self.retriever = retriever;
        self.generator = generator;
        self.rebuild_index().await;
        tracing::info!("API key updated");
        Ok(())
    }

    /// 세션 상태
    pub async fn status(&self) -> Result<SessionStatus> {
        let indexed_count = match &self.retriever {
            Some(retriever) => retriever.count().await?,
            None => 0,
        };
        let stats = self.store.stats()?;

        Ok(SessionStatus {
            file_count: stats.file_count,
            failed_file_count: stats.failed_file_count,
            record_count: stats.record_count,
            db_path: stats.db_path,
            vector_search: self.vector_ready,
            indexed_count,
            embedder: self.retriever.as_ref().map(|r| r.embedder_name().to_string()),
            generator: self.generator.as_ref().map(|g| g.name().to_string()),
            history_len: self.history.len(),
            data_dir: self.config.data_dir.clone(),
        })
    }
}

/// 파일 하나를 읽어 보고서와 레코드로 변환
fn parse_file(path: &Path, file_id: &str) -> (FileReport, Vec<Record>) {
    match process_sheet(path, file_id) {
        Ok((summary, records)) => {
            tracing::info!(
                "Processed {}: {} records (header at row {})",
                summary.filename,
                summary.row_count,
                summary.header_row + 1
            );
            (FileReport::Success(summary), records)
        }
        Err(e) => {
            tracing::error!("Error processing {:?}: {}", path, e);
            let report = FileReport::Error {
                file_id: file_id.to_string(),
                filename: file_name(path),
                error: e.to_string(),
            };
            (report, vec![])
        }
    }
}

/// API 키가 있으면 Gemini 임베딩 + LanceDB 검색기와 생성기를 만듦
async fn build_providers(
    config: &AppConfig,
) -> Result<(Option<Retriever>, Option<Box<dyn GenerationProvider>>)> {
    let Some(api_key) = config.api_key.clone() else {
        tracing::warn!("GEMINI_API_KEY not set. Vector search and answer generation disabled");
        return Ok((None, None));
    };

    let dimension = config.retrieval.embedding_dimension;
    let embedder = GeminiEmbedding::with_dimension(api_key.clone(), dimension)?;
    let vectors =
        LanceVectorStore::open_with_dimension(&config.vectors_path(), dimension as i32).await?;
    let retriever = Retriever::new(Box::new(vectors), Box::new(embedder));

    let generator: Option<Box<dyn GenerationProvider>> = if config.generation.enabled {
        let settings = &config.generation;
        Some(Box::new(GeminiGenerator::new(
            api_key,
            &settings.model,
            settings.temperature,
        )?))
    } else {
        None
    };

    Ok((Some(retriever), generator))
}

// ============================================================================
// Tests
// ============================================================================
