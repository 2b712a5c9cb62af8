//! 설정 - 기본값 → TOML 파일 → 환경 변수
//!
//! ```toml
//! data_dir = "/var/lib/excel-rag"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8501
//!
//! [retrieval]
//! search_limit = 3
//! embedding_dimension = 768
//!
//! [generation]
//! enabled = true
//! model = "gemini-2.0-flash"
//! temperature = 0.2
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::{DEFAULT_DIMENSION, SUPPORTED_DIMENSIONS};
use crate::generation::DEFAULT_MODEL;
use crate::knowledge::get_data_dir;

/// 작업 디렉토리에서 찾는 기본 설정 파일
pub const DEFAULT_CONFIG_FILE: &str = "excel-rag.toml";

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 8501;

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 검색할 레코드 수 (top-k)
    pub search_limit: usize,
    pub embedding_dimension: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_limit: 3,
            embedding_dimension: DEFAULT_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// false면 검색된 레코드 텍스트를 그대로 답변
    pub enabled: bool,
    pub model: String,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// 애플리케이션 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub server: ServerConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationSettings,
    /// Gemini API 키 (파일에는 저장하지 않음)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            server: ServerConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationSettings::default(),
            api_key: None,
        }
    }
}

impl AppConfig {
    /// 설정 로드
    ///
    /// `path`가 주어지면 그 파일을 반드시 읽고, 없으면 작업 디렉토리의
    /// `excel-rag.toml`을 있을 때만 읽습니다. 마지막으로 환경 변수를 적용합니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 읽기
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML")
    }

    /// 환경 변수 덮어쓰기
    ///
    /// `lookup`은 변수 이름으로 값을 찾는 함수입니다 (테스트에서 교체 가능).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_AI_API_KEY")) {
            self.api_key = Some(key);
        }

        if let Some(dir) = non_empty("EXCEL_RAG_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(port) = non_empty("EXCEL_RAG_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid EXCEL_RAG_PORT: {}", port),
            }
        }

        if let Some(model) = non_empty("GEMINI_MODEL") {
            self.generation.model = model;
        }
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.search_limit == 0 {
            anyhow::bail!("retrieval.search_limit must be at least 1");
        }
        if !SUPPORTED_DIMENSIONS.contains(&self.retrieval.embedding_dimension) {
            anyhow::bail!(
                "retrieval.embedding_dimension must be one of {:?}, got {}",
                SUPPORTED_DIMENSIONS,
                self.retrieval.embedding_dimension
            );
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            anyhow::bail!(
                "generation.temperature must be between 0.0 and 2.0, got {}",
                self.generation.temperature
            );
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// 레코드 DB 경로
    pub fn records_db_path(&self) -> PathBuf {
        self.data_dir.join("records.db")
    }

    /// 벡터 인덱스 경로
    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    /// 서버 바인드 주소
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
