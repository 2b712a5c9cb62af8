//! 답변 생성 모듈 - Gemini generateContent
//!
//! 검색된 레코드를 컨텍스트로 넣어 자연어 답변을 생성합니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::embedding::{
    api_error, backoff_for, RateLimiter, MAX_RETRIES, RATE_LIMIT_RPM, RATE_LIMIT_WINDOW,
};

/// 기본 생성 모델
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// 프롬프트에 포함할 최근 대화 수
const HISTORY_TURNS: usize = 6;

// ============================================================================
// GenerationProvider Trait
// ============================================================================

/// 텍스트 생성 프로바이더 트레이트
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 프롬프트로 답변 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Chat History
// ============================================================================

/// 대화 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// 대화 한 턴
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

// ============================================================================
// Gemini Generator
// ============================================================================

/// Gemini 답변 생성기
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiGenerator {
    /// 새 생성기
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 모델 이름 (예: gemini-2.0-flash)
    /// * `temperature` - 샘플링 온도
    pub fn new(api_key: String, model: &str, temperature: f32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.trim_start_matches("models/").to_string(),
            temperature,
            max_output_tokens: 2048,
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
            ))),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let url = self.endpoint();
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let response = match self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send generation request: {}", e));
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(backoff_for(attempt)).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: GenerateResponse =
                    serde_json::from_str(&body).context("Failed to parse generation response")?;
                return parsed
                    .first_text()
                    .ok_or_else(|| anyhow::anyhow!("Gemini returned no text candidates"));
            }

            if status.as_u16() == 429 {
                let backoff = backoff_for(attempt);
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(anyhow::anyhow!("Rate limit exceeded (429)"));
                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                return Err(api_error(status, &body));
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Generation failed after {} retries", MAX_RETRIES)))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// 시스템 지시문
const SYSTEM_INSTRUCTIONS: &str = "You are a data assistant answering questions about spreadsheet records.
Rules:
1. Answer only from the records below. Do not invent values.
2. If the records do not contain the answer, say that the loaded data does not include it.
3. When you compute totals, averages or comparisons, show the numbers you used.
4. Mention the source file of every value you quote.";

/// RAG 프롬프트 구성
///
/// 지시문 → 최근 대화 → 번호 붙은 레코드 → 질문 순서입니다.
pub fn build_prompt(question: &str, contexts: &[String], history: &[ChatTurn]) -> String {
    let mut prompt = String::from(SYSTEM_INSTRUCTIONS);
    prompt.push_str("\n\n");

    let start = history.len().saturating_sub(HISTORY_TURNS);
    if start < history.len() {
        prompt.push_str("Conversation so far:\n");
        for turn in &history[start..] {
            let speaker = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str("Records:\n");
    for (i, context) in contexts.iter().enumerate() {
        prompt.push_str(&format!("[{}]\n{}\n\n", i + 1, context));
    }

    prompt.push_str(&format!("Question: {}\nAnswer:", question));
    prompt
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트를 이어붙임
    fn first_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        let text = text.trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    text: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_models_prefix() {
        let generator = GeminiGenerator::new("key".to_string(), "models/gemini-2.0-flash", 0.2).unwrap();
        assert_eq!(
            generator.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(generator.name(), "gemini-2.0-flash");
    }

    #[test]
    fn test_build_prompt_layout() {
        let history = vec![
            ChatTurn {
                role: ChatRole::User,
                content: "hi".to_string(),
            },
            ChatTurn {
                role: ChatRole::Assistant,
                content: "hello".to_string(),
            },
        ];
        let contexts = vec!["Record from a.csv:\nName: Rahim".to_string()];

        let prompt = build_prompt("Who is Rahim?", &contexts, &history);
        assert!(prompt.starts_with("You are a data assistant"));
        assert!(prompt.contains("User: hi\nAssistant: hello\n"));
        assert!(prompt.contains("[1]\nRecord from a.csv:\nName: Rahim"));
        assert!(prompt.ends_with("Question: Who is Rahim?\nAnswer:"));
    }

    #[test]
    fn test_build_prompt_limits_history() {
        let history: Vec<ChatTurn> = (0..10)
            .map(|i| ChatTurn {
                role: ChatRole::User,
                content: format!("turn {}", i),
            })
            .collect();

        let prompt = build_prompt("q", &[], &history);
        assert!(!prompt.contains("turn 3\n"));
        assert!(prompt.contains("turn 4\n"));
        assert!(prompt.contains("turn 9\n"));
    }

    #[test]
    fn test_build_prompt_without_history() {
        let prompt = build_prompt("q", &[], &[]);
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"The total "},{"text":"is 42."}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.first_text().as_deref(), Some("The total is 42."));

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(empty.first_text().is_none());
    }
}
