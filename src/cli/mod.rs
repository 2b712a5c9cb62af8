//! CLI 모듈
//!
//! excel-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::collector::{CollectionStats, CollectorConfig, SheetCollector};
use crate::config::AppConfig;
use crate::query::Answer;
use crate::session::{is_summary_request, RagSession};
use crate::spreadsheet::FileReport;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "excel-rag")]
#[command(version, about = "엑셀/CSV 스프레드시트 질의응답 RAG 시스템", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (기본: ./excel-rag.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 데이터 디렉토리 (기본: ~/.excel-rag)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 스프레드시트 파일 처리 (기존 데이터는 교체됨)
    Load {
        /// 처리할 파일 경로
        paths: Vec<PathBuf>,

        /// 스프레드시트를 찾을 폴더 (파일을 지정하지 않으면 현재 폴더)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 하위 폴더까지 탐색
        #[arg(short, long)]
        recursive: bool,
    },

    /// 질문 하나에 답변
    Ask {
        /// 질문 (예: "What is the net pay of 10234?")
        question: String,
    },

    /// 대화형 질의응답
    Chat,

    /// 로드된 데이터 요약
    Summary,

    /// 처리된 파일 목록
    Files,

    /// HTTP API 서버 실행
    Serve {
        /// 바인드 호스트
        #[arg(long)]
        host: Option<String>,

        /// 포트 (기본: 8501)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 모든 데이터 삭제
    Reset,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.data_dir)?;

    match cli.command {
        Commands::Load {
            paths,
            dir,
            recursive,
        } => cmd_load(config, paths, dir, recursive).await,
        Commands::Ask { question } => cmd_ask(config, &question).await,
        Commands::Chat => cmd_chat(config).await,
        Commands::Summary => cmd_summary(config).await,
        Commands::Files => cmd_files(config).await,
        Commands::Serve { host, port } => cmd_serve(config, host, port).await,
        Commands::Reset => cmd_reset(config).await,
        Commands::Status => cmd_status(config).await,
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<AppConfig> {
    let mut config = AppConfig::load(path).context("설정 로드 실패")?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

async fn open_session(config: AppConfig) -> Result<RagSession> {
    RagSession::open(config).await.context("세션 열기 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 파일 처리 명령어 (load)
///
/// 파일을 직접 지정하거나 폴더에서 스프레드시트를 찾아 처리합니다.
async fn cmd_load(
    config: AppConfig,
    paths: Vec<PathBuf>,
    dir: Option<PathBuf>,
    recursive: bool,
) -> Result<()> {
    let paths = if paths.is_empty() {
        let dir = dir.unwrap_or_else(|| PathBuf::from("."));
        println!("[*] 폴더 스캔 중: {}", dir.display());

        let collector = SheetCollector::new(CollectorConfig {
            recursive,
            ..CollectorConfig::default()
        });
        let files = collector
            .collect_directory(&dir)
            .context("폴더 스캔 실패")?;

        if files.is_empty() {
            bail!(
                "{}에서 스프레드시트 파일(.xlsx, .xls, .xlsm, .ods, .csv)을 찾지 못했습니다",
                dir.display()
            );
        }

        let stats = CollectionStats::from_files(&files);
        println!(
            "[*] {} 개 파일 발견 ({}, {})",
            stats.total_files,
            stats.format_breakdown(),
            format_bytes(stats.total_size)
        );

        files.into_iter().map(|f| f.path).collect()
    } else {
        paths
    };

    let mut session = open_session(config).await?;
    println!("[*] {} 개 파일 처리 중...\n", paths.len());

    let reports = session
        .process_files(&paths)
        .await
        .context("파일 처리 실패")?;

    print_reports(&reports);

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    println!();
    println!(
        "[OK] 총 {} 개 레코드 로드 (성공 {} / 실패 {})",
        session.record_count(),
        reports.len() - failed,
        failed
    );

    if session.vector_search_enabled() {
        println!("[OK] 벡터 인덱스 구축 완료");
    } else {
        println!("[!] 벡터 검색 비활성화 - 키워드 검색을 사용합니다");
    }

    println!("    'excel-rag summary'로 전체 데이터 요약을 볼 수 있습니다.");
    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(config: AppConfig, question: &str) -> Result<()> {
    let mut session = open_session(config).await?;

    if is_summary_request(question) {
        println!("{}", session.data_summary());
        return Ok(());
    }

    let answer = session.query(question).await;
    print_answer(&answer);
    Ok(())
}

/// 대화형 명령어 (chat)
///
/// `exit`/`quit`로 종료, `/reset`으로 대화 초기화, `/key <KEY>`로 API 키 변경.
async fn cmd_chat(config: AppConfig) -> Result<()> {
    let mut session = open_session(config).await?;

    println!("excel-rag chat ({} 개 레코드 로드됨)", session.record_count());
    println!("    종료: exit | 대화 초기화: /reset | 데이터 요약: show all data\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                session.reset_chat();
                println!("[OK] 대화 기록을 초기화했습니다.\n");
                continue;
            }
            _ => {}
        }

        if let Some(key) = input.strip_prefix("/key ") {
            match session.set_api_key(key).await {
                Ok(()) => println!("[OK] API 키가 변경되었습니다.\n"),
                Err(e) => println!("[!] API 키 변경 실패: {:#}\n", e),
            }
            continue;
        }

        if is_summary_request(input) {
            println!("\n{}", session.data_summary());
            continue;
        }

        let answer = session.query(input).await;
        print_answer(&answer);
    }

    Ok(())
}

/// 요약 명령어 (summary)
async fn cmd_summary(config: AppConfig) -> Result<()> {
    let session = open_session(config).await?;
    println!("{}", session.data_summary());
    Ok(())
}

/// 파일 목록 명령어 (files)
async fn cmd_files(config: AppConfig) -> Result<()> {
    let session = open_session(config).await?;

    if session.reports().is_empty() {
        println!("[!] 처리된 파일이 없습니다. 'excel-rag load'로 파일을 처리하세요.");
        return Ok(());
    }

    println!("[OK] 처리된 파일 ({} 개):\n", session.reports().len());
    print_reports(session.reports());
    Ok(())
}

/// 서버 명령어 (serve)
async fn cmd_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!("[*] 서버 시작: http://{}", config.bind_address());
    crate::server::serve(config).await
}

/// 초기화 명령어 (reset)
async fn cmd_reset(config: AppConfig) -> Result<()> {
    let mut session = open_session(config).await?;
    session.clear_all().await.context("데이터 삭제 실패")?;
    println!("[OK] 모든 데이터를 삭제했습니다.");
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: AppConfig) -> Result<()> {
    println!("excel-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    if config.has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (키워드 검색만 사용)");
        println!("    설정: .env 파일에 GEMINI_API_KEY=your-key");
    }

    let session = open_session(config).await?;
    let status = session.status().await?;

    println!("[*] 레코드 DB: {}", status.db_path.display());
    println!(
        "[OK] 파일: {} 개 (실패 {}) | 레코드: {} 개",
        status.file_count, status.failed_file_count, status.record_count
    );

    if status.vector_search {
        println!(
            "[OK] 벡터 인덱스: {} 개 ({})",
            status.indexed_count,
            status.embedder.as_deref().unwrap_or("-")
        );
    } else {
        println!("[!] 벡터 검색: 비활성화");
    }

    match status.generator {
        Some(model) => println!("[OK] 답변 생성 모델: {}", model),
        None => println!("[!] 답변 생성: 비활성화 (검색된 레코드를 그대로 표시)"),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_reports(reports: &[FileReport]) {
    for report in reports {
        println!("  {}", report_line(report));
    }
}

/// 파일 보고서 한 줄 표시
fn report_line(report: &FileReport) -> String {
    match report {
        FileReport::Success(summary) => format!(
            "[OK] {} ({}): {} 행 x {} 열, 헤더 {}행",
            summary.filename,
            summary.file_id,
            summary.row_count,
            summary.column_count,
            summary.header_row + 1
        ),
        FileReport::Error {
            file_id,
            filename,
            error,
        } => format!("[!] {} ({}): {}", filename, file_id, truncate_text(error, 120)),
    }
}

fn print_answer(answer: &Answer) {
    println!("\n{}\n", answer.text);
    if !answer.sources.is_empty() {
        println!("    출처: {}\n", answer.sources.join(", "));
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::SheetSummary;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_report_line() {
        let ok = FileReport::Success(SheetSummary {
            file_id: "file_1".to_string(),
            filename: "agents.xlsx".to_string(),
            columns: vec!["Sl".to_string(), "Name".to_string()],
            header_row: 2,
            rows_deleted_above_header: 2,
            row_count: 40,
            column_count: 2,
        });
        assert_eq!(report_line(&ok), "[OK] agents.xlsx (file_1): 40 행 x 2 열, 헤더 3행");

        let err = FileReport::Error {
            file_id: "file_2".to_string(),
            filename: "broken.xlsx".to_string(),
            error: "Could not detect header row in broken.xlsx".to_string(),
        };
        assert_eq!(
            report_line(&err),
            "[!] broken.xlsx (file_2): Could not detect header row in broken.xlsx"
        );
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "excel-rag",
            "ask",
            "net pay of 10234?",
            "--data-dir",
            "/tmp/rag",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/rag")));
        assert!(matches!(cli.command, Commands::Ask { ref question } if question == "net pay of 10234?"));
    }

    #[test]
    fn test_cli_load_args() {
        let cli = Cli::try_parse_from(["excel-rag", "load", "--dir", "sheets", "-r"]).unwrap();
        match cli.command {
            Commands::Load {
                paths,
                dir,
                recursive,
            } => {
                assert!(paths.is_empty());
                assert_eq!(dir, Some(PathBuf::from("sheets")));
                assert!(recursive);
            }
            _ => panic!("expected load command"),
        }
    }
}
