//! Record Store - rusqlite 기반 레코드 저장소
//!
//! 처리된 파일 보고서와 레코드를 저장합니다. CLI 호출 사이에도
//! 마지막으로 로드한 데이터를 유지합니다.
//! 저장 위치: ~/.excel-rag/records.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use serde::Serialize;

use crate::spreadsheet::{FileReport, Record};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.excel-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".excel-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 저장된 레코드 (DB row id 포함)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub record: Record,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub file_count: usize,
    pub failed_file_count: usize,
    pub record_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// RecordStore
// ============================================================================

/// Record Store - 동기 레코드 저장소
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl RecordStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                file_id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                filename TEXT NOT NULL,
                report TEXT NOT NULL,
                processed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                row_index INTEGER NOT NULL,
                original_row INTEGER NOT NULL,
                fields TEXT NOT NULL,
                content TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_file_id ON records(file_id);
            "#,
        )
        .context("Failed to create schema")?;

        tracing::debug!("Record store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 모든 파일/레코드 삭제
    pub fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM records; DELETE FROM files;")
            .context("Failed to clear record store")?;
        Ok(())
    }

    /// 저장된 데이터를 새 로드 결과로 교체 (단일 트랜잭션)
    ///
    /// 파일 순서가 곧 보고서 순서입니다. 중간에 실패하면 롤백되어
    /// 이전 데이터가 그대로 남습니다.
    pub fn replace_all(&self, loads: &[(FileReport, Vec<Record>)]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        tx.execute_batch("DELETE FROM records; DELETE FROM files;")
            .context("Failed to clear record store")?;

        let mut total = 0;
        for (seq, (report, records)) in loads.iter().enumerate() {
            insert_report(&tx, seq, report)?;
            total += insert_records(&tx, records)?;
        }

        tx.commit().context("Failed to commit load")?;
        tracing::debug!("Stored {} files with {} records", loads.len(), total);
        Ok(total)
    }

    /// 파일 보고서 목록 (입력 순서)
    pub fn list_reports(&self) -> Result<Vec<FileReport>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT report FROM files ORDER BY seq ASC")?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut reports = Vec::new();
        for row in rows {
            let json = row.context("Failed to read file report row")?;
            let report = serde_json::from_str::<FileReport>(&json)
                .context("Failed to parse stored file report")?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// 전체 레코드 로드 (저장 순서)
    pub fn load_records(&self) -> Result<Vec<StoredRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_id, filename, row_index, original_row, fields
             FROM records ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], row_to_stored)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("Failed to read record row")?);
        }
        Ok(records)
    }

    /// ID로 레코드 조회
    pub fn get_record(&self, id: i64) -> Result<Option<StoredRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_id, filename, row_index, original_row, fields
             FROM records WHERE id = ?1",
        )?;

        stmt.query_row(params![id], row_to_stored)
            .optional()
            .context("Failed to read record")
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let reports = self.list_reports()?;
        let conn = self.lock()?;

        let record_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .context("Failed to count records")?;

        Ok(StoreStats {
            file_count: reports.len(),
            failed_file_count: reports.iter().filter(|r| !r.is_success()).count(),
            record_count: record_count as usize,
            db_path: self.db_path.clone(),
        })
    }
}

/// 파일 보고서 한 건 저장
fn insert_report(tx: &Transaction<'_>, seq: usize, report: &FileReport) -> Result<()> {
    let json = serde_json::to_string(report).context("Failed to serialize file report")?;

    tx.execute(
        "INSERT INTO files (file_id, seq, filename, report, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            report.file_id(),
            seq as i64,
            report.filename(),
            json,
            Utc::now().to_rfc3339()
        ],
    )
    .with_context(|| format!("Failed to insert file report {}", report.file_id()))?;

    Ok(())
}

/// 레코드 저장
fn insert_records(tx: &Transaction<'_>, records: &[Record]) -> Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT INTO records (file_id, filename, row_index, original_row, fields, content)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    for record in records {
        let fields = serde_json::to_string(&record.fields).context("Failed to serialize fields")?;
        stmt.execute(params![
            record.file_id,
            record.filename,
            record.row_index as i64,
            record.original_row as i64,
            fields,
            record.content(),
        ])
        .context("Failed to insert record")?;
    }

    Ok(records.len())
}

/// SELECT 결과 → StoredRecord
fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    let fields_json: String = row.get(5)?;
    let fields: Vec<(String, String)> = serde_json::from_str(&fields_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(StoredRecord {
        id: row.get(0)?,
        record: Record {
            file_id: row.get(1)?,
            filename: row.get(2)?,
            row_index: row.get::<_, i64>(3)? as usize,
            original_row: row.get::<_, i64>(4)? as usize,
            fields,
        },
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::SheetSummary;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn record(file_id: &str, row_index: usize, name: &str) -> Record {
        Record {
            file_id: file_id.to_string(),
            filename: format!("{}.csv", file_id),
            row_index,
            original_row: row_index + 1,
            fields: vec![
                ("Sl".to_string(), format!("{}", 10000 + row_index)),
                ("Name".to_string(), name.to_string()),
            ],
        }
    }

    fn success_report(file_id: &str) -> FileReport {
        FileReport::Success(SheetSummary {
            file_id: file_id.to_string(),
            filename: format!("{}.csv", file_id),
            columns: vec!["Sl".to_string(), "Name".to_string()],
            header_row: 0,
            rows_deleted_above_header: 0,
            row_count: 2,
            column_count: 2,
        })
    }

    fn error_report(file_id: &str) -> FileReport {
        FileReport::Error {
            file_id: file_id.to_string(),
            filename: "bad.xlsx".to_string(),
            error: "Could not detect header row in bad.xlsx".to_string(),
        }
    }

    #[test]
    fn test_replace_all_and_load_records() {
        let (_dir, store) = create_test_store();

        let total = store
            .replace_all(&[(
                success_report("file_1"),
                vec![record("file_1", 0, "Rahim"), record("file_1", 1, "Karim")],
            )])
            .unwrap();
        assert_eq!(total, 2);

        let loaded = store.load_records().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].record, record("file_1", 0, "Rahim"));
        assert!(loaded[0].id < loaded[1].id);
    }

    #[test]
    fn test_replace_all_replaces_previous_load() {
        let (_dir, store) = create_test_store();

        store
            .replace_all(&[(success_report("file_1"), vec![record("file_1", 0, "Rahim")])])
            .unwrap();
        let first_id = store.load_records().unwrap()[0].id;

        store
            .replace_all(&[(success_report("file_1"), vec![record("file_1", 0, "Nila")])])
            .unwrap();

        let loaded = store.load_records().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].record.get("Name"), Some("Nila"));
        // AUTOINCREMENT는 지운 id를 재사용하지 않음
        assert!(loaded[0].id > first_id);
    }

    #[test]
    fn test_failed_load_keeps_previous_data() {
        let (_dir, store) = create_test_store();

        store
            .replace_all(&[(success_report("file_1"), vec![record("file_1", 0, "Rahim")])])
            .unwrap();

        // 같은 file_id가 두 번 나오면 PRIMARY KEY 위반으로 실패
        let result = store.replace_all(&[
            (success_report("file_9"), vec![record("file_9", 0, "Karim")]),
            (error_report("file_9"), vec![]),
        ]);
        assert!(result.is_err());

        let loaded = store.load_records().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].record.get("Name"), Some("Rahim"));
        assert_eq!(store.list_reports().unwrap(), vec![success_report("file_1")]);
    }

    #[test]
    fn test_get_record() {
        let (_dir, store) = create_test_store();
        store
            .replace_all(&[(success_report("file_1"), vec![record("file_1", 0, "Rahim")])])
            .unwrap();
        let id = store.load_records().unwrap()[0].id;

        let found = store.get_record(id).unwrap().unwrap();
        assert_eq!(found.record.get("Name"), Some("Rahim"));
        assert!(store.get_record(9999).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_rows_are_errors() {
        let (_dir, store) = create_test_store();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO records (id, file_id, filename, row_index, original_row, fields, content)
                 VALUES (7, 'file_1', 'a.csv', 0, 1, 'not json', '')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO files (file_id, seq, filename, report, processed_at)
                 VALUES ('file_1', 0, 'a.csv', '{broken', '')",
                [],
            )
            .unwrap();
        }

        assert!(store.get_record(7).is_err());
        assert!(store.list_reports().is_err());
    }

    #[test]
    fn test_reports_keep_input_order() {
        let (_dir, store) = create_test_store();

        store
            .replace_all(&[
                (error_report("file_1"), vec![]),
                (success_report("file_2"), vec![record("file_2", 0, "Karim")]),
            ])
            .unwrap();

        let reports = store.list_reports().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].file_id(), "file_1");
        assert!(!reports[0].is_success());
        assert_eq!(reports[1], success_report("file_2"));
    }

    #[test]
    fn test_clear_and_stats() {
        let (_dir, store) = create_test_store();

        store
            .replace_all(&[
                (success_report("file_1"), vec![record("file_1", 0, "Rahim")]),
                (error_report("file_2"), vec![]),
            ])
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.failed_file_count, 1);
        assert_eq!(stats.record_count, 1);

        store.clear().unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.record_count, 0);
        assert!(store.load_records().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.db");

        {
            let store = RecordStore::open(&path).unwrap();
            store
                .replace_all(&[(success_report("file_1"), vec![record("file_1", 0, "Rahim")])])
                .unwrap();
        }

        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.load_records().unwrap().len(), 1);
    }
}
