//! 数据库存储模块
//!
//! 使用SQLite存储代理问答记录和知识入库历史

use crate::core::models::{Episode, IngestionRecord, IngestionStatus};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// 数据库管理器
pub struct Database {
    conn: Connection,
}

/// 固定精度的时间文本，保证按字符串排序即按时间排序
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl Database {
    /// 打开或创建数据库
    pub fn open(path: &Path) -> Result<Self> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_tables()?;
        Ok(db)
    }

    /// 内存数据库
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_tables()?;
        Ok(db)
    }

    /// 默认数据库路径
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("no", "oyna", "Oyna")
            .map(|d| d.data_dir().join("oyna.db"))
            .unwrap_or_else(|| PathBuf::from("oyna.db"))
    }

    /// 初始化表结构
    fn init_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- 问答记录表
            CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                asked_at TEXT NOT NULL,
                query TEXT NOT NULL,
                plan_json TEXT NOT NULL,
                result_json TEXT NOT NULL
            );

            -- 入库历史表
            CREATE TABLE IF NOT EXISTS ingestions (
                id TEXT PRIMARY KEY,
                processed_at TEXT NOT NULL,
                source_file TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                knowledge_file TEXT,
                status TEXT NOT NULL,
                error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_episodes_asked ON episodes(asked_at DESC);
            CREATE INDEX IF NOT EXISTS idx_ingestions_hash ON ingestions(content_hash);
            "#,
        )?;
        Ok(())
    }

    /// 保存问答记录
    pub fn save_episode(&self, episode: &Episode) -> Result<()> {
        let plan_json = serde_json::to_string(&episode.plan)?;
        let result_json = serde_json::to_string(&episode.result)?;

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO episodes (id, asked_at, query, plan_json, result_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                episode.id,
                format_time(&episode.asked_at),
                episode.query,
                plan_json,
                result_json,
            ],
        )?;
        Ok(())
    }

    /// 加载最近的问答记录
    pub fn load_recent_episodes(&self, limit: usize) -> Result<Vec<Episode>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, asked_at, query, plan_json, result_json
            FROM episodes
            ORDER BY asked_at DESC
            LIMIT ?1
            "#,
        )?;

        let episodes = stmt.query_map(params![limit as i64], |row| {
            let asked_at: String = row.get(1)?;
            let plan_json: String = row.get(3)?;
            let result_json: String = row.get(4)?;

            Ok(Episode {
                id: row.get(0)?,
                asked_at: parse_time(&asked_at),
                query: row.get(2)?,
                plan: serde_json::from_str(&plan_json).unwrap_or_default(),
                result: serde_json::from_str(&result_json).unwrap_or_default(),
            })
        })?;

        episodes.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// 保存入库记录
    pub fn save_ingestion(&self, record: &IngestionRecord) -> Result<()> {
        let status = format!("{:?}", record.status);

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO ingestions
            (id, processed_at, source_file, content_hash, knowledge_file, status, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id,
                format_time(&record.processed_at),
                record.source_file.to_string_lossy().to_string(),
                record.content_hash,
                record
                    .knowledge_file
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                status,
                record.error,
            ],
        )?;
        Ok(())
    }

    /// 加载最近的入库记录
    pub fn load_recent_ingestions(&self, limit: usize) -> Result<Vec<IngestionRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, processed_at, source_file, content_hash, knowledge_file, status, error
            FROM ingestions
            ORDER BY processed_at DESC
            LIMIT ?1
            "#,
        )?;

        let records = stmt.query_map(params![limit as i64], |row| {
            let processed_at: String = row.get(1)?;
            let source_file: String = row.get(2)?;
            let knowledge_file: Option<String> = row.get(4)?;
            let status: String = row.get(5)?;

            Ok(IngestionRecord {
                id: row.get(0)?,
                processed_at: parse_time(&processed_at),
                source_file: PathBuf::from(source_file),
                content_hash: row.get(3)?,
                knowledge_file: knowledge_file.map(PathBuf::from),
                status: match status.as_str() {
                    "Converted" => IngestionStatus::Converted,
                    "RawFallback" => IngestionStatus::RawFallback,
                    _ => IngestionStatus::Failed,
                },
                error: row.get(6)?,
            })
        })?;

        records.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::PlanStep;
    use chrono::Duration;
    use serde_json::{json, Map};
    use tempfile::tempdir;

    #[test]
    fn test_database_init() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("data/test.db");

        let _db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_episodes_newest_first() {
        let db = Database::open_in_memory().unwrap();

        let mut older = Episode::new(
            "pumpe?".to_string(),
            vec![PlanStep::new("home_assistant", "get_entity_state", Map::new())],
            json!("[MOCK] HA state for switch.pressure_pump_contactor"),
        );
        older.asked_at = Utc::now() - Duration::minutes(5);
        let newer = Episode::new("vannforbruk?".to_string(), Vec::new(), json!(["a", "b"]));

        db.save_episode(&older).unwrap();
        db.save_episode(&newer).unwrap();

        let episodes = db.load_recent_episodes(10).unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].query, "vannforbruk?");
        assert_eq!(episodes[0].result, json!(["a", "b"]));
        assert_eq!(episodes[1].plan[0].tool, "home_assistant");

        assert_eq!(db.load_recent_episodes(1).unwrap().len(), 1);
    }

    #[test]
    fn test_ingestions() {
        let db = Database::open_in_memory().unwrap();
        let record = IngestionRecord {
            id: "1".to_string(),
            processed_at: Utc::now(),
            source_file: PathBuf::from("ai-input/raw/a.pdf"),
            content_hash: "abc".to_string(),
            knowledge_file: Some(PathBuf::from("knowledge/a.json")),
            status: IngestionStatus::RawFallback,
            error: None,
        };
        db.save_ingestion(&record).unwrap();
        db.save_ingestion(&IngestionRecord {
            id: "2".to_string(),
            content_hash: "def".to_string(),
            knowledge_file: None,
            status: IngestionStatus::Failed,
            error: Some("timeout".to_string()),
            ..record.clone()
        })
        .unwrap();

        let loaded = db.load_recent_ingestions(10).unwrap();
        assert_eq!(loaded.len(), 2);
        let failed = loaded.iter().find(|r| r.id == "2").unwrap();
        assert_eq!(failed.status, IngestionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("timeout"));
    }
}
