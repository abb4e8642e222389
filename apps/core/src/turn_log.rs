//! Conversation log.
//!
//! Every answered turn becomes a [`TurnRecord`]. The assistant hands records
//! to a [`TurnSink`]; [`SqliteTurnLog`] persists them together with per-session
//! and per-day aggregates that the office reviews.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::brain::Language;
use crate::error::AppError;

const DAY_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// One logged exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub input_text: String,
    pub detected_language: Language,
    pub matched_topic: Option<String>,
    pub confidence: f32,
    pub needs_human: bool,
    pub response_text: String,
}

/// Destination for turn records. Failures are reported, never fatal to a reply.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn log_turn(&self, record: &TurnRecord) -> Result<(), AppError>;
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTurnSink;

#[async_trait]
impl TurnSink for NullTurnSink {
    async fn log_turn(&self, _record: &TurnRecord) -> Result<(), AppError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    pub languages_used: Vec<String>,
    /// Conversation rows still present (older rows may have been pruned)
    pub actual_message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ConversationRow {
    pub id: i64,
    pub session_id: String,
    pub timestamp: String,
    pub user_message: String,
    pub bot_response: String,
    pub language: String,
    pub confidence: f64,
    pub category: Option<String>,
    pub needs_human: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: String,
    pub total_conversations: i64,
    pub total_sessions: i64,
    pub languages_breakdown: BTreeMap<String, i64>,
    pub categories_breakdown: BTreeMap<String, i64>,
    pub avg_confidence: f64,
    pub human_handoff_count: i64,
}

#[derive(FromRow)]
struct SessionRow {
    session_id: String,
    created_at: String,
    updated_at: String,
    message_count: i64,
    languages_used: Json<Vec<String>>,
    actual_message_count: i64,
}

#[derive(FromRow)]
struct DailyStatsRow {
    date: String,
    total_conversations: i64,
    total_sessions: i64,
    languages_breakdown: Json<BTreeMap<String, i64>>,
    categories_breakdown: Json<BTreeMap<String, i64>>,
    avg_confidence: f64,
    human_handoff_count: i64,
}

impl From<DailyStatsRow> for DailyStats {
    fn from(row: DailyStatsRow) -> Self {
        Self {
            date: row.date,
            total_conversations: row.total_conversations,
            total_sessions: row.total_sessions,
            languages_breakdown: row.languages_breakdown.0,
            categories_breakdown: row.categories_breakdown.0,
            avg_confidence: row.avg_confidence,
            human_handoff_count: row.human_handoff_count,
        }
    }
}

/// SQLite-backed conversation log.
///
/// Writes read the aggregates they update, so they run one at a time;
/// readers share the pool freely.
#[derive(Clone)]
pub struct SqliteTurnLog {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteTurnLog {
    /// Opens (or creates) the database at `url` and applies the schema.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        info!("Opening conversation log at: {}", url);

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Wraps an existing pool and applies the schema.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                languages_used TEXT NOT NULL DEFAULT '[]'
            );
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                day TEXT NOT NULL,
                user_message TEXT NOT NULL,
                bot_response TEXT NOT NULL,
                language TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0.0,
                category TEXT,
                needs_human BOOLEAN NOT NULL DEFAULT FALSE,
                FOREIGN KEY(session_id) REFERENCES sessions(session_id)
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_day ON conversations(day);
            CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations(session_id);
            CREATE TABLE IF NOT EXISTS daily_stats (
                date TEXT PRIMARY KEY,
                total_conversations INTEGER NOT NULL DEFAULT 0,
                total_sessions INTEGER NOT NULL DEFAULT 0,
                languages_breakdown TEXT NOT NULL DEFAULT '{}',
                categories_breakdown TEXT NOT NULL DEFAULT '{}',
                avg_confidence REAL NOT NULL DEFAULT 0.0,
                human_handoff_count INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn write_record(&self, record: &TurnRecord) -> Result<(), AppError> {
        let timestamp = record.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let day = record.timestamp.format(DAY_FORMAT).to_string();
        let language = record.detected_language.code();

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing: Option<(Json<Vec<String>>,)> =
            sqlx::query_as("SELECT languages_used FROM sessions WHERE session_id = ?")
                .bind(&record.session_id)
                .fetch_optional(&mut *tx)
                .await?;

        let mut languages = existing.map(|(Json(l),)| l).unwrap_or_default();
        if !languages.iter().any(|l| l == language) {
            languages.push(language.to_string());
        }

        sqlx::query(
            r#"
            INSERT INTO sessions
                (session_id, created_at, updated_at, message_count, languages_used)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                updated_at = excluded.updated_at,
                message_count = message_count + 1,
                languages_used = excluded.languages_used
            "#,
        )
        .bind(&record.session_id)
        .bind(&timestamp)
        .bind(&timestamp)
        .bind(Json(languages))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO conversations
                (session_id, timestamp, day, user_message, bot_response,
                 language, confidence, category, needs_human)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.session_id)
        .bind(&timestamp)
        .bind(&day)
        .bind(&record.input_text)
        .bind(&record.response_text)
        .bind(language)
        .bind(record.confidence as f64)
        .bind(&record.matched_topic)
        .bind(record.needs_human)
        .execute(&mut *tx)
        .await?;

        let (total_sessions,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT session_id) FROM conversations WHERE day = ?")
                .bind(&day)
                .fetch_one(&mut *tx)
                .await?;

        let current: Option<DailyStatsRow> =
            sqlx::query_as("SELECT * FROM daily_stats WHERE date = ?")
                .bind(&day)
                .fetch_optional(&mut *tx)
                .await?;

        let mut stats = current.map(DailyStats::from).unwrap_or_else(|| DailyStats {
            date: day.clone(),
            total_conversations: 0,
            total_sessions: 0,
            languages_breakdown: BTreeMap::new(),
            categories_breakdown: BTreeMap::new(),
            avg_confidence: 0.0,
            human_handoff_count: 0,
        });

        let previous_total = stats.total_conversations as f64;
        stats.total_conversations += 1;
        stats.total_sessions = total_sessions;
        stats.avg_confidence = (stats.avg_confidence * previous_total + record.confidence as f64)
            / stats.total_conversations as f64;
        *stats.languages_breakdown.entry(language.to_string()).or_insert(0) += 1;
        if let Some(topic) = &record.matched_topic {
            *stats.categories_breakdown.entry(topic.clone()).or_insert(0) += 1;
        }
        if record.needs_human {
            stats.human_handoff_count += 1;
        }

        sqlx::query(
            r#"
            INSERT INTO daily_stats
                (date, total_conversations, total_sessions, languages_breakdown,
                 categories_breakdown, avg_confidence, human_handoff_count)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(date) DO UPDATE SET
                total_conversations = excluded.total_conversations,
                total_sessions = excluded.total_sessions,
                languages_breakdown = excluded.languages_breakdown,
                categories_breakdown = excluded.categories_breakdown,
                avg_confidence = excluded.avg_confidence,
                human_handoff_count = excluded.human_handoff_count
            "#,
        )
        .bind(&stats.date)
        .bind(stats.total_conversations)
        .bind(stats.total_sessions)
        .bind(Json(&stats.languages_breakdown))
        .bind(Json(&stats.categories_breakdown))
        .bind(stats.avg_confidence)
        .bind(stats.human_handoff_count)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn session_info(&self, session_id: &str) -> Result<Option<SessionInfo>, AppError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT s.session_id, s.created_at, s.updated_at, s.message_count, s.languages_used,
                   COUNT(c.id) AS actual_message_count
            FROM sessions s
            LEFT JOIN conversations c ON s.session_id = c.session_id
            WHERE s.session_id = ?
            GROUP BY s.session_id
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| SessionInfo {
            session_id: r.session_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            message_count: r.message_count,
            languages_used: r.languages_used.0,
            actual_message_count: r.actual_message_count,
        }))
    }

    /// Oldest first.
    pub async fn conversation_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<ConversationRow>, AppError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, session_id, timestamp, user_message, bot_response, language,
                   confidence, category, needs_human
            FROM conversations
            WHERE session_id = ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Newest first.
    pub async fn daily_logs(&self, date: NaiveDate) -> Result<Vec<ConversationRow>, AppError> {
        self.logs_between(date, date).await
    }

    pub async fn daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>, AppError> {
        let row: Option<DailyStatsRow> = sqlx::query_as("SELECT * FROM daily_stats WHERE date = ?")
            .bind(date.format(DAY_FORMAT).to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(DailyStats::from))
    }

    /// Pretty-printed JSON array of every conversation between `start` and `end`, inclusive.
    pub async fn export_logs(&self, start: NaiveDate, end: NaiveDate) -> Result<String, AppError> {
        let rows = self.logs_between(start, end).await?;
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    /// Deletes conversations and daily stats older than `days_to_keep` days,
    /// then sessions left without conversations. Returns deleted conversation rows.
    pub async fn cleanup_old_logs(&self, days_to_keep: u32) -> Result<u64, AppError> {
        let cutoff = (Utc::now() - Duration::days(i64::from(days_to_keep)))
            .format(DAY_FORMAT)
            .to_string();

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM conversations WHERE day < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE session_id NOT IN (SELECT DISTINCT session_id FROM conversations)
            "#,
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM daily_stats WHERE date < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Pruned old conversation logs");
        }
        Ok(deleted)
    }

    async fn logs_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ConversationRow>, AppError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, session_id, timestamp, user_message, bot_response, language,
                   confidence, category, needs_human
            FROM conversations
            WHERE day BETWEEN ? AND ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(start.format(DAY_FORMAT).to_string())
        .bind(end.format(DAY_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl TurnSink for SqliteTurnLog {
    async fn log_turn(&self, record: &TurnRecord) -> Result<(), AppError> {
        self.write_record(record).await
    }
}
