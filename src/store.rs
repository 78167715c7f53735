//! SQLite persistence for channel statistics.
//!
//! Three tables: `channels` and `videos` hold current state (one row per
//! natural key, overwritten on every ingest), `video_stats_snapshots` holds
//! one row per video per calendar day and is the only table with history.
//! All writes go through one generic upsert primitive operating on
//! [`RowBatch`] values.

use std::path::Path;

use anyhow::{Context, Result, bail};
use libsql::{Builder, Connection, Row, Value, params, params_from_iter};
use serde::Serialize;

/// Ordered column lists, one per table. These are the single source of truth
/// for batch construction and must stay in sync with the DDL below.
pub const CHANNEL_COLUMNS: &[&str] = &[
    "channel_id",
    "title",
    "description",
    "country",
    "subscriber_count",
    "view_count",
    "video_count",
];
pub const VIDEO_COLUMNS: &[&str] = &[
    "video_id",
    "channel_id",
    "title",
    "published_at",
    "duration",
    "category_id",
];
pub const SNAPSHOT_COLUMNS: &[&str] = &[
    "snapshot_date",
    "video_id",
    "view_count",
    "like_count",
    "comment_count",
];

/// Natural keys per table.
pub const CHANNEL_KEY: &[&str] = &["channel_id"];
pub const VIDEO_KEY: &[&str] = &["video_id"];
pub const SNAPSHOT_KEY: &[&str] = &["snapshot_date", "video_id"];

/// Current public profile of a channel. Hidden subscriber counts stay `None`
/// all the way into the table; they are never coerced to zero.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelRecord {
    pub channel_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub subscriber_count: Option<i64>,
    pub view_count: i64,
    pub video_count: i64,
}

/// Static metadata for one video. `duration` keeps the API's ISO-8601 form
/// (`PT1H2M3S`); the numeric seconds view is derived at export time only.
#[derive(Debug, Clone, Serialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub channel_id: Option<String>,
    pub title: Option<String>,
    pub published_at: Option<String>,
    pub duration: Option<String>,
    pub category_id: Option<String>,
}

/// One dated observation of a video's counters. Like and comment counts are
/// `None` when the uploader disabled them.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRecord {
    pub snapshot_date: String,
    pub video_id: String,
    pub view_count: i64,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
}

/// A batch of rows sharing one ordered column list. The column list is the
/// table's schema constant; every pushed row must match its arity.
#[derive(Debug, Clone)]
pub struct RowBatch {
    columns: &'static [&'static str],
    rows: Vec<Vec<Value>>,
}

impl RowBatch {
    pub fn new(columns: &'static [&'static str]) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends one row. Fails if the value count does not match the column
    /// list the batch was created with.
    pub fn push(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "row has {} values but the batch schema has {} columns",
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &'static [&'static str] {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Builds an upsert batch from channel records. Arity is correct by
/// construction, so these builders never fail.
pub fn channel_batch(records: &[ChannelRecord]) -> RowBatch {
    let mut batch = RowBatch::new(CHANNEL_COLUMNS);
    for record in records {
        batch.rows.push(vec![
            record.channel_id.as_str().into(),
            record.title.as_deref().into(),
            record.description.as_deref().into(),
            record.country.as_deref().into(),
            record.subscriber_count.into(),
            record.view_count.into(),
            record.video_count.into(),
        ]);
    }
    batch
}

pub fn video_batch(records: &[VideoRecord]) -> RowBatch {
    let mut batch = RowBatch::new(VIDEO_COLUMNS);
    for record in records {
        batch.rows.push(vec![
            record.video_id.as_str().into(),
            record.channel_id.as_deref().into(),
            record.title.as_deref().into(),
            record.published_at.as_deref().into(),
            record.duration.as_deref().into(),
            record.category_id.as_deref().into(),
        ]);
    }
    batch
}

pub fn snapshot_batch(records: &[SnapshotRecord]) -> RowBatch {
    let mut batch = RowBatch::new(SNAPSHOT_COLUMNS);
    for record in records {
        batch.rows.push(vec![
            record.snapshot_date.as_str().into(),
            record.video_id.as_str().into(),
            record.view_count.into(),
            record.like_count.into(),
            record.comment_count.into(),
        ]);
    }
    batch
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    // libsql's execute path rejects row-returning statements and
    // `PRAGMA journal_mode=WAL` reports the new mode as a row, so the
    // pragmas go through the query path; `next()` surfaces step errors.
    conn.query("PRAGMA journal_mode=WAL", params![])
        .await?
        .next()
        .await?;
    conn.query("PRAGMA synchronous=NORMAL", params![])
        .await?
        .next()
        .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            channel_id TEXT PRIMARY KEY,
            title TEXT,
            description TEXT,
            country TEXT,
            subscriber_count INTEGER,
            view_count INTEGER,
            video_count INTEGER
        );

        CREATE TABLE IF NOT EXISTS videos (
            video_id TEXT PRIMARY KEY,
            channel_id TEXT,
            title TEXT,
            published_at TEXT,
            duration TEXT,
            category_id TEXT
        );

        CREATE TABLE IF NOT EXISTS video_stats_snapshots (
            snapshot_date TEXT,         -- YYYY-MM-DD
            video_id TEXT,
            view_count INTEGER,
            like_count INTEGER,
            comment_count INTEGER,
            PRIMARY KEY (snapshot_date, video_id)
        );
        "#,
    )
    .await?;
    Ok(())
}

/// Wrapper around the SQLite connection. Opened once per run and dropped on
/// exit; there is no pooling and no concurrent-writer protection.
pub struct StatsStore {
    conn: Connection,
}

impl StatsStore {
    /// Opens (and if necessary creates) the database file and ensures the
    /// expected schema exists. Safe to call on every run.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening stats DB {}", path.display()))?;

        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Inserts every row of the batch, overwriting all non-key columns when a
    /// row with the same natural key already exists. The whole batch commits
    /// as one transaction. An empty batch is a no-op: the generated SQL needs
    /// at least one row to bind, so it must never reach the statement.
    pub async fn upsert(
        &self,
        table: &str,
        batch: &RowBatch,
        key_columns: &[&str],
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        for key in key_columns {
            if !batch.columns.contains(key) {
                bail!("key column {key} is not part of the batch schema for table {table}");
            }
        }

        let columns = batch.columns.join(",");
        let placeholders = (1..=batch.columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(",");
        let updates = batch
            .columns
            .iter()
            .filter(|column| !key_columns.contains(column))
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        if updates.is_empty() {
            bail!("upsert into {table} needs at least one non-key column to update");
        }
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders}) \
             ON CONFLICT({key}) DO UPDATE SET {updates}",
            key = key_columns.join(",")
        );

        let tx = self.conn.transaction().await?;
        for row in &batch.rows {
            tx.execute(&sql, params_from_iter(row.iter().cloned()))
                .await
                .with_context(|| format!("upserting into {table}"))?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_channels(&self) -> Result<Vec<ChannelRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT channel_id, title, description, country,
                       subscriber_count, view_count, video_count
                FROM channels
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_channel(&row)?);
        }
        Ok(records)
    }

    pub async fn load_videos(&self) -> Result<Vec<VideoRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT video_id, channel_id, title, published_at, duration, category_id
                FROM videos
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_video(&row)?);
        }
        Ok(records)
    }

    pub async fn load_snapshots(&self) -> Result<Vec<SnapshotRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT snapshot_date, video_id, view_count, like_count, comment_count
                FROM video_stats_snapshots
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_snapshot(&row)?);
        }
        Ok(records)
    }
}

fn row_to_channel(row: &Row) -> Result<ChannelRecord> {
    Ok(ChannelRecord {
        channel_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        country: row.get(3)?,
        subscriber_count: row.get(4)?,
        view_count: row.get(5)?,
        video_count: row.get(6)?,
    })
}

fn row_to_video(row: &Row) -> Result<VideoRecord> {
    Ok(VideoRecord {
        video_id: row.get(0)?,
        channel_id: row.get(1)?,
        title: row.get(2)?,
        published_at: row.get(3)?,
        duration: row.get(4)?,
        category_id: row.get(5)?,
    })
}

fn row_to_snapshot(row: &Row) -> Result<SnapshotRecord> {
    Ok(SnapshotRecord {
        snapshot_date: row.get(0)?,
        video_id: row.get(1)?,
        view_count: row.get(2)?,
        like_count: row.get(3)?,
        comment_count: row.get(4)?,
    })
}
