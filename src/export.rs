//! Flattened CSV views for the BI layer.
//!
//! Five files per run: the three base tables (`channels.csv`, `videos.csv`,
//! `video_stats_snapshots.csv`), per-day totals across all videos
//! (`daily_totals.csv`), and the newest snapshot per video joined with its
//! metadata (`video_latest.csv`). Every file is rewritten on every run, so
//! an empty store produces header-only files instead of missing ones and a
//! downstream refresh never breaks on a path that is not there.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::store::{
    CHANNEL_COLUMNS, ChannelRecord, SNAPSHOT_COLUMNS, SnapshotRecord, VIDEO_COLUMNS, VideoRecord,
};

const DAILY_TOTALS_HEADER: &[&str] = &["snapshot_date", "views", "likes", "comments"];

const VIDEO_LATEST_HEADER: &[&str] = &[
    "video_id",
    "title",
    "published_at",
    "duration",
    "duration_seconds",
    "snapshot_date",
    "view_count",
    "like_count",
    "comment_count",
];

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").unwrap());

/// Converts an ISO 8601 duration like `PT1H2M3S` into whole seconds.
///
/// Anything outside the `PT..H..M..S` shape maps to `None`. A malformed
/// duration costs one derived cell, never the export run.
pub fn iso8601_to_seconds(duration: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(duration)?;
    let hours = capture_value(&caps, 1)?;
    let minutes = capture_value(&caps, 2)?;
    let seconds = capture_value(&caps, 3)?;
    Some(hours * 3600 + minutes * 60 + seconds)
}

fn capture_value(caps: &regex::Captures<'_>, index: usize) -> Option<i64> {
    match caps.get(index) {
        Some(group) => group.as_str().parse().ok(),
        None => Some(0),
    }
}

/// One `videos.csv` row: the stored metadata plus the derived
/// `duration_seconds` column.
#[derive(Debug, Serialize)]
struct VideoCsvRow {
    video_id: String,
    channel_id: Option<String>,
    title: Option<String>,
    published_at: Option<String>,
    duration: Option<String>,
    category_id: Option<String>,
    duration_seconds: Option<i64>,
}

impl VideoCsvRow {
    fn from_record(video: &VideoRecord) -> Self {
        Self {
            video_id: video.video_id.clone(),
            channel_id: video.channel_id.clone(),
            title: video.title.clone(),
            published_at: video.published_at.clone(),
            duration: video.duration.clone(),
            category_id: video.category_id.clone(),
            duration_seconds: video.duration.as_deref().and_then(iso8601_to_seconds),
        }
    }
}

#[derive(Debug, Serialize)]
struct DailyTotalRow {
    snapshot_date: String,
    views: i64,
    likes: Option<i64>,
    comments: Option<i64>,
}

#[derive(Debug, Serialize)]
struct VideoLatestRow {
    video_id: String,
    title: Option<String>,
    published_at: Option<String>,
    duration: Option<String>,
    duration_seconds: Option<i64>,
    snapshot_date: String,
    view_count: i64,
    like_count: Option<i64>,
    comment_count: Option<i64>,
}

/// Writes the five CSV views into `export_dir`, creating it if needed.
pub fn write_reports(
    export_dir: &Path,
    channels: &[ChannelRecord],
    videos: &[VideoRecord],
    snapshots: &[SnapshotRecord],
) -> Result<()> {
    fs::create_dir_all(export_dir)
        .with_context(|| format!("creating export directory {}", export_dir.display()))?;

    write_csv(&export_dir.join("channels.csv"), CHANNEL_COLUMNS, channels)?;

    let video_rows: Vec<VideoCsvRow> = videos.iter().map(VideoCsvRow::from_record).collect();
    let mut videos_header: Vec<&str> = VIDEO_COLUMNS.to_vec();
    videos_header.push("duration_seconds");
    write_csv(&export_dir.join("videos.csv"), &videos_header, &video_rows)?;

    write_csv(
        &export_dir.join("video_stats_snapshots.csv"),
        SNAPSHOT_COLUMNS,
        snapshots,
    )?;
    write_csv(
        &export_dir.join("daily_totals.csv"),
        DAILY_TOTALS_HEADER,
        &daily_totals(snapshots),
    )?;
    write_csv(
        &export_dir.join("video_latest.csv"),
        VIDEO_LATEST_HEADER,
        &video_latest(videos, snapshots),
    )?;
    Ok(())
}

/// Sums the counters of every snapshot taken on the same day, ascending by
/// date. A metric stays absent for a day only while every video left it
/// absent that day.
fn daily_totals(snapshots: &[SnapshotRecord]) -> Vec<DailyTotalRow> {
    let mut by_date: BTreeMap<&str, (i64, Option<i64>, Option<i64>)> = BTreeMap::new();
    for snapshot in snapshots {
        let entry = by_date
            .entry(snapshot.snapshot_date.as_str())
            .or_insert((0, None, None));
        entry.0 += snapshot.view_count;
        entry.1 = add_optional(entry.1, snapshot.like_count);
        entry.2 = add_optional(entry.2, snapshot.comment_count);
    }
    by_date
        .into_iter()
        .map(|(date, (views, likes, comments))| DailyTotalRow {
            snapshot_date: date.to_owned(),
            views,
            likes,
            comments,
        })
        .collect()
}

fn add_optional(acc: Option<i64>, value: Option<i64>) -> Option<i64> {
    match (acc, value) {
        (None, None) => None,
        (acc, value) => Some(acc.unwrap_or(0) + value.unwrap_or(0)),
    }
}

/// Picks the newest snapshot per video and joins it with the video's stored
/// metadata, most-viewed first. Snapshot dates are ISO `YYYY-MM-DD`, so
/// string comparison orders them correctly. A snapshot whose video row is
/// missing still exports, with empty metadata cells.
fn video_latest(videos: &[VideoRecord], snapshots: &[SnapshotRecord]) -> Vec<VideoLatestRow> {
    let mut latest: HashMap<&str, &SnapshotRecord> = HashMap::new();
    for snapshot in snapshots {
        let newer = latest
            .get(snapshot.video_id.as_str())
            .map_or(true, |current| snapshot.snapshot_date > current.snapshot_date);
        if newer {
            latest.insert(snapshot.video_id.as_str(), snapshot);
        }
    }

    let video_index: HashMap<&str, &VideoRecord> = videos
        .iter()
        .map(|video| (video.video_id.as_str(), video))
        .collect();

    let mut rows: Vec<VideoLatestRow> = latest
        .into_values()
        .map(|snapshot| {
            let video = video_index.get(snapshot.video_id.as_str());
            VideoLatestRow {
                video_id: snapshot.video_id.clone(),
                title: video.and_then(|v| v.title.clone()),
                published_at: video.and_then(|v| v.published_at.clone()),
                duration: video.and_then(|v| v.duration.clone()),
                duration_seconds: video
                    .and_then(|v| v.duration.as_deref())
                    .and_then(iso8601_to_seconds),
                snapshot_date: snapshot.snapshot_date.clone(),
                view_count: snapshot.view_count,
                like_count: snapshot.like_count,
                comment_count: snapshot.comment_count,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.view_count
            .cmp(&a.view_count)
            .then_with(|| a.video_id.cmp(&b.video_id))
    });
    rows
}

fn write_csv<R: Serialize>(path: &Path, header: &[&str], rows: &[R]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer
        .write_record(header)
        .with_context(|| format!("writing header of {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}
