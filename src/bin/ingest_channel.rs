#![forbid(unsafe_code)]

//! Pulls one channel's public statistics from the YouTube Data API and
//! upserts them into the local store: current channel and video state plus
//! one counter snapshot per video for today. Safe to re-run; a second run on
//! the same day overwrites that day's snapshots instead of duplicating them.

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use std::env;
use std::path::PathBuf;
use tubepulse_tools::{
    api::{StatsSample, YouTube},
    config::{SettingsOverrides, resolve_ingest_settings},
    store::{
        CHANNEL_KEY, SNAPSHOT_KEY, SnapshotRecord, StatsStore, VIDEO_KEY, channel_batch,
        snapshot_batch, video_batch,
    },
};

#[derive(Debug)]
struct IngestArgs {
    overrides: SettingsOverrides,
}

impl IngestArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut overrides = SettingsOverrides::default();
        let mut args = iter.into_iter();

        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--env-file=") {
                overrides.env_path = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--db=") {
                overrides.db_path = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--days-back=") {
                overrides.days_back = Some(parse_days_back(value)?);
                continue;
            }

            match arg.as_str() {
                "--env-file" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--env-file requires a value"))?;
                    overrides.env_path = Some(PathBuf::from(value));
                }
                "--db" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--db requires a value"))?;
                    overrides.db_path = Some(PathBuf::from(value));
                }
                "--days-back" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--days-back requires a value"))?;
                    overrides.days_back = Some(parse_days_back(&value)?);
                }
                _ => {
                    bail!("unknown argument: {arg}");
                }
            }
        }

        Ok(Self { overrides })
    }
}

fn parse_days_back(value: &str) -> Result<u32> {
    value
        .parse()
        .with_context(|| format!("invalid --days-back value {value:?}"))
}

/// Stamps freshly fetched counters with the run date, producing the rows
/// destined for the snapshot table.
fn stamp_snapshots(samples: Vec<StatsSample>, snapshot_date: &str) -> Vec<SnapshotRecord> {
    samples
        .into_iter()
        .map(|sample| SnapshotRecord {
            snapshot_date: snapshot_date.to_owned(),
            video_id: sample.video_id,
            view_count: sample.view_count,
            like_count: sample.like_count,
            comment_count: sample.comment_count,
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let IngestArgs { overrides } = IngestArgs::parse()?;
    let settings = resolve_ingest_settings(overrides)?;

    println!("=== Channel statistics ingest ===");
    println!("Channel: {}", settings.channel_id);
    println!("Database: {}", settings.storage.db_path.display());
    println!("Window: last {} days", settings.days_back);

    let store = StatsStore::open(&settings.storage.db_path)
        .await
        .context("initializing statistics database")?;
    let youtube = YouTube::new(&settings.api_key);

    let channel = youtube
        .fetch_channel_public(&settings.channel_id)
        .context("fetching channel profile")?;
    store
        .upsert(
            "channels",
            &channel_batch(std::slice::from_ref(&channel)),
            CHANNEL_KEY,
        )
        .await
        .context("storing channel profile")?;

    let video_ids = youtube
        .list_recent_video_ids(&settings.channel_id, settings.days_back)
        .context("listing recent videos")?;
    println!("Videos published in window: {}", video_ids.len());

    let (videos, samples) = youtube
        .fetch_videos_and_stats(&video_ids)
        .context("fetching video details")?;
    store
        .upsert("videos", &video_batch(&videos), VIDEO_KEY)
        .await
        .context("storing video metadata")?;

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let snapshots = stamp_snapshots(samples, &today);
    store
        .upsert(
            "video_stats_snapshots",
            &snapshot_batch(&snapshots),
            SNAPSHOT_KEY,
        )
        .await
        .context("storing daily snapshots")?;

    let title = channel.title.as_deref().unwrap_or(&settings.channel_id);
    println!();
    println!(
        "Done. Channel: {title}, videos snapshot: {} on {today}",
        snapshots.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn args_default_to_no_overrides() {
        let args = IngestArgs::from_slice(&[]).unwrap();
        assert_eq!(args.overrides.env_path, None);
        assert_eq!(args.overrides.db_path, None);
        assert_eq!(args.overrides.days_back, None);
    }

    #[test]
    fn args_accept_space_separated_values() {
        let args = IngestArgs::from_slice(&[
            "--env-file",
            "conf/.env",
            "--db",
            "/var/lib/stats.db",
            "--days-back",
            "30",
        ])
        .unwrap();
        assert_eq!(args.overrides.env_path, Some(PathBuf::from("conf/.env")));
        assert_eq!(
            args.overrides.db_path,
            Some(PathBuf::from("/var/lib/stats.db"))
        );
        assert_eq!(args.overrides.days_back, Some(30));
    }

    #[test]
    fn args_accept_equals_form() {
        let args =
            IngestArgs::from_slice(&["--db=stats.db", "--days-back=7", "--env-file=.env.local"])
                .unwrap();
        assert_eq!(args.overrides.db_path, Some(PathBuf::from("stats.db")));
        assert_eq!(args.overrides.days_back, Some(7));
        assert_eq!(args.overrides.env_path, Some(PathBuf::from(".env.local")));
    }

    #[test]
    fn args_reject_unknown_flag() {
        let err = IngestArgs::from_slice(&["--verbose"]).unwrap_err();
        assert!(err.to_string().contains("--verbose"));
    }

    #[test]
    fn args_reject_missing_value() {
        let err = IngestArgs::from_slice(&["--db"]).unwrap_err();
        assert!(err.to_string().contains("--db"));
    }

    #[test]
    fn args_reject_non_numeric_days_back() {
        let err = IngestArgs::from_slice(&["--days-back", "soon"]).unwrap_err();
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn stamping_applies_one_date_to_every_sample() {
        let samples = vec![
            StatsSample {
                video_id: "v1".to_owned(),
                view_count: 10,
                like_count: Some(2),
                comment_count: None,
            },
            StatsSample {
                video_id: "v2".to_owned(),
                view_count: 0,
                like_count: None,
                comment_count: Some(1),
            },
        ];
        let snapshots = stamp_snapshots(samples, "2024-05-10");
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.snapshot_date == "2024-05-10"));
        assert_eq!(snapshots[0].video_id, "v1");
        assert_eq!(snapshots[0].like_count, Some(2));
        assert_eq!(snapshots[1].video_id, "v2");
        assert_eq!(snapshots[1].view_count, 0);
        assert_eq!(snapshots[1].comment_count, Some(1));
    }

    #[test]
    fn stamping_empty_batch_yields_no_rows() {
        assert!(stamp_snapshots(Vec::new(), "2024-05-10").is_empty());
    }
}
