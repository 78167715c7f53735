#![forbid(unsafe_code)]

//! Regenerates the five CSV views from the local statistics store. Reads
//! only; the API key is not needed here. Running against a store that has
//! never been ingested yields header-only files.

use anyhow::{Context, Result, anyhow, bail};
use std::env;
use std::path::PathBuf;
use tubepulse_tools::{
    config::{SettingsOverrides, resolve_storage_paths},
    export::write_reports,
    store::StatsStore,
};

#[derive(Debug)]
struct ExportArgs {
    overrides: SettingsOverrides,
}

impl ExportArgs {
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
            if let Some(value) = arg.strip_prefix("--out-dir=") {
                overrides.export_dir = Some(PathBuf::from(value));
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
                "--out-dir" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--out-dir requires a value"))?;
                    overrides.export_dir = Some(PathBuf::from(value));
                }
                _ => {
                    bail!("unknown argument: {arg}");
                }
            }
        }

        Ok(Self { overrides })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let ExportArgs { overrides } = ExportArgs::parse()?;
    let storage = resolve_storage_paths(overrides)?;

    let store = StatsStore::open(&storage.db_path)
        .await
        .context("opening statistics database")?;
    let channels = store.load_channels().await.context("loading channels")?;
    let videos = store.load_videos().await.context("loading videos")?;
    let snapshots = store
        .load_snapshots()
        .await
        .context("loading daily snapshots")?;

    write_reports(&storage.export_dir, &channels, &videos, &snapshots)?;

    println!(
        "Exported {} channel(s), {} video(s), {} snapshot row(s) to {}",
        channels.len(),
        videos.len(),
        snapshots.len(),
        storage.export_dir.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn args_default_to_no_overrides() {
        let args = ExportArgs::from_slice(&[]).unwrap();
        assert_eq!(args.overrides.db_path, None);
        assert_eq!(args.overrides.export_dir, None);
    }

    #[test]
    fn args_accept_both_flag_forms() {
        let args = ExportArgs::from_slice(&["--db", "stats.db", "--out-dir=reports"]).unwrap();
        assert_eq!(args.overrides.db_path, Some(PathBuf::from("stats.db")));
        assert_eq!(args.overrides.export_dir, Some(PathBuf::from("reports")));
    }

    #[test]
    fn args_accept_env_file_override() {
        let args = ExportArgs::from_slice(&["--env-file", "/etc/tubepulse.env"]).unwrap();
        assert_eq!(
            args.overrides.env_path,
            Some(PathBuf::from("/etc/tubepulse.env"))
        );
    }

    #[test]
    fn args_reject_unknown_flag() {
        let err = ExportArgs::from_slice(&["--format", "json"]).unwrap_err();
        assert!(err.to_string().contains("--format"));
    }

    #[test]
    fn args_reject_missing_value() {
        let err = ExportArgs::from_slice(&["--out-dir"]).unwrap_err();
        assert!(err.to_string().contains("--out-dir"));
    }
}
