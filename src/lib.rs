#![forbid(unsafe_code)]

//! Shared library for the tubepulse binaries.
//!
//! `ingest_channel` pulls public channel/video statistics from the YouTube
//! Data API into a local SQLite database; `export_reports` flattens that
//! database into CSV files for reporting tools. Everything they share lives
//! here: configuration, the store, the API client, and the export views.

pub mod api;
pub mod config;
pub mod export;
pub mod store;
