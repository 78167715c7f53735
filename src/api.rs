//! Read-only client for the YouTube Data API v3.
//!
//! Three operations: fetch one channel's public profile, page through a
//! channel's recent uploads, and batch-fetch per-video statistics. Requests
//! block the calling thread; there is deliberately no timeout, retry, or
//! backoff, so a failed or hung call fails or hangs the whole run.
//!
//! The API encodes every counter as a JSON string and omits counters the
//! owner has hidden or disabled. Absent counters stay absent (`None`) here;
//! they are never coerced to zero.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::store::{ChannelRecord, VideoRecord};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// The API caps both search pages and `videos.list` id batches at 50.
const MAX_BATCH: usize = 50;

/// Counters for one video as observed right now. The ingest orchestrator
/// stamps these with a snapshot date before they reach the store.
#[derive(Debug, Clone)]
pub struct StatsSample {
    pub video_id: String,
    pub view_count: i64,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
}

/// API client bound to one key.
pub struct YouTube {
    agent: ureq::Agent,
    api_key: String,
}

impl YouTube {
    pub fn new(api_key: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            api_key: api_key.to_owned(),
        }
    }

    /// Fetches the public profile of one channel. Fails with a not-found
    /// error when the API returns no matching item.
    pub fn fetch_channel_public(&self, channel_id: &str) -> Result<ChannelRecord> {
        let response: ChannelListResponse = self
            .agent
            .get(&format!("{API_BASE}/channels"))
            .query("part", "snippet,statistics")
            .query("id", channel_id)
            .query("key", &self.api_key)
            .call()
            .with_context(|| format!("requesting channel {channel_id}"))?
            .into_json()
            .context("decoding channels.list response")?;
        channel_from_response(channel_id, response)
    }

    /// Collects the ids of every video the channel published within the last
    /// `days_back` days, walking the date-ordered search feed page by page.
    ///
    /// Each page is filtered in full against the cutoff instead of stopping
    /// at the first stale item, so an ordering glitch inside a page cannot
    /// drop an in-range video. Paging stops once a page has produced
    /// anything older than the cutoff: the feed is newest-first, so later
    /// pages are older still.
    pub fn list_recent_video_ids(&self, channel_id: &str, days_back: u32) -> Result<Vec<String>> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_back));
        collect_paged_ids(
            |page_token| self.fetch_search_page(channel_id, page_token),
            cutoff,
        )
    }

    fn fetch_search_page(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
    ) -> Result<SearchListResponse> {
        let mut request = self
            .agent
            .get(&format!("{API_BASE}/search"))
            .query("part", "id,snippet")
            .query("channelId", channel_id)
            .query("type", "video")
            .query("order", "date")
            .query("maxResults", "50")
            .query("key", &self.api_key);
        if let Some(token) = page_token {
            request = request.query("pageToken", token);
        }
        request
            .call()
            .with_context(|| format!("requesting videos for channel {channel_id}"))?
            .into_json()
            .context("decoding search.list response")
    }

    /// Fetches static metadata and current counters for the given videos,
    /// split into two aligned batches. Empty input returns two empty batches
    /// without touching the network; larger inputs are chunked at the API's
    /// 50-id cap, one request per chunk.
    pub fn fetch_videos_and_stats(
        &self,
        video_ids: &[String],
    ) -> Result<(Vec<VideoRecord>, Vec<StatsSample>)> {
        fetch_stats_chunked(video_ids, |joined_ids| {
            self.agent
                .get(&format!("{API_BASE}/videos"))
                .query("part", "snippet,statistics,contentDetails")
                .query("id", joined_ids)
                .query("key", &self.api_key)
                .call()
                .context("requesting video details")?
                .into_json()
                .context("decoding videos.list response")
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: ChannelStatistics,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: Option<String>,
    description: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    view_count: Option<String>,
    subscriber_count: Option<String>,
    video_count: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    published_at: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: VideoStatistics,
    #[serde(default)]
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    channel_id: Option<String>,
    title: Option<String>,
    published_at: Option<String>,
    category_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

fn channel_from_response(
    channel_id: &str,
    response: ChannelListResponse,
) -> Result<ChannelRecord> {
    let Some(item) = response.items.into_iter().next() else {
        bail!("no channel found for id={channel_id}");
    };
    let ChannelItem {
        snippet,
        statistics,
    } = item;
    Ok(ChannelRecord {
        channel_id: channel_id.to_owned(),
        title: snippet.title,
        description: snippet.description,
        country: snippet.country,
        subscriber_count: optional_count(statistics.subscriber_count.as_deref(), "subscriberCount")?,
        view_count: required_count(statistics.view_count.as_deref(), "viewCount")?,
        video_count: required_count(statistics.video_count.as_deref(), "videoCount")?,
    })
}

/// Walks the paged search feed through `fetch_page`, filtering each page
/// against the cutoff and stopping after the first page that reached past it.
fn collect_paged_ids(
    mut fetch_page: impl FnMut(Option<&str>) -> Result<SearchListResponse>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = fetch_page(page_token.as_deref())?;
        let (in_range, saw_older) = ids_within_cutoff(&page.items, cutoff)?;
        ids.extend(in_range);
        page_token = page.next_page_token;
        if saw_older || page_token.is_none() {
            break;
        }
    }
    Ok(ids)
}

/// Filters one search page. Returns the in-range ids in page order plus
/// whether the page contained anything older than the cutoff.
fn ids_within_cutoff(
    items: &[SearchItem],
    cutoff: DateTime<Utc>,
) -> Result<(Vec<String>, bool)> {
    let mut ids = Vec::new();
    let mut saw_older = false;
    for item in items {
        let published = DateTime::parse_from_rfc3339(&item.snippet.published_at)
            .with_context(|| {
                format!(
                    "parsing publishedAt {:?} for video {}",
                    item.snippet.published_at, item.id.video_id
                )
            })?
            .with_timezone(&Utc);
        if published < cutoff {
            saw_older = true;
        } else {
            ids.push(item.id.video_id.clone());
        }
    }
    Ok((ids, saw_older))
}

fn fetch_stats_chunked(
    video_ids: &[String],
    mut fetch_chunk: impl FnMut(&str) -> Result<VideoListResponse>,
) -> Result<(Vec<VideoRecord>, Vec<StatsSample>)> {
    let mut videos = Vec::new();
    let mut stats = Vec::new();
    for chunk in video_ids.chunks(MAX_BATCH) {
        let response = fetch_chunk(&chunk.join(","))?;
        let (mut chunk_videos, mut chunk_stats) = split_video_items(response.items)?;
        videos.append(&mut chunk_videos);
        stats.append(&mut chunk_stats);
    }
    Ok((videos, stats))
}

/// Splits a `videos.list` response into the static-metadata batch and the
/// counters batch, aligned by position.
fn split_video_items(items: Vec<VideoItem>) -> Result<(Vec<VideoRecord>, Vec<StatsSample>)> {
    let mut videos = Vec::new();
    let mut stats = Vec::new();
    for item in items {
        let VideoItem {
            id,
            snippet,
            statistics,
            content_details,
        } = item;
        videos.push(VideoRecord {
            video_id: id.clone(),
            channel_id: snippet.channel_id,
            title: snippet.title,
            published_at: snippet.published_at,
            duration: content_details.duration,
            category_id: snippet.category_id,
        });
        stats.push(StatsSample {
            video_id: id,
            view_count: required_count(statistics.view_count.as_deref(), "viewCount")?,
            like_count: optional_count(statistics.like_count.as_deref(), "likeCount")?,
            comment_count: optional_count(statistics.comment_count.as_deref(), "commentCount")?,
        });
    }
    Ok((videos, stats))
}

/// Parses a counter the API always publishes; absence means zero.
fn required_count(value: Option<&str>, field: &str) -> Result<i64> {
    match value {
        Some(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("parsing {field} value {raw:?}")),
        None => Ok(0),
    }
}

/// Parses a counter the owner may hide or disable; absence stays absent.
fn optional_count(value: Option<&str>, field: &str) -> Result<Option<i64>> {
    value
        .map(|raw| {
            raw.parse::<i64>()
                .with_context(|| format!("parsing {field} value {raw:?}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn cutoff_at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    fn search_item(video_id: &str, published_at: &str) -> SearchItem {
        SearchItem {
            id: SearchItemId {
                video_id: video_id.to_owned(),
            },
            snippet: SearchSnippet {
                published_at: published_at.to_owned(),
            },
        }
    }

    fn page(items: Vec<SearchItem>, next: Option<&str>) -> SearchListResponse {
        SearchListResponse {
            items,
            next_page_token: next.map(str::to_owned),
        }
    }

    #[test]
    fn channel_parses_nested_profile_and_counts() {
        let response: ChannelListResponse = serde_json::from_value(json!({
            "items": [{
                "snippet": {
                    "title": "Acme Clips",
                    "description": "Weekly uploads",
                    "country": "DE"
                },
                "statistics": {
                    "viewCount": "123456",
                    "subscriberCount": "7890",
                    "videoCount": "42"
                }
            }]
        }))
        .unwrap();
        let channel = channel_from_response("UCacme", response).unwrap();
        assert_eq!(channel.channel_id, "UCacme");
        assert_eq!(channel.title.as_deref(), Some("Acme Clips"));
        assert_eq!(channel.country.as_deref(), Some("DE"));
        assert_eq!(channel.view_count, 123_456);
        assert_eq!(channel.subscriber_count, Some(7_890));
        assert_eq!(channel.video_count, 42);
    }

    /// Channels that hide their subscriber count simply omit the field; the
    /// record must carry `None`, never zero.
    #[test]
    fn channel_hidden_subscribers_stay_absent() {
        let response: ChannelListResponse = serde_json::from_value(json!({
            "items": [{
                "snippet": { "title": "Quiet" },
                "statistics": { "viewCount": "10", "videoCount": "1" }
            }]
        }))
        .unwrap();
        let channel = channel_from_response("UCquiet", response).unwrap();
        assert_eq!(channel.subscriber_count, None);
        assert_eq!(channel.view_count, 10);
        assert_eq!(channel.country, None);
    }

    #[test]
    fn channel_not_found_names_the_id() {
        let response: ChannelListResponse = serde_json::from_value(json!({ "items": [] })).unwrap();
        let err = channel_from_response("UCmissing", response).unwrap_err();
        assert!(err.to_string().contains("UCmissing"));
    }

    #[test]
    fn malformed_counter_string_errors_with_field_name() {
        let err = required_count(Some("many"), "viewCount").unwrap_err();
        assert!(err.to_string().contains("viewCount"));
        let err = optional_count(Some("n/a"), "likeCount").unwrap_err();
        assert!(err.to_string().contains("likeCount"));
    }

    #[test]
    fn ids_within_cutoff_keeps_recent_flags_older() {
        let cutoff = cutoff_at(2024, 5, 1);
        let items = vec![
            search_item("new", "2024-05-03T12:00:00Z"),
            search_item("edge", "2024-05-01T00:00:00Z"),
            search_item("old", "2024-04-20T08:00:00Z"),
        ];
        let (ids, saw_older) = ids_within_cutoff(&items, cutoff).unwrap();
        assert_eq!(ids, vec!["new", "edge"]);
        assert!(saw_older);
    }

    /// An out-of-order page must not cost us in-range ids that appear after
    /// a stale item.
    #[test]
    fn ids_within_cutoff_survives_order_violation() {
        let cutoff = cutoff_at(2024, 5, 1);
        let items = vec![
            search_item("a", "2024-05-03T00:00:00Z"),
            search_item("stale", "2024-03-01T00:00:00Z"),
            search_item("b", "2024-05-02T00:00:00Z"),
        ];
        let (ids, saw_older) = ids_within_cutoff(&items, cutoff).unwrap();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(saw_older);
    }

    #[test]
    fn ids_within_cutoff_rejects_garbage_timestamp() {
        let items = vec![search_item("v", "yesterday")];
        let err = ids_within_cutoff(&items, cutoff_at(2024, 5, 1)).unwrap_err();
        assert!(err.to_string().contains("publishedAt"));
    }

    /// Paging stops after the first page containing a stale item, no matter
    /// how many pages the feed still advertises.
    #[test]
    fn paging_stops_at_first_stale_page() {
        let cutoff = cutoff_at(2024, 5, 1);
        let mut calls = 0;
        let ids = collect_paged_ids(
            |token| {
                calls += 1;
                match token {
                    None => Ok(page(
                        vec![search_item("v1", "2024-05-05T00:00:00Z")],
                        Some("page2"),
                    )),
                    Some("page2") => Ok(page(
                        vec![
                            search_item("v2", "2024-05-02T00:00:00Z"),
                            search_item("v3", "2024-04-01T00:00:00Z"),
                        ],
                        Some("page3"),
                    )),
                    Some(other) => panic!("unexpected page request: {other}"),
                }
            },
            cutoff,
        )
        .unwrap();
        assert_eq!(ids, vec!["v1", "v2"]);
        assert_eq!(calls, 2);
    }

    #[test]
    fn paging_exhausts_feed_when_everything_is_recent() {
        let cutoff = cutoff_at(2024, 5, 1);
        let ids = collect_paged_ids(
            |token| match token {
                None => Ok(page(
                    vec![search_item("v1", "2024-05-05T00:00:00Z")],
                    Some("page2"),
                )),
                Some("page2") => Ok(page(vec![search_item("v2", "2024-05-04T00:00:00Z")], None)),
                Some(other) => panic!("unexpected page request: {other}"),
            },
            cutoff,
        )
        .unwrap();
        assert_eq!(ids, vec!["v1", "v2"]);
    }

    #[test]
    fn search_page_decodes_wire_names() {
        let response: SearchListResponse = serde_json::from_value(json!({
            "items": [
                { "id": { "videoId": "abc" }, "snippet": { "publishedAt": "2024-05-05T00:00:00Z" } }
            ],
            "nextPageToken": "tok"
        }))
        .unwrap();
        assert_eq!(response.items[0].id.video_id, "abc");
        assert_eq!(response.next_page_token.as_deref(), Some("tok"));
    }

    #[test]
    fn split_video_items_aligns_metadata_and_counters() {
        let response: VideoListResponse = serde_json::from_value(json!({
            "items": [
                {
                    "id": "v1",
                    "snippet": {
                        "channelId": "UC1",
                        "title": "First",
                        "publishedAt": "2024-05-05T00:00:00Z",
                        "categoryId": "22"
                    },
                    "statistics": { "viewCount": "100", "likeCount": "9", "commentCount": "3" },
                    "contentDetails": { "duration": "PT1H2M3S" }
                },
                {
                    "id": "v2",
                    "snippet": { "title": "Likes disabled" },
                    "statistics": { "viewCount": "50" }
                }
            ]
        }))
        .unwrap();

        let (videos, stats) = split_video_items(response.items).unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(stats.len(), 2);
        assert_eq!(videos[0].video_id, "v1");
        assert_eq!(videos[0].duration.as_deref(), Some("PT1H2M3S"));
        assert_eq!(videos[0].category_id.as_deref(), Some("22"));
        assert_eq!(stats[0].view_count, 100);
        assert_eq!(stats[0].like_count, Some(9));
        assert_eq!(videos[1].duration, None);
        assert_eq!(stats[1].video_id, "v2");
        assert_eq!(stats[1].like_count, None);
        assert_eq!(stats[1].comment_count, None);
    }

    /// A payload without a statistics block still yields a sample; views
    /// default to zero the way the rest of the pipeline expects.
    #[test]
    fn split_video_items_tolerates_missing_statistics() {
        let response: VideoListResponse = serde_json::from_value(json!({
            "items": [{ "id": "bare", "snippet": {} }]
        }))
        .unwrap();
        let (videos, stats) = split_video_items(response.items).unwrap();
        assert_eq!(videos[0].title, None);
        assert_eq!(stats[0].view_count, 0);
        assert_eq!(stats[0].like_count, None);
    }

    #[test]
    fn chunked_fetch_splits_at_fifty_ids() {
        let ids: Vec<String> = (0..120).map(|n| format!("v{n}")).collect();
        let mut chunk_sizes = Vec::new();
        let (videos, stats) = fetch_stats_chunked(&ids, |joined| {
            chunk_sizes.push(joined.split(',').count());
            Ok(VideoListResponse { items: Vec::new() })
        })
        .unwrap();
        assert_eq!(chunk_sizes, vec![50, 50, 20]);
        assert!(videos.is_empty());
        assert!(stats.is_empty());
    }

    #[test]
    fn empty_id_list_never_touches_the_feed() {
        let (videos, stats) = fetch_stats_chunked(&[], |_| {
            panic!("no request expected for an empty id list")
        })
        .unwrap();
        assert!(videos.is_empty());
        assert!(stats.is_empty());
    }
}
