//! src/resolver/mod.rs
//!
//! Turns a user query into a playable YouTube watch URL: direct URLs pass
//! through untouched, anything else goes through the Data API search
//! endpoint. Re-resolution of the same query on loop replay is deliberate;
//! the catalog may legitimately serve a different stream next time.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::Error;
use crate::playback::{MediaResolver, StreamRef};

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

pub fn is_youtube_url(text: &str) -> bool {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+$")
            .expect("static search pattern")
    });
    re.is_match(text)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

/// Search results can contain channels or playlists; take the first item
/// that is actually a video.
fn first_video(items: Vec<SearchItem>) -> Option<StreamRef> {
    for item in items {
        if let Some(video_id) = item.id.video_id {
            return Some(StreamRef {
                url: format!("https://www.youtube.com/watch?v={video_id}"),
                title: item.snippet.map(|s| s.title),
            });
        }
    }
    None
}

pub struct YouTubeResolver {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl YouTubeResolver {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }

    async fn search(&self, query: &str, key: &str) -> Result<StreamRef, Error> {
        let response: SearchResponse = self
            .http
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("maxResults", "5"),
                ("type", "video"),
                ("key", key),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Resolution(format!("search request failed: {e}")))?
            .json()
            .await?;

        first_video(response.items)
            .ok_or_else(|| Error::Resolution(format!("no results for '{query}'")))
    }
}

#[async_trait]
impl MediaResolver for YouTubeResolver {
    async fn resolve(&self, query: &str) -> Result<StreamRef, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Resolution("empty query".into()));
        }

        if is_youtube_url(query) {
            debug!("'{query}' taken as a direct URL");
            return Ok(StreamRef {
                url: query.to_string(),
                title: None,
            });
        }

        match &self.api_key {
            Some(key) => self.search(query, key).await,
            None => {
                warn!("search requested but no YouTube API key is configured");
                Err(Error::Resolution(
                    "search is unavailable without a YouTube API key".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_youtube_urls() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=abc123"));
        assert!(is_youtube_url("http://youtube.com/watch?v=abc123"));
        assert!(is_youtube_url("youtu.be/abc123"));
        assert!(is_youtube_url("www.youtube.com/playlist?list=xyz"));

        assert!(!is_youtube_url("never gonna give you up"));
        assert!(!is_youtube_url("https://example.com/watch?v=abc123"));
        assert!(!is_youtube_url("youtube.com"));
    }

    #[test]
    fn parses_search_responses() {
        let body = serde_json::json!({
            "items": [
                {
                    "id": { "kind": "youtube#video", "videoId": "abc123" },
                    "snippet": { "title": "Some Song" }
                }
            ]
        });
        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        let stream = first_video(parsed.items).unwrap();
        assert_eq!(stream.url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(stream.title.as_deref(), Some("Some Song"));
    }

    #[test]
    fn skips_non_video_items() {
        let body = serde_json::json!({
            "items": [
                { "id": { "kind": "youtube#channel", "channelId": "chan1" } },
                {
                    "id": { "kind": "youtube#video", "videoId": "vid2" },
                    "snippet": { "title": "Second" }
                }
            ]
        });
        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        let stream = first_video(parsed.items).unwrap();
        assert_eq!(stream.url, "https://www.youtube.com/watch?v=vid2");
    }

    #[test]
    fn empty_result_sets_yield_nothing() {
        let parsed: SearchResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(first_video(parsed.items).is_none());
    }
}
