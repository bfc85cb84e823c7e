//! External movie-metadata provider client (OMDb-compatible).
//!
//! Looks up catalog fields by IMDb id and merges them into a video row.
//! Rate-limited so a batch of uploads cannot hammer the provider.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};
use serde::Deserialize;

use vf_core::config::MetadataConfig;
use vf_db::models::Video;

const DEFAULT_ENDPOINT: &str = "http://www.omdbapi.com";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OmdbClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl OmdbClient {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(5).unwrap());
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Build a client when the config enables the provider.
    pub fn from_config(config: &MetadataConfig) -> Option<Self> {
        if config.endpoint.is_none() && config.api_key.is_none() {
            return None;
        }
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Some(Self::new(endpoint, config.api_key.clone()))
    }

    /// Fetch title metadata for an IMDb id (`tt0133093`).
    pub async fn fetch_title(&self, imdb_id: &str) -> vf_core::Result<OmdbTitle> {
        self.limiter.until_ready().await;

        let mut params: Vec<(&str, &str)> = vec![("i", imdb_id), ("plot", "short"), ("r", "json")];
        if let Some(ref key) = self.api_key {
            params.push(("apikey", key.as_str()));
        }

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| vf_core::Error::Internal(format!("metadata request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(vf_core::Error::Internal(format!(
                "metadata provider returned {status}"
            )));
        }

        let title: OmdbTitle = resp
            .json()
            .await
            .map_err(|e| vf_core::Error::Internal(format!("metadata parse error: {e}")))?;

        if title.response.as_deref() == Some("False") {
            return Err(vf_core::Error::Internal(format!(
                "metadata provider error for {imdb_id}: {}",
                title.error.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(title)
    }
}

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

/// Title metadata as returned by an OMDb-compatible provider. Absent fields
/// and the literal `"N/A"` both mean "unknown".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OmdbTitle {
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Plot")]
    pub plot: Option<String>,
    #[serde(rename = "Poster")]
    pub poster: Option<String>,
    #[serde(rename = "Year")]
    pub year: Option<String>,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    #[serde(rename = "Genre")]
    pub genre: Option<String>,
    #[serde(rename = "Response")]
    response: Option<String>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

fn known(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "N/A")
}

/// Merge fetched metadata into a video row.
///
/// Present fields overwrite; the thumbnail URL is only filled in when the
/// video does not have one yet (a generated thumbnail wins over a poster).
pub fn apply_to_video(title: &OmdbTitle, video: &mut Video) {
    if let Some(t) = known(&title.title) {
        video.title = t.to_string();
    }
    if let Some(plot) = known(&title.plot) {
        video.description = plot.to_string();
    }
    if let Some(poster) = known(&title.poster) {
        video.poster_url = Some(poster.to_string());
        if known(&video.thumbnail_url).is_none() {
            video.thumbnail_url = Some(poster.to_string());
        }
    }
    if let Some(year) = known(&title.year) {
        // OMDb series years look like "2008-2013"; keep the first year.
        let first = year.split(['-', '–']).next().unwrap_or(year).trim();
        if let Ok(y) = first.parse::<i32>() {
            video.release_year = Some(y);
        }
    }
    if let Some(kind) = known(&title.kind) {
        video.kind = kind.to_string();
    }
    if let Some(genre) = known(&title.genre) {
        video.category = genre.to_string();
    }
}
