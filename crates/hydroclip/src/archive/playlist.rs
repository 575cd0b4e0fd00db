use std::sync::Arc;

use async_trait::async_trait;
use m3u8_rs::{MediaPlaylist, parse_playlist_res};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::StreamLocation;
use crate::error::{ClipError, Result};

/// One transport-stream chunk as listed in a folder's playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub uri: String,
    pub base_uri: String,
    /// `EXTINF` duration in seconds. Zero, negative or absent counts as unknown.
    pub duration: Option<f64>,
}

impl Segment {
    pub fn new(uri: impl Into<String>, base_uri: impl Into<String>, duration: Option<f64>) -> Self {
        Self {
            uri: uri.into(),
            base_uri: base_uri.into(),
            duration,
        }
    }

    /// Duration when it is usable for timing arithmetic.
    pub fn valid_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Absolute URL of the segment. Absolute URIs pass through untouched.
    pub fn url(&self) -> Result<String> {
        if let Ok(absolute) = Url::parse(&self.uri) {
            return Ok(absolute.into());
        }
        let base = Url::parse(&self.base_uri)
            .map_err(|e| ClipError::invalid_url(&self.base_uri, e.to_string()))?;
        base.join(&self.uri)
            .map(Into::into)
            .map_err(|e| ClipError::invalid_url(&self.uri, e.to_string()))
    }
}

/// Loads the ordered segment list of one folder.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn load(&self, folder: i64) -> Result<Arc<[Segment]>>;
}

/// Fetches `live.m3u8` for a folder over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPlaylistSource {
    client: Client,
    location: StreamLocation,
}

impl HttpPlaylistSource {
    pub fn new(client: Client, location: StreamLocation) -> Self {
        Self { client, location }
    }
}

/// Parses playlist bytes into segments rooted at `base_uri`.
pub fn parse_media_segments(folder: i64, bytes: &[u8], base_uri: &str) -> Result<Vec<Segment>> {
    match parse_playlist_res(bytes) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) => Ok(segments_from_media(&pl, base_uri)),
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(ClipError::playlist(
            folder,
            "expected a media playlist, found a master playlist",
        )),
        Err(e) => Err(ClipError::playlist(
            folder,
            format!("failed to parse playlist: {e}"),
        )),
    }
}

fn segments_from_media(playlist: &MediaPlaylist, base_uri: &str) -> Vec<Segment> {
    playlist
        .segments
        .iter()
        .map(|s| Segment::new(&s.uri, base_uri, Some(f64::from(s.duration))))
        .collect()
}

#[async_trait]
impl PlaylistSource for HttpPlaylistSource {
    #[instrument(skip(self), level = "debug")]
    async fn load(&self, folder: i64) -> Result<Arc<[Segment]>> {
        let url = self.location.playlist_url(folder);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClipError::http_status(status, url, "playlist"));
        }
        let bytes = response.bytes().await?;
        let segments =
            parse_media_segments(folder, &bytes, &self.location.folder_base_url(folder))?;
        debug!(folder, segments = segments.len(), "Loaded folder playlist");
        Ok(segments.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://s3.example.com/bucket/node/hls/1000/";

    #[test]
    fn media_playlist_becomes_segments() {
        let body = b"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:10.0,
live000.ts
#EXTINF:10.010,
live001.ts
#EXTINF:0,
live002.ts
";
        let segments = parse_media_segments(1000, body, BASE).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].uri, "live000.ts");
        assert_eq!(segments[0].base_uri, BASE);
        assert_eq!(segments[0].valid_duration(), Some(10.0));
        assert!(segments[2].valid_duration().is_none());
    }

    #[test]
    fn master_playlist_is_rejected() {
        let body = b"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=128000
audio/index.m3u8
";
        let err = parse_media_segments(1000, body, BASE).unwrap_err();
        assert!(matches!(err, ClipError::Playlist { folder: 1000, .. }));
    }

    #[test]
    fn garbage_is_a_playlist_error() {
        let err = parse_media_segments(7, b"hello", BASE).unwrap_err();
        assert!(matches!(err, ClipError::Playlist { folder: 7, .. }));
    }

    #[test]
    fn segment_url_joins_base() {
        let seg = Segment::new("live005.ts", BASE, Some(10.0));
        assert_eq!(seg.url().unwrap(), format!("{BASE}live005.ts"));
    }

    #[test]
    fn absolute_segment_url_passes_through() {
        let seg = Segment::new("https://cdn.example.com/x.ts", BASE, None);
        assert_eq!(seg.url().unwrap(), "https://cdn.example.com/x.ts");
    }
}
