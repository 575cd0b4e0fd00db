use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::StreamLocation;
use crate::error::{ClipError, Result};

/// Lists the time-bucketed folders of one node's archive.
#[async_trait]
pub trait FolderIndex: Send + Sync {
    /// Every folder timestamp in the archive, ascending.
    async fn list_folders(&self) -> Result<Vec<i64>>;

    /// Newest folder, used when tailing a live node.
    async fn latest_folder(&self) -> Result<Option<i64>> {
        Ok(self.list_folders().await?.last().copied())
    }

    /// Keys of every object stored under one folder, in listing order.
    async fn list_folder_objects(&self, folder: i64) -> Result<Vec<String>>;

    /// Folders that can hold audio for `[start, end]`.
    ///
    /// Fails with [`ClipError::NoFoldersInRange`] when nothing qualifies.
    async fn folders_in_range(&self, start: i64, end: i64) -> Result<Vec<i64>> {
        let folders = self.list_folders().await?;
        let selected = select_folders_in_range(&folders, start, end);
        if selected.is_empty() {
            return Err(ClipError::NoFoldersInRange { start, end });
        }
        Ok(selected)
    }
}

/// Keeps the newest folder starting at or before `start` (it holds the
/// beginning of the window) plus every folder starting in `(start, end]`.
pub fn select_folders_in_range(folders: &[i64], start: i64, end: i64) -> Vec<i64> {
    let mut sorted = folders.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let containing = sorted.iter().rev().find(|&&ts| ts <= start).copied();

    containing
        .into_iter()
        .chain(sorted.into_iter().filter(|&ts| ts > start && ts <= end))
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
    #[serde(default)]
    common_prefixes: Vec<CommonPrefix>,
    #[serde(default)]
    contents: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectEntry {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommonPrefix {
    prefix: String,
}

/// Anonymous `ListObjectsV2` listing over plain HTTP.
#[derive(Debug, Clone)]
pub struct S3FolderIndex {
    client: Client,
    location: StreamLocation,
}

impl S3FolderIndex {
    pub fn new(client: Client, location: StreamLocation) -> Self {
        Self { client, location }
    }

    /// `ListObjectsV2` URL under `prefix`. With `delimited` set only the
    /// immediate child prefixes are returned.
    fn list_url(&self, prefix: &str, delimited: bool, continuation: Option<&str>) -> Result<Url> {
        let bucket_url = self.location.bucket_url();
        let mut url = Url::parse(&bucket_url)
            .map_err(|e| ClipError::invalid_url(&bucket_url, e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("list-type", "2")
                .append_pair("prefix", prefix);
            if delimited {
                query.append_pair("delimiter", "/");
            }
            if let Some(token) = continuation {
                query.append_pair("continuation-token", token);
            }
        }
        Ok(url)
    }

    async fn fetch_page(
        &self,
        prefix: &str,
        delimited: bool,
        continuation: Option<&str>,
    ) -> Result<ListBucketResult> {
        let url = self.list_url(prefix, delimited, continuation)?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClipError::http_status(status, url.as_str(), "folder listing"));
        }
        let body = response.text().await?;
        parse_listing(&body)
    }

    /// Every page of a listing, following continuation tokens.
    async fn fetch_all_pages(&self, prefix: &str, delimited: bool) -> Result<Vec<ListBucketResult>> {
        let mut pages = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut page = self
                .fetch_page(prefix, delimited, continuation.as_deref())
                .await?;
            let next = match (page.is_truncated, page.next_continuation_token.take()) {
                (true, Some(token)) => Some(token),
                (true, None) => {
                    return Err(ClipError::listing(
                        "truncated listing without a continuation token",
                    ));
                }
                (false, _) => None,
            };
            pages.push(page);
            match next {
                Some(token) => continuation = Some(token),
                None => return Ok(pages),
            }
        }
    }
}

fn parse_listing(body: &str) -> Result<ListBucketResult> {
    quick_xml::de::from_str(body)
        .map_err(|e| ClipError::listing(format!("malformed ListObjectsV2 response: {e}")))
}

/// Last path component of a common prefix, parsed as a folder timestamp.
fn folder_from_prefix(prefix: &str) -> Option<i64> {
    prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|last| last.parse().ok())
}

#[async_trait]
impl FolderIndex for S3FolderIndex {
    #[instrument(skip(self), level = "debug")]
    async fn list_folders(&self) -> Result<Vec<i64>> {
        let mut folders = Vec::new();
        let pages = self
            .fetch_all_pages(&self.location.hls_prefix(), true)
            .await?;

        for entry in pages.iter().flat_map(|page| &page.common_prefixes) {
            match folder_from_prefix(&entry.prefix) {
                Some(folder) => folders.push(folder),
                None => warn!(prefix = %entry.prefix, "Skipping non-numeric archive folder"),
            }
        }

        folders.sort_unstable();
        folders.dedup();
        debug!(
            bucket = %self.location.bucket(),
            node = %self.location.node(),
            count = folders.len(),
            "Listed archive folders"
        );
        Ok(folders)
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_folder_objects(&self, folder: i64) -> Result<Vec<String>> {
        let prefix = format!("{}{folder}/", self.location.hls_prefix());
        let keys: Vec<String> = self
            .fetch_all_pages(&prefix, false)
            .await?
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|entry| entry.key)
            .collect();
        debug!(folder, count = keys.len(), "Listed folder objects");
        Ok(keys)
    }

    async fn latest_folder(&self) -> Result<Option<i64>> {
        let url = self.location.latest_url();
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClipError::http_status(status, url, "latest folder"));
        }
        let body = response.text().await?;
        match body.trim().parse() {
            Ok(folder) => Ok(Some(folder)),
            Err(_) => {
                warn!(content = %body.trim(), "latest.txt does not hold a folder timestamp");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_keeps_containing_folder_and_later_ones() {
        let folders = [400, 1000, 1600, 2200, 2800];
        assert_eq!(select_folders_in_range(&folders, 1100, 2200), vec![1000, 1600, 2200]);
        assert_eq!(select_folders_in_range(&folders, 1000, 1120), vec![1000]);
        assert_eq!(select_folders_in_range(&folders, 1000, 1660), vec![1000, 1600]);
    }

    #[test]
    fn range_before_first_folder_starts_at_first_inside_window() {
        let folders = [1000, 1600];
        assert_eq!(select_folders_in_range(&folders, 500, 1200), vec![1000]);
        assert!(select_folders_in_range(&folders, 100, 200).is_empty());
    }

    #[test]
    fn range_sorts_unordered_input() {
        let folders = [1600, 400, 1000];
        assert_eq!(select_folders_in_range(&folders, 500, 2000), vec![400, 1000, 1600]);
    }

    #[test]
    fn parses_listing_page() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>audio-orcasound-net</Name>
  <Prefix>rpi_orcasound_lab/hls/</Prefix>
  <KeyCount>3</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <Delimiter>/</Delimiter>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>token-1</NextContinuationToken>
  <CommonPrefixes><Prefix>rpi_orcasound_lab/hls/1600/</Prefix></CommonPrefixes>
  <CommonPrefixes><Prefix>rpi_orcasound_lab/hls/1000/</Prefix></CommonPrefixes>
  <CommonPrefixes><Prefix>rpi_orcasound_lab/hls/backup/</Prefix></CommonPrefixes>
</ListBucketResult>"#;

        let page = parse_listing(body).unwrap();
        assert!(page.is_truncated);
        assert_eq!(page.next_continuation_token.as_deref(), Some("token-1"));
        let folders: Vec<Option<i64>> = page
            .common_prefixes
            .iter()
            .map(|p| folder_from_prefix(&p.prefix))
            .collect();
        assert_eq!(folders, vec![Some(1600), Some(1000), None]);
    }

    #[test]
    fn parses_final_page_without_prefixes() {
        let body = r#"<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>"#;
        let page = parse_listing(body).unwrap();
        assert!(!page.is_truncated);
        assert!(page.common_prefixes.is_empty());
    }

    #[test]
    fn list_url_carries_prefix_and_token() {
        let location = StreamLocation::parse("https://s3.example.com/bucket/node_a").unwrap();
        crate::config::install_rustls_provider();
        let index = S3FolderIndex::new(Client::new(), location);
        let url = index.list_url("node_a/hls/", true, Some("abc")).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(url.path(), "/bucket");
        assert!(pairs.contains(&("prefix".into(), "node_a/hls/".into())));
        assert!(pairs.contains(&("continuation-token".into(), "abc".into())));
        assert!(pairs.contains(&("list-type".into(), "2".into())));
        assert!(pairs.contains(&("delimiter".into(), "/".into())));

        let url = index.list_url("node_a/hls/1000/", false, None).unwrap();
        assert!(url.query_pairs().all(|(k, _)| k != "delimiter" && k != "continuation-token"));
    }

    #[test]
    fn parses_object_keys_of_undelimited_listing() {
        let body = r#"<ListBucketResult>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>node/hls/1000/live.m3u8</Key><Size>812</Size></Contents>
  <Contents><Key>node/hls/1000/live000.ts</Key><Size>188000</Size></Contents>
  <Contents><Key>node/hls/1000/live001.ts</Key><Size>188000</Size></Contents>
</ListBucketResult>"#;
        let page = parse_listing(body).unwrap();
        let keys: Vec<&str> = page.contents.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "node/hls/1000/live.m3u8",
                "node/hls/1000/live000.ts",
                "node/hls/1000/live001.ts"
            ]
        );
        assert!(page.common_prefixes.is_empty());
    }
}
