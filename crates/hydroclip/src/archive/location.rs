use url::Url;

use crate::error::{ClipError, Result};

/// Where one hydrophone node's archive lives in the object store.
///
/// Parsed from a base URL of the form `https://<endpoint>/<bucket>/<node>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLocation {
    endpoint: Url,
    bucket: String,
    node: String,
}

impl StreamLocation {
    pub fn parse(stream_base: &str) -> Result<Self> {
        let url = Url::parse(stream_base.trim_end_matches('/'))
            .map_err(|e| ClipError::invalid_url(stream_base, e.to_string()))?;

        if url.cannot_be_a_base() {
            return Err(ClipError::invalid_url(stream_base, "not a hierarchical URL"));
        }

        let parts: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let [bucket, node] = parts.as_slice() else {
            return Err(ClipError::invalid_url(
                stream_base,
                "expected exactly `<bucket>/<node>` in the path",
            ));
        };

        let mut endpoint = url.clone();
        endpoint.set_path("/");
        endpoint.set_query(None);
        endpoint.set_fragment(None);

        Ok(Self {
            endpoint,
            bucket: (*bucket).to_owned(),
            node: (*node).to_owned(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Node name as used in artifact names, `rpi_orcasound_lab` -> `rpi-orcasound-lab`.
    pub fn station_id(&self) -> String {
        self.node.replace('_', "-")
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}{}/{}",
            self.endpoint.as_str(),
            self.bucket,
            self.node
        )
    }

    pub fn bucket_url(&self) -> String {
        format!("{}{}", self.endpoint.as_str(), self.bucket)
    }

    pub fn hls_prefix(&self) -> String {
        format!("{}/hls/", self.node)
    }

    pub fn folder_base_url(&self, folder: i64) -> String {
        format!("{}/hls/{folder}/", self.base_url())
    }

    pub fn playlist_url(&self, folder: i64) -> String {
        format!("{}live.m3u8", self.folder_base_url(folder))
    }

    pub fn latest_url(&self) -> String {
        format!("{}/latest.txt", self.base_url())
    }
}
