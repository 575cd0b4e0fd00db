use std::path::PathBuf;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("no archive folders between {start} and {end}")]
    NoFoldersInRange { start: i64, end: i64 },

    #[error("cannot prepare output directory {}: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("playlist error for folder {folder}: {reason}")]
    Playlist { folder: i64, reason: String },

    #[error("folder listing error: {reason}")]
    Listing { reason: String },

    #[error("segment fetch error for {url}: {reason}")]
    SegmentFetch { url: String, reason: String },

    #[error("transcode of {clip} failed: {reason}")]
    Transcode {
        clip: String,
        reason: String,
        preserved_at: Option<PathBuf>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl ClipError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn playlist(folder: i64, reason: impl Into<String>) -> Self {
        Self::Playlist {
            folder,
            reason: reason.into(),
        }
    }

    pub fn listing(reason: impl Into<String>) -> Self {
        Self::Listing {
            reason: reason.into(),
        }
    }

    pub fn segment_fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SegmentFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn transcode(clip: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transcode {
            clip: clip.into(),
            reason: reason.into(),
            preserved_at: None,
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Attach the location of a preserved input blob to a transcode failure.
    /// Other variants are returned unchanged.
    pub fn with_preserved_blob(self, path: PathBuf) -> Self {
        match self {
            Self::Transcode { clip, reason, .. } => Self::Transcode {
                clip,
                reason,
                preserved_at: Some(path),
            },
            other => other,
        }
    }

    /// Whether retrying the same operation later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NoFoldersInRange { .. }
            | Self::OutputDirectory { .. }
            | Self::InvalidUrl { .. }
            | Self::Configuration { .. }
            | Self::Transcode { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { .. }
            | Self::Playlist { .. }
            | Self::Listing { .. }
            | Self::SegmentFetch { .. }
            | Self::Io { .. }
            | Self::Internal { .. } => true,
        }
    }
}

pub type Result<T, E = ClipError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = ClipError::http_status(StatusCode::SERVICE_UNAVAILABLE, "u", "playlist");
        assert!(err.is_transient());
        let err = ClipError::http_status(StatusCode::NOT_FOUND, "u", "playlist");
        assert!(!err.is_transient());
    }

    #[test]
    fn preserved_blob_only_applies_to_transcode() {
        let err = ClipError::transcode("clip", "exit 1").with_preserved_blob("/tmp/x.ts".into());
        match err {
            ClipError::Transcode { preserved_at, .. } => {
                assert_eq!(preserved_at, Some(PathBuf::from("/tmp/x.ts")))
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = ClipError::configuration("bad").with_preserved_blob("/tmp/x.ts".into());
        assert!(matches!(err, ClipError::Configuration { .. }));
    }
}
