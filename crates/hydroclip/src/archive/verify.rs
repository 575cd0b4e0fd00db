//! Cross-checking a folder's playlist against what the bucket actually holds.

use std::{collections::BTreeSet, sync::Arc};

use tracing::{info, warn};

use super::{
    FolderIndex, HttpPlaylistSource, PlaylistSource, S3FolderIndex, Segment, StreamLocation,
};
use crate::{config::HttpConfig, error::Result};

/// Segment files that disagree between `live.m3u8` and the bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistDiscrepancy {
    pub folder: i64,
    /// Listed in the playlist but absent from the bucket.
    pub missing_files: Vec<String>,
    /// Present in the bucket but not listed in the playlist.
    pub extra_files: Vec<String>,
}

impl PlaylistDiscrepancy {
    pub fn is_consistent(&self) -> bool {
        self.missing_files.is_empty() && self.extra_files.is_empty()
    }
}

fn file_name(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit('/').next().unwrap_or(path)
}

fn ts_names<'a>(paths: impl Iterator<Item = &'a str>) -> BTreeSet<&'a str> {
    paths
        .map(file_name)
        .filter(|name| name.ends_with(".ts"))
        .collect()
}

/// Compare `.ts` file names referenced by `segments` with those in `object_keys`.
pub fn compare_folder(
    folder: i64,
    segments: &[Segment],
    object_keys: &[String],
) -> PlaylistDiscrepancy {
    let referenced = ts_names(segments.iter().map(|s| s.uri.as_str()));
    let stored = ts_names(object_keys.iter().map(String::as_str));

    PlaylistDiscrepancy {
        folder,
        missing_files: referenced.difference(&stored).map(|s| (*s).to_owned()).collect(),
        extra_files: stored.difference(&referenced).map(|s| (*s).to_owned()).collect(),
    }
}

/// Checks archive folders for playlist entries without data and the reverse.
#[derive(Clone)]
pub struct FolderVerifier {
    folders: Arc<dyn FolderIndex>,
    playlists: Arc<dyn PlaylistSource>,
}

impl FolderVerifier {
    pub fn new(folders: Arc<dyn FolderIndex>, playlists: Arc<dyn PlaylistSource>) -> Self {
        Self { folders, playlists }
    }

    pub fn connect(stream_base: &str, http: &HttpConfig) -> Result<Self> {
        let location = StreamLocation::parse(stream_base)?;
        let client = http.create_client()?;
        Ok(Self::new(
            Arc::new(S3FolderIndex::new(client.clone(), location.clone())),
            Arc::new(HttpPlaylistSource::new(client, location)),
        ))
    }

    pub async fn verify_folder(&self, folder: i64) -> Result<PlaylistDiscrepancy> {
        let segments = self.playlists.load(folder).await?;
        let keys = self.folders.list_folder_objects(folder).await?;
        let discrepancy = compare_folder(folder, &segments, &keys);

        if discrepancy.is_consistent() {
            info!(folder, segments = segments.len(), "Playlist matches stored segments");
        } else {
            warn!(
                folder,
                missing = discrepancy.missing_files.len(),
                extra = discrepancy.extra_files.len(),
                "Playlist and stored segments disagree"
            );
        }
        Ok(discrepancy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeFolderIndex, ScriptedPlaylists, uniform_segments};

    #[test]
    fn matching_folder_is_consistent() {
        let segments = uniform_segments(1000, 2, 10.0);
        let keys = vec![
            "node/hls/1000/live.m3u8".to_owned(),
            "node/hls/1000/live000.ts".to_owned(),
            "node/hls/1000/live001.ts".to_owned(),
        ];
        let d = compare_folder(1000, &segments, &keys);
        assert!(d.is_consistent());
    }

    #[test]
    fn reports_missing_and_extra_files_sorted() {
        let segments = uniform_segments(1000, 3, 10.0);
        let keys = vec![
            "node/hls/1000/live000.ts".to_owned(),
            "node/hls/1000/live007.ts".to_owned(),
            "node/hls/1000/live005.ts".to_owned(),
        ];
        let d = compare_folder(1000, &segments, &keys);
        assert_eq!(d.missing_files, vec!["live001.ts", "live002.ts"]);
        assert_eq!(d.extra_files, vec!["live005.ts", "live007.ts"]);
        assert!(!d.is_consistent());
    }

    #[test]
    fn absolute_segment_uris_compare_by_file_name() {
        let segments = vec![Segment::new(
            "https://cdn.example.com/node/hls/1000/live000.ts?sig=1",
            "https://h/b/n/hls/1000/",
            Some(10.0),
        )];
        let d = compare_folder(1000, &segments, &["node/hls/1000/live000.ts".to_owned()]);
        assert!(d.is_consistent());
    }

    #[tokio::test]
    async fn verify_folder_combines_playlist_and_listing() {
        let index = FakeFolderIndex::new(vec![1000])
            .with_objects(1000, ["node/hls/1000/live000.ts", "node/hls/1000/live.m3u8"]);
        let playlists = ScriptedPlaylists::uniform(&[1000], 2, 10.0);
        let verifier = FolderVerifier::new(Arc::new(index), Arc::new(playlists));

        let d = verifier.verify_folder(1000).await.unwrap();
        assert_eq!(d.folder, 1000);
        assert_eq!(d.missing_files, vec!["live001.ts"]);
        assert!(d.extra_files.is_empty());
    }

    #[tokio::test]
    async fn verify_folder_fails_without_playlist() {
        let verifier = FolderVerifier::new(
            Arc::new(FakeFolderIndex::new(vec![1000])),
            Arc::new(ScriptedPlaylists::new()),
        );
        assert!(verifier.verify_folder(1000).await.is_err());
    }
}
