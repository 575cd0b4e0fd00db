//! In-memory collaborators for exercising traversal and assembly without a
//! network or an ffmpeg binary.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    archive::{FolderIndex, PlaylistSource, Segment, SegmentFetcher},
    error::{ClipError, Result},
    transcode::Transcoder,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Segments `live000.ts ..` with a fixed duration under a fake folder URL.
pub fn uniform_segments(folder: i64, count: usize, duration: f64) -> Arc<[Segment]> {
    let base = format!("https://archive.test/bucket/node/hls/{folder}/");
    (0..count)
        .map(|i| Segment::new(format!("live{i:03}.ts"), base.clone(), Some(duration)))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct FakeFolderIndex {
    folders: Vec<i64>,
    latest: Option<i64>,
    objects: HashMap<i64, Vec<String>>,
}

impl FakeFolderIndex {
    pub fn new(folders: impl Into<Vec<i64>>) -> Self {
        let folders = folders.into();
        let latest = folders.iter().max().copied();
        Self {
            folders,
            latest,
            ..Self::default()
        }
    }

    pub fn with_latest(mut self, latest: Option<i64>) -> Self {
        self.latest = latest;
        self
    }

    /// Object keys stored under `folder`.
    pub fn with_objects<I, S>(mut self, folder: i64, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.objects
            .insert(folder, keys.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl FolderIndex for FakeFolderIndex {
    async fn list_folders(&self) -> Result<Vec<i64>> {
        let mut folders = self.folders.clone();
        folders.sort_unstable();
        Ok(folders)
    }

    async fn list_folder_objects(&self, folder: i64) -> Result<Vec<String>> {
        Ok(self.objects.get(&folder).cloned().unwrap_or_default())
    }

    async fn latest_folder(&self) -> Result<Option<i64>> {
        Ok(self.latest)
    }
}

/// Playlists keyed by folder. Unknown folders fail to load.
#[derive(Debug, Default)]
pub struct ScriptedPlaylists {
    playlists: Mutex<HashMap<i64, Arc<[Segment]>>>,
    loads: Mutex<HashMap<i64, usize>>,
}

impl ScriptedPlaylists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uniform(folders: &[i64], count: usize, duration: f64) -> Self {
        let this = Self::new();
        for &folder in folders {
            this.set(folder, uniform_segments(folder, count, duration));
        }
        this
    }

    pub fn with(self, folder: i64, segments: Arc<[Segment]>) -> Self {
        self.set(folder, segments);
        self
    }

    pub fn set(&self, folder: i64, segments: Arc<[Segment]>) {
        lock(&self.playlists).insert(folder, segments);
    }

    pub fn load_count(&self, folder: i64) -> usize {
        lock(&self.loads).get(&folder).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PlaylistSource for ScriptedPlaylists {
    async fn load(&self, folder: i64) -> Result<Arc<[Segment]>> {
        *lock(&self.loads).entry(folder).or_default() += 1;
        lock(&self.playlists)
            .get(&folder)
            .cloned()
            .ok_or_else(|| ClipError::playlist(folder, "no such playlist"))
    }
}

/// Answers every URL with the bytes of its last path component.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFetcher {
    failing: Arc<HashSet<String>>,
    reverse_delays: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFetcher {
    pub fn echo_uri() -> Self {
        Self::default()
    }

    /// Fail any URL ending with one of `names`.
    pub fn failing_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing = Arc::new(names.into_iter().map(Into::into).collect());
        self
    }

    /// Lower-numbered segments finish last.
    pub fn with_reverse_delays(mut self) -> Self {
        self.reverse_delays = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

fn last_component(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[async_trait]
impl SegmentFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        lock(&self.calls).push(url.to_owned());
        let name = last_component(url);

        if self.reverse_delays {
            let number: u64 = name
                .chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(100u64.saturating_sub(number * 10))).await;
        }

        if self.failing.contains(name) {
            return Err(ClipError::segment_fetch(url, "scripted failure"));
        }
        Ok(Bytes::copy_from_slice(name.as_bytes()))
    }
}

/// Writes the blob verbatim to the output path and records each call.
#[derive(Debug, Clone, Default)]
pub struct RecordingTranscoder {
    fail: bool,
    calls: Arc<Mutex<Vec<(PathBuf, Bytes)>>>,
}

impl RecordingTranscoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, Bytes)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Transcoder for RecordingTranscoder {
    async fn convert(&self, blob: Bytes, output: &Path) -> Result<()> {
        lock(&self.calls).push((output.to_path_buf(), blob.clone()));
        if self.fail {
            let clip = output
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(ClipError::transcode(clip, "scripted failure"));
        }
        tokio::fs::write(output, &blob).await?;
        Ok(())
    }
}
