use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use tracing::{error, info, instrument, warn};

use super::cursor::ClipPlan;
use crate::{
    archive::{Segment, SegmentFetcher},
    config::ClipStreamConfig,
    error::{ClipError, Result},
    naming::{ClipNamer, clip_label, utc_from_unix},
    transcode::Transcoder,
};

/// A finished audio artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub path: PathBuf,
    /// Unix seconds of the first sample the clip was resolved for.
    pub clip_start_time: i64,
    /// ISO-8601 UTC start label.
    pub label: String,
    pub folder: i64,
    pub segments_fetched: usize,
    pub segments_missing: usize,
}

/// Fetches, orders, concatenates and transcodes the segments of one plan.
pub struct ClipAssembler {
    fetcher: Arc<dyn SegmentFetcher>,
    transcoder: Arc<dyn Transcoder>,
    namer: ClipNamer,
    output_dir: PathBuf,
    failed_dir: PathBuf,
    audio_extension: String,
    fetch_concurrency: usize,
    overwrite: bool,
}

impl ClipAssembler {
    pub fn new(
        fetcher: Arc<dyn SegmentFetcher>,
        transcoder: Arc<dyn Transcoder>,
        namer: ClipNamer,
        config: &ClipStreamConfig,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            namer,
            output_dir: config.output_dir.clone(),
            failed_dir: config.failed_dir(),
            audio_extension: config.audio_extension.clone(),
            fetch_concurrency: config.fetch_concurrency.max(1),
            overwrite: config.overwrite_output,
        }
    }

    fn artifact_path(&self, name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{name}.{}", self.audio_extension))
    }

    /// Fetch the plan's segments concurrently and return them in playlist
    /// order. Failed segments are logged and left out.
    pub async fn fetch_ordered(&self, plan: &ClipPlan) -> (Bytes, usize, usize) {
        // Owned urls keep the stream free of borrowed segments so it can run
        // inside spawned tasks.
        let urls: Vec<(usize, Result<String>)> = plan
            .segment_range()
            .iter()
            .map(Segment::url)
            .enumerate()
            .collect();

        let mut results: Vec<(usize, Result<Bytes>)> = stream::iter(urls)
            .map(|(i, url)| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let result = match url {
                        Ok(url) => fetcher.fetch(&url).await,
                        Err(e) => Err(e),
                    };
                    (i, result)
                }
            })
            .buffer_unordered(self.fetch_concurrency)
            .collect()
            .await;

        results.sort_unstable_by_key(|(i, _)| *i);

        let mut blob = BytesMut::new();
        let mut fetched = 0;
        let mut missing = 0;
        for (i, result) in results {
            match result {
                Ok(bytes) => {
                    blob.extend_from_slice(&bytes);
                    fetched += 1;
                }
                Err(e) => {
                    missing += 1;
                    let segment = &plan.segments[plan.start_index + i];
                    warn!(
                        folder = plan.folder,
                        segment = %segment.uri,
                        error = %e,
                        "Skipping segment that failed to download"
                    );
                }
            }
        }

        (blob.freeze(), fetched, missing)
    }

    #[instrument(skip(self, plan), fields(folder = plan.folder, clip_start = plan.clip_start_time))]
    pub async fn assemble(&self, plan: &ClipPlan) -> Result<Clip> {
        let name = self.namer.name_for_unix(plan.clip_start_time)?;
        let output = self.artifact_path(&name);

        let (blob, segments_fetched, segments_missing) = self.fetch_ordered(plan).await;
        if segments_fetched == 0 {
            warn!(clip = %name, "No segments could be fetched, transcoding an empty stream");
        }

        if let Err(e) = self.transcoder.convert(blob.clone(), &output).await {
            return Err(self.preserve_failed_blob(&name, &blob, e).await);
        }

        let clip = Clip {
            path: output,
            clip_start_time: plan.clip_start_time,
            label: clip_label(utc_from_unix(plan.clip_start_time)?),
            folder: plan.folder,
            segments_fetched,
            segments_missing,
        };
        info!(
            path = %clip.path.display(),
            segments = segments_fetched,
            missing = segments_missing,
            "Clip written"
        );
        Ok(clip)
    }

    async fn preserve_failed_blob(&self, name: &str, blob: &Bytes, err: ClipError) -> ClipError {
        let path = self.failed_dir.join(format!("{name}.ts"));
        let written = async {
            tokio::fs::create_dir_all(&self.failed_dir).await?;
            tokio::fs::write(&path, blob).await
        }
        .await;

        match written {
            Ok(()) => {
                error!(clip = %name, preserved = %path.display(), error = %err, "Transcode failed");
                err.with_preserved_blob(path)
            }
            Err(io) => {
                error!(clip = %name, error = %err, io_error = %io, "Transcode failed and the input could not be preserved");
                err
            }
        }
    }

    /// Rename an artifact to the name derived from `expected` and relabel it.
    pub async fn relabel(&self, mut clip: Clip, expected: DateTime<Utc>) -> Result<Clip> {
        let target = self.artifact_path(&self.namer.name_for(expected));
        if target != clip.path {
            if !self.overwrite && path_exists(&target).await? {
                return Err(ClipError::Io {
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("{} already exists", target.display()),
                    ),
                });
            }
            tokio::fs::rename(&clip.path, &target).await?;
            clip.path = target;
        }
        clip.label = clip_label(expected);
        Ok(clip)
    }
}

async fn path_exists(path: &Path) -> Result<bool> {
    Ok(tokio::fs::try_exists(path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingTranscoder, ScriptedFetcher};

    fn plan(n: usize, start: usize, end: usize) -> ClipPlan {
        let segments: Arc<[Segment]> = (0..n)
            .map(|i| Segment::new(format!("live{i:03}.ts"), "https://h/b/n/hls/0/", Some(1.0)))
            .collect();
        ClipPlan {
            folder: 0,
            start_index: start,
            end_index: end,
            clip_start_time: 1_700_000_000,
            segments,
        }
    }

    fn assembler(
        fetcher: ScriptedFetcher,
        transcoder: RecordingTranscoder,
        dir: &Path,
        concurrency: usize,
    ) -> ClipAssembler {
        let config = ClipStreamConfig::builder()
            .output_dir(dir)
            .fetch_concurrency(concurrency)
            .build();
        ClipAssembler::new(
            Arc::new(fetcher),
            Arc::new(transcoder),
            ClipNamer::new("test-hydrophone", chrono_tz::America::Los_Angeles),
            &config,
        )
    }

    #[tokio::test]
    async fn fetch_keeps_playlist_order_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::echo_uri().with_reverse_delays();
        let a = assembler(fetcher, RecordingTranscoder::default(), dir.path(), 8);

        let (blob, fetched, missing) = a.fetch_ordered(&plan(6, 1, 5)).await;
        assert_eq!(&blob[..], b"live001.tslive002.tslive003.tslive004.ts");
        assert_eq!((fetched, missing), (4, 0));
    }

    #[tokio::test]
    async fn assemble_runs_inside_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::echo_uri();
        let a = Arc::new(assembler(
            fetcher.clone(),
            RecordingTranscoder::default(),
            dir.path(),
            4,
        ));

        let plan = plan(5, 1, 4);
        let handle = tokio::spawn({
            let a = Arc::clone(&a);
            async move { a.assemble(&plan).await }
        });
        let clip = handle.await.unwrap().unwrap();
        assert_eq!(clip.segments_fetched, 3);
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn assemble_names_artifact_from_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = RecordingTranscoder::default();
        let a = assembler(ScriptedFetcher::echo_uri(), transcoder.clone(), dir.path(), 2);

        let clip = a.assemble(&plan(3, 0, 3)).await.unwrap();
        assert_eq!(
            clip.path,
            dir.path().join("test-hydrophone_2023_11_14_14_13_20_PST.wav")
        );
        assert_eq!(clip.label, "2023-11-14T22:13:20Z");
        assert_eq!(transcoder.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_transcode_preserves_blob() {
        let dir = tempfile::tempdir().unwrap();
        let a = assembler(
            ScriptedFetcher::echo_uri(),
            RecordingTranscoder::failing(),
            dir.path(),
            2,
        );

        let err = a.assemble(&plan(2, 0, 2)).await.unwrap_err();
        let path = match err {
            ClipError::Transcode {
                preserved_at: Some(path),
                ..
            } => path,
            other => panic!("expected preserved transcode failure, got {other:?}"),
        };
        assert_eq!(
            path,
            dir.path().join("failed").join("test-hydrophone_2023_11_14_14_13_20_PST.ts")
        );
        assert_eq!(std::fs::read(path).unwrap(), b"live000.tslive001.ts");
    }

    #[tokio::test]
    async fn relabel_renames_to_expected_time() {
        let dir = tempfile::tempdir().unwrap();
        let a = assembler(
            ScriptedFetcher::echo_uri(),
            RecordingTranscoder::default(),
            dir.path(),
            2,
        );
        let clip = a.assemble(&plan(2, 0, 2)).await.unwrap();
        let expected = utc_from_unix(1_700_000_060).unwrap();

        let clip = a.relabel(clip, expected).await.unwrap();
        assert_eq!(
            clip.path,
            dir.path().join("test-hydrophone_2023_11_14_14_14_20_PST.wav")
        );
        assert_eq!(clip.label, "2023-11-14T22:14:20Z");
        assert!(clip.path.exists());
    }
}
