//! Driving a date range end to end, one clip at a time or as a batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    archive::{
        FolderIndex, HttpPlaylistSource, HttpSegmentFetcher, PlaylistSource, S3FolderIndex,
        SegmentFetcher, StreamLocation,
    },
    clip::{
        self, BatchPlan, BatchPlanner, BatchReport, Clip, ClipAssembler, Step, TraversalCursor,
        TraversalState,
    },
    config::{ClipStreamConfig, FfmpegConfig, HttpConfig},
    error::{ClipError, Result},
    naming::ClipNamer,
    transcode::{FfmpegTranscoder, Transcoder},
};

/// The external services a stream talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub folders: Arc<dyn FolderIndex>,
    pub playlists: Arc<dyn PlaylistSource>,
    pub fetcher: Arc<dyn SegmentFetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    /// Station name used in artifact filenames.
    pub station_id: String,
}

impl Collaborators {
    /// S3 listing, HTTP playlist and segment fetches, ffmpeg transcoding.
    pub fn connect(
        stream_base: &str,
        http: &HttpConfig,
        ffmpeg: FfmpegConfig,
    ) -> Result<Self> {
        let location = StreamLocation::parse(stream_base)?;
        let client = http.create_client()?;

        Ok(Self {
            folders: Arc::new(S3FolderIndex::new(client.clone(), location.clone())),
            playlists: Arc::new(HttpPlaylistSource::new(client.clone(), location.clone())),
            fetcher: Arc::new(HttpSegmentFetcher::new(client).with_timeout(http.timeout)),
            transcoder: Arc::new(FfmpegTranscoder::new(ffmpeg)),
            station_id: location.station_id(),
        })
    }
}

pub(crate) async fn prepare_output_dir(config: &ClipStreamConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|source| ClipError::OutputDirectory {
            path: config.output_dir.clone(),
            source,
        })
}

/// Sequential and batch clip extraction over a fixed window.
pub struct DateRangeStream {
    config: ClipStreamConfig,
    cursor: TraversalCursor,
    playlists: Arc<dyn PlaylistSource>,
    assembler: Arc<ClipAssembler>,
}

impl DateRangeStream {
    pub async fn new(config: ClipStreamConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        prepare_output_dir(&config).await?;

        let folders = collaborators
            .folders
            .folders_in_range(config.start_unix_time, config.end_unix_time)
            .await?;
        info!(
            start = config.start_unix_time,
            end = config.end_unix_time,
            folders = folders.len(),
            "Resolved archive folders for window"
        );

        let state = TraversalState::new(
            folders,
            config.start_unix_time,
            config.end_unix_time,
            config.polling_interval_secs,
        )?;

        let namer = ClipNamer::new(collaborators.station_id, config.timezone);
        let assembler = ClipAssembler::new(
            collaborators.fetcher,
            collaborators.transcoder,
            namer,
            &config,
        );

        Ok(Self {
            cursor: TraversalCursor::new(state, collaborators.playlists.clone()),
            playlists: collaborators.playlists,
            assembler: Arc::new(assembler),
            config,
        })
    }

    /// Builds a stream against the real archive at `stream_base`.
    pub async fn connect(
        stream_base: &str,
        config: ClipStreamConfig,
        http: &HttpConfig,
        ffmpeg: FfmpegConfig,
    ) -> Result<Self> {
        let ffmpeg = ffmpeg.with_overwrite(config.overwrite_output);
        let collaborators = Collaborators::connect(stream_base, http, ffmpeg)?;
        Self::new(config, collaborators).await
    }

    pub fn config(&self) -> &ClipStreamConfig {
        &self.config
    }

    pub fn state(&self) -> &TraversalState {
        self.cursor.state()
    }

    pub fn valid_folders(&self) -> &[i64] {
        self.cursor.state().valid_folders()
    }

    pub fn is_stream_over(&self) -> bool {
        self.cursor.is_stream_over()
    }

    /// Advance one step and assemble the clip it resolves to, if any.
    ///
    /// `expected` is the wall-clock time this clip is meant to represent. In
    /// real-time mode the call waits for it; in every mode the artifact is
    /// renamed and relabelled after it.
    pub async fn next_clip(&mut self, expected: Option<DateTime<Utc>>) -> Result<Option<Clip>> {
        if self.config.real_time
            && let Some(expected) = expected
        {
            wait_until(expected).await;
        }

        let plan = match self.cursor.advance().await {
            Step::Emit(plan) => plan,
            Step::Skip(reason) => {
                debug!(?reason, "No clip at this step");
                return Ok(None);
            }
        };

        let clip = self.assembler.assemble(&plan).await?;
        match expected {
            Some(expected) => self.assembler.relabel(clip, expected).await.map(Some),
            None => Ok(Some(clip)),
        }
    }

    /// Plan the remaining window without touching the live cursor.
    pub async fn plan_batch(&self) -> BatchPlan {
        BatchPlanner::new(self.playlists.clone())
            .plan(self.cursor.snapshot())
            .await
    }

    /// Assemble every remaining clip, folders in parallel. Per-clip failures
    /// are collected in the report.
    pub async fn all_clips(&self) -> Result<BatchReport> {
        let plan = self.plan_batch().await;
        info!(clips = plan.len(), "Starting batch");
        Ok(clip::execute(plan, self.assembler.clone(), self.config.batch_concurrency).await)
    }
}

async fn wait_until(expected: DateTime<Utc>) {
    let now = Utc::now();
    match (expected - now).to_std() {
        Ok(delay) => {
            debug!(until = %expected, delay_ms = delay.as_millis() as u64, "Waiting for clip time");
            tokio::time::sleep(delay).await;
        }
        Err(_) => {
            warn!(
                expected = %expected,
                late_by_secs = (now - expected).num_seconds(),
                "Clip is already late, not waiting"
            );
        }
    }
}
