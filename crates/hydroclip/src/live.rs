//! Tailing the newest folder of a live node.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::{
    archive::{FolderIndex, PlaylistSource, Segment},
    clip::{Clip, ClipAssembler, ClipPlan, resolver},
    config::{ClipStreamConfig, FfmpegConfig, HttpConfig},
    error::{ClipError, Result},
    naming::ClipNamer,
    stream::{Collaborators, prepare_output_dir},
};

/// Delay between a folder's nominal start and its first audio.
pub const DEFAULT_AUDIO_OFFSET_SECS: i64 = 2;

/// Audio required beyond one interval before a folder is read.
const FRESHNESS_MARGIN_SECS: i64 = 20;

/// Extra wait past the clip end so its last segment is uploaded.
const UPLOAD_SETTLE_SECS: i64 = 10;

/// Result of one live step.
#[derive(Debug)]
pub struct LiveStep {
    pub clip: Option<Clip>,
    /// Pass back in as `current_clip_end` on the next call.
    pub next_clip_end: DateTime<Utc>,
}

/// Where the next live clip sits inside the newest folder.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveWindow {
    pub start_index: i64,
    pub end_index: i64,
    /// Unix seconds, possibly fractional.
    pub clip_end: f64,
}

/// Compute the live window ending at `current_clip_end`. `None` when the
/// folder does not yet hold enough audio or its durations are unusable.
pub fn live_window(
    folder: i64,
    segments: &[Segment],
    current_clip_end: i64,
    polling_interval_secs: i64,
    audio_offset_secs: i64,
) -> Option<LiveWindow> {
    let time_since_folder_start = current_clip_end - folder - audio_offset_secs;
    if time_since_folder_start < polling_interval_secs + FRESHNESS_MARGIN_SECS {
        return None;
    }

    let (d, _) = resolver::target_segment_duration(segments);
    let segments_per_clip = resolver::ceil_index(polling_interval_secs as f64, d)?;
    let end_index = resolver::ceil_index(time_since_folder_start as f64, d)?;
    let start_index = end_index.checked_sub(segments_per_clip)?.max(0);

    Some(LiveWindow {
        start_index,
        end_index,
        clip_end: (folder + audio_offset_secs) as f64 + end_index as f64 * d,
    })
}

fn utc_from_fractional(secs: f64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
        .ok_or_else(|| ClipError::internal(format!("timestamp {secs} is out of range")))
}

pub struct LiveStream {
    folders: Arc<dyn FolderIndex>,
    playlists: Arc<dyn PlaylistSource>,
    assembler: ClipAssembler,
    polling_interval_secs: i64,
    audio_offset_secs: i64,
}

impl LiveStream {
    /// Only the interval, output and naming fields of `config` apply.
    pub async fn new(config: &ClipStreamConfig, collaborators: Collaborators) -> Result<Self> {
        if config.polling_interval_secs == 0 {
            return Err(ClipError::configuration(
                "polling interval must be greater than zero",
            ));
        }
        prepare_output_dir(config).await?;

        let polling_interval_secs = i64::try_from(config.polling_interval_secs)
            .map_err(|_| ClipError::configuration("polling interval is too large"))?;
        let namer = ClipNamer::new(collaborators.station_id, config.timezone);

        Ok(Self {
            folders: collaborators.folders,
            playlists: collaborators.playlists,
            assembler: ClipAssembler::new(
                collaborators.fetcher,
                collaborators.transcoder,
                namer,
                config,
            ),
            polling_interval_secs,
            audio_offset_secs: DEFAULT_AUDIO_OFFSET_SECS,
        })
    }

    pub async fn connect(
        stream_base: &str,
        config: &ClipStreamConfig,
        http: &HttpConfig,
        ffmpeg: FfmpegConfig,
    ) -> Result<Self> {
        let ffmpeg = ffmpeg.with_overwrite(config.overwrite_output);
        let collaborators = Collaborators::connect(stream_base, http, ffmpeg)?;
        Self::new(config, collaborators).await
    }

    /// A live node never finishes.
    pub fn is_stream_over(&self) -> bool {
        false
    }

    /// Wait for `current_clip_end` to pass, then cut the newest interval of
    /// audio from the latest folder.
    pub async fn next_clip(&self, current_clip_end: DateTime<Utc>) -> Result<LiveStep> {
        let until = current_clip_end + TimeDelta::seconds(UPLOAD_SETTLE_SECS);
        if let Ok(delay) = (until - Utc::now()).to_std() {
            debug!(delay_ms = delay.as_millis() as u64, "Waiting for live audio");
            tokio::time::sleep(delay).await;
        }

        let unchanged = LiveStep {
            clip: None,
            next_clip_end: current_clip_end,
        };

        let Some(folder) = self.folders.latest_folder().await? else {
            warn!("No latest folder published, will retry");
            return Ok(unchanged);
        };

        let segments = match self.playlists.load(folder).await {
            Ok(segments) if !segments.is_empty() => segments,
            Ok(_) => {
                warn!(folder, "Latest folder has an empty playlist, will retry");
                return Ok(unchanged);
            }
            Err(e) => {
                warn!(folder, error = %e, "Latest playlist unavailable, will retry");
                return Ok(unchanged);
            }
        };

        let Some(window) = live_window(
            folder,
            &segments,
            current_clip_end.timestamp(),
            self.polling_interval_secs,
            self.audio_offset_secs,
        ) else {
            info!(folder, "Not enough audio in the newest folder yet");
            return Ok(unchanged);
        };

        let next_clip_end = utc_from_fractional(window.clip_end)?;
        if window.end_index > segments.len() as i64 {
            debug!(
                folder,
                end_index = window.end_index,
                available = segments.len(),
                "Playlist has not caught up with the clip end"
            );
            return Ok(LiveStep {
                clip: None,
                next_clip_end,
            });
        }

        let plan = ClipPlan {
            folder,
            start_index: window.start_index as usize,
            end_index: window.end_index as usize,
            clip_start_time: window.clip_end.floor() as i64 - self.polling_interval_secs,
            segments,
        };
        let clip = self.assembler.assemble(&plan).await?;

        Ok(LiveStep {
            clip: Some(clip),
            next_clip_end,
        })
    }
}
