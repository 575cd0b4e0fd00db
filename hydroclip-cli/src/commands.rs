use chrono::{DateTime, TimeDelta, Utc};
use hydroclip_engine::{
    Clip, ClipError, ClipStreamConfig, DateRangeStream, FfmpegConfig, HttpConfig, LiveStream,
    archive::{FolderVerifier, PlaylistDiscrepancy},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};

fn print_clip(clip: &Clip) {
    println!("{}\t{}", clip.label, clip.path.display());
}

/// Sequential traversal of a window. Transcode failures are reported and
/// skipped; the run fails at the end if any clip failed.
pub async fn run_range(
    stream_base: &str,
    config: ClipStreamConfig,
    http: &HttpConfig,
    ffmpeg: FfmpegConfig,
    token: CancellationToken,
) -> Result<()> {
    let real_time = config.real_time;
    let interval = TimeDelta::seconds(config.polling_interval_secs as i64);
    let mut stream = DateRangeStream::connect(stream_base, config, http, ffmpeg).await?;
    info!(folders = stream.valid_folders().len(), "Stream ready");

    let anchor = Utc::now();
    // Clips attempted so far; paces the expected time in real-time mode.
    let mut attempts: i32 = 0;
    let mut failed = 0usize;

    while !stream.is_stream_over() {
        if token.is_cancelled() {
            info!("Interrupted, stopping before the next clip");
            break;
        }

        let expected: Option<DateTime<Utc>> =
            real_time.then(|| anchor + interval * attempts);

        match stream.next_clip(expected).await {
            Ok(Some(clip)) => {
                print_clip(&clip);
                attempts += 1;
            }
            Ok(None) => {}
            Err(e @ ClipError::Transcode { .. }) => {
                error!(error = %e, "Clip failed, continuing with the next one");
                failed += 1;
                attempts += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(clips = attempts, failed, "Range finished");
    if failed > 0 {
        return Err(AppError::ClipsFailed {
            failed,
            total: attempts as usize,
        });
    }
    Ok(())
}

/// Plan the window and process folders in parallel.
pub async fn run_batch(
    stream_base: &str,
    config: ClipStreamConfig,
    http: &HttpConfig,
    ffmpeg: FfmpegConfig,
) -> Result<()> {
    let stream = DateRangeStream::connect(stream_base, config, http, ffmpeg).await?;
    let report = stream.all_clips().await?.into_sorted();

    for clip in &report.clips {
        print_clip(clip);
    }
    for failure in &report.failures {
        warn!(
            folder = failure.folder,
            clip_start = failure.clip_start_time,
            error = %failure.error,
            "Clip failed"
        );
    }

    if !report.is_complete() {
        return Err(AppError::ClipsFailed {
            failed: report.failures.len(),
            total: report.clips.len() + report.failures.len(),
        });
    }
    Ok(())
}

/// Follow a live node until interrupted or `max_clips` is reached.
pub async fn run_live(
    stream_base: &str,
    config: ClipStreamConfig,
    http: &HttpConfig,
    ffmpeg: FfmpegConfig,
    max_clips: Option<usize>,
    token: CancellationToken,
) -> Result<()> {
    let interval = TimeDelta::seconds(config.polling_interval_secs as i64);
    let live = LiveStream::connect(stream_base, &config, http, ffmpeg).await?;

    let mut clip_end = Utc::now();
    let mut emitted = 0usize;

    while !live.is_stream_over() && max_clips.is_none_or(|max| emitted < max) {
        let step = tokio::select! {
            _ = token.cancelled() => {
                info!("Interrupted, leaving live stream");
                break;
            }
            step = live.next_clip(clip_end) => step,
        };

        match step {
            Ok(step) => {
                if let Some(clip) = &step.clip {
                    print_clip(clip);
                    emitted += 1;
                }
                // Without progress, retry relative to now instead of spinning.
                clip_end = if step.clip.is_none() && step.next_clip_end <= clip_end {
                    clip_end.max(Utc::now())
                } else {
                    step.next_clip_end
                };
            }
            Err(e) => match live_retry_end(&e, clip_end, interval, Utc::now()) {
                Some(next) => {
                    error!(error = %e, "Live step failed, retrying");
                    clip_end = next;
                }
                None => return Err(e.into()),
            },
        }
    }

    info!(clips = emitted, "Live stream stopped");
    Ok(())
}

/// Check each folder's playlist against the bucket, one line per folder.
pub async fn run_verify(stream_base: &str, folders: &[i64], http: &HttpConfig) -> Result<()> {
    let verifier = FolderVerifier::connect(stream_base, http)?;
    let mut inconsistent = 0usize;

    for &folder in folders {
        let discrepancy = verifier.verify_folder(folder).await?;
        if !discrepancy.is_consistent() {
            inconsistent += 1;
        }
        println!("{}", verify_line(&discrepancy));
    }

    if inconsistent > 0 {
        return Err(AppError::FoldersInconsistent {
            inconsistent,
            total: folders.len(),
        });
    }
    Ok(())
}

fn verify_line(d: &PlaylistDiscrepancy) -> String {
    if d.is_consistent() {
        return format!("{}\tok", d.folder);
    }
    format!(
        "{}\tmissing={}\textra={}",
        d.folder,
        d.missing_files.join(","),
        d.extra_files.join(",")
    )
}

/// Clip end to resume from after a failed live step, `None` when the error
/// should end the run. A failed clip is skipped; transient failures retry
/// from `now` so the next step waits instead of spinning.
fn live_retry_end(
    err: &ClipError,
    clip_end: DateTime<Utc>,
    interval: TimeDelta,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match err {
        ClipError::Transcode { .. } => Some(clip_end + interval),
        e if e.is_transient() => Some(clip_end.max(now)),
        _ => None,
    }
}
