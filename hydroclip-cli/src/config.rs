use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chrono_tz::Tz;
use hydroclip_engine::{ClipStreamConfig, FfmpegConfig, HttpConfig};
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Defaults read from `--config`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub interval: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub failed_dir: Option<PathBuf>,
    /// IANA zone name for clip filenames
    pub timezone: Option<String>,
    pub audio_extension: Option<String>,
    pub fetch_concurrency: Option<usize>,
    pub batch_concurrency: Option<usize>,
    pub overwrite: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub ffmpeg: Option<PathBuf>,
    /// Output arguments handed to ffmpeg before the output path
    pub ffmpeg_args: Vec<String>,
}

impl FileConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn timezone(&self) -> Result<Option<Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|e| AppError::Config(format!("unknown timezone `{name}`: {e}")))
            })
            .transpose()
    }

    /// Merge the file with command-line values. Flags win.
    pub fn stream_config(&self, flags: &StreamFlags) -> Result<ClipStreamConfig> {
        let mut config = ClipStreamConfig::default();

        if let Some(interval) = flags.interval.or(self.interval) {
            config.polling_interval_secs = interval;
        }
        if let Some(dir) = flags.output_dir.clone().or_else(|| self.output_dir.clone()) {
            config.output_dir = dir;
        }
        config.failed_clip_dir = self.failed_dir.clone();
        if let Some(tz) = self.timezone()? {
            config.timezone = tz;
        }
        if let Some(ext) = &self.audio_extension {
            config.audio_extension = ext.clone();
        }
        if let Some(n) = self.fetch_concurrency {
            config.fetch_concurrency = n;
        }
        if let Some(n) = self.batch_concurrency {
            config.batch_concurrency = n;
        }
        config.overwrite_output = flags.overwrite || self.overwrite.unwrap_or(false);
        config.real_time = flags.real_time;
        config.start_unix_time = flags.start;
        config.end_unix_time = flags.end;

        Ok(config)
    }

    pub fn http_config(&self, timeout_flag: Option<u64>) -> HttpConfig {
        let mut http = HttpConfig::default();
        if let Some(secs) = timeout_flag.or(self.timeout_secs) {
            http.timeout = Duration::from_secs(secs);
        }
        if let Some(ua) = &self.user_agent {
            http.user_agent = ua.clone();
        }
        http
    }

    pub fn ffmpeg_config(&self, binary_flag: Option<&Path>) -> FfmpegConfig {
        let mut ffmpeg = FfmpegConfig::default();
        if let Some(binary) = binary_flag.or(self.ffmpeg.as_deref()) {
            ffmpeg = ffmpeg.with_binary(binary);
        }
        ffmpeg.extra_args = self.ffmpeg_args.clone();
        ffmpeg
    }
}

/// Command-line values that feed [`ClipStreamConfig`].
#[derive(Debug, Clone, Default)]
pub struct StreamFlags {
    pub interval: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub overwrite: bool,
    pub real_time: bool,
    pub start: i64,
    pub end: i64,
}
