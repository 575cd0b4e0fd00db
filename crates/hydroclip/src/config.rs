use std::{
    ffi::OsString,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use chrono_tz::Tz;
use reqwest::Client;
use tracing::debug;

use crate::error::{ClipError, Result};

pub const DEFAULT_USER_AGENT: &str = concat!("hydroclip/", env!("CARGO_PKG_VERSION"));

/// Nominal clip length used when nothing else is configured.
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 60;

/// Local zone that clip filenames are rendered in.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

pub const DEFAULT_AUDIO_EXTENSION: &str = "wav";

/// Environment variable consulted for the transcoder binary.
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";

/// Worker count derived from the host, never zero.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Options that shape traversal and clip output
#[derive(Debug, Clone)]
pub struct ClipStreamConfig {
    /// Nominal duration of each emitted clip, in seconds
    pub polling_interval_secs: u64,

    /// Start of the requested window (unix seconds)
    pub start_unix_time: i64,

    /// End of the requested window (unix seconds)
    pub end_unix_time: i64,

    /// Pace emission against the wall clock
    pub real_time: bool,

    /// Replace artifacts that already exist at the target path
    pub overwrite_output: bool,

    /// Directory that receives finished clips
    pub output_dir: PathBuf,

    /// Where blobs that failed to transcode are kept. Defaults to `<output_dir>/failed`.
    pub failed_clip_dir: Option<PathBuf>,

    /// Maximum in-flight segment fetches within one clip
    pub fetch_concurrency: usize,

    /// Maximum folders processed at once in batch mode
    pub batch_concurrency: usize,

    /// Zone used for human-readable clip names
    pub timezone: Tz,

    /// Extension of the transcoded artifact, without the dot
    pub audio_extension: String,
}

impl Default for ClipStreamConfig {
    fn default() -> Self {
        let parallelism = default_parallelism();
        Self {
            polling_interval_secs: DEFAULT_POLLING_INTERVAL_SECS,
            start_unix_time: 0,
            end_unix_time: 0,
            real_time: false,
            overwrite_output: false,
            output_dir: PathBuf::from("wav"),
            failed_clip_dir: None,
            fetch_concurrency: parallelism,
            batch_concurrency: parallelism,
            timezone: DEFAULT_TIMEZONE,
            audio_extension: DEFAULT_AUDIO_EXTENSION.to_owned(),
        }
    }
}

impl ClipStreamConfig {
    pub fn builder() -> ClipStreamConfigBuilder {
        ClipStreamConfigBuilder::new()
    }

    /// Directory for blobs kept after a failed transcode.
    pub fn failed_dir(&self) -> PathBuf {
        self.failed_clip_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("failed"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling_interval_secs == 0 {
            return Err(ClipError::configuration(
                "polling interval must be greater than zero",
            ));
        }
        if self.end_unix_time < self.start_unix_time {
            return Err(ClipError::configuration(format!(
                "end time {} precedes start time {}",
                self.end_unix_time, self.start_unix_time
            )));
        }
        if self.fetch_concurrency == 0 || self.batch_concurrency == 0 {
            return Err(ClipError::configuration("concurrency must be at least 1"));
        }
        if self.audio_extension.is_empty() || self.audio_extension.contains('.') {
            return Err(ClipError::configuration(format!(
                "invalid audio extension `{}`",
                self.audio_extension
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClipStreamConfigBuilder {
    config: ClipStreamConfig,
}

impl ClipStreamConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn polling_interval_secs(mut self, secs: u64) -> Self {
        self.config.polling_interval_secs = secs;
        self
    }

    pub fn window(mut self, start_unix_time: i64, end_unix_time: i64) -> Self {
        self.config.start_unix_time = start_unix_time;
        self.config.end_unix_time = end_unix_time;
        self
    }

    pub fn real_time(mut self, enabled: bool) -> Self {
        self.config.real_time = enabled;
        self
    }

    pub fn overwrite_output(mut self, enabled: bool) -> Self {
        self.config.overwrite_output = enabled;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn failed_clip_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.failed_clip_dir = Some(dir.into());
        self
    }

    pub fn fetch_concurrency(mut self, n: usize) -> Self {
        self.config.fetch_concurrency = n;
        self
    }

    pub fn batch_concurrency(mut self, n: usize) -> Self {
        self.config.batch_concurrency = n;
        self
    }

    pub fn timezone(mut self, tz: Tz) -> Self {
        self.config.timezone = tz;
        self
    }

    pub fn audio_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.audio_extension = ext.into();
        self
    }

    pub fn build(self) -> ClipStreamConfig {
        self.config
    }
}

/// HTTP client settings shared by listing, playlist and segment requests
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Overall timeout for a single request; zero disables it
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    pub user_agent: String,

    pub follow_redirects: bool,

    /// Maximum idle connections to keep per host
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            follow_redirects: true,
            pool_max_idle_per_host: 16,
        }
    }
}

impl HttpConfig {
    pub fn create_client(&self) -> Result<Client> {
        install_rustls_provider();

        let mut builder = Client::builder()
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .user_agent(&self.user_agent)
            .redirect(if self.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            });

        if !self.timeout.is_zero() {
            builder = builder.timeout(self.timeout);
        }

        if !self.connect_timeout.is_zero() {
            builder = builder.connect_timeout(self.connect_timeout);
        }

        Ok(builder.build()?)
    }
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Settings for the external ffmpeg process
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub binary: PathBuf,

    /// Pass `-y` instead of `-n`
    pub overwrite: bool,

    /// Restrict ffmpeg's own logging to errors
    pub quiet: bool,

    /// Extra output arguments placed between the input and the output path
    pub extra_args: Vec<String>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: Self::binary_from_env(std::env::var_os(FFMPEG_PATH_ENV)),
            overwrite: false,
            quiet: true,
            extra_args: Vec::new(),
        }
    }
}

impl FfmpegConfig {
    fn binary_from_env(value: Option<OsString>) -> PathBuf {
        value
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    pub fn with_binary(mut self, binary: impl AsRef<Path>) -> Self {
        self.binary = binary.as_ref().to_path_buf();
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_window_and_interval() {
        let config = ClipStreamConfig::builder()
            .window(1000, 1120)
            .polling_interval_secs(30)
            .output_dir("/tmp/clips")
            .build();

        assert_eq!(config.start_unix_time, 1000);
        assert_eq!(config.end_unix_time, 1120);
        assert_eq!(config.polling_interval_secs, 30);
        assert_eq!(config.failed_dir(), PathBuf::from("/tmp/clips/failed"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let config = ClipStreamConfig::builder().polling_interval_secs(0).build();
        assert!(matches!(
            config.validate(),
            Err(ClipError::Configuration { .. })
        ));
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let config = ClipStreamConfig::builder().window(2000, 1000).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_dotted_extension() {
        let config = ClipStreamConfig::builder().audio_extension(".wav").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn ffmpeg_binary_falls_back_when_env_missing_or_empty() {
        assert_eq!(FfmpegConfig::binary_from_env(None), PathBuf::from("ffmpeg"));
        assert_eq!(
            FfmpegConfig::binary_from_env(Some(OsString::new())),
            PathBuf::from("ffmpeg")
        );
        assert_eq!(
            FfmpegConfig::binary_from_env(Some(OsString::from("/opt/ffmpeg"))),
            PathBuf::from("/opt/ffmpeg")
        );
    }

    #[test]
    fn default_parallelism_is_positive() {
        assert!(default_parallelism() >= 1);
    }
}
