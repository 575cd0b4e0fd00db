//! Turning a concatenated transport stream into the final audio artifact.

use std::{
    ffi::OsString,
    path::Path,
    process::Stdio,
    time::Instant,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, error};

use crate::{
    config::FfmpegConfig,
    error::{ClipError, Result},
};

/// Converts a transport-stream blob into an audio file at `output`.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, blob: Bytes, output: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    config: FfmpegConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostats".into(),
            "-loglevel".into(),
            if self.config.quiet { "error" } else { "warning" }.into(),
            if self.config.overwrite { "-y" } else { "-n" }.into(),
            "-i".into(),
            input.as_os_str().to_owned(),
        ];
        args.extend(self.config.extra_args.iter().map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }
}

fn clip_name(output: &Path) -> String {
    output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| output.display().to_string())
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, blob: Bytes, output: &Path) -> Result<()> {
        let clip = clip_name(output);

        let input = tempfile::Builder::new()
            .prefix("hydroclip-")
            .suffix(".ts")
            .tempfile()?;
        tokio::fs::write(input.path(), &blob).await?;

        let started = Instant::now();
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(self.build_args(input.path(), output))
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| {
            ClipError::transcode(
                &clip,
                format!("failed to spawn {}: {e}", self.config.binary.display()),
            )
        })?;

        let out = child
            .wait_with_output()
            .await
            .map_err(|e| ClipError::transcode(&clip, format!("failed to wait for ffmpeg: {e}")))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stderr = stderr.trim();
            error!(clip = %clip, code = ?out.status.code(), "ffmpeg failed: {stderr}");
            return Err(ClipError::transcode(
                &clip,
                format!(
                    "ffmpeg exited with code {}: {stderr}",
                    out.status.code().unwrap_or(-1)
                ),
            ));
        }

        debug!(
            clip = %clip,
            bytes = blob.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcoded clip"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn args_place_input_before_extra_and_output_last() {
        let config = FfmpegConfig {
            binary: PathBuf::from("ffmpeg"),
            overwrite: true,
            quiet: true,
            extra_args: vec!["-ac".into(), "1".into()],
        };
        let transcoder = FfmpegTranscoder::new(config);
        let args = strings(transcoder.build_args(Path::new("/tmp/in.ts"), Path::new("out/clip.wav")));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-nostats",
                "-loglevel",
                "error",
                "-y",
                "-i",
                "/tmp/in.ts",
                "-ac",
                "1",
                "out/clip.wav",
            ]
        );
    }

    #[test]
    fn args_refuse_overwrite_by_default() {
        let config = FfmpegConfig {
            binary: PathBuf::from("ffmpeg"),
            overwrite: false,
            quiet: false,
            extra_args: Vec::new(),
        };
        let args = strings(FfmpegTranscoder::new(config).build_args(Path::new("a.ts"), Path::new("b.wav")));
        assert!(args.contains(&"-n".to_owned()));
        assert!(args.contains(&"warning".to_owned()));
        assert!(!args.contains(&"-y".to_owned()));
    }

    #[tokio::test]
    async fn missing_binary_is_a_transcode_error() {
        let config = FfmpegConfig::default().with_binary("/nonexistent/hydroclip-ffmpeg");
        let dir = tempfile::tempdir().unwrap();
        let err = FfmpegTranscoder::new(config)
            .convert(Bytes::from_static(b"\x47"), &dir.path().join("node_x.wav"))
            .await
            .unwrap_err();
        match err {
            ClipError::Transcode { clip, .. } => assert_eq!(clip, "node_x"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
