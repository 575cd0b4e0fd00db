use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "hydroclip",
    author,
    version,
    about = "Cut continuous audio clips out of archived hydrophone HLS streams",
    long_about = None
)]
pub struct Args {
    /// TOML file with default settings; flags override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// ffmpeg binary to use
    #[arg(long, global = true, env = "FFMPEG_PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract clips for a fixed time window
    Range {
        /// Stream base, e.g. https://s3-us-west-2.amazonaws.com/audio-orcasound-net/rpi_orcasound_lab
        stream_base: String,

        /// Window start (unix seconds)
        #[arg(long)]
        start: i64,

        /// Window end (unix seconds)
        #[arg(long)]
        end: i64,

        /// Clip length in seconds [default: 60]
        #[arg(long)]
        interval: Option<u64>,

        /// Directory for finished clips
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Replace clips that already exist
        #[arg(long)]
        overwrite: bool,

        /// Emit clips at wall-clock pace
        #[arg(long, conflicts_with = "batch")]
        real_time: bool,

        /// Plan the whole window up front and process folders in parallel
        #[arg(long)]
        batch: bool,
    },

    /// Follow the newest folder of a live node
    Live {
        stream_base: String,

        /// Clip length in seconds [default: 60]
        #[arg(long)]
        interval: Option<u64>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Stop after this many clips
        #[arg(long)]
        max_clips: Option<usize>,
    },

    /// Compare folder playlists with the segments stored in the bucket
    Verify {
        stream_base: String,

        /// Folder timestamps to check
        #[arg(required = true)]
        folders: Vec<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_range_with_global_flags() {
        let args = Args::try_parse_from([
            "hydroclip",
            "range",
            "https://s3.example.com/bucket/node",
            "--start",
            "1000",
            "--end",
            "1120",
            "--batch",
            "--verbose",
            "--timeout",
            "5",
        ])
        .unwrap();

        assert!(args.verbose);
        assert_eq!(args.timeout, Some(5));
        match args.command {
            Commands::Range {
                start,
                end,
                batch,
                interval,
                ..
            } => {
                assert_eq!((start, end), (1000, 1120));
                assert!(batch);
                assert_eq!(interval, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn real_time_conflicts_with_batch() {
        let result = Args::try_parse_from([
            "hydroclip",
            "range",
            "https://s3.example.com/bucket/node",
            "--start",
            "1",
            "--end",
            "2",
            "--batch",
            "--real-time",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn verify_requires_a_folder() {
        let args = Args::try_parse_from([
            "hydroclip",
            "verify",
            "https://s3.example.com/bucket/node",
            "1000",
            "1600",
        ])
        .unwrap();
        match args.command {
            Commands::Verify { folders, .. } => assert_eq!(folders, vec![1000, 1600]),
            other => panic!("unexpected command {other:?}"),
        }

        let result =
            Args::try_parse_from(["hydroclip", "verify", "https://s3.example.com/bucket/node"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_live() {
        let args = Args::try_parse_from([
            "hydroclip",
            "live",
            "https://s3.example.com/bucket/node",
            "--max-clips",
            "3",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Commands::Live {
                max_clips: Some(3),
                ..
            }
        ));
    }
}
