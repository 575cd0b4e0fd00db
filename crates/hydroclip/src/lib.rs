//! Hydroclip engine: continuous audio clips from an archived hydrophone HLS stream.
//!
//! The archive is a set of time-bucketed folders, each with its own
//! `live.m3u8` playlist of transport-stream segments. Given a time window and
//! a clip duration, the engine works out which segments belong to each clip,
//! fetches them, concatenates them in playlist order and hands the result to
//! a transcoder.
//!
//! ## Component Overview
//!
//! - [`clip::resolver`]: clip start time to `[start, end)` segment indices
//! - [`clip::cursor`]: folder-crossing traversal state and its boundary rules
//! - [`clip::assembler`]: bounded concurrent fetch, ordered concatenation, transcode
//! - [`clip::planner`]: whole-window planning and folder-parallel execution
//! - [`archive`]: S3 listing, playlist and segment access, folder verification
//! - [`transcode`]: the ffmpeg transcoder
//! - [`DateRangeStream`] and [`LiveStream`]: the two drivers
//!
//! ## License
//!
//! `SPDX-License-Identifier: MIT OR Apache-2.0`
#![deny(unsafe_code)]

pub mod archive;
pub mod clip;
pub mod config;
pub mod error;
pub mod live;
pub mod naming;
pub mod stream;
pub mod transcode;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use clip::{BatchReport, Clip, ClipFailure};
pub use config::{ClipStreamConfig, FfmpegConfig, HttpConfig};
pub use error::{ClipError, Result};
pub use live::{LiveStep, LiveStream};
pub use stream::{Collaborators, DateRangeStream};
