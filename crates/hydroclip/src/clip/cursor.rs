//! Sequential traversal of the folder list.
//!
//! [`TraversalState`] holds the position and applies the boundary rules to a
//! loaded playlist. [`TraversalCursor`] pairs it with a playlist source and is
//! the only thing that mutates live state; batch planning works on a clone.

use std::sync::Arc;

use tracing::{debug, warn};

use super::resolver::{self, Resolution};
use crate::{
    archive::{PlaylistSource, Segment},
    error::{ClipError, Result},
};

/// One clip's worth of work inside a single folder.
#[derive(Debug, Clone)]
pub struct ClipPlan {
    pub folder: i64,
    pub start_index: usize,
    pub end_index: usize,
    pub clip_start_time: i64,
    pub segments: Arc<[Segment]>,
}

impl ClipPlan {
    /// Segments `[start_index, end_index)` in playlist order.
    pub fn segment_range(&self) -> &[Segment] {
        &self.segments[self.start_index..self.end_index]
    }

    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a step produced no clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The window is exhausted or every folder has been visited.
    StreamOver,
    /// The playlist failed to load or listed no segments.
    FolderUnavailable { folder: i64 },
    /// The clip ran past the end of a folder that is not the last one.
    FolderOverrun { folder: i64 },
    /// The last folder has no segments left at the cursor.
    DataExhausted { folder: i64 },
}

/// Outcome of one traversal step.
#[derive(Debug, Clone)]
pub enum Step {
    Emit(ClipPlan),
    Skip(SkipReason),
}

impl Step {
    pub fn into_plan(self) -> Option<ClipPlan> {
        match self {
            Step::Emit(plan) => Some(plan),
            Step::Skip(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalState {
    valid_folders: Vec<i64>,
    current_folder_index: usize,
    current_clip_start_time: i64,
    start_time: i64,
    end_time: i64,
    polling_interval_secs: i64,
    is_end_of_stream: bool,
}

impl TraversalState {
    /// Fails when no folders are given or the interval is not positive.
    pub fn new(
        mut valid_folders: Vec<i64>,
        start_time: i64,
        end_time: i64,
        polling_interval_secs: u64,
    ) -> Result<Self> {
        valid_folders.sort_unstable();
        valid_folders.dedup();
        if valid_folders.is_empty() {
            return Err(ClipError::NoFoldersInRange {
                start: start_time,
                end: end_time,
            });
        }
        let polling_interval_secs = i64::try_from(polling_interval_secs)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| {
                ClipError::configuration(format!(
                    "invalid polling interval {polling_interval_secs}"
                ))
            })?;

        Ok(Self {
            valid_folders,
            current_folder_index: 0,
            current_clip_start_time: start_time,
            start_time,
            end_time,
            polling_interval_secs,
            is_end_of_stream: false,
        })
    }

    pub fn valid_folders(&self) -> &[i64] {
        &self.valid_folders
    }

    pub fn current_folder_index(&self) -> usize {
        self.current_folder_index
    }

    pub fn current_clip_start_time(&self) -> i64 {
        self.current_clip_start_time
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.is_end_of_stream
    }

    pub fn is_stream_over(&self) -> bool {
        self.current_clip_start_time >= self.end_time || self.is_end_of_stream
    }

    fn is_last_folder(&self) -> bool {
        self.current_folder_index + 1 >= self.valid_folders.len()
    }

    /// Folder the next step reads from. Marks end of stream once the folder
    /// list is exhausted.
    pub fn pending_folder(&mut self) -> Option<i64> {
        if self.is_stream_over() {
            return None;
        }
        match self.valid_folders.get(self.current_folder_index) {
            Some(&folder) => Some(folder),
            None => {
                self.is_end_of_stream = true;
                None
            }
        }
    }

    /// Move to the next folder, or end the stream when there is none.
    /// The clip time never moves backwards.
    fn skip_to_next_folder(&mut self) {
        self.current_folder_index += 1;
        match self.valid_folders.get(self.current_folder_index) {
            Some(&next) => {
                self.current_clip_start_time = self.current_clip_start_time.max(next);
            }
            None => self.is_end_of_stream = true,
        }
    }

    /// Apply the boundary rules to `folder`'s playlist. `None` means the
    /// playlist could not be loaded.
    pub fn apply(&mut self, folder: i64, segments: Option<Arc<[Segment]>>) -> Step {
        if self.is_stream_over() {
            return Step::Skip(SkipReason::StreamOver);
        }

        let segments = match segments {
            Some(segments) if !segments.is_empty() => segments,
            _ => {
                warn!(folder, "Folder has no usable playlist, moving to the next folder");
                self.skip_to_next_folder();
                return Step::Skip(SkipReason::FolderUnavailable { folder });
            }
        };

        if self.current_clip_start_time < folder {
            debug!(
                folder,
                clip_start = self.current_clip_start_time,
                "Clip start precedes folder start, snapping forward"
            );
            self.current_clip_start_time = folder;
            if self.is_stream_over() {
                return Step::Skip(SkipReason::StreamOver);
            }
        }

        let Some(Resolution {
            start_index,
            mut end_index,
            target_segment_duration,
            degraded,
        }) = resolver::resolve(
            folder,
            self.current_clip_start_time,
            &segments,
            self.polling_interval_secs as f64,
        )
        else {
            warn!(
                folder,
                "Playlist durations yield no usable segment range, moving to the next folder"
            );
            self.skip_to_next_folder();
            return Step::Skip(SkipReason::FolderUnavailable { folder });
        };

        if degraded {
            warn!(
                folder,
                fallback = target_segment_duration,
                "No valid segment durations in playlist, using fallback duration"
            );
        }

        let available = segments.len() as i64;
        if end_index > available {
            if self.is_last_folder() {
                end_index = available;
                if end_index <= start_index {
                    debug!(folder, start_index, available, "Last folder exhausted");
                    self.current_clip_start_time = self.current_clip_start_time.max(self.end_time);
                    return Step::Skip(SkipReason::DataExhausted { folder });
                }
            } else {
                warn!(
                    folder,
                    start_index,
                    end_index,
                    available,
                    "Clip overruns folder, dropping its tail and moving on"
                );
                self.skip_to_next_folder();
                return Step::Skip(SkipReason::FolderOverrun { folder });
            }
        }

        let clip_start_time = self.current_clip_start_time;
        self.current_clip_start_time += self.polling_interval_secs;

        // start_index >= 0 because the clip start was clamped to the folder.
        Step::Emit(ClipPlan {
            folder,
            start_index: start_index as usize,
            end_index: end_index as usize,
            clip_start_time,
            segments,
        })
    }
}

/// Live traversal driver that loads each folder on demand.
pub struct TraversalCursor {
    state: TraversalState,
    playlists: Arc<dyn PlaylistSource>,
}

impl TraversalCursor {
    pub fn new(state: TraversalState, playlists: Arc<dyn PlaylistSource>) -> Self {
        Self { state, playlists }
    }

    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    /// Copy of the current position for planning.
    pub fn snapshot(&self) -> TraversalState {
        self.state.clone()
    }

    pub fn is_stream_over(&self) -> bool {
        self.state.is_stream_over()
    }

    pub async fn advance(&mut self) -> Step {
        let Some(folder) = self.state.pending_folder() else {
            return Step::Skip(SkipReason::StreamOver);
        };

        let segments = match self.playlists.load(folder).await {
            Ok(segments) => Some(segments),
            Err(e) => {
                warn!(folder, error = %e, "Failed to load folder playlist");
                None
            }
        };

        self.state.apply(folder, segments)
    }
}
