//! Object-store side of the archive: where folders live, how they are
//! listed, how playlists and segments are fetched, and how a folder's
//! playlist is checked against its stored segments.

mod fetcher;
mod folder_index;
mod location;
mod playlist;
mod verify;

pub use fetcher::{HttpSegmentFetcher, SegmentFetcher};
pub use folder_index::{FolderIndex, S3FolderIndex, select_folders_in_range};
pub use location::StreamLocation;
pub use playlist::{HttpPlaylistSource, PlaylistSource, Segment, parse_media_segments};
pub use verify::{FolderVerifier, PlaylistDiscrepancy, compare_folder};
