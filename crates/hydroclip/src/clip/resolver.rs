//! Mapping a clip start time onto a folder's segment indices.

use crate::archive::Segment;

/// Segment length assumed when a playlist reports no usable durations.
pub const FALLBACK_SEGMENT_DURATION: f64 = 1.0;

/// Half-open `[start_index, end_index)` range inside one folder.
///
/// Indices are not clamped; `end_index` may exceed the playlist length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub start_index: i64,
    pub end_index: i64,
    pub target_segment_duration: f64,
    /// No segment had a usable duration and the fallback was used.
    pub degraded: bool,
}

impl Resolution {
    pub fn segments_per_clip(&self) -> i64 {
        self.end_index - self.start_index
    }
}

/// Mean of the strictly positive durations, or the fallback.
pub fn target_segment_duration(segments: &[Segment]) -> (f64, bool) {
    let (sum, count) = segments
        .iter()
        .filter_map(Segment::valid_duration)
        .fold((0.0_f64, 0_usize), |(sum, count), d| (sum + d, count + 1));

    if count == 0 {
        (FALLBACK_SEGMENT_DURATION, true)
    } else {
        (sum / count as f64, false)
    }
}

/// Largest index a playlist position may take.
const MAX_SEGMENT_INDEX: f64 = u32::MAX as f64;

/// `ceil(seconds / segment_duration)` as an index, `None` when the quotient
/// is not a representable playlist position.
pub fn ceil_index(seconds: f64, segment_duration: f64) -> Option<i64> {
    let index = (seconds / segment_duration).ceil();
    (index.is_finite() && index.abs() <= MAX_SEGMENT_INDEX).then_some(index as i64)
}

/// Resolve the segment range for a clip starting at `clip_start`.
///
/// `clip_start` is expected to be at or after `folder_start`; callers clamp
/// before calling. Returns `None` when the playlist's durations are so small
/// that the indices fall outside any real playlist.
pub fn resolve(
    folder_start: i64,
    clip_start: i64,
    segments: &[Segment],
    target_clip_duration: f64,
) -> Option<Resolution> {
    let (target_segment_duration, degraded) = target_segment_duration(segments);

    let segments_per_clip = ceil_index(target_clip_duration, target_segment_duration)?;
    let offset_seconds = clip_start.checked_sub(folder_start)? as f64;
    let start_index = ceil_index(offset_seconds, target_segment_duration)?;

    Some(Resolution {
        start_index,
        end_index: start_index.checked_add(segments_per_clip)?,
        target_segment_duration,
        degraded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(n: usize, d: f64) -> Vec<Segment> {
        (0..n)
            .map(|i| Segment::new(format!("live{i:03}.ts"), "https://h/b/n/hls/0/", Some(d)))
            .collect()
    }

    #[test]
    fn uniform_segments_follow_ceiling_rule() {
        let segments = uniform(60, 10.0);
        let r = resolve(1000, 1095, &segments, 60.0).unwrap();
        assert_eq!(r.start_index, 10); // ceil(95 / 10)
        assert_eq!(r.end_index, 16);
        assert_eq!(r.target_segment_duration, 10.0);
        assert!(!r.degraded);
    }

    #[test]
    fn clip_at_folder_start_begins_at_zero() {
        let r = resolve(1000, 1000, &uniform(60, 1.0), 60.0).unwrap();
        assert_eq!((r.start_index, r.end_index), (0, 60));
        assert_eq!(r.segments_per_clip(), 60);
    }

    #[test]
    fn mean_ignores_missing_and_non_positive_durations() {
        let mut segments = uniform(4, 4.0);
        segments.push(Segment::new("x.ts", "b/", Some(0.0)));
        segments.push(Segment::new("y.ts", "b/", None));
        segments.push(Segment::new("z.ts", "b/", Some(-3.0)));
        let (d, degraded) = target_segment_duration(&segments);
        assert_eq!(d, 4.0);
        assert!(!degraded);
    }

    #[test]
    fn all_zero_durations_fall_back_to_one_second() {
        let segments = uniform(10, 0.0);
        let r = resolve(0, 5, &segments, 3.0).unwrap();
        assert!(r.degraded);
        assert_eq!(r.target_segment_duration, FALLBACK_SEGMENT_DURATION);
        assert_eq!((r.start_index, r.end_index), (5, 8));
    }

    #[test]
    fn empty_playlist_is_degraded_not_a_panic() {
        let r = resolve(0, 0, &[], 60.0).unwrap();
        assert!(r.degraded);
        assert_eq!((r.start_index, r.end_index), (0, 60));
    }

    #[test]
    fn end_index_may_overrun_playlist() {
        let r = resolve(0, 50, &uniform(60, 1.0), 60.0).unwrap();
        assert_eq!((r.start_index, r.end_index), (50, 110));
    }

    #[test]
    fn fractional_durations_round_up() {
        let r = resolve(0, 7, &uniform(30, 2.5), 10.0).unwrap();
        assert_eq!(r.start_index, 3); // ceil(2.8)
        assert_eq!(r.end_index, 7); // + ceil(4.0)
    }

    #[test]
    fn tiny_durations_do_not_resolve() {
        let segments = uniform(10, 1e-30);
        assert!(resolve(0, 10, &segments, 60.0).is_none());
    }

    #[test]
    fn ceil_index_rejects_unrepresentable_quotients() {
        assert_eq!(ceil_index(95.0, 10.0), Some(10));
        assert_eq!(ceil_index(1.0, 1e-300), None);
        assert_eq!(ceil_index(f64::NAN, 1.0), None);
    }
}
