//! Read-ahead window math
//!
//! Windows are listed in the order requests should be issued: the current
//! position first, then ahead in the playback direction, then behind.

use crate::time::{TimePoint, TimeRange};

/// Playback direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Playback {
    /// Paused; the window still reads ahead as if playing forward
    #[default]
    Stop,
    Forward,
    Reverse,
}

impl Playback {
    /// +1 for forward reading, -1 for reverse
    pub fn direction(&self) -> i64 {
        match self {
            Playback::Stop | Playback::Forward => 1,
            Playback::Reverse => -1,
        }
    }
}

/// Frames between window entries: `max(1, floor(|speed|))`
pub fn frame_step(speed: f64) -> i64 {
    if !speed.is_finite() {
        return 1;
    }
    (speed.abs().floor() as i64).max(1)
}

/// Video times wanted around `position`.
///
/// Times are expressed at the range's rate and stepped by
/// [`frame_step`]. Forward playback covers `[P - B*step, P + A*step]`;
/// reverse mirrors it to `[P - A*step, P + B*step]`. Times outside `range`
/// are dropped.
pub fn video_window(
    position: TimePoint,
    playback: Playback,
    speed: f64,
    read_ahead: usize,
    read_behind: usize,
    range: TimeRange,
) -> Vec<TimePoint> {
    if !range.is_valid() || !position.is_valid() {
        return Vec::new();
    }
    let rate = range.start().rate();
    let current = range.clamp(position).rescaled_to(rate);
    let step = frame_step(speed) * playback.direction();

    let ahead = (1..=read_ahead as i64).map(|i| current.offset(i.saturating_mul(step)));
    let behind = (1..=read_behind as i64).map(|i| current.offset(i.saturating_mul(-step)));
    std::iter::once(current)
        .chain(ahead)
        .chain(behind)
        .filter(|t| range.contains(*t))
        .collect()
}

/// Whole seconds of audio wanted around `position`, in request order
pub fn audio_window(
    position: TimePoint,
    playback: Playback,
    read_ahead_seconds: usize,
    read_behind_seconds: usize,
    range: TimeRange,
) -> Vec<i64> {
    if !range.is_valid() || !position.is_valid() {
        return Vec::new();
    }
    let current = range.clamp(position).floor_seconds();
    let dir = playback.direction();

    let ahead = (1..=read_ahead_seconds as i64).map(|i| current + i * dir);
    let behind = (1..=read_behind_seconds as i64).map(|i| current - i * dir);
    std::iter::once(current)
        .chain(ahead)
        .chain(behind)
        .filter(|&s| overlaps_second(range, s))
        .collect()
}

fn overlaps_second(range: TimeRange, seconds: i64) -> bool {
    TimePoint::new(seconds + 1, 1) > range.start() && TimePoint::new(seconds, 1) < range.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> TimeRange {
        TimeRange::new(TimePoint::new(0, 24), TimePoint::new(240, 24))
    }

    fn frames(times: &[TimePoint]) -> Vec<i64> {
        times.iter().map(|t| t.rescaled_to(24).value()).collect()
    }

    #[test]
    fn test_forward_window() {
        let times = video_window(TimePoint::new(10, 24), Playback::Forward, 1.0, 3, 2, range());
        assert_eq!(frames(&times), vec![10, 11, 12, 13, 9, 8]);
    }

    #[test]
    fn test_reverse_window_mirrors() {
        let times = video_window(TimePoint::new(10, 24), Playback::Reverse, 1.0, 3, 2, range());
        assert_eq!(frames(&times), vec![10, 9, 8, 7, 11, 12]);
    }

    #[test]
    fn test_stop_reads_forward() {
        let stop = video_window(TimePoint::new(10, 24), Playback::Stop, 1.0, 2, 1, range());
        let forward = video_window(TimePoint::new(10, 24), Playback::Forward, 1.0, 2, 1, range());
        assert_eq!(stop, forward);
    }

    #[test]
    fn test_speed_widens_step() {
        let times = video_window(TimePoint::new(10, 24), Playback::Forward, 2.5, 2, 1, range());
        assert_eq!(frames(&times), vec![10, 12, 14, 8]);
        assert_eq!(frame_step(0.25), 1);
        assert_eq!(frame_step(-3.0), 3);
        assert_eq!(frame_step(f64::NAN), 1);
    }

    #[test]
    fn test_huge_speed_stays_in_range() {
        let times = video_window(TimePoint::new(10, 24), Playback::Forward, 1e30, 3, 3, range());
        assert_eq!(frames(&times), vec![10]);
    }

    #[test]
    fn test_window_clipped_to_range() {
        let times = video_window(TimePoint::new(1, 24), Playback::Forward, 1.0, 2, 3, range());
        assert_eq!(frames(&times), vec![1, 2, 3, 0]);
        let end = video_window(TimePoint::new(239, 24), Playback::Forward, 1.0, 2, 1, range());
        assert_eq!(frames(&end), vec![239, 238]);
    }

    #[test]
    fn test_position_at_other_rate() {
        // 0.5 s at 1000 ticks per second lands on frame 12
        let times = video_window(TimePoint::new(500, 1000), Playback::Forward, 1.0, 0, 0, range());
        assert_eq!(times, vec![TimePoint::new(12, 24)]);
    }

    #[test]
    fn test_audio_window() {
        let position = TimePoint::new(60, 24); // 2.5 s
        assert_eq!(audio_window(position, Playback::Forward, 2, 1, range()), vec![2, 3, 4, 1]);
        assert_eq!(audio_window(position, Playback::Reverse, 2, 1, range()), vec![2, 1, 0, 3]);
        let end = TimePoint::new(239, 24);
        assert_eq!(audio_window(end, Playback::Forward, 2, 0, range()), vec![9]);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(video_window(TimePoint::INVALID, Playback::Forward, 1.0, 2, 2, range()).is_empty());
        assert!(audio_window(TimePoint::new(0, 24), Playback::Forward, 1, 1, TimeRange::default()).is_empty());
    }
}
