use std::ops::Range;

use crate::shared::video_metadata::VideoMetadata;

/// Maps a video onto evenly spaced sample slots and splits them across workers.
///
/// Slot `i` sits at `i * interval` seconds and decodes source frame
/// `ceil(i * fps * interval)`.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSampler {
    fps: f64,
    interval_secs: f64,
    slot_count: usize,
}

impl TimeSampler {
    pub fn new(metadata: &VideoMetadata, interval_secs: u32) -> Self {
        let interval = interval_secs as f64;
        let slot_count = if metadata.fps > 0.0 && interval > 0.0 {
            (metadata.total_frames as f64 / metadata.fps / interval).floor() as usize
        } else {
            0
        };
        Self {
            fps: metadata.fps,
            interval_secs: interval,
            slot_count,
        }
    }

    /// Number of slots, `floor(frames / fps / interval)`.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Frames between two consecutive slots.
    pub fn stride(&self) -> f64 {
        self.fps * self.interval_secs
    }

    pub fn frame_number(&self, slot: usize) -> usize {
        (slot as f64 * self.stride()).ceil() as usize
    }

    /// Splits `[0, slot_count)` into `workers` contiguous ranges in time order.
    ///
    /// Every range holds `slot_count / workers` slots; the remainder goes to
    /// the last range. With fewer slots than workers the leading ranges are
    /// empty.
    pub fn partition(&self, workers: usize) -> Vec<Range<usize>> {
        let workers = workers.max(1);
        let chunk = self.slot_count / workers;
        let remainder = self.slot_count % workers;

        (0..workers)
            .map(|i| {
                let start = chunk * i;
                let len = if i == workers - 1 {
                    chunk + remainder
                } else {
                    chunk
                };
                start..start + len
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn metadata(fps: f64, total_frames: usize) -> VideoMetadata {
        VideoMetadata {
            name: "clip".to_string(),
            fps,
            total_frames,
            width: 640,
            height: 360,
        }
    }

    #[test]
    fn test_two_minute_video_at_ten_second_interval() {
        let sampler = TimeSampler::new(&metadata(30.0, 3600), 10);
        assert_eq!(sampler.slot_count(), 12);
        assert_eq!(sampler.partition(4), vec![0..3, 3..6, 6..9, 9..12]);
    }

    #[test]
    fn test_remainder_goes_to_last_worker() {
        let sampler = TimeSampler::new(&metadata(25.0, 25 * 14), 1);
        assert_eq!(sampler.slot_count(), 14);
        assert_eq!(sampler.partition(4), vec![0..3, 3..6, 6..9, 9..14]);
    }

    #[test]
    fn test_fewer_slots_than_workers() {
        let sampler = TimeSampler::new(&metadata(30.0, 90), 1);
        assert_eq!(sampler.partition(8).last(), Some(&(0..3)));
        assert!(sampler.partition(8)[..7].iter().all(|r| r.is_empty()));
    }

    #[test]
    fn test_zero_workers_treated_as_one() {
        let sampler = TimeSampler::new(&metadata(30.0, 300), 1);
        assert_eq!(sampler.partition(0), vec![0..10]);
    }

    #[test]
    fn test_partial_trailing_interval_is_dropped() {
        // 119.9 seconds at a 10 s interval -> 11 full slots.
        let sampler = TimeSampler::new(&metadata(30.0, 3597), 10);
        assert_eq!(sampler.slot_count(), 11);
    }

    #[test]
    fn test_zero_fps_has_no_slots() {
        let sampler = TimeSampler::new(&metadata(0.0, 100), 3);
        assert_eq!(sampler.slot_count(), 0);
        assert!(sampler.partition(3).iter().all(|r| r.is_empty()));
    }

    #[rstest]
    #[case(30.0, 0, 0)]
    #[case(30.0, 1, 30)]
    #[case(29.97, 1, 30)]
    #[case(29.97, 3, 90)]
    #[case(23.976, 2, 48)]
    fn test_frame_number_rounds_up(
        #[case] fps: f64,
        #[case] slot: usize,
        #[case] expected: usize,
    ) {
        let sampler = TimeSampler::new(&metadata(fps, 100_000), 1);
        assert_eq!(sampler.frame_number(slot), expected);
    }

    #[test]
    fn test_partitions_are_disjoint_ordered_and_exhaustive() {
        for total_secs in [0usize, 1, 7, 59, 120, 3601] {
            for workers in 1..=16 {
                let sampler = TimeSampler::new(&metadata(30.0, total_secs * 30), 1);
                let ranges = sampler.partition(workers);
                assert_eq!(ranges.len(), workers);

                let mut next = 0;
                for r in &ranges {
                    assert_eq!(r.start, next, "ranges must be contiguous");
                    next = r.end;
                }
                assert_eq!(next, sampler.slot_count());

                let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
                let base = sampler.slot_count() / workers;
                assert!(sizes[..workers - 1].iter().all(|&s| s == base));
            }
        }
    }
}
