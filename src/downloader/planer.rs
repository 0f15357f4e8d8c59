use std::fmt;

use crate::config::TransferConfig;
use crate::downloader::probe::RemoteFileMetadata;

/// Inclusive byte window `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    Whole,
    /// Contiguous, non-overlapping ranges covering the whole file in order.
    Split(Vec<ByteRange>),
}

impl fmt::Display for TransferPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPlan::Whole => write!(f, "single stream"),
            TransferPlan::Split(ranges) => write!(f, "{} ranges", ranges.len()),
        }
    }
}

/// Splits `[0, size)` into chunks of `ceil(size / segments)` bytes, the last
/// one clamped to `size - 1`. Yields fewer than `segments` ranges when the file
/// is too small to give each one a byte.
pub fn partition(size: u64, segments: usize) -> Vec<ByteRange> {
    if size == 0 || segments == 0 {
        return Vec::new();
    }
    let chunk = size.div_ceil(segments as u64);
    (0..segments as u64)
        .map(|i| i * chunk)
        .take_while(|start| *start < size)
        .map(|start| ByteRange {
            start,
            end: (start + chunk - 1).min(size - 1),
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct RangePlanner {
    min_split_kb: i64,
    split_count: usize,
}

impl RangePlanner {
    pub fn new(min_split_kb: i64, split_count: usize) -> Self {
        RangePlanner {
            min_split_kb,
            split_count,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.min_split_kb, config.split_count)
    }

    pub fn plan(&self, remote: &RemoteFileMetadata) -> TransferPlan {
        if self.split_count == 0
            || self.min_split_kb < 0
            || remote.size < (self.min_split_kb as u64).saturating_mul(1000)
            || !remote.accepts_ranges
        {
            return TransferPlan::Whole;
        }
        let ranges = partition(remote.size, self.split_count);
        if ranges.is_empty() {
            TransferPlan::Whole
        } else {
            TransferPlan::Split(ranges)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(size: u64, accepts_ranges: bool) -> RemoteFileMetadata {
        RemoteFileMetadata {
            size,
            md5: None,
            sha1: None,
            accepts_ranges,
        }
    }

    fn assert_partitions(size: u64, segments: usize) {
        let ranges = partition(size, segments);
        assert!(ranges.len() <= segments);
        let mut next = 0;
        for range in &ranges {
            assert_eq!(range.start, next, "gap or overlap for size={size} n={segments}");
            assert!(range.end >= range.start);
            next = range.end + 1;
        }
        assert_eq!(next, size, "coverage for size={size} n={segments}");
        assert_eq!(ranges.iter().map(ByteRange::len).sum::<u64>(), size);
    }

    #[test]
    fn test_partition_covers_exactly() {
        for segments in 1..=15 {
            for size in (0..200).chain([1000, 1001, 4095, 20_000_000, 20 * 1024 * 1024]) {
                assert_partitions(size, segments);
            }
        }
    }

    #[test]
    fn test_partition_last_range_shorter() {
        let ranges = partition(20_000_000, 3);
        assert_eq!(
            ranges,
            vec![
                ByteRange { start: 0, end: 6_666_666 },
                ByteRange { start: 6_666_667, end: 13_333_333 },
                ByteRange { start: 13_333_334, end: 19_999_999 },
            ]
        );
        assert_eq!(ranges[2].len(), 6_666_666);
        assert_eq!(ranges[0].header_value(), "bytes=0-6666666");
    }

    #[test]
    fn test_plan_whole_conditions() {
        let big = 20_000_000;
        assert_eq!(RangePlanner::new(5120, 0).plan(&remote(big, true)), TransferPlan::Whole);
        assert_eq!(RangePlanner::new(-1, 3).plan(&remote(big, true)), TransferPlan::Whole);
        assert_eq!(
            RangePlanner::new(5120, 3).plan(&remote(5_119_999, true)),
            TransferPlan::Whole
        );
        assert_eq!(RangePlanner::new(5120, 3).plan(&remote(big, false)), TransferPlan::Whole);
        assert_eq!(RangePlanner::new(0, 3).plan(&remote(0, true)), TransferPlan::Whole);
    }

    #[test]
    fn test_plan_split_at_threshold() {
        match RangePlanner::new(5120, 3).plan(&remote(5_120_000, true)) {
            TransferPlan::Split(ranges) => {
                assert_eq!(ranges.len(), 3);
                assert_eq!(ranges.last().unwrap().end, 5_119_999);
            }
            plan => panic!("expected split plan, got {plan:?}"),
        }
    }

    #[test]
    fn test_plan_from_config() {
        let config = TransferConfig {
            split_count: 4,
            min_split_kb: 1,
            ..Default::default()
        };
        match RangePlanner::from_config(&config).plan(&remote(4000, true)) {
            TransferPlan::Split(ranges) => assert_eq!(ranges.len(), 4),
            plan => panic!("expected split plan, got {plan:?}"),
        }
    }
}
