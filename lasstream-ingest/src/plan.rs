//! Partitioning the point range into fixed-size batches.

use crate::error::{ConfigError, SessionError};
use lasstream_data::FileHeader;
use std::iter::FusedIterator;
use std::ops::Range;

/// One contiguous run of point records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Batch {
    pub point_offset: u64,
    pub point_count: u32,
    pub byte_start: u64,
    pub byte_end: u64,
}

impl Batch {
    pub fn point_range(&self) -> Range<u64> {
        self.point_offset..self.point_offset + self.point_count as u64
    }

    pub fn byte_len(&self) -> usize {
        (self.byte_end - self.byte_start) as usize
    }
}

/// Lazy, ordered sequence of batches covering every point in the file.
///
/// Every batch holds `batch_size` points except possibly the last.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    next_point: u64,
    num_points: u64,
    batch_size: u32,
    record_length: u64,
    data_start: u64,
}

impl BatchPlan {
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }
}

impl Iterator for BatchPlan {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let remaining = self.num_points - self.next_point;
        if remaining == 0 {
            return None;
        }
        let point_count = remaining.min(self.batch_size as u64) as u32;
        let byte_start = self.data_start + self.next_point * self.record_length;
        let batch = Batch {
            point_offset: self.next_point,
            point_count,
            byte_start,
            byte_end: byte_start + point_count as u64 * self.record_length,
        };
        self.next_point += point_count as u64;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.num_points - self.next_point).div_ceil(self.batch_size as u64);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchPlan {}

impl FusedIterator for BatchPlan {}

/// Plan the batches for `header`. A pure function of its inputs.
///
/// Fails if `batch_size` is zero or the point region does not fit in u64
/// byte offsets; past that every offset the iterator computes is in range.
pub fn plan(header: &FileHeader, batch_size: u32) -> Result<BatchPlan, SessionError> {
    if batch_size == 0 {
        return Err(ConfigError::ZeroBatchSize.into());
    }
    header.check_point_data(u64::MAX)?;
    Ok(BatchPlan {
        next_point: 0,
        num_points: header.num_points,
        batch_size,
        record_length: header.point_record_length as u64,
        data_start: header.offset_to_point_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_header;
    use lasstream_data::FormatError;

    fn check_tiling(header: &FileHeader, batch_size: u32) {
        let batches: Vec<Batch> = plan(header, batch_size).unwrap().collect();
        let total: u64 = batches.iter().map(|b| b.point_count as u64).sum();
        assert_eq!(total, header.num_points);

        let mut expected_offset = 0;
        let mut expected_byte = header.offset_to_point_data;
        for (i, batch) in batches.iter().enumerate() {
            assert!(batch.point_count > 0);
            assert_eq!(batch.point_offset, expected_offset);
            assert_eq!(batch.byte_start, expected_byte);
            assert_eq!(
                batch.byte_end - batch.byte_start,
                batch.point_count as u64 * header.point_record_length as u64
            );
            if i + 1 < batches.len() {
                assert_eq!(batch.point_count, batch_size);
            } else {
                assert!(batch.point_count <= batch_size);
            }
            expected_offset += batch.point_count as u64;
            expected_byte = batch.byte_end;
        }
        assert_eq!(
            expected_byte,
            header.point_data_end().unwrap()
        );
    }

    #[test]
    fn test_three_batches() {
        let header = synthetic_header(1_200_000, 2, 26);
        let counts: Vec<u32> = plan(&header, 500_000)
            .unwrap()
            .map(|b| b.point_count)
            .collect();
        assert_eq!(counts, vec![500_000, 500_000, 200_000]);
        check_tiling(&header, 500_000);
    }

    #[test]
    fn test_tiling_across_sizes() {
        for num_points in [1u64, 2, 7, 64, 999, 1000, 1001, 123_457] {
            let header = synthetic_header(num_points, 3, 34);
            for batch_size in [1u32, 3, 64, 1000, 500_000] {
                check_tiling(&header, batch_size);
            }
        }
    }

    #[test]
    fn test_exact_size() {
        let header = synthetic_header(1001, 0, 20);
        let mut batches = plan(&header, 100).unwrap();
        assert_eq!(batches.len(), 11);
        batches.next();
        assert_eq!(batches.len(), 10);
        assert_eq!(batches.by_ref().count(), 10);
        assert_eq!(batches.next(), None);
    }

    #[test]
    fn test_zero_batch_size() {
        let header = synthetic_header(10, 2, 26);
        assert!(matches!(
            plan(&header, 0),
            Err(SessionError::Config(ConfigError::ZeroBatchSize))
        ));
    }

    #[test]
    fn test_overflowing_point_region_rejected() {
        let mut header = synthetic_header(u64::MAX, 2, 26);
        header.point_record_length = 65_535;
        assert!(matches!(
            plan(&header, u32::MAX),
            Err(SessionError::Format(FormatError::PointDataOverflow { .. }))
        ));
    }

    #[test]
    fn test_largest_region_plans_without_overflow() {
        // The last record ends exactly at u64::MAX.
        let record_length = 65_535u32;
        let num_points = (u64::MAX - 227) / record_length as u64;
        let mut header = synthetic_header(num_points, 2, record_length);
        header.offset_to_point_data = u64::MAX - num_points * record_length as u64;
        assert_eq!(header.point_data_end(), Some(u64::MAX));

        let mut batches = plan(&header, u32::MAX).unwrap();
        let first = batches.next().unwrap();
        assert_eq!(first.byte_start, header.offset_to_point_data);
        let last = batches.last().unwrap();
        assert_eq!(last.byte_end, u64::MAX);
        assert_eq!(last.point_range().end, num_points);
    }

    #[test]
    fn test_plan_is_repeatable() {
        let header = synthetic_header(1_234_567, 2, 26);
        let a: Vec<Batch> = plan(&header, 65_536).unwrap().collect();
        let b: Vec<Batch> = plan(&header, 65_536).unwrap().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ranges_disjoint() {
        let header = synthetic_header(10_000, 2, 26);
        let batches: Vec<Batch> = plan(&header, 333).unwrap().collect();
        for (i, a) in batches.iter().enumerate() {
            for b in &batches[i + 1..] {
                let (ra, rb) = (a.point_range(), b.point_range());
                assert!(ra.end <= rb.start || rb.end <= ra.start);
            }
        }
    }
}
