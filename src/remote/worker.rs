use std::ops::AddAssign;

use rayon::prelude::*;

use crate::error::{PrepError, PrepResult};

use super::SegmentService;

/// Per-sample results summed over all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentTotals {
    pub segmented: usize,
    /// The service found no segments; nothing was committed.
    pub empty: usize,
    pub failed: usize,
}

impl AddAssign for SegmentTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.segmented += rhs.segmented;
        self.empty += rhs.empty;
        self.failed += rhs.failed;
    }
}

/// Split `ids` into `workers` contiguous chunks; the last takes the remainder.
pub fn split_ids(ids: &[u64], workers: usize) -> Vec<&[u64]> {
    let workers = workers.max(1);
    let n = ids.len() / workers;
    (0..workers)
        .map(|i| {
            if i == workers - 1 {
                &ids[n * i..]
            } else {
                &ids[n * i..n * (i + 1)]
            }
        })
        .collect()
}

/// Segment one chunk. A failing id is logged and does not stop the rest.
pub fn segment_chunk<S: SegmentService + ?Sized>(service: &S, worker: usize, ids: &[u64]) -> SegmentTotals {
    let mut totals = SegmentTotals::default();
    for &sample_id in ids {
        let result = service.find_segments(sample_id).and_then(|segments| {
            if segments.is_empty() {
                return Ok(false);
            }
            service.commit_segments(sample_id, &segments).map(|_| true)
        });
        match result {
            Ok(true) => {
                log::info!("Segment: {worker} {sample_id}");
                totals.segmented += 1;
            }
            Ok(false) => {
                log::debug!("Segment: {worker} {sample_id} has no segments");
                totals.empty += 1;
            }
            Err(e) => {
                log::error!("Segment: {worker} {sample_id} {e}");
                totals.failed += 1;
            }
        }
    }
    totals
}

/// Run `workers` independent workers over disjoint chunks of `ids` and
/// block until all of them finish.
pub fn segment_all<S: SegmentService + ?Sized>(
    service: &S,
    ids: &[u64],
    workers: usize,
) -> PrepResult<SegmentTotals> {
    let chunks = split_ids(ids, workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(chunks.len())
        .thread_name(|i| format!("segment-{i}"))
        .build()
        .map_err(|e| PrepError::configuration(format!("cannot start worker pool: {e}")))?;

    let totals = pool.install(|| {
        chunks
            .par_iter()
            .enumerate()
            .map(|(worker, chunk)| segment_chunk(service, worker, chunk))
            .reduce(SegmentTotals::default, |mut a, b| {
                a += b;
                a
            })
    });
    log::info!(
        "Finished: {} segmented, {} without segments, {} failed of {} samples",
        totals.segmented,
        totals.empty,
        totals.failed,
        ids.len()
    );
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Segment;
    use std::sync::Mutex;

    /// Fails on ids divisible by 5, returns no segments for odd ids.
    struct FakeService {
        committed: Mutex<Vec<u64>>,
    }

    impl SegmentService for FakeService {
        fn find_segments(&self, sample_id: u64) -> PrepResult<Vec<Segment>> {
            if sample_id % 5 == 0 {
                return Err(PrepError::RemoteService("HTTP 500".into()));
            }
            if sample_id % 2 == 1 {
                return Ok(Vec::new());
            }
            Ok(vec![Segment { start_ms: 0, end_ms: 2500 }])
        }

        fn commit_segments(&self, sample_id: u64, segments: &[Segment]) -> PrepResult<()> {
            assert!(!segments.is_empty());
            self.committed.lock().unwrap().push(sample_id);
            Ok(())
        }
    }

    #[test]
    fn split_gives_remainder_to_last_worker() {
        let ids: Vec<u64> = (0..19).collect();
        let chunks = split_ids(&ids, 8);
        assert_eq!(chunks.len(), 8);
        assert!(chunks[..7].iter().all(|c| c.len() == 2));
        assert_eq!(chunks[7].len(), 5);
        assert_eq!(chunks.concat(), ids);
    }

    #[test]
    fn fewer_ids_than_workers() {
        let ids = [1, 2, 3];
        let chunks = split_ids(&ids, 8);
        assert_eq!(chunks.concat(), ids.to_vec());
        assert_eq!(chunks[7], &ids[..]);
    }

    #[test]
    fn failures_do_not_stop_siblings() {
        let service = FakeService {
            committed: Mutex::new(Vec::new()),
        };
        let ids: Vec<u64> = (1..=20).collect();
        let totals = segment_all(&service, &ids, 4).unwrap();

        // multiples of 5: 5, 10, 15, 20
        assert_eq!(totals.failed, 4);
        // odd and not a multiple of 5: 1, 3, 7, 9, 11, 13, 17, 19
        assert_eq!(totals.empty, 8);
        assert_eq!(totals.segmented, 8);

        let mut committed = service.committed.into_inner().unwrap();
        committed.sort_unstable();
        assert_eq!(committed, vec![2, 4, 6, 8, 12, 14, 16, 18]);
    }
}
