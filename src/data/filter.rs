use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};

use super::model::RawRecording;

// ---------------------------------------------------------------------------
// Filter predicate: which recordings are eligible for export
// ---------------------------------------------------------------------------

/// Recording-level selection rule.
///
/// Both activity bounds are inclusive; `activity_min == activity_max` picks a
/// single activity class. The device comparison ignores case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub activity_min: i64,
    pub activity_max: i64,
    pub device: String,
}

impl FilterPredicate {
    pub fn new(activity_min: i64, activity_max: i64, device: impl Into<String>) -> PrepResult<Self> {
        if activity_min > activity_max {
            return Err(PrepError::configuration(format!(
                "activity range [{activity_min}, {activity_max}] is empty"
            )));
        }
        Ok(FilterPredicate {
            activity_min,
            activity_max,
            device: device.into(),
        })
    }

    /// A recording passes when:
    /// * its activity id is present and within `[activity_min, activity_max]`
    /// * its device is present and equals `device` ignoring case
    pub fn matches(&self, rec: &RawRecording) -> bool {
        let activity_ok = rec
            .activity_id
            .is_some_and(|a| (self.activity_min..=self.activity_max).contains(&a));
        let device_ok = rec
            .device
            .as_deref()
            .is_some_and(|d| d.to_lowercase() == self.device.to_lowercase());
        activity_ok && device_ok
    }
}

/// Return indices of recordings that pass the predicate, in input order.
pub fn filtered_indices(recordings: &[RawRecording], predicate: &FilterPredicate) -> Vec<usize> {
    recordings
        .iter()
        .enumerate()
        .filter(|(_, rec)| predicate.matches(rec))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Vec<RawRecording> {
        [(5, "waist"), (17, "waist"), (17, "wrist"), (101, "waist")]
            .iter()
            .enumerate()
            .map(|(i, &(act, dev))| RawRecording::new(i, vec![], 40).with_activity(act).with_device(dev))
            .collect()
    }

    #[test]
    fn single_activity_on_waist() {
        let recs = dataset();
        let p = FilterPredicate::new(17, 17, "waist").unwrap();
        assert_eq!(filtered_indices(&recs, &p), vec![1]);
    }

    #[test]
    fn device_match_ignores_case() {
        let recs = dataset();
        let p = FilterPredicate::new(0, 200, "WAIST").unwrap();
        assert_eq!(filtered_indices(&recs, &p), vec![0, 1, 3]);
    }

    #[test]
    fn bounds_are_inclusive() {
        let recs = dataset();
        let p = FilterPredicate::new(5, 101, "waist").unwrap();
        assert_eq!(filtered_indices(&recs, &p), vec![0, 1, 3]);
        let p = FilterPredicate::new(6, 100, "waist").unwrap();
        assert_eq!(filtered_indices(&recs, &p), vec![1]);
    }

    #[test]
    fn filtering_is_idempotent_and_exact() {
        let recs = dataset();
        let p = FilterPredicate::new(10, 120, "waist").unwrap();
        let once: Vec<RawRecording> = filtered_indices(&recs, &p)
            .into_iter()
            .map(|i| recs[i].clone())
            .collect();
        let twice: Vec<usize> = filtered_indices(&once, &p)
            .into_iter()
            .map(|i| once[i].index)
            .collect();
        assert_eq!(once.iter().map(|r| r.index).collect::<Vec<_>>(), twice);
        for rec in &recs {
            let kept = once.iter().any(|r| r.index == rec.index);
            assert_eq!(kept, p.matches(rec));
        }
    }

    #[test]
    fn missing_metadata_never_matches() {
        let p = FilterPredicate::new(0, 200, "waist").unwrap();
        assert!(!p.matches(&RawRecording::new(0, vec![], 40).with_device("waist")));
        assert!(!p.matches(&RawRecording::new(0, vec![], 40).with_activity(3)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert!(matches!(
            FilterPredicate::new(135, 101, "waist"),
            Err(PrepError::Configuration(_))
        ));
    }
}
