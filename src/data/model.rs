use std::collections::BTreeSet;

use super::calibration::CalibrationProfile;

/// Milliseconds between consecutive samples at `rate_hz`.
///
/// Callers validate that `rate_hz` divides 1000 (see `Resampler::new`), so
/// the step is exact.
pub fn step_ms(rate_hz: u32) -> u64 {
    1000 / u64::from(rate_hz.max(1))
}

/// Zero-based timestamp axis with a fixed step of `1000 / rate_hz` ms.
pub fn synthetic_timestamps(len: usize, rate_hz: u32) -> Vec<u64> {
    let step = step_ms(rate_hz);
    (0..len as u64).map(|i| i * step).collect()
}

fn channel_count(rows: &[Vec<f64>]) -> usize {
    rows.first().map_or(0, Vec::len)
}

// ---------------------------------------------------------------------------
// RawRecording – one capture as loaded from disk
// ---------------------------------------------------------------------------

/// One continuous sensor capture, exactly as it was stored.
#[derive(Debug, Clone)]
pub struct RawRecording {
    /// Row position in the source dataset.
    pub index: usize,
    /// Raw readings, one row per sample, one column per channel.
    pub rows: Vec<Vec<f64>>,
    /// Native sample rate in Hz.
    pub sample_rate_hz: u32,
    /// How the raw readings map to g.
    pub calibration: CalibrationProfile,
    pub activity_id: Option<i64>,
    /// Sensor placement, e.g. `waist` or `wrist`.
    pub device: Option<String>,
}

impl RawRecording {
    pub fn new(index: usize, rows: Vec<Vec<f64>>, sample_rate_hz: u32) -> Self {
        RawRecording {
            index,
            rows,
            sample_rate_hz,
            calibration: CalibrationProfile::G_UNITS,
            activity_id: None,
            device: None,
        }
    }

    pub fn with_calibration(mut self, calibration: CalibrationProfile) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_activity(mut self, activity_id: i64) -> Self {
        self.activity_id = Some(activity_id);
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn channel_count(&self) -> usize {
        channel_count(&self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// NormalizedRecording – g units at the target rate
// ---------------------------------------------------------------------------

/// A recording after unit conversion and resampling.
///
/// Timestamps start at 0 and are spaced by exactly `1000 / rate_hz` ms.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecording {
    pub rate_hz: u32,
    pub timestamps_ms: Vec<u64>,
    pub rows: Vec<Vec<f64>>,
}

impl NormalizedRecording {
    /// Wrap rows already at `rate_hz`, regenerating the timestamp axis.
    pub fn from_rows(rate_hz: u32, rows: Vec<Vec<f64>>) -> Self {
        NormalizedRecording {
            rate_hz,
            timestamps_ms: synthetic_timestamps(rows.len(), rate_hz),
            rows,
        }
    }

    pub fn channel_count(&self) -> usize {
        channel_count(&self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Sample – one labeled, fixed-length training example
// ---------------------------------------------------------------------------

/// A fixed-length window cut from a normalized recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub label: String,
    pub activity_id: i64,
    pub source_index: usize,
    pub timestamps_ms: Vec<u64>,
    pub rows: Vec<Vec<f64>>,
}

impl Sample {
    /// `{label}_act{activity_id}_{source_index}.csv`
    pub fn file_name(&self) -> String {
        format!(
            "{}_act{}_{}.csv",
            self.label, self.activity_id, self.source_index
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RecordingSet – the complete loaded dataset
// ---------------------------------------------------------------------------

/// All recordings of one source dataset with pre-computed value indices.
#[derive(Debug, Clone)]
pub struct RecordingSet {
    pub recordings: Vec<RawRecording>,
    /// Distinct placements (lower-cased).
    pub devices: BTreeSet<String>,
    pub activity_ids: BTreeSet<i64>,
    /// Rows that could not be turned into a recording.
    pub skipped: usize,
}

impl RecordingSet {
    pub fn from_recordings(recordings: Vec<RawRecording>) -> Self {
        let mut devices = BTreeSet::new();
        let mut activity_ids = BTreeSet::new();
        for rec in &recordings {
            if let Some(d) = &rec.device {
                devices.insert(d.to_lowercase());
            }
            if let Some(a) = rec.activity_id {
                activity_ids.insert(a);
            }
        }
        RecordingSet {
            recordings,
            devices,
            activity_ids,
            skipped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_at_40hz() {
        let ts = synthetic_timestamps(4, 40);
        assert_eq!(ts, vec![0, 25, 50, 75]);
    }

    #[test]
    fn sample_file_name() {
        let sample = Sample {
            label: "turningLying".into(),
            activity_id: 17,
            source_index: 1,
            timestamps_ms: vec![0],
            rows: vec![vec![0.0, 0.0, 1.0]],
        };
        assert_eq!(sample.file_name(), "turningLying_act17_1.csv");
    }

    #[test]
    fn recording_set_indexes_devices_case_insensitively() {
        let set = RecordingSet::from_recordings(vec![
            RawRecording::new(0, vec![], 40).with_device("Waist").with_activity(5),
            RawRecording::new(1, vec![], 40).with_device("waist").with_activity(17),
            RawRecording::new(2, vec![], 40).with_device("wrist"),
        ]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.devices.len(), 2);
        assert_eq!(set.activity_ids.iter().copied().collect::<Vec<_>>(), vec![5, 17]);
    }
}
