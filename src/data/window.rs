use serde::{Deserialize, Serialize};

use crate::error::{PrepError, PrepResult};

use super::model::{synthetic_timestamps, NormalizedRecording, Sample};

/// Where the labeled event sits inside a fixed-duration capture.
///
/// `offset` and `length` count samples at the normalized rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub offset: usize,
    pub length: usize,
    /// Channels every window row must carry; extra channels are dropped.
    #[serde(default = "default_channels")]
    pub channels: usize,
}

/// Exported rows carry `accX`, `accY` and `accZ`.
pub const OUTPUT_CHANNELS: usize = 3;

fn default_channels() -> usize {
    OUTPUT_CHANNELS
}

impl WindowSpec {
    pub fn new(offset: usize, length: usize) -> Self {
        WindowSpec {
            offset,
            length,
            channels: default_channels(),
        }
    }

    /// Exclusive end row; `None` when `offset + length` overflows.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }

    pub fn validate(&self) -> PrepResult<()> {
        if self.length == 0 {
            return Err(PrepError::configuration("window length must be > 0"));
        }
        if self.end().is_none() {
            return Err(PrepError::configuration(format!(
                "window offset {} + length {} overflows",
                self.offset, self.length
            )));
        }
        if self.channels < OUTPUT_CHANNELS {
            return Err(PrepError::configuration(format!(
                "window keeps {} channels, exported rows need {OUTPUT_CHANNELS}",
                self.channels
            )));
        }
        Ok(())
    }

    /// Rows `[offset, offset + length)` trimmed to `channels` columns, or
    /// `None` when the recording is too short or too narrow.
    pub fn extract(&self, rows: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
        let end = self.end()?;
        if self.length == 0 || rows.len() < end {
            return None;
        }
        let window = &rows[self.offset..end];
        if window.iter().any(|r| r.len() < self.channels) {
            return None;
        }
        Some(window.iter().map(|r| r[..self.channels].to_vec()).collect())
    }

    /// Cut one labeled sample from `rec` with a fresh zero-based time axis.
    pub fn cut(
        &self,
        rec: &NormalizedRecording,
        label: &str,
        activity_id: i64,
        source_index: usize,
    ) -> Option<Sample> {
        let rows = self.extract(&rec.rows)?;
        Some(Sample {
            label: label.to_string(),
            activity_id,
            source_index,
            timestamps_ms: synthetic_timestamps(rows.len(), rec.rate_hz),
            rows,
        })
    }
}
