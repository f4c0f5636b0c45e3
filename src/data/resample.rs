use crate::error::{PrepError, PrepResult};

use super::model::NormalizedRecording;

// ---------------------------------------------------------------------------
// Resampler – block-average decimation to the target rate
// ---------------------------------------------------------------------------

/// Decimates a series from `source_hz` to `target_hz` by averaging
/// non-overlapping blocks of `source_hz / target_hz` samples.
///
/// Trailing samples that do not fill a whole block are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resampler {
    source_hz: u32,
    target_hz: u32,
    factor: usize,
}

impl Resampler {
    /// Rejects zero rates, a target that does not divide the source, and a
    /// target whose period is not a whole number of milliseconds.
    pub fn new(source_hz: u32, target_hz: u32) -> PrepResult<Self> {
        if source_hz == 0 || target_hz == 0 {
            return Err(PrepError::configuration(format!(
                "sample rates must be positive (source {source_hz} Hz, target {target_hz} Hz)"
            )));
        }
        if source_hz % target_hz != 0 {
            return Err(PrepError::configuration(format!(
                "{source_hz} Hz is not evenly divisible by {target_hz} Hz"
            )));
        }
        if 1000 % target_hz != 0 {
            return Err(PrepError::configuration(format!(
                "{target_hz} Hz has no whole-millisecond period"
            )));
        }
        Ok(Resampler {
            source_hz,
            target_hz,
            factor: (source_hz / target_hz) as usize,
        })
    }

    pub fn source_hz(&self) -> u32 {
        self.source_hz
    }

    pub fn target_hz(&self) -> u32 {
        self.target_hz
    }

    /// Input samples per output sample.
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Average each block per channel; an empty input gives an empty result.
    ///
    /// Input timestamps are not consulted: the output axis is regenerated
    /// as `index * 1000 / target_hz`.
    pub fn resample(&self, rows: &[Vec<f64>]) -> NormalizedRecording {
        let out = rows
            .chunks_exact(self.factor)
            .map(|block| {
                let channels = block[0].len();
                let mut acc = vec![0.0; channels];
                for row in block {
                    for (sum, v) in acc.iter_mut().zip(row) {
                        *sum += v;
                    }
                }
                let n = block.len() as f64;
                acc.iter_mut().for_each(|s| *s /= n);
                acc
            })
            .collect();
        NormalizedRecording::from_rows(self.target_hz, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, channels: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| (0..channels).map(|c| (i * 10 + c) as f64).collect())
            .collect()
    }

    #[test]
    fn two_hundred_to_forty_hz() {
        let r = Resampler::new(200, 40).unwrap();
        let out = r.resample(&ramp(600, 3));
        assert_eq!(out.len(), 120);
        assert_eq!(out.rate_hz, 40);
        assert_eq!(out.channel_count(), 3);
        assert_eq!(out.timestamps_ms.first(), Some(&0));
        assert_eq!(out.timestamps_ms.last(), Some(&2975));
        assert!(out.timestamps_ms.windows(2).all(|w| w[1] - w[0] == 25));
    }

    #[test]
    fn block_mean_per_channel() {
        let r = Resampler::new(200, 40).unwrap();
        let out = r.resample(&ramp(5, 2));
        // rows 0..5 → channel 0 values 0,10,20,30,40; channel 1 offset by 1
        assert_eq!(out.rows, vec![vec![20.0, 21.0]]);
    }

    #[test]
    fn output_length_is_floor_of_ratio() {
        let r = Resampler::new(200, 40).unwrap();
        for n in [0, 1, 4, 5, 6, 599, 600, 601] {
            assert_eq!(r.resample(&ramp(n, 3)).len(), n / 5);
        }
    }

    #[test]
    fn factor_one_is_identity_on_values() {
        let r = Resampler::new(40, 40).unwrap();
        let input = ramp(7, 3);
        let out = r.resample(&input);
        assert_eq!(out.rows, input);
        assert_eq!(out.timestamps_ms, vec![0, 25, 50, 75, 100, 125, 150]);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let r = Resampler::new(100, 50).unwrap();
        let out = r.resample(&[]);
        assert!(out.is_empty());
        assert!(out.timestamps_ms.is_empty());
    }

    #[test]
    fn incompatible_rates_are_configuration_errors() {
        assert!(matches!(Resampler::new(200, 30), Err(PrepError::Configuration(_))));
        assert!(matches!(Resampler::new(200, 0), Err(PrepError::Configuration(_))));
        assert!(matches!(Resampler::new(0, 40), Err(PrepError::Configuration(_))));
        // 1000 / 400 is not an integer
        assert!(matches!(Resampler::new(800, 400), Err(PrepError::Configuration(_))));
    }
}
