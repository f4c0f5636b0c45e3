use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{PrepError, PrepResult};

// ---------------------------------------------------------------------------
// CalibrationProfile – how a dataset's raw readings map to g
// ---------------------------------------------------------------------------

/// Full-scale range and divisor of one sensor configuration.
///
/// A raw reading `r` is `r * full_scale_g / divisor` g.
///
/// In configuration files a profile is written as a built-in name
/// (`"adxl345_16g"`), as `{ "full_scale_g": 16, "divisor": 4096 }`, or as
/// `{ "full_scale_g": 16, "bits": 13 }` for a signed ADC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CalibrationRepr")]
pub struct CalibrationProfile {
    pub full_scale_g: f64,
    pub divisor: f64,
}

impl CalibrationProfile {
    /// Readings already expressed in g.
    pub const G_UNITS: CalibrationProfile = CalibrationProfile {
        full_scale_g: 1.0,
        divisor: 1.0,
    };

    /// ADXL345 at ±16 g, 13-bit signed counts.
    pub const ADXL345_16G: CalibrationProfile = CalibrationProfile {
        full_scale_g: 16.0,
        divisor: 4096.0,
    };

    /// LSM9DS1 at ±8 g, 16-bit signed counts.
    pub const LSM9DS1_8G: CalibrationProfile = CalibrationProfile {
        full_scale_g: 8.0,
        divisor: 32768.0,
    };

    /// Profile for a signed ADC of `bits` width: the divisor is `2^(bits-1)`.
    pub fn from_bits(full_scale_g: f64, bits: u32) -> Self {
        CalibrationProfile {
            full_scale_g,
            divisor: 2f64.powi(bits.saturating_sub(1) as i32),
        }
    }

    /// Look up a built-in profile by its configuration name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "g_units" | "g" => Some(Self::G_UNITS),
            "adxl345_16g" => Some(Self::ADXL345_16G),
            "lsm9ds1_8g" => Some(Self::LSM9DS1_8G),
            _ => None,
        }
    }

    /// g per raw unit.
    pub fn scale(&self) -> f64 {
        self.full_scale_g / self.divisor
    }

    pub fn is_identity(&self) -> bool {
        self.scale() == 1.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CalibrationRepr {
    Named(String),
    Divisor { full_scale_g: f64, divisor: f64 },
    Bits { full_scale_g: f64, bits: u32 },
}

impl TryFrom<CalibrationRepr> for CalibrationProfile {
    type Error = String;

    fn try_from(repr: CalibrationRepr) -> Result<Self, Self::Error> {
        match repr {
            CalibrationRepr::Named(name) => CalibrationProfile::by_name(&name)
                .ok_or_else(|| format!("unknown calibration profile '{name}'")),
            CalibrationRepr::Divisor {
                full_scale_g,
                divisor,
            } => Ok(CalibrationProfile {
                full_scale_g,
                divisor,
            }),
            CalibrationRepr::Bits { full_scale_g, bits } => {
                if !(2..=32).contains(&bits) {
                    return Err(format!("{bits}-bit resolution is out of range"));
                }
                Ok(CalibrationProfile::from_bits(full_scale_g, bits))
            }
        }
    }
}

/// Parse one textual reading. Anything that is not a finite number,
/// including `nan` and `inf`, is a `DataFormat` error.
pub fn parse_reading(token: &str) -> PrepResult<f64> {
    let tok = token.trim();
    match tok.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(PrepError::data_format(format!(
            "'{tok}' is not a numeric reading"
        ))),
    }
}

// ---------------------------------------------------------------------------
// UnitConverter
// ---------------------------------------------------------------------------

/// Converts raw readings to g with a scale computed once per dataset.
#[derive(Debug, Clone, Copy)]
pub struct UnitConverter {
    profile: CalibrationProfile,
    scale: f64,
}

impl UnitConverter {
    pub fn new(profile: CalibrationProfile) -> PrepResult<Self> {
        let scale = profile.scale();
        if !scale.is_finite() || profile.divisor == 0.0 {
            return Err(PrepError::configuration(format!(
                "calibration {profile:?} does not yield a finite scale"
            )));
        }
        Ok(UnitConverter { profile, scale })
    }

    pub fn profile(&self) -> CalibrationProfile {
        self.profile
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn convert(&self, raw: f64) -> f64 {
        raw * self.scale
    }

    /// Convert a JSON reading, recursing into arrays of readings.
    pub fn convert_json(&self, value: &JsonValue) -> PrepResult<JsonValue> {
        match value {
            JsonValue::Array(items) => items
                .iter()
                .map(|v| self.convert_json(v))
                .collect::<PrepResult<Vec<_>>>()
                .map(JsonValue::Array),
            JsonValue::Number(n) => {
                let raw = n
                    .as_f64()
                    .ok_or_else(|| PrepError::data_format(format!("{n} is not representable")))?;
                serde_json::Number::from_f64(self.convert(raw))
                    .map(JsonValue::Number)
                    .ok_or_else(|| PrepError::data_format(format!("{n} converts to a non-finite value")))
            }
            other => Err(PrepError::data_format(format!(
                "expected a numeric reading, got {other}"
            ))),
        }
    }

    /// Convert every channel of every row.
    pub fn convert_rows(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        if self.profile.is_identity() {
            return rows.to_vec();
        }
        rows.iter()
            .map(|row| row.iter().map(|&v| self.convert(v)).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn adxl345_full_scale_count_is_sixteen_g() {
        let conv = UnitConverter::new(CalibrationProfile::ADXL345_16G).unwrap();
        assert_eq!(conv.convert(4096.0), 16.0);
        assert_eq!(conv.scale(), 0.00390625);
    }

    #[test]
    fn from_bits_matches_named_profiles() {
        assert_eq!(CalibrationProfile::from_bits(16.0, 13), CalibrationProfile::ADXL345_16G);
        assert_eq!(CalibrationProfile::from_bits(8.0, 16), CalibrationProfile::LSM9DS1_8G);
    }

    #[test]
    fn conversion_is_linear() {
        let conv = UnitConverter::new(CalibrationProfile::LSM9DS1_8G).unwrap();
        for &x in &[-32768.0, -1.0, 0.0, 3.5, 1234.0] {
            for &a in &[-2.0, 0.5, 3.0, 1e3] {
                let lhs = conv.convert(a * x);
                let rhs = a * conv.convert(x);
                assert!((lhs - rhs).abs() <= 1e-12 * lhs.abs().max(1.0));
            }
        }
    }

    #[test]
    fn non_numeric_token_is_data_format_error() {
        assert_eq!(parse_reading(" -2048 ").unwrap(), -2048.0);
        for tok in ["abc", "NaN", "nan", "inf", "-infinity", ""] {
            assert!(matches!(parse_reading(tok), Err(PrepError::DataFormat(_))), "{tok}");
        }
    }

    #[test]
    fn profiles_deserialize_from_name_divisor_or_bits() {
        let named: CalibrationProfile = serde_json::from_value(json!("adxl345_16g")).unwrap();
        assert_eq!(named, CalibrationProfile::ADXL345_16G);
        let divisor: CalibrationProfile =
            serde_json::from_value(json!({"full_scale_g": 8.0, "divisor": 32768.0})).unwrap();
        assert_eq!(divisor, CalibrationProfile::LSM9DS1_8G);
        let bits: CalibrationProfile =
            serde_json::from_value(json!({"full_scale_g": 16.0, "bits": 13})).unwrap();
        assert_eq!(bits, CalibrationProfile::ADXL345_16G);
        assert!(serde_json::from_value::<CalibrationProfile>(json!("bogus")).is_err());
        assert!(serde_json::from_value::<CalibrationProfile>(json!({"full_scale_g": 8.0, "bits": 0})).is_err());
    }

    #[test]
    fn zero_divisor_is_rejected() {
        let bad = CalibrationProfile {
            full_scale_g: 8.0,
            divisor: 0.0,
        };
        assert!(matches!(UnitConverter::new(bad), Err(PrepError::Configuration(_))));
    }

    #[test]
    fn json_arrays_are_scaled() {
        let conv = UnitConverter::new(CalibrationProfile::LSM9DS1_8G).unwrap();
        let out = conv.convert_json(&json!([[4096, -4096, 0]])).unwrap();
        assert_eq!(out, json!([[1.0, -1.0, 0.0]]));
        assert!(conv.convert_json(&json!(["x"])).is_err());
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(CalibrationProfile::by_name("ADXL345_16G"), Some(CalibrationProfile::ADXL345_16G));
        assert_eq!(CalibrationProfile::by_name("unknown"), None);
    }
}
