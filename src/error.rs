use std::path::PathBuf;

use thiserror::Error;

/// Result alias used by the normalization pipeline.
pub type PrepResult<T> = Result<T, PrepError>;

// ---------------------------------------------------------------------------
// PrepError – pipeline error taxonomy
// ---------------------------------------------------------------------------

/// Errors produced while normalizing and exporting accelerometer recordings.
///
/// `DataFormat` errors concern one recording and are normally logged and
/// skipped by the exporter. `Configuration` errors are caller mistakes and
/// abort the run.
#[derive(Debug, Error)]
pub enum PrepError {
    /// Unparseable raw array or non-numeric reading.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// Incompatible sample-rate ratio, missing column, bad bounds.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Output path could not be created or written.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote segment service failed or answered with `success: false`.
    #[error("remote service error: {0}")]
    RemoteService(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PrepError {
    pub fn data_format(msg: impl Into<String>) -> Self {
        PrepError::DataFormat(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        PrepError::Configuration(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrepError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error should abort a batch rather than skip one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PrepError::Configuration(_) | PrepError::Io { .. })
    }
}

impl From<reqwest::Error> for PrepError {
    fn from(err: reqwest::Error) -> Self {
        PrepError::RemoteService(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(PrepError::configuration("bad ratio").is_fatal());
        assert!(PrepError::io("/x", std::io::Error::other("denied")).is_fatal());
        assert!(!PrepError::data_format("nan").is_fatal());
        assert!(!PrepError::RemoteService("503".into()).is_fatal());
    }

    #[test]
    fn display_carries_message() {
        let e = PrepError::configuration("200 Hz is not divisible by 30 Hz");
        assert_eq!(
            e.to_string(),
            "configuration error: 200 Hz is not divisible by 30 Hz"
        );
    }
}
