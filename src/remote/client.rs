//! Blocking client for the labeled-segment service.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::config::RemoteConfig;
use crate::error::{PrepError, PrepResult};

use super::SegmentService;

/// One accepted segment of a sample, in milliseconds from its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "startMs")]
    pub start_ms: u64,
    #[serde(rename = "endMs")]
    pub end_ms: u64,
}

/// Sample list response
#[derive(Debug, Deserialize)]
struct SamplesResponse {
    samples: Vec<SampleEntry>,
}

#[derive(Debug, Deserialize)]
struct SampleEntry {
    id: u64,
}

/// Single sample response
#[derive(Debug, Deserialize)]
struct SampleResponse {
    sample: SampleDetail,
}

#[derive(Debug, Deserialize)]
struct SampleDetail {
    #[serde(rename = "totalLengthMs")]
    total_length_ms: f64,
}

#[derive(Debug, Deserialize)]
struct SegmentsResponse {
    segments: Vec<Segment>,
}

/// Client addressed by project and sample ids.
pub struct SegmentClient {
    client: Client,
    base_url: String,
    project_id: String,
    segment_length_ms: u64,
    shift_segments: bool,
}

impl SegmentClient {
    pub fn new(config: &RemoteConfig) -> PrepResult<Self> {
        config.validate()?;
        let key = config.resolved_api_key()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&key)
            .map_err(|_| PrepError::configuration("API key is not a valid header value"))?;
        headers.insert("x-api-key", key);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(SegmentClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            segment_length_ms: config.segment_length_ms,
            shift_segments: config.shift_segments,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.project_id, path)
    }

    /// Ids of all samples in `category` carrying one of `labels`.
    pub fn list_sample_ids(&self, category: &str, labels: &[String]) -> PrepResult<Vec<u64>> {
        let labels = serde_json::to_string(labels)?;
        let response = self
            .client
            .get(self.url("raw-data"))
            .query(&[
                ("category", category),
                ("excludeSensors", "true"),
                ("labels", labels.as_str()),
            ])
            .send()?;
        let data: SamplesResponse = decode(response)?;
        Ok(data.samples.into_iter().map(|s| s.id).collect())
    }

    /// Total duration of a sample.
    pub fn sample_length_ms(&self, sample_id: u64) -> PrepResult<f64> {
        let response = self
            .client
            .get(self.url(&format!("raw-data/{sample_id}")))
            .send()?;
        let data: SampleResponse = decode(response)?;
        Ok(data.sample.total_length_ms)
    }
}

impl SegmentService for SegmentClient {
    fn find_segments(&self, sample_id: u64) -> PrepResult<Vec<Segment>> {
        let body = json!({
            "shiftSegments": self.shift_segments,
            "segmentLengthMs": self.segment_length_ms,
        });
        let response = self
            .client
            .post(self.url(&format!("raw-data/{sample_id}/find-segments")))
            .json(&body)
            .send()?;
        let data: SegmentsResponse = decode(response)?;
        Ok(data.segments)
    }

    fn commit_segments(&self, sample_id: u64, segments: &[Segment]) -> PrepResult<()> {
        let response = self
            .client
            .post(self.url(&format!("raw-data/{sample_id}/segment")))
            .json(&json!({ "segments": segments }))
            .send()?;
        decode::<JsonValue>(response).map(|_| ())
    }
}

fn decode<T: DeserializeOwned>(response: Response) -> PrepResult<T> {
    let status = response.status();
    let text = response.text()?;
    if !status.is_success() {
        return Err(PrepError::RemoteService(format!("HTTP {status}: {text}")));
    }
    parse_body(&text)
}

/// Decode a response body, mapping `success: false` to a service error.
fn parse_body<T: DeserializeOwned>(text: &str) -> PrepResult<T> {
    let value: JsonValue = serde_json::from_str(text)
        .map_err(|e| PrepError::RemoteService(format!("malformed response: {e}")))?;
    if value.get("success").and_then(JsonValue::as_bool) == Some(false) {
        let msg = value
            .get("error")
            .and_then(JsonValue::as_str)
            .unwrap_or("request rejected");
        return Err(PrepError::RemoteService(msg.to_string()));
    }
    serde_json::from_value(value)
        .map_err(|e| PrepError::RemoteService(format!("unexpected response shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_wire_names() {
        let s: Segment = serde_json::from_str(r#"{"startMs": 120, "endMs": 2620}"#).unwrap();
        assert_eq!(s, Segment { start_ms: 120, end_ms: 2620 });
        assert_eq!(
            serde_json::to_value(s).unwrap(),
            json!({"startMs": 120, "endMs": 2620})
        );
    }

    #[test]
    fn failure_body_becomes_remote_error() {
        let err = parse_body::<JsonValue>(r#"{"success": false, "error": "Sample not found"}"#)
            .unwrap_err();
        match err {
            PrepError::RemoteService(msg) => assert_eq!(msg, "Sample not found"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn success_body_decodes() {
        let data: SegmentsResponse = parse_body(
            r#"{"success": true, "segments": [{"startMs": 0, "endMs": 2500}]}"#,
        )
        .unwrap();
        assert_eq!(data.segments.len(), 1);

        let ids: SamplesResponse =
            parse_body(r#"{"success": true, "samples": [{"id": 7, "filename": "a"}, {"id": 9}]}"#).unwrap();
        assert_eq!(ids.samples.iter().map(|s| s.id).collect::<Vec<_>>(), vec![7, 9]);

        let detail: SampleResponse =
            parse_body(r#"{"success": true, "sample": {"totalLengthMs": 10000}}"#).unwrap();
        assert_eq!(detail.sample.total_length_ms, 10000.0);
    }

    #[test]
    fn garbage_body_is_remote_error() {
        assert!(matches!(
            parse_body::<JsonValue>("<html>"),
            Err(PrepError::RemoteService(_))
        ));
    }

    #[test]
    fn client_requires_project() {
        let cfg = RemoteConfig {
            api_key: Some("k".into()),
            ..RemoteConfig::default()
        };
        assert!(matches!(SegmentClient::new(&cfg), Err(PrepError::Configuration(_))));
    }
}
