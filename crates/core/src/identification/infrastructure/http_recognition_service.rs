use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::identification::domain::recognition_service::{
    RecognitionError, RecognitionResponse, RecognitionService, RecognizedFace, ServiceBox,
};
use crate::shared::constants::MAX_PAYLOAD_BYTES;

pub const ENV_RECOGNITION_URL: &str = "FACE_INGEST_RECOGNITION_URL";
pub const ENV_RECOGNITION_KEY: &str = "FACE_INGEST_RECOGNITION_KEY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingVar(&'static str),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Recognition service reached over HTTP.
///
/// The image is POSTed as the raw request body with a bearer key; the
/// endpoint answers with `CelebrityFaces` / `UnrecognizedFaces` JSON.
pub struct HttpRecognitionService {
    client: reqwest::blocking::Client,
    url: String,
    key: String,
}

impl HttpRecognitionService {
    pub fn new(url: String, key: String) -> Result<Self, ConfigError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ConfigError::Client)?;
        Ok(Self { client, url, key })
    }

    /// Reads the endpoint and key from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_values(
            std::env::var(ENV_RECOGNITION_URL).ok(),
            std::env::var(ENV_RECOGNITION_KEY).ok(),
        )
    }

    fn from_values(url: Option<String>, key: Option<String>) -> Result<Self, ConfigError> {
        let url = non_empty(url).ok_or(ConfigError::MissingVar(ENV_RECOGNITION_URL))?;
        let key = non_empty(key).ok_or(ConfigError::MissingVar(ENV_RECOGNITION_KEY))?;
        Self::new(url, key)
    }
}

impl RecognitionService for HttpRecognitionService {
    fn recognize(&self, image: &[u8]) -> Result<RecognitionResponse, RecognitionError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.key)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(image.to_vec())
            .send()
            .map_err(|e| RecognitionError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status, image.len(), body));
        }

        let wire: WireResponse = response
            .json()
            .map_err(|e| RecognitionError::Fatal(format!("malformed response: {e}")))?;
        Ok(wire.into())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn classify_status(status: StatusCode, size: usize, body: String) -> RecognitionError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return RecognitionError::PayloadTooLarge {
            size,
            limit: MAX_PAYLOAD_BYTES,
        };
    }
    let reason = format!("HTTP {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        RecognitionError::Transient(reason)
    } else {
        RecognitionError::Fatal(reason)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireBox {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireFaceDetail {
    bounding_box: WireBox,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCelebrity {
    name: String,
    match_confidence: f64,
    face: WireFaceDetail,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireResponse {
    #[serde(default)]
    celebrity_faces: Vec<WireCelebrity>,
    #[serde(default)]
    unrecognized_faces: Vec<WireFaceDetail>,
}

impl From<WireBox> for ServiceBox {
    fn from(b: WireBox) -> Self {
        ServiceBox::new(b.left, b.top, b.width, b.height)
    }
}

impl From<WireResponse> for RecognitionResponse {
    fn from(wire: WireResponse) -> Self {
        RecognitionResponse {
            recognized: wire
                .celebrity_faces
                .into_iter()
                .map(|c| RecognizedFace {
                    name: c.name,
                    confidence: c.match_confidence,
                    bbox: c.face.bounding_box.into(),
                })
                .collect(),
            unrecognized: wire
                .unrecognized_faces
                .into_iter()
                .map(|f| f.bounding_box.into())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_parses_service_response() {
        let json = r#"{
            "CelebrityFaces": [{
                "Name": "Jane Doe",
                "Id": "abc",
                "MatchConfidence": 97.5,
                "Face": {"BoundingBox": {"Left": 0.1, "Top": 0.2, "Width": 0.05, "Height": 0.06}}
            }],
            "UnrecognizedFaces": [
                {"BoundingBox": {"Left": 0.5, "Top": 0.5, "Width": 0.1, "Height": 0.1}, "Confidence": 99.0}
            ]
        }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        let response = RecognitionResponse::from(wire);

        assert_eq!(response.recognized.len(), 1);
        assert_eq!(response.recognized[0].name, "Jane Doe");
        assert_relative_eq!(response.recognized[0].confidence, 97.5);
        assert_relative_eq!(response.recognized[0].bbox.top, 0.2);
        assert_eq!(response.unrecognized, vec![ServiceBox::new(0.5, 0.5, 0.1, 0.1)]);
    }

    #[test]
    fn test_missing_lists_default_to_empty() {
        let wire: WireResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(RecognitionResponse::from(wire), RecognitionResponse::default());
    }

    #[rstest]
    #[case(StatusCode::TOO_MANY_REQUESTS, true)]
    #[case(StatusCode::SERVICE_UNAVAILABLE, true)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, true)]
    #[case(StatusCode::REQUEST_TIMEOUT, true)]
    #[case(StatusCode::UNAUTHORIZED, false)]
    #[case(StatusCode::BAD_REQUEST, false)]
    fn test_status_classification(#[case] status: StatusCode, #[case] retryable: bool) {
        assert_eq!(
            classify_status(status, 10, String::new()).is_retryable(),
            retryable
        );
    }

    #[test]
    fn test_413_is_a_size_violation() {
        assert!(matches!(
            classify_status(StatusCode::PAYLOAD_TOO_LARGE, 7, String::new()),
            RecognitionError::PayloadTooLarge { size: 7, .. }
        ));
    }

    #[test]
    fn test_missing_credentials_are_a_config_error() {
        let err = HttpRecognitionService::from_values(None, Some("k".into())).err();
        assert!(matches!(err, Some(ConfigError::MissingVar(ENV_RECOGNITION_URL))));

        let err = HttpRecognitionService::from_values(Some("http://x".into()), Some("  ".into())).err();
        assert!(matches!(err, Some(ConfigError::MissingVar(ENV_RECOGNITION_KEY))));
    }

    #[test]
    fn test_complete_credentials_build_a_client() {
        let service =
            HttpRecognitionService::from_values(Some("http://localhost:1".into()), Some("k".into()));
        assert!(service.is_ok());
    }
}
