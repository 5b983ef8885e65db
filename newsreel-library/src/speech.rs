//! Speech synthesis service boundary
//!
//! The narration pipeline only sees the `SpeechService` trait. Errors carry a
//! kind derived from the HTTP status so callers can tell a bad key from a
//! busy service.

use crate::http::HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Broad category of a service failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    Authentication,
    RateLimit,
    Network,
    Unknown,
}

impl ServiceErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            _ => Self::Unknown,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?} error from speech service: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::from_status(status),
            status: Some(status),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), e.to_string()),
            None => Self::new(ServiceErrorKind::Network, e.to_string()),
        }
    }
}

/// Synthesized narration as returned by the provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeechResult {
    pub audio_base64: String,
    /// Provider alignment in whatever shape it was sent; normalize before use
    #[serde(default)]
    pub alignment: Option<Value>,
}

pub trait SpeechService: Send + Sync {
    fn generate_speech(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<SpeechResult, ServiceError>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
}

/// HTTP implementation: `POST {endpoint}/{voice_id}` with a bearer key
pub struct HttpSpeechClient {
    http: HttpClient,
    endpoint: String,
    api_key: String,
    default_voice: String,
}

impl HttpSpeechClient {
    pub fn new(
        http: HttpClient,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        default_voice: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            default_voice: default_voice.into(),
        }
    }

    fn url_for(&self, voice: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), voice)
    }
}

impl SpeechService for HttpSpeechClient {
    fn generate_speech(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<SpeechResult, ServiceError> {
        let voice = voice_id.unwrap_or(&self.default_voice);
        if voice.is_empty() {
            return Err(ServiceError::new(
                ServiceErrorKind::Unknown,
                "no voice configured",
            ));
        }
        if self.api_key.is_empty() {
            return Err(ServiceError::new(
                ServiceErrorKind::Authentication,
                "no API key configured",
            ));
        }

        let auth = format!("Bearer {}", self.api_key);
        let response = self.http.post_json(
            &self.url_for(voice),
            &[("Authorization", auth.as_str())],
            &SpeechRequest { text },
        )?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Speech request failed");
            return Err(ServiceError::from_status(status.as_u16(), body));
        }

        let result: SpeechResult = response.json()?;
        tracing::debug!(
            voice,
            chars = text.chars().count(),
            has_alignment = result.alignment.is_some(),
            "Generated speech"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            ServiceErrorKind::from_status(401),
            ServiceErrorKind::Authentication
        );
        assert_eq!(
            ServiceErrorKind::from_status(403),
            ServiceErrorKind::Authentication
        );
        assert_eq!(ServiceErrorKind::from_status(429), ServiceErrorKind::RateLimit);
        assert_eq!(ServiceErrorKind::from_status(500), ServiceErrorKind::Unknown);
    }

    #[test]
    fn test_result_parses_without_alignment() {
        let result: SpeechResult =
            serde_json::from_str(r#"{"audio_base64": "AAAA"}"#).unwrap();
        assert_eq!(result.alignment, None);

        let result: SpeechResult =
            serde_json::from_str(r#"{"audio_base64": "AAAA", "alignment": null}"#).unwrap();
        assert_eq!(result.alignment, None);
    }

    #[test]
    fn test_missing_key_fails_before_request() {
        let client = HttpSpeechClient::new(HttpClient::new().unwrap(), "http://localhost:1", "", "voice");
        let err = client.generate_speech("hello", None).unwrap_err();
        assert_eq!(err.kind, ServiceErrorKind::Authentication);
        assert_eq!(err.status, None);
    }

    #[test]
    fn test_url_joins_voice() {
        let client = HttpSpeechClient::new(HttpClient::new().unwrap(), "https://tts.local/v1/", "k", "v");
        assert_eq!(client.url_for("abc"), "https://tts.local/v1/abc");
    }
}
