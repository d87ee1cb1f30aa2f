use std::time::{Duration, Instant};

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "REPLICATE_API_TOKEN";

const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("REPLICATE_API_TOKEN is not set")]
    MissingToken,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("prediction {id} {status}: {reason}")]
    PredictionFailed {
        id: String,
        status: String,
        reason: String,
    },
    #[error("prediction {0} did not finish in time")]
    Timeout(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Rate limits, server errors, network trouble and failed predictions
    /// may succeed on another attempt; everything else will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::MissingToken | BackendError::Decode(_) => false,
            BackendError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BackendError::Status { code, .. } => *code == 429 || (500..600).contains(code),
            BackendError::PredictionFailed { .. } | BackendError::Timeout(_) => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PredictionUrls {
    pub get: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    pub urls: Option<PredictionUrls>,
}

impl Prediction {
    /// Output as a list of strings: a single string becomes a one-element list.
    pub fn output_strings(&self) -> Vec<String> {
        match &self.output {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct UploadedFile {
    urls: PredictionUrls,
}

/// Blocking client for a Replicate-style prediction API.
#[derive(Clone)]
pub struct ReplicateClient {
    http: Client,
    base_url: String,
    token: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ReplicateClient {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        poll_interval: Duration,
    ) -> Result<Self, BackendError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(BackendError::MissingToken);
        }
        let http = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            poll_interval,
            max_wait: DEFAULT_MAX_WAIT,
        })
    }

    /// Reads the token from [`TOKEN_ENV`].
    pub fn from_env(base_url: &str, poll_interval: Duration) -> Result<Self, BackendError> {
        let token = std::env::var(TOKEN_ENV).map_err(|_| BackendError::MissingToken)?;
        Self::new(base_url, token, poll_interval)
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Uploads a file and returns a URL predictions can take as input.
    pub fn upload(&self, bytes: Vec<u8>, filename: &str, mime: &str) -> Result<String, BackendError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)?;
        let form = multipart::Form::new().part("content", part);

        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()?;
        let uploaded: UploadedFile = parse_json(response)?;
        Ok(uploaded.urls.get)
    }

    /// Creates a prediction and blocks until it reaches a terminal status.
    ///
    /// Returns the prediction only when it succeeded.
    pub fn predict(&self, version: &str, input: Value) -> Result<Prediction, BackendError> {
        let response = self
            .http
            .post(format!("{}/predictions", self.base_url))
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&json!({ "version": version, "input": input }))
            .send()?;
        let mut prediction: Prediction = parse_json(response)?;
        log::debug!("Prediction {} is {:?}", prediction.id, prediction.status);

        let started = Instant::now();
        while !prediction.status.is_terminal() {
            if started.elapsed() > self.max_wait {
                return Err(BackendError::Timeout(prediction.id));
            }
            std::thread::sleep(self.poll_interval);
            prediction = self.fetch(&prediction)?;
        }

        match prediction.status {
            PredictionStatus::Succeeded => Ok(prediction),
            status => Err(BackendError::PredictionFailed {
                id: prediction.id.clone(),
                status: format!("{status:?}").to_lowercase(),
                reason: prediction
                    .error
                    .as_ref()
                    .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
                    .unwrap_or_else(|| "no error message".to_string()),
            }),
        }
    }

    fn fetch(&self, prediction: &Prediction) -> Result<Prediction, BackendError> {
        let url = match &prediction.urls {
            Some(urls) => urls.get.clone(),
            None => format!("{}/predictions/{}", self.base_url, prediction.id),
        };
        let response = self.http.get(url).bearer_auth(&self.token).send()?;
        parse_json(response)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, BackendError> {
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(BackendError::Status {
            code: status.as_u16(),
            body: truncate(&body, 300),
        });
    }
    serde_json::from_str(&body)
        .map_err(|e| BackendError::Decode(format!("{e}: {}", truncate(&body, 300))))
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::rate_limited(429, true)]
    #[case::server_error(503, true)]
    #[case::bad_request(400, false)]
    #[case::unauthorized(401, false)]
    fn test_status_retry_classification(#[case] code: u16, #[case] retryable: bool) {
        let err = BackendError::Status {
            code,
            body: String::new(),
        };
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn test_failed_prediction_is_retryable() {
        let err = BackendError::PredictionFailed {
            id: "abc".into(),
            status: "failed".into(),
            reason: "CUDA out of memory".into(),
        };
        assert!(err.is_retryable());
        assert!(!BackendError::MissingToken.is_retryable());
        assert!(!BackendError::Decode("x".into()).is_retryable());
    }

    #[test]
    fn test_prediction_output_shapes() {
        let list: Prediction = serde_json::from_str(
            r#"{"id":"p1","status":"succeeded","output":["https://x/1.png","https://x/2.png"],"urls":{"get":"https://api/p1"}}"#,
        )
        .unwrap();
        assert_eq!(list.output_strings().len(), 2);

        let text: Prediction =
            serde_json::from_str(r#"{"id":"p2","status":"succeeded","output":"yes"}"#).unwrap();
        assert_eq!(text.output_strings(), vec!["yes".to_string()]);
        assert!(text.urls.is_none());

        let pending: Prediction =
            serde_json::from_str(r#"{"id":"p3","status":"processing","output":null}"#).unwrap();
        assert!(!pending.status.is_terminal());
        assert!(pending.output_strings().is_empty());
    }

    #[test]
    fn test_empty_token_is_rejected() {
        assert!(matches!(
            ReplicateClient::new("https://api.example.com/v1", "  ", Duration::from_secs(1)),
            Err(BackendError::MissingToken)
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
