//! Minimal HTTP client for the remote Arabic speech recognizer.
//!
//! We only call the /recognize endpoint with a multipart form (audio bytes,
//! target text, model id) and walk a fallback chain of models when one fails.
//! Calls are instrumented and log model names, latencies, and response sizes.
//!
//! NOTE: We never log the API token and we never log raw audio bytes.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::audio::AudioSample;
use crate::domain::ErrorKind;

fn default_models() -> Vec<String> {
  [
    "facebook/wav2vec2-large-xlsr-53-arabic",
    "jonatasgrosman/wav2vec2-large-xlsr-53-arabic",
    "facebook/wav2vec2-large-xlsr-53",
    "openai/whisper-small",
  ]
  .iter()
  .map(|m| m.to_string())
  .collect()
}

/// Successful transcription of one clip.
#[derive(Clone, Debug)]
pub struct AsrTranscription {
  pub text: String,
  pub model: String,
  pub confidence: Option<f64>,
}

/// Terminal failure after the fallback chain is exhausted (or a definitive
/// no-speech verdict that no other model could change).
#[derive(Clone, Debug)]
pub struct AsrFailure {
  pub kind: ErrorKind,
  pub message: String,
}

struct AttemptError {
  failure: AsrFailure,
  definitive: bool,
}

impl AttemptError {
  fn retryable(kind: ErrorKind, message: String) -> Self {
    Self { failure: AsrFailure { kind, message }, definitive: false }
  }
  fn definitive(kind: ErrorKind, message: String) -> Self {
    Self { failure: AsrFailure { kind, message }, definitive: true }
  }
}

#[derive(Clone)]
pub struct AsrClient {
  pub client: reqwest::Client,
  pub base_url: String,
  pub api_token: Option<String>,
  pub models: Vec<String>,
}

impl AsrClient {
  /// Construct the client if we find ASR_BASE_URL; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let base_url = std::env::var("ASR_BASE_URL").ok()?;
    let base_url = base_url.trim().trim_end_matches('/').to_string();
    if base_url.is_empty() {
      return None;
    }

    let api_token = std::env::var("ASR_API_TOKEN")
      .ok()
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty());

    let models = std::env::var("ASR_MODELS")
      .ok()
      .map(|raw| {
        raw
          .split(',')
          .map(|m| m.trim().to_string())
          .filter(|m| !m.is_empty())
          .collect::<Vec<_>>()
      })
      .filter(|ms| !ms.is_empty())
      .unwrap_or_else(default_models);

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, base_url, api_token, models })
  }

  /// Transcribe one clip, walking the model chain. A question may pin a model
  /// via `model_hint`; it is tried first, then the configured chain.
  #[instrument(level = "info", skip(self, sample), fields(expected = %target, bytes = sample.raw_bytes().len()))]
  pub async fn transcribe(
    &self,
    sample: &AudioSample,
    target: &str,
    model_hint: Option<&str>,
  ) -> Result<AsrTranscription, AsrFailure> {
    let order = self.model_order(model_hint);
    if order.is_empty() {
      return Err(AsrFailure {
        kind: ErrorKind::RecognitionServerError,
        message: "no recognition models configured".into(),
      });
    }

    let mut last = AsrFailure {
      kind: ErrorKind::RecognitionServerError,
      message: "Arabic speech recognition failed".into(),
    };
    for model in &order {
      let start = std::time::Instant::now();
      match self.recognize_once(sample, target, model).await {
        Ok(out) => {
          info!(
            model = %model,
            elapsed = ?start.elapsed(),
            text_len = out.text.chars().count(),
            "recognizer accepted clip"
          );
          return Ok(out);
        }
        Err(attempt) => {
          if attempt.definitive {
            return Err(attempt.failure);
          }
          warn!(
            model = %model,
            elapsed = ?start.elapsed(),
            error = %attempt.failure.message,
            "recognizer model failed, trying next"
          );
          last = attempt.failure;
        }
      }
    }
    Err(last)
  }

  fn model_order(&self, hint: Option<&str>) -> Vec<String> {
    let mut order = Vec::with_capacity(self.models.len() + 1);
    if let Some(h) = hint {
      let h = h.trim();
      if !h.is_empty() {
        order.push(h.to_string());
      }
    }
    for m in &self.models {
      if order.iter().all(|o| o != m) {
        order.push(m.clone());
      }
    }
    order
  }

  async fn recognize_once(
    &self,
    sample: &AudioSample,
    target: &str,
    model: &str,
  ) -> Result<AsrTranscription, AttemptError> {
    let url = format!("{}/recognize", self.base_url);

    let part = reqwest::multipart::Part::bytes(sample.raw_bytes().to_vec())
      .file_name("recording.wav")
      .mime_str(sample.mime())
      .map_err(|e| AttemptError::retryable(ErrorKind::RecognitionServerError, e.to_string()))?;
    let form = reqwest::multipart::Form::new()
      .part("audio", part)
      .text("model", model.to_string())
      .text("target_text", target.to_string());

    let mut req = self.client.post(&url).header(USER_AGENT, "makhraj-backend/0.1");
    if let Some(token) = &self.api_token {
      req = req.header(AUTHORIZATION, format!("Bearer {}", token));
    }

    let res = req.multipart(form).send().await.map_err(|e| {
      let kind = if e.is_timeout() {
        ErrorKind::RecognitionTimeout
      } else {
        ErrorKind::RecognitionNetworkError
      };
      AttemptError::retryable(kind, e.to_string())
    })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_service_error(&body).unwrap_or_else(|| body);
      return Err(AttemptError::retryable(
        ErrorKind::RecognitionServerError,
        format!("recognizer HTTP {}: {}", status, msg),
      ));
    }

    let body: RecognizeResponse = res
      .json()
      .await
      .map_err(|e| AttemptError::retryable(ErrorKind::RecognitionServerError, e.to_string()))?;

    if body.silence_detected {
      // The service analyzes the waveform itself; another model cannot help.
      return Err(AttemptError::definitive(
        ErrorKind::NoSpeechDetected,
        "recognizer classified the clip as silence".into(),
      ));
    }
    if !body.success {
      let msg = body.error.unwrap_or_else(|| "Arabic speech recognition failed".into());
      return Err(AttemptError::retryable(ErrorKind::RecognitionServerError, msg));
    }

    let text = body.transcription.trim().to_string();
    if text.chars().count() < 2 {
      return Err(AttemptError::definitive(
        ErrorKind::NoSpeechDetected,
        "recognizer returned an empty or degenerate transcription".into(),
      ));
    }

    Ok(AsrTranscription {
      text,
      model: body.model.unwrap_or_else(|| model.to_string()),
      confidence: body.confidence,
    })
  }
}

// --- Recognizer DTOs ---

#[derive(Deserialize)]
struct RecognizeResponse {
  #[serde(default)]
  success: bool,
  #[serde(default)]
  transcription: String,
  #[serde(default)]
  error: Option<String>,
  #[serde(default, rename = "silenceDetected")]
  silence_detected: bool,
  #[serde(default)]
  model: Option<String>,
  #[serde(default)]
  confidence: Option<f64>,
}

/// Try to extract a clean error message from a recognizer error body. The
/// service reports either a plain string or an object with a message field.
fn extract_service_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EField,
  }
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum EField {
    Plain(String),
    Nested { message: String },
  }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(match w.error {
      EField::Plain(s) => s,
      EField::Nested { message } => message,
    }),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client_with_models(models: &[&str]) -> AsrClient {
    AsrClient {
      client: reqwest::Client::new(),
      base_url: "http://localhost:9".into(),
      api_token: None,
      models: models.iter().map(|m| m.to_string()).collect(),
    }
  }

  #[test]
  fn hint_goes_first_without_duplication() {
    let c = client_with_models(&["a", "b"]);
    assert_eq!(c.model_order(None), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(c.model_order(Some("b")), vec!["b".to_string(), "a".to_string()]);
    assert_eq!(
      c.model_order(Some("x")),
      vec!["x".to_string(), "a".to_string(), "b".to_string()]
    );
  }

  #[test]
  fn default_chain_starts_with_the_arabic_model() {
    let models = default_models();
    assert_eq!(models.len(), 4);
    assert_eq!(models[0], "facebook/wav2vec2-large-xlsr-53-arabic");
  }

  #[test]
  fn error_bodies_yield_clean_messages() {
    assert_eq!(
      extract_service_error(r#"{"error":"model is loading"}"#).as_deref(),
      Some("model is loading")
    );
    assert_eq!(
      extract_service_error(r#"{"error":{"message":"bad audio"}}"#).as_deref(),
      Some("bad audio")
    );
    assert_eq!(extract_service_error("not json"), None);
  }

  #[test]
  fn response_fields_deserialize_with_defaults() {
    let ok: RecognizeResponse =
      serde_json::from_str(r#"{"success":true,"transcription":"قال","silenceDetected":false}"#)
        .expect("parse");
    assert!(ok.success);
    assert_eq!(ok.transcription, "قال");
    assert!(ok.model.is_none());

    let silent: RecognizeResponse =
      serde_json::from_str(r#"{"success":true,"transcription":"","silenceDetected":true}"#)
        .expect("parse");
    assert!(silent.silence_detected);
  }
}
