//! On-device recognizer and the local-then-remote orchestration around it.
//!
//! The local pass never leaves the process: it segments the clip into voiced
//! bursts and scores lexicon entries by syllable count and duration fit,
//! trying each configured language in turn under a per-attempt timeout. Only
//! when no guess clears the confidence floor do we hand the clip to the
//! remote recognizer, and only when one is configured. Recognition never
//! returns an Err outward; failures travel as a kind inside the result.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::asr::AsrClient;
use crate::audio::AudioSample;
use crate::domain::ErrorKind;
use crate::util::normalize_answer;

const FRAME_ENERGY_FLOOR: f32 = 0.01;
const SYLLABLE_SECS: f64 = 0.22;
const GAP_HANGOVER_FRAMES: usize = 2;
const MIN_BURST_FRAMES: usize = 2;

/// Which pass produced (or last touched) the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionSource {
  Local,
  Remote,
}

/// What the pipeline heard, or why it heard nothing.
#[derive(Clone, Debug)]
pub struct RecognitionResult {
  pub success: bool,
  pub text: String,
  pub confidence: Option<f64>,
  pub source: RecognitionSource,
  pub error: Option<ErrorKind>,
}

impl RecognitionResult {
  pub fn heard(text: String, confidence: Option<f64>, source: RecognitionSource) -> Self {
    Self { success: true, text, confidence, source, error: None }
  }

  pub fn failed(kind: ErrorKind, source: RecognitionSource) -> Self {
    Self { success: false, text: String::new(), confidence: None, source, error: Some(kind) }
  }
}

/// One lexicon entry the local pass can decode to.
#[derive(Clone, Debug)]
pub struct LexEntry {
  pub arabic: String,
  pub latin: String,
  pub syllables: u32,
}

#[derive(Clone, Debug)]
pub struct LocalGuess {
  pub text: String,
  pub confidence: f64,
}

pub struct LocalRecognizer {
  lexicon: Vec<LexEntry>,
  languages: Vec<String>,
  attempt_timeout: Duration,
  min_confidence: f64,
  max_alternatives: usize,
}

impl LocalRecognizer {
  pub fn new(
    lexicon: Vec<LexEntry>,
    languages: Vec<String>,
    attempt_timeout: Duration,
    min_confidence: f64,
    max_alternatives: usize,
  ) -> Self {
    Self { lexicon, languages, attempt_timeout, min_confidence, max_alternatives }
  }

  /// Try each language in turn. Returns the first guess that clears the
  /// confidence floor, or None when every pass stays inconclusive.
  #[instrument(level = "debug", skip(self, sample), fields(secs = sample.duration_secs()))]
  pub async fn recognize(&self, sample: &AudioSample, expected: Option<&str>) -> Option<LocalGuess> {
    for language in &self.languages {
      let task = tokio::task::spawn_blocking({
        let lexicon = self.lexicon.clone();
        let sample = sample.clone();
        let language = language.clone();
        let expected = expected.map(|s| s.to_string());
        let max_alternatives = self.max_alternatives;
        move || decode_once(&lexicon, &sample, &language, expected.as_deref(), max_alternatives)
      });

      let guesses = match tokio::time::timeout(self.attempt_timeout, task).await {
        Ok(Ok(guesses)) => guesses,
        Ok(Err(e)) => {
          warn!(language = %language, error = %e, "local decode task failed");
          continue;
        }
        Err(_) => {
          warn!(language = %language, timeout = ?self.attempt_timeout, "local decode timed out");
          continue;
        }
      };

      if let Some(best) = guesses.first() {
        debug!(language = %language, candidates = ?guesses, "local decode candidates");
        if best.confidence >= self.min_confidence {
          return Some(best.clone());
        }
      }
    }
    None
  }
}

/// Score every lexicon entry against the clip's voiced bursts for one
/// language. Sorted best-first, truncated to `max_alternatives`.
fn decode_once(
  lexicon: &[LexEntry],
  sample: &AudioSample,
  language: &str,
  expected: Option<&str>,
  max_alternatives: usize,
) -> Vec<LocalGuess> {
  let rate = sample.sample_rate();
  if rate == 0 || sample.samples().is_empty() {
    return Vec::new();
  }
  let frame = (rate / 50) as usize;
  if frame == 0 {
    return Vec::new();
  }

  let energies: Vec<f32> = sample
    .samples()
    .chunks_exact(frame)
    .map(|w| (w.iter().map(|s| s * s).sum::<f32>() / w.len() as f32).sqrt())
    .collect();
  let bursts = detect_bursts(&energies);
  if bursts.is_empty() {
    return Vec::new();
  }

  let frame_secs = frame as f64 / rate as f64;
  let voiced_secs: f64 = bursts.iter().map(|(s, e)| (e - s) as f64 * frame_secs).sum();
  let expected_norm = expected.map(normalize_answer).filter(|e| !e.is_empty());

  let mut guesses: Vec<LocalGuess> = lexicon
    .iter()
    .map(|entry| {
      let burst_score = match (bursts.len() as i64 - entry.syllables as i64).abs() {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
      };
      let expected_secs = entry.syllables as f64 * SYLLABLE_SECS;
      let closeness = 1.0 - ((voiced_secs - expected_secs).abs() / expected_secs).min(1.0);
      let mut confidence = (0.15 + 0.55 * burst_score + 0.30 * closeness).clamp(0.0, 0.95);
      if let Some(exp) = &expected_norm {
        // Applied after the cap so a hinted entry still outranks saturated ties.
        if *exp == normalize_answer(&entry.latin) || *exp == normalize_answer(&entry.arabic) {
          confidence = (confidence + 0.05).min(1.0);
        }
      }
      let text = if language.starts_with("ar") { entry.arabic.clone() } else { entry.latin.clone() };
      LocalGuess { text, confidence }
    })
    .collect();

  guesses.sort_by(|a, b| {
    b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
  });
  guesses.truncate(max_alternatives.max(1));
  guesses
}

/// Collapse voiced frames into bursts. A gap of up to two frames joins the
/// surrounding speech; bursts shorter than two frames are noise and dropped.
fn detect_bursts(energies: &[f32]) -> Vec<(usize, usize)> {
  let mut bursts: Vec<(usize, usize)> = Vec::new();
  let mut start: Option<usize> = None;
  let mut gap = 0usize;
  for (i, &e) in energies.iter().enumerate() {
    if e > FRAME_ENERGY_FLOOR {
      if start.is_none() {
        start = Some(i);
      }
      gap = 0;
    } else if let Some(s) = start {
      gap += 1;
      if gap > GAP_HANGOVER_FRAMES {
        let end = i + 1 - gap;
        if end - s >= MIN_BURST_FRAMES {
          bursts.push((s, end));
        }
        start = None;
        gap = 0;
      }
    }
  }
  if let Some(s) = start {
    let end = energies.len() - gap;
    if end - s >= MIN_BURST_FRAMES {
      bursts.push((s, end));
    }
  }
  bursts
}

/// Local pass first, remote fallback second.
pub struct RecognitionOrchestrator {
  local: Option<LocalRecognizer>,
  remote: Option<AsrClient>,
}

impl RecognitionOrchestrator {
  pub fn new(local: Option<LocalRecognizer>, remote: Option<AsrClient>) -> Self {
    Self { local, remote }
  }

  pub fn remote_enabled(&self) -> bool {
    self.remote.is_some()
  }

  #[instrument(level = "debug", skip(self, sample), fields(expected = %target))]
  pub async fn recognize(
    &self,
    sample: &AudioSample,
    target: &str,
    model_hint: Option<&str>,
  ) -> RecognitionResult {
    if let Some(local) = &self.local {
      if let Some(guess) = local.recognize(sample, Some(target)).await {
        info!(text = %guess.text, confidence = guess.confidence, "local recognizer definitive");
        return RecognitionResult::heard(
          guess.text,
          Some(guess.confidence),
          RecognitionSource::Local,
        );
      }
      if self.remote.is_some() {
        warn!("local recognizer inconclusive, handing clip to remote");
      }
    }

    if let Some(remote) = &self.remote {
      return match remote.transcribe(sample, target, model_hint).await {
        Ok(t) => RecognitionResult::heard(t.text, t.confidence, RecognitionSource::Remote),
        Err(f) => {
          warn!(kind = ?f.kind, error = %f.message, "remote recognition failed");
          RecognitionResult::failed(f.kind, RecognitionSource::Remote)
        }
      };
    }

    if self.local.is_some() {
      RecognitionResult::failed(ErrorKind::NoSpeechDetected, RecognitionSource::Local)
    } else {
      RecognitionResult::failed(ErrorKind::RecognitionServerError, RecognitionSource::Local)
    }
  }
}
