//! Captured-audio decoding and the pre-recognition quality gate.
//!
//! Flow:
//! 1) Client submits a base64 PCM16 mono recording (plus its mime type).
//! 2) `AudioSample` decodes it once and derives duration/RMS/peak/speech-ratio.
//! 3) `AudioQualityGate::assess` accepts or rejects before any recognizer runs.
//!
//! A rejected sample short-circuits the voice pipeline: nothing is recognized,
//! no attempt is recorded, and the learner re-records.

use base64::Engine as _;
use serde::Serialize;

use crate::domain::ErrorKind;

/// Decoded mono recording. Keeps the raw bytes so the remote recognizer can
/// upload the exact payload the client sent.
#[derive(Clone, Debug)]
pub struct AudioSample {
  samples: Vec<f32>,
  sample_rate: u32,
  raw: Vec<u8>,
  mime: String,
}

impl AudioSample {
  /// Decode a base64 PCM16 little-endian mono payload.
  pub fn from_pcm16_base64(audio_base64: &str, mime: &str, sample_rate: u32) -> Result<Self, String> {
    let raw = base64::engine::general_purpose::STANDARD
      .decode(audio_base64.trim())
      .map_err(|e| format!("invalid base64 audio payload: {}", e))?;
    if raw.is_empty() {
      return Err("empty audio payload".into());
    }
    let samples: Vec<f32> = raw
      .chunks_exact(2)
      .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
      .collect();
    if samples.is_empty() {
      return Err("audio payload shorter than one sample".into());
    }
    Ok(Self { samples, sample_rate: sample_rate.max(1), raw, mime: mime.to_string() })
  }

  /// Build a sample directly from float samples. The raw bytes are the PCM16
  /// encoding of the given waveform.
  pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
    let mut raw = Vec::with_capacity(samples.len() * 2);
    for s in &samples {
      let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
      raw.extend_from_slice(&v.to_le_bytes());
    }
    Self { samples, sample_rate: sample_rate.max(1), raw, mime: "audio/wav".into() }
  }

  pub fn samples(&self) -> &[f32] {
    &self.samples
  }

  pub fn sample_rate(&self) -> u32 {
    self.sample_rate
  }

  pub fn raw_bytes(&self) -> &[u8] {
    &self.raw
  }

  pub fn mime(&self) -> &str {
    &self.mime
  }

  pub fn duration_secs(&self) -> f32 {
    self.samples.len() as f32 / self.sample_rate as f32
  }

  pub fn rms(&self) -> f32 {
    let sum: f32 = self.samples.iter().map(|s| s * s).sum();
    (sum / self.samples.len() as f32).sqrt()
  }

  pub fn peak(&self) -> f32 {
    self.samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
  }

  /// Fraction of samples above the silence threshold.
  pub fn speech_ratio(&self, silence_threshold: f32) -> f32 {
    let speech = self.samples.iter().filter(|s| s.abs() > silence_threshold).count();
    speech as f32 / self.samples.len() as f32
  }

  /// Volume as a 0..100 level (RMS scaled, saturating).
  pub fn volume_level(&self) -> f32 {
    (self.rms() * 1000.0).min(100.0)
  }
}

/// Why the gate refused a recording. `kind` is the public classification;
/// `message` is what the learner sees.
#[derive(Clone, Debug, Serialize)]
pub struct AudioRejection {
  pub kind: ErrorKind,
  pub message: String,
}

/// Pre-recognition checks on a decoded sample. All thresholds are exclusive:
/// a value sitting exactly on a limit is rejected.
#[derive(Clone, Copy, Debug)]
pub struct AudioQualityGate {
  pub min_duration_secs: f32,
  pub min_volume_level: f32,
  pub silence_threshold: f32,
  pub min_speech_ratio: f32,
  pub min_peak: f32,
}

impl Default for AudioQualityGate {
  fn default() -> Self {
    Self {
      min_duration_secs: 0.2,
      min_volume_level: 1.0,
      silence_threshold: 0.01,
      min_speech_ratio: 0.05,
      min_peak: 0.005,
    }
  }
}

impl AudioQualityGate {
  /// Accept or reject a recording. Checks run in a fixed order so the learner
  /// always gets the most actionable reason: too short, then too quiet, then
  /// no clear speech, then too weak a signal.
  pub fn assess(&self, sample: &AudioSample) -> Result<(), AudioRejection> {
    if !(sample.duration_secs() > self.min_duration_secs) {
      return Err(AudioRejection {
        kind: ErrorKind::AudioTooShort,
        message: "Recording too short. Try speaking a little longer.".into(),
      });
    }
    if !(sample.volume_level() > self.min_volume_level) {
      return Err(AudioRejection {
        kind: ErrorKind::AudioTooQuiet,
        message: "Volume too low. Try speaking louder.".into(),
      });
    }
    if !(sample.speech_ratio(self.silence_threshold) > self.min_speech_ratio) {
      return Err(AudioRejection {
        kind: ErrorKind::NoSpeechDetected,
        message: "No clear speech detected. Make sure you pronounce the letter.".into(),
      });
    }
    if !(sample.peak() > self.min_peak) {
      return Err(AudioRejection {
        kind: ErrorKind::NoSpeechDetected,
        message: "Audio signal too weak. Move closer to the microphone.".into(),
      });
    }
    Ok(())
  }
}

/// Synthesize a waveform of `bursts` voiced segments separated by silence.
/// Shared by audio and recognizer tests.
#[cfg(test)]
pub(crate) fn synth_bursts(bursts: usize, burst_secs: f32, gap_secs: f32, amplitude: f32) -> AudioSample {
  let rate = 16_000u32;
  let mut samples = Vec::new();
  // Lead-in silence so bursts never start at sample zero.
  samples.resize((0.05 * rate as f32) as usize, 0.0);
  for i in 0..bursts {
    let burst_len = (burst_secs * rate as f32) as usize;
    for n in 0..burst_len {
      let t = n as f32 / rate as f32;
      samples.push(amplitude * (2.0 * std::f32::consts::PI * 220.0 * t).sin());
    }
    if i + 1 < bursts {
      samples.resize(samples.len() + (gap_secs * rate as f32) as usize, 0.0);
    }
  }
  samples.resize(samples.len() + (0.05 * rate as f32) as usize, 0.0);
  AudioSample::from_samples(samples, rate)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_sample_is_rejected_first() {
    // 0.05 s of loud speech: fails duration before anything else.
    let sample = synth_bursts(1, 0.05, 0.0, 0.5);
    let short = AudioSample::from_samples(sample.samples()[..800].to_vec(), 16_000);
    let rej = AudioQualityGate::default().assess(&short).expect_err("must reject");
    assert_eq!(rej.kind, ErrorKind::AudioTooShort);
    assert!(rej.message.contains("too short"));
  }

  #[test]
  fn quiet_sample_is_rejected_as_too_quiet() {
    // Long enough, but amplitude keeps RMS under the volume floor.
    let samples = vec![0.0004_f32; 16_000];
    let sample = AudioSample::from_samples(samples, 16_000);
    let rej = AudioQualityGate::default().assess(&sample).expect_err("must reject");
    assert_eq!(rej.kind, ErrorKind::AudioTooQuiet);
  }

  #[test]
  fn sparse_speech_is_rejected_as_no_speech() {
    // Loud but only ~1% of samples are voiced: volume passes, ratio fails.
    let mut samples = vec![0.0_f32; 16_000];
    for s in samples.iter_mut().take(160) {
      *s = 0.9;
    }
    let sample = AudioSample::from_samples(samples, 16_000);
    let rej = AudioQualityGate::default().assess(&sample).expect_err("must reject");
    assert_eq!(rej.kind, ErrorKind::NoSpeechDetected);
    assert!(rej.message.contains("No clear speech"));
  }

  #[test]
  fn weak_peak_is_rejected_with_distinct_message() {
    // With the default 0.01 silence threshold the ratio check fires before the
    // peak check ever can; a lowered threshold makes the peak floor reachable.
    let gate = AudioQualityGate { silence_threshold: 0.001, ..Default::default() };
    let samples = vec![0.0045_f32; 16_000];
    let sample = AudioSample::from_samples(samples, 16_000);
    let rej = gate.assess(&sample).expect_err("must reject");
    assert_eq!(rej.kind, ErrorKind::NoSpeechDetected);
    assert!(rej.message.contains("too weak"));
  }

  #[test]
  fn clear_speech_passes_the_gate() {
    let sample = synth_bursts(1, 0.4, 0.0, 0.5);
    AudioQualityGate::default().assess(&sample).expect("should pass");
  }

  #[test]
  fn pcm16_base64_round_trip() {
    let original = synth_bursts(1, 0.3, 0.0, 0.5);
    let b64 = base64::engine::general_purpose::STANDARD.encode(original.raw_bytes());
    let decoded = AudioSample::from_pcm16_base64(&b64, "audio/wav", 16_000).expect("decode");
    assert_eq!(decoded.samples().len(), original.samples().len());
    assert!((decoded.duration_secs() - original.duration_secs()).abs() < 1e-3);
  }

  #[test]
  fn garbage_base64_is_an_error() {
    assert!(AudioSample::from_pcm16_base64("not base64!!!", "audio/wav", 16_000).is_err());
  }
}
