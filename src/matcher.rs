//! Fuzzy comparison of recognized speech against the expected utterance.
//!
//! Matching ladder, first hit wins:
//! 1) exact equality after normalization (similarity 1.0)
//! 2) normalized Levenshtein similarity at or above the direct threshold
//! 3) accepted transliteration spellings of the target, each scored the same
//!    way against a lower threshold
//!
//! Voice questions may carry a per-question tolerance that replaces the direct
//! threshold for that question only.

use std::collections::HashMap;

use serde::Serialize;
use strsim::normalized_levenshtein;

use crate::util::normalize_answer;

/// Which rung of the ladder produced the verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
  Exact,
  Similarity,
  Transliteration,
  None,
}

/// Outcome of one comparison. `similarity` is the best score seen, even when
/// it fell short of every threshold.
#[derive(Clone, Debug, Serialize)]
pub struct MatchResult {
  pub is_match: bool,
  pub similarity: f64,
  pub method: MatchMethod,
  pub matched_spelling: Option<String>,
}

impl MatchResult {
  fn none(similarity: f64) -> Self {
    Self { is_match: false, similarity, method: MatchMethod::None, matched_spelling: None }
  }
}

/// Deterministic, side-effect-free matcher. The transliteration table maps a
/// normalized target to its accepted spellings (Latin variants and the Arabic
/// form).
#[derive(Clone, Debug)]
pub struct SimilarityMatcher {
  direct_threshold: f64,
  transliteration_threshold: f64,
  table: HashMap<String, Vec<String>>,
}

impl SimilarityMatcher {
  pub fn new(
    direct_threshold: f64,
    transliteration_threshold: f64,
    table: HashMap<String, Vec<String>>,
  ) -> Self {
    Self { direct_threshold, transliteration_threshold, table }
  }

  /// Compare recognized text to the expected utterance.
  pub fn match_answer(&self, recognized: &str, target: &str, tolerance: Option<f64>) -> MatchResult {
    let recog = normalize_answer(recognized);
    let tgt = normalize_answer(target);
    if recog.is_empty() || tgt.is_empty() {
      return MatchResult::none(0.0);
    }

    if recog == tgt {
      return MatchResult {
        is_match: true,
        similarity: 1.0,
        method: MatchMethod::Exact,
        matched_spelling: None,
      };
    }

    let direct = normalized_levenshtein(&recog, &tgt);
    let threshold = tolerance.unwrap_or(self.direct_threshold);
    if direct >= threshold {
      return MatchResult {
        is_match: true,
        similarity: direct,
        method: MatchMethod::Similarity,
        matched_spelling: None,
      };
    }

    if let Some(spellings) = self.table.get(&tgt) {
      let mut best: Option<(f64, &String)> = None;
      for spelling in spellings {
        let sim = normalized_levenshtein(&recog, &normalize_answer(spelling));
        if best.map_or(true, |(b, _)| sim > b) {
          best = Some((sim, spelling));
        }
      }
      if let Some((sim, spelling)) = best {
        if sim >= self.transliteration_threshold {
          return MatchResult {
            is_match: true,
            similarity: sim,
            method: MatchMethod::Transliteration,
            matched_spelling: Some(spelling.clone()),
          };
        }
      }
    }

    MatchResult::none(direct)
  }
}
