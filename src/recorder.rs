//! Best-effort delivery of attempt records and session summaries to the
//! progress service.
//!
//! Failures are logged and swallowed by the callers; a quiz never blocks on
//! bookkeeping. The client is only constructed when PROGRESS_BASE_URL is set.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use tracing::instrument;

use crate::domain::{AttemptRecord, QuestionKind, SessionSummary};
use crate::util::trunc_for_log;

#[derive(Clone)]
pub struct ProgressClient {
  pub client: reqwest::Client,
  pub base_url: String,
  pub api_token: Option<String>,
}

impl ProgressClient {
  /// Construct the client if we find PROGRESS_BASE_URL; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let base_url = std::env::var("PROGRESS_BASE_URL").ok()?;
    let base_url = base_url.trim().trim_end_matches('/').to_string();
    if base_url.is_empty() {
      return None;
    }

    let api_token = std::env::var("PROGRESS_API_TOKEN")
      .ok()
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, base_url, api_token })
  }

  /// Flush one graded answer. Called right after every submission.
  #[instrument(level = "debug", skip(self, record), fields(session_id = %session_id, question_id = %record.question_id))]
  pub async fn post_attempt(
    &self,
    session_id: &str,
    lesson: &str,
    record: &AttemptRecord,
  ) -> Result<(), String> {
    let body = attempt_body(session_id, lesson, record);
    self.post("attempts", &body).await
  }

  /// Flush the final summary once a session runs to completion. Abandoned
  /// sessions keep their per-question flushes but post no summary.
  #[instrument(level = "debug", skip(self, summary), fields(session_id = %session_id, lesson = %lesson))]
  pub async fn post_summary(
    &self,
    session_id: &str,
    lesson: &str,
    summary: &SessionSummary,
  ) -> Result<(), String> {
    let body = summary_body(session_id, lesson, summary);
    self.post("results", &body).await
  }

  async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), String> {
    let url = format!("{}/{}", self.base_url, path);
    let mut req = self
      .client
      .post(&url)
      .header(USER_AGENT, "makhraj-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    if let Some(token) = &self.api_token {
      req = req.header(AUTHORIZATION, format!("Bearer {}", token));
    }

    let res = req.json(body).send().await.map_err(|e| e.to_string())?;
    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      return Err(format!("progress HTTP {}: {}", status, trunc_for_log(&body, 300)));
    }
    Ok(())
  }
}

fn attempt_body(session_id: &str, lesson: &str, record: &AttemptRecord) -> AttemptBody {
  AttemptBody {
    session_id: session_id.to_string(),
    lesson: lesson.to_string(),
    question_id: record.question_id.clone(),
    question_type: record.question_type,
    user_answer: record.user_answer.clone(),
    correct_answer: record.correct_answer.clone(),
    is_correct: record.is_correct,
    answered_at: record.timestamp_utc.clone(),
  }
}

fn summary_body(session_id: &str, lesson: &str, summary: &SessionSummary) -> SummaryBody {
  SummaryBody {
    session_id: session_id.to_string(),
    lesson: lesson.to_string(),
    completed: true,
    completed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    score_percentage: summary.score_percent,
    correct_answers: summary.correct_count,
    total_questions: summary.total_questions,
    elapsed_seconds: summary.elapsed_seconds,
  }
}

// --- Progress DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttemptBody {
  session_id: String,
  lesson: String,
  question_id: String,
  question_type: QuestionKind,
  user_answer: String,
  correct_answer: String,
  is_correct: bool,
  answered_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryBody {
  session_id: String,
  lesson: String,
  completed: bool,
  completed_at: String,
  score_percentage: f32,
  correct_answers: u32,
  total_questions: u32,
  elapsed_seconds: u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn attempt_body_uses_the_wire_field_names() {
    let record = AttemptRecord {
      question_id: "q7".into(),
      question_type: QuestionKind::VoiceInput,
      user_answer: "qala".into(),
      correct_answer: "قال (qala)".into(),
      is_correct: true,
      timestamp_utc: "2026-08-25T10:15:30.123Z".into(),
    };
    let v = serde_json::to_value(attempt_body("s1", "pronunciation-basic", &record)).expect("json");
    assert_eq!(v["sessionId"], "s1");
    assert_eq!(v["questionId"], "q7");
    assert_eq!(v["questionType"], "voice_input");
    assert_eq!(v["isCorrect"], true);
    assert_eq!(v["answeredAt"], "2026-08-25T10:15:30.123Z");
  }

  #[test]
  fn summary_body_marks_the_lesson_completed() {
    let summary = SessionSummary {
      correct_count: 3,
      total_questions: 4,
      score_percent: 75.0,
      elapsed_seconds: 61,
    };
    let v = serde_json::to_value(summary_body("s1", "letters-basic", &summary)).expect("json");
    assert_eq!(v["completed"], true);
    assert_eq!(v["scorePercentage"], 75.0);
    assert_eq!(v["correctAnswers"], 3);
    assert_eq!(v["totalQuestions"], 4);
    assert!(v["completedAt"].as_str().map(|s| s.ends_with('Z')).unwrap_or(false));
  }
}
