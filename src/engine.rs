//! Quiz session state machine.
//!
//! A session walks Loading -> InProgress -> ShowingFeedback -> (InProgress |
//! Completed). Every transition takes an explicit instant so the machine can
//! be driven by the session clock in production and by hand in tests. The
//! machine holds no channels and does no I/O; pushing events to clients and
//! flushing records is the caller's business.

use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::domain::{AttemptRecord, Question, SessionSummary};
use crate::validator::Verdict;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizPhase {
  Loading,
  InProgress,
  ShowingFeedback,
  Completed,
}

/// What one graded answer did to the running totals.
#[derive(Clone, Debug)]
pub struct FeedbackOutcome {
  pub is_correct: bool,
  pub score: u32,
  pub streak: u32,
  pub milestone: Option<u32>,
}

/// Emitted by the session clock when the feedback hold expires.
#[derive(Clone, Debug)]
pub enum AdvanceEvent {
  Next { index: usize, question: Question },
  Completed { summary: SessionSummary },
}

pub struct QuizSession {
  pub id: String,
  pub lesson: String,
  questions: Vec<Question>,
  phase: QuizPhase,
  current_index: usize,
  score: u32,
  streak: u32,
  best_streak: u32,
  elapsed_seconds: u64,
  answers: Vec<AttemptRecord>,
  started_at: Option<Instant>,
  feedback_until: Option<Instant>,
  summary: Option<SessionSummary>,
}

impl QuizSession {
  pub fn new(id: String, lesson: String, questions: Vec<Question>) -> Result<Self, String> {
    if questions.is_empty() {
      return Err(format!("no questions available for lesson '{lesson}'"));
    }
    Ok(Self {
      id,
      lesson,
      questions,
      phase: QuizPhase::Loading,
      current_index: 0,
      score: 0,
      streak: 0,
      best_streak: 0,
      elapsed_seconds: 0,
      answers: Vec::new(),
      started_at: None,
      feedback_until: None,
      summary: None,
    })
  }

  pub fn phase(&self) -> QuizPhase {
    self.phase
  }
  pub fn current_index(&self) -> usize {
    self.current_index
  }
  pub fn total_questions(&self) -> usize {
    self.questions.len()
  }
  pub fn score(&self) -> u32 {
    self.score
  }
  pub fn streak(&self) -> u32 {
    self.streak
  }
  pub fn best_streak(&self) -> u32 {
    self.best_streak
  }
  pub fn elapsed_seconds(&self) -> u64 {
    self.elapsed_seconds
  }
  pub fn answers(&self) -> &[AttemptRecord] {
    &self.answers
  }
  pub fn summary(&self) -> Option<&SessionSummary> {
    self.summary.as_ref()
  }

  /// The question currently on screen, if the session is live.
  pub fn current_question(&self) -> Option<&Question> {
    match self.phase {
      QuizPhase::InProgress | QuizPhase::ShowingFeedback => self.questions.get(self.current_index),
      QuizPhase::Loading | QuizPhase::Completed => None,
    }
  }

  /// Leave Loading and put the first question on screen.
  #[instrument(level = "debug", skip(self, now), fields(session_id = %self.id))]
  pub fn start(&mut self, now: Instant) -> Result<(), String> {
    if self.phase != QuizPhase::Loading {
      return Err(format!("session already started (phase {:?})", self.phase));
    }
    self.phase = QuizPhase::InProgress;
    self.started_at = Some(now);
    info!(lesson = %self.lesson, total = self.questions.len(), "session started");
    Ok(())
  }

  /// Apply one graded answer. Rejected outside InProgress, so a duplicate
  /// submission during the feedback hold cannot double-count.
  #[instrument(level = "debug", skip(self, verdict, now, feedback_delay, milestones), fields(session_id = %self.id, index = self.current_index))]
  pub fn record_answer(
    &mut self,
    verdict: &Verdict,
    now: Instant,
    feedback_delay: Duration,
    milestones: &[u32],
  ) -> Result<FeedbackOutcome, String> {
    if self.phase != QuizPhase::InProgress {
      return Err(format!("session is not accepting answers (phase {:?})", self.phase));
    }
    let question = self
      .questions
      .get(self.current_index)
      .ok_or_else(|| "current question index out of range".to_string())?;

    self.answers.push(AttemptRecord {
      question_id: question.id.clone(),
      question_type: question.payload.kind(),
      user_answer: verdict.user_answer.clone(),
      correct_answer: verdict.correct_answer.clone(),
      is_correct: verdict.is_correct,
      timestamp_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });

    let mut milestone = None;
    if verdict.is_correct {
      self.score += 1;
      self.streak += 1;
      self.best_streak = self.best_streak.max(self.streak);
      if milestones.contains(&self.streak) {
        milestone = Some(self.streak);
      }
    } else {
      self.streak = 0;
    }

    self.phase = QuizPhase::ShowingFeedback;
    self.feedback_until = Some(now + feedback_delay);
    debug!(
      correct = verdict.is_correct,
      score = self.score,
      streak = self.streak,
      "answer recorded"
    );

    Ok(FeedbackOutcome {
      is_correct: verdict.is_correct,
      score: self.score,
      streak: self.streak,
      milestone,
    })
  }

  /// Move past the feedback hold once its deadline passes. None while the
  /// hold is still running or the session is not showing feedback.
  pub fn advance_if_due(&mut self, now: Instant) -> Option<AdvanceEvent> {
    if self.phase != QuizPhase::ShowingFeedback {
      return None;
    }
    let due = self.feedback_until?;
    if now < due {
      return None;
    }
    self.feedback_until = None;

    if self.current_index + 1 < self.questions.len() {
      self.current_index += 1;
      self.phase = QuizPhase::InProgress;
      let question = self.questions[self.current_index].clone();
      Some(AdvanceEvent::Next { index: self.current_index, question })
    } else {
      self.phase = QuizPhase::Completed;
      let summary = self.make_summary();
      self.summary = Some(summary.clone());
      info!(session_id = %self.id, score = self.score, total = self.questions.len(), "session completed");
      Some(AdvanceEvent::Completed { summary })
    }
  }

  /// Refresh the elapsed counter while the session is live.
  pub fn tick_elapsed(&mut self, now: Instant) {
    if matches!(self.phase, QuizPhase::InProgress | QuizPhase::ShowingFeedback) {
      if let Some(started) = self.started_at {
        self.elapsed_seconds = now.duration_since(started).as_secs();
      }
    }
  }

  /// End the session early. Questions never answered count against the
  /// score. Idempotent once completed.
  #[instrument(level = "debug", skip(self, now), fields(session_id = %self.id))]
  pub fn abandon(&mut self, now: Instant) -> SessionSummary {
    if let Some(summary) = &self.summary {
      return summary.clone();
    }
    self.tick_elapsed(now);
    self.phase = QuizPhase::Completed;
    self.feedback_until = None;
    let summary = self.make_summary();
    self.summary = Some(summary.clone());
    info!(answered = self.answers.len(), total = self.questions.len(), "session abandoned");
    summary
  }

  fn make_summary(&self) -> SessionSummary {
    let total = self.questions.len() as u32;
    let score_percent = if total == 0 {
      0.0
    } else {
      (self.score as f32 * 100.0 / total as f32).round()
    };
    SessionSummary {
      correct_count: self.score,
      total_questions: total,
      score_percent,
      elapsed_seconds: self.elapsed_seconds,
    }
  }

  /// Milliseconds left on the feedback hold, for state snapshots.
  pub fn feedback_remaining_ms(&self, now: Instant) -> Option<u64> {
    let due = self.feedback_until?;
    Some(due.saturating_duration_since(now).as_millis() as u64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{ChoiceOption, QuestionPayload, QuestionSource};

  const DELAY: Duration = Duration::from_millis(2000);
  const MILESTONES: [u32; 3] = [3, 5, 10];

  fn mc_question(id: &str) -> Question {
    Question {
      id: id.into(),
      prompt: "What is the name of this letter?".into(),
      payload: QuestionPayload::MultipleChoice {
        options: vec![
          ChoiceOption { id: "a".into(), label: "Alif".into(), correct: true },
          ChoiceOption { id: "b".into(), label: "Ba".into(), correct: false },
        ],
      },
      source: QuestionSource::Seed,
    }
  }

  fn session(n: usize) -> QuizSession {
    let questions = (0..n).map(|i| mc_question(&format!("q{i}"))).collect();
    QuizSession::new("s1".into(), "letters-basic".into(), questions).expect("non-empty")
  }

  fn verdict(correct: bool) -> Verdict {
    Verdict {
      is_correct: correct,
      user_answer: if correct { "Alif".into() } else { "Ba".into() },
      correct_answer: "Alif".into(),
    }
  }

  fn answer(s: &mut QuizSession, correct: bool, now: Instant) -> FeedbackOutcome {
    let out = s.record_answer(&verdict(correct), now, DELAY, &MILESTONES).expect("accepting");
    // Jump past the hold so the next answer can land.
    s.advance_if_due(now + DELAY);
    out
  }

  #[test]
  fn empty_question_list_is_rejected() {
    assert!(QuizSession::new("s".into(), "l".into(), Vec::new()).is_err());
  }

  #[test]
  fn full_run_keeps_one_record_per_question() {
    let mut s = session(4);
    let t0 = Instant::now();
    s.start(t0).expect("loading");
    for i in 0..4u64 {
      answer(&mut s, true, t0 + Duration::from_secs(i));
    }
    assert_eq!(s.phase(), QuizPhase::Completed);
    assert_eq!(s.answers().len(), 4);
    assert!(s.summary().is_some());
  }

  #[test]
  fn score_and_streak_follow_the_answer_pattern() {
    // correct, incorrect, correct, correct -> 75 %, streak 1 -> 0 -> 1 -> 2.
    let mut s = session(4);
    let t0 = Instant::now();
    s.start(t0).expect("loading");

    assert_eq!(answer(&mut s, true, t0).streak, 1);
    assert_eq!(answer(&mut s, false, t0).streak, 0);
    assert_eq!(answer(&mut s, true, t0).streak, 1);
    let last = answer(&mut s, true, t0);
    assert_eq!(last.streak, 2);
    assert_eq!(last.score, 3);

    let summary = s.summary().expect("completed");
    assert_eq!(summary.correct_count, 3);
    assert_eq!(summary.total_questions, 4);
    assert_eq!(summary.score_percent, 75.0);
    assert_eq!(s.best_streak(), 2);
  }

  #[test]
  fn milestone_fires_exactly_on_the_threshold() {
    let mut s = session(5);
    let t0 = Instant::now();
    s.start(t0).expect("loading");
    assert_eq!(answer(&mut s, true, t0).milestone, None);
    assert_eq!(answer(&mut s, true, t0).milestone, None);
    assert_eq!(answer(&mut s, true, t0).milestone, Some(3));
    assert_eq!(answer(&mut s, true, t0).milestone, None);
  }

  #[test]
  fn duplicate_submission_during_feedback_is_rejected() {
    let mut s = session(2);
    let t0 = Instant::now();
    s.start(t0).expect("loading");
    s.record_answer(&verdict(true), t0, DELAY, &MILESTONES).expect("first");
    let second = s.record_answer(&verdict(true), t0, DELAY, &MILESTONES);
    assert!(second.is_err());
    assert_eq!(s.answers().len(), 1);
    assert_eq!(s.score(), 1);
  }

  #[test]
  fn advance_waits_for_the_feedback_deadline() {
    let mut s = session(2);
    let t0 = Instant::now();
    s.start(t0).expect("loading");
    s.record_answer(&verdict(true), t0, DELAY, &MILESTONES).expect("accepting");

    assert!(s.advance_if_due(t0 + Duration::from_millis(500)).is_none());
    match s.advance_if_due(t0 + DELAY) {
      Some(AdvanceEvent::Next { index, question }) => {
        assert_eq!(index, 1);
        assert_eq!(question.id, "q1");
      }
      other => panic!("expected Next, got {other:?}"),
    }
    assert_eq!(s.phase(), QuizPhase::InProgress);
  }

  #[test]
  fn last_advance_completes_with_a_summary() {
    let mut s = session(1);
    let t0 = Instant::now();
    s.start(t0).expect("loading");
    s.record_answer(&verdict(true), t0, DELAY, &MILESTONES).expect("accepting");
    match s.advance_if_due(t0 + DELAY) {
      Some(AdvanceEvent::Completed { summary }) => {
        assert_eq!(summary.correct_count, 1);
        assert_eq!(summary.score_percent, 100.0);
      }
      other => panic!("expected Completed, got {other:?}"),
    }
  }

  #[test]
  fn abandon_freezes_the_session_early() {
    let mut s = session(3);
    let t0 = Instant::now();
    s.start(t0).expect("loading");
    answer(&mut s, true, t0);

    let summary = s.abandon(t0 + Duration::from_secs(30));
    assert_eq!(s.phase(), QuizPhase::Completed);
    assert_eq!(summary.correct_count, 1);
    assert_eq!(summary.total_questions, 3);
    assert_eq!(summary.elapsed_seconds, 30);
    // A second abandon returns the frozen summary unchanged.
    assert_eq!(s.abandon(t0 + Duration::from_secs(99)), summary);
  }

  #[test]
  fn elapsed_tracks_the_clock_while_live() {
    let mut s = session(2);
    let t0 = Instant::now();
    s.start(t0).expect("loading");
    s.tick_elapsed(t0 + Duration::from_secs(7));
    assert_eq!(s.elapsed_seconds(), 7);

    s.record_answer(&verdict(true), t0 + Duration::from_secs(8), DELAY, &MILESTONES).expect("ok");
    s.tick_elapsed(t0 + Duration::from_secs(9));
    assert_eq!(s.elapsed_seconds(), 9);
  }
}
