//! Application state: the question bank, the live session registry, and the
//! shared collaborators (matcher, gate, recognizer, progress client).
//!
//! This module owns:
//!   - the question bank keyed by lesson id (seeds + optional TOML bank)
//!   - the session registry (session id -> handle with optional event channel)
//!   - the per-session clock task driving elapsed time and auto-advances
//!
//! Handlers never mutate a `QuizSession` outside the registry lock; the clock
//! task is the only time-driven writer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::asr::AsrClient;
use crate::audio::AudioQualityGate;
use crate::config::{load_app_config_from_env, AppConfig, FeedbackTemplates};
use crate::domain::{Question, QuestionPayload, QuestionSource, SessionSummary};
use crate::engine::{AdvanceEvent, QuizPhase, QuizSession};
use crate::matcher::SimilarityMatcher;
use crate::recognize::{LocalRecognizer, RecognitionOrchestrator};
use crate::recorder::ProgressClient;
use crate::seeds::{fallback_voice_question, lexicon, seed_question_bank, transliteration_table};

/// How often the clock task wakes a session. Fine enough that a due advance
/// lands promptly; the elapsed counter itself only moves once per second.
const CLOCK_TICK: Duration = Duration::from_millis(250);

/// One live session plus the channel used to push server-initiated events
/// (question advances, completion). HTTP-only sessions have no channel and
/// observe the same transitions by polling.
pub struct SessionHandle {
  pub session: QuizSession,
  pub events: Option<mpsc::UnboundedSender<SessionEvent>>,
}

/// Server-initiated session transitions, pushed to the owning WebSocket.
#[derive(Clone, Debug)]
pub enum SessionEvent {
  Advanced { session_id: String, index: usize, total: usize, question: Question },
  Completed { session_id: String, summary: SessionSummary },
}

pub struct AppState {
  pub sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
  pub bank: HashMap<String, Vec<Question>>,
  pub matcher: SimilarityMatcher,
  pub gate: AudioQualityGate,
  pub recognizer: RecognitionOrchestrator,
  pub progress: Option<ProgressClient>,
  pub feedback_delay: Duration,
  pub milestones: Vec<u32>,
  pub use_fallback_question: bool,
  pub templates: FeedbackTemplates,
}

impl AppState {
  /// Build state from env: load config, assemble the bank, init the optional
  /// remote clients.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    Self::from_config(load_app_config_from_env().unwrap_or_default())
  }

  pub fn from_config(cfg: AppConfig) -> Self {
    let mut bank: HashMap<String, Vec<Question>> = HashMap::new();

    // Insert config-based questions first (if any); they win on id collisions.
    for qc in &cfg.questions {
      match qc.to_question() {
        Ok(q) => bank.entry(qc.lesson.clone()).or_default().push(q),
        Err(reason) => {
          error!(target: "quiz", lesson = %qc.lesson, kind = ?qc.kind, %reason, "Skipping bank entry");
        }
      }
    }

    // Always insert built-in seeds, but don't overwrite existing ids.
    for (lesson, questions) in seed_question_bank() {
      let entry = bank.entry(lesson).or_default();
      for q in questions {
        if !entry.iter().any(|existing| existing.id == q.id) {
          entry.push(q);
        }
      }
    }

    // Inventory summary by lesson/source.
    for (lesson, questions) in &bank {
      let from_bank = questions.iter().filter(|q| q.source == QuestionSource::LessonBank).count();
      let from_seed = questions.iter().filter(|q| q.source == QuestionSource::Seed).count();
      info!(target: "quiz", %lesson, total = questions.len(), lesson_bank = from_bank, seed = from_seed, "Startup question inventory");
    }

    let local = LocalRecognizer::new(
      lexicon(),
      cfg.recognition.languages.clone(),
      Duration::from_secs(cfg.recognition.attempt_timeout_secs),
      cfg.recognition.min_confidence,
      cfg.recognition.max_alternatives,
    );

    let mut remote = AsrClient::from_env();
    if let Some(asr) = remote.as_mut() {
      if !cfg.recognition.models.is_empty() {
        asr.models = cfg.recognition.models.clone();
      }
    }
    if let Some(asr) = &remote {
      info!(target: "makhraj_backend", base_url = %asr.base_url, models = ?asr.models, "Remote recognition enabled.");
    } else {
      info!(target: "makhraj_backend", "Remote recognition disabled (no ASR_BASE_URL). Local recognition only.");
    }

    let progress = ProgressClient::from_env();
    if let Some(pc) = &progress {
      info!(target: "makhraj_backend", base_url = %pc.base_url, "Progress recording enabled.");
    } else {
      info!(target: "makhraj_backend", "Progress recording disabled (no PROGRESS_BASE_URL).");
    }

    Self {
      sessions: Arc::new(RwLock::new(HashMap::new())),
      bank,
      matcher: SimilarityMatcher::new(
        cfg.matching.direct_threshold,
        cfg.matching.transliteration_threshold,
        transliteration_table(),
      ),
      gate: cfg.audio.to_gate(),
      recognizer: RecognitionOrchestrator::new(Some(local), remote),
      progress,
      feedback_delay: Duration::from_millis(cfg.quiz.feedback_delay_ms),
      milestones: cfg.quiz.streak_milestones.clone(),
      use_fallback_question: cfg.quiz.use_fallback_question,
      templates: cfg.feedback.clone(),
    }
  }

  /// Assemble a fresh question set for one session: the lesson's questions in
  /// shuffled order, with choice options and drag fragments shuffled too. An
  /// empty lesson substitutes the built-in fallback voice question unless
  /// that substitution is disabled.
  #[instrument(level = "debug", skip(self), fields(%lesson))]
  pub fn build_question_set(&self, lesson: &str) -> Vec<Question> {
    let mut rng = rand::thread_rng();
    let mut questions = self.bank.get(lesson).cloned().unwrap_or_default();
    questions.shuffle(&mut rng);
    for q in &mut questions {
      match &mut q.payload {
        QuestionPayload::MultipleChoice { options } => options.shuffle(&mut rng),
        QuestionPayload::DragAndDrop { choices, .. } => choices.shuffle(&mut rng),
        _ => {}
      }
    }

    if questions.is_empty() {
      if self.use_fallback_question {
        warn!(target: "quiz", %lesson, "Lesson resolved empty; substituting the fallback voice question");
        questions.push(fallback_voice_question());
      } else {
        warn!(target: "quiz", %lesson, "Lesson resolved empty and the fallback question is disabled");
      }
    }
    questions
  }

  /// Register a session under its id.
  #[instrument(level = "debug", skip(self, handle), fields(session_id = %handle.session.id))]
  pub async fn insert_session(&self, handle: SessionHandle) {
    let id = handle.session.id.clone();
    self.sessions.write().await.insert(id, handle);
  }

  /// Drop a session from the registry, returning the handle if it was live.
  #[instrument(level = "debug", skip(self), fields(%session_id))]
  pub async fn remove_session(&self, session_id: &str) -> Option<SessionHandle> {
    self.sessions.write().await.remove(session_id)
  }
}

/// Drive one session's clock: refresh the elapsed counter, perform due
/// advances, push the resulting events, and flush the summary on completion.
/// The task exits once the session reaches a terminal phase or leaves the
/// registry.
pub fn spawn_session_clock(state: Arc<AppState>, session_id: String) {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(CLOCK_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      let now = Instant::now();

      // Collect the flush under the lock, run it after releasing.
      let mut completed: Option<(String, SessionSummary)> = None;
      {
        let mut sessions = state.sessions.write().await;
        let Some(handle) = sessions.get_mut(&session_id) else { break };
        handle.session.tick_elapsed(now);
        match handle.session.advance_if_due(now) {
          Some(AdvanceEvent::Next { index, question }) => {
            let total = handle.session.total_questions();
            if let Some(tx) = &handle.events {
              let _ = tx.send(SessionEvent::Advanced {
                session_id: session_id.clone(),
                index,
                total,
                question,
              });
            }
          }
          Some(AdvanceEvent::Completed { summary }) => {
            if let Some(tx) = &handle.events {
              let _ = tx.send(SessionEvent::Completed {
                session_id: session_id.clone(),
                summary: summary.clone(),
              });
            }
            completed = Some((handle.session.lesson.clone(), summary));
          }
          None => {
            if handle.session.phase() == QuizPhase::Completed {
              // Abandoned elsewhere; nothing left to drive.
              break;
            }
          }
        }
      }

      if let Some((lesson, summary)) = completed {
        if let Some(progress) = &state.progress {
          if let Err(e) = progress.post_summary(&session_id, &lesson, &summary).await {
            error!(target: "quiz", %session_id, error = %e, "Summary flush failed");
          }
        }
        break;
      }
    }
    debug!(target: "quiz", %session_id, "Session clock stopped");
  });
}
