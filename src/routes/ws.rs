//! WebSocket upgrade + message loop. Each client message is parsed as JSON
//! and forwarded to core logic; every request gets exactly one reply. The
//! socket is split so session events (question advances, completion) can be
//! pushed while the read half waits.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use crate::logic::*;
use crate::protocol::{
  to_out, ClientWsMessage, QuestionAdvancedOut, ServerWsMessage, SessionCompletedOut,
};
use crate::state::{AppState, SessionEvent};

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "makhraj_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
  info!(target: "makhraj_backend", "WebSocket connected");
  let (mut sink, mut stream) = socket.split();
  let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEvent>();
  // Sessions this socket started; abandoned for it on disconnect.
  let mut sessions_started: Vec<String> = Vec::new();

  loop {
    tokio::select! {
      incoming = stream.next() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            // Parse, dispatch, serialize response.
            let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(incoming) => {
                debug!(target: "makhraj_backend", kind = incoming.name(), "WS message received");
                handle_client_ws(incoming, &state, &events_tx, &mut sessions_started).await
              }
              Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
            };
            if !send_ws(&mut sink, &reply_msg).await {
              break;
            }
          }
          Message::Ping(payload) => { let _ = sink.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      event = events_rx.recv() => {
        // recv cannot yield None while we hold a sender.
        let Some(event) = event else { break };
        let push = match event {
          SessionEvent::Advanced { session_id, index, total, question } => {
            ServerWsMessage::QuestionAdvanced(QuestionAdvancedOut {
              session_id,
              index,
              total_questions: total,
              question: to_out(&question),
            })
          }
          SessionEvent::Completed { session_id, summary } => {
            ServerWsMessage::SessionCompleted(SessionCompletedOut { session_id, summary })
          }
        };
        if !send_ws(&mut sink, &push).await {
          break;
        }
      }
    }
  }

  teardown_sessions(&state, &sessions_started).await;
  info!(target: "makhraj_backend", "WebSocket disconnected");
}

/// Serialize and send one message. False means the socket is gone.
async fn send_ws(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  if let Err(e) = sink.send(Message::Text(out)).await {
    error!(target: "makhraj_backend", error = %e, "WS send error");
    return false;
  }
  true
}

#[instrument(level = "info", skip_all, fields(kind = msg.name()))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &Arc<AppState>,
  events: &mpsc::UnboundedSender<SessionEvent>,
  sessions_started: &mut Vec<String>,
) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartSession { lesson } => {
      match start_session(state, lesson, Some(events.clone())).await {
        Ok(out) => {
          sessions_started.push(out.session_id.clone());
          info!(target: "quiz", session_id = %out.session_id, lesson = %out.lesson, "WS session started");
          ServerWsMessage::SessionStarted(out)
        }
        Err(kind) => ServerWsMessage::SessionFailed {
          kind,
          message: kind.user_message().to_string(),
        },
      }
    }

    ClientWsMessage::SubmitAnswer { session_id, option_id, value, text } => {
      match parse_submission(option_id, value, text) {
        Ok(answer) => match submit_answer(state, &session_id, answer).await {
          Ok(out) => {
            info!(target: "quiz", %session_id, correct = out.correct, "WS submit_answer evaluated");
            ServerWsMessage::AnswerFeedback(out)
          }
          Err(e) => ServerWsMessage::Error { message: e.to_string() },
        },
        Err(message) => ServerWsMessage::Error { message },
      }
    }

    ClientWsMessage::SubmitVoice { session_id, audio_base64, mime, sample_rate } => {
      match submit_voice(state, &session_id, &audio_base64, &mime, sample_rate).await {
        Ok(VoiceReply::Feedback(out)) => {
          info!(target: "quiz", %session_id, correct = out.correct, "WS submit_voice evaluated");
          ServerWsMessage::AnswerFeedback(out)
        }
        Ok(VoiceReply::Rejected(out)) => {
          info!(target: "quiz", %session_id, kind = ?out.kind, "WS submit_voice rejected");
          ServerWsMessage::VoiceRejected(out)
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::CaptureError { session_id, error } => {
      match capture_failure(state, &session_id, &error).await {
        Ok(out) => ServerWsMessage::VoiceRejected(out),
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::GetState { session_id } => match session_state(state, &session_id).await {
      Ok(out) => ServerWsMessage::SessionState(out),
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::AbandonSession { session_id } => {
      match abandon_session(state, &session_id).await {
        Ok(summary) => {
          sessions_started.retain(|id| id != &session_id);
          info!(target: "quiz", %session_id, "WS session abandoned");
          ServerWsMessage::SessionCompleted(SessionCompletedOut { session_id, summary })
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }
  }
}
