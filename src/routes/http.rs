//! HTTP endpoint handlers. These are thin wrappers that forward to core
//! logic. Errors map to status codes with a JSON body: unknown session 404,
//! malformed request 400, gate-rejected recordings 422.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::domain::ErrorKind;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorOut>);

fn api_error(status: StatusCode, message: impl Into<String>, kind: Option<ErrorKind>) -> ApiError {
  (status, Json(ErrorOut { error: message.into(), kind }))
}

fn from_request_error(e: RequestError) -> ApiError {
  let status = match &e {
    RequestError::UnknownSession(_) => StatusCode::NOT_FOUND,
    RequestError::BadRequest(_) => StatusCode::BAD_REQUEST,
  };
  api_error(status, e.to_string(), None)
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info")]
pub async fn http_letters() -> impl IntoResponse {
  Json(letters_out())
}

#[instrument(level = "info", skip(state, body), fields(lesson = ?body.lesson))]
pub async fn http_start_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartSessionIn>,
) -> Result<Json<SessionStartedOut>, ApiError> {
  match start_session(&state, body.lesson, None).await {
    Ok(out) => {
      info!(target: "quiz", session_id = %out.session_id, lesson = %out.lesson, "HTTP session started");
      Ok(Json(out))
    }
    Err(kind) => Err(api_error(StatusCode::NOT_FOUND, kind.user_message(), Some(kind))),
  }
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<SessionStateOut>, ApiError> {
  session_state(&state, &session_id).await.map(Json).map_err(from_request_error)
}

#[instrument(level = "info", skip(state, body), fields(%session_id))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
  Json(body): Json<AnswerIn>,
) -> Result<Json<FeedbackOut>, ApiError> {
  let answer = parse_submission(body.option_id, body.value, body.text)
    .map_err(|m| api_error(StatusCode::BAD_REQUEST, m, None))?;
  let out = submit_answer(&state, &session_id, answer).await.map_err(from_request_error)?;
  info!(target: "quiz", %session_id, correct = out.correct, "HTTP submit_answer evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%session_id, audio_len = body.audio_base64.len()))]
pub async fn http_post_voice(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
  Json(body): Json<VoiceIn>,
) -> Result<Json<FeedbackOut>, ApiError> {
  let reply = submit_voice(&state, &session_id, &body.audio_base64, &body.mime, body.sample_rate)
    .await
    .map_err(from_request_error)?;
  match reply {
    VoiceReply::Feedback(out) => {
      info!(target: "quiz", %session_id, correct = out.correct, "HTTP submit_voice evaluated");
      Ok(Json(out))
    }
    VoiceReply::Rejected(out) => {
      info!(target: "quiz", %session_id, kind = ?out.kind, "HTTP submit_voice rejected");
      Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, out.message, Some(out.kind)))
    }
  }
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_post_abandon(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<Json<SessionCompletedOut>, ApiError> {
  let summary = abandon_session(&state, &session_id).await.map_err(from_request_error)?;
  info!(target: "quiz", %session_id, "HTTP session abandoned");
  Ok(Json(SessionCompletedOut { session_id, summary }))
}
