//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic with a single JSON reply. Countdown events from the
//! runner and republished progress are pushed without a request.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, instrument, warn};

use crate::logic::{self, ApiError};
use crate::protocol::{ClientWsMessage, ProgressOut, ServerWsMessage};
use crate::progress::badges;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "quizchain_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "quizchain_backend", error = %e, "WS send error");
      false
    }
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "quizchain_backend", "WebSocket connected");
  let mut events = state.runner.subscribe();
  let mut progress = state.progress.clone();
  progress.borrow_and_update();

  loop {
    let outgoing = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "quizchain_backend", "WS received: {:?}", &msg);
            handle_client_ws(msg, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
        Some(Ok(_)) => continue,
      },
      event = events.recv() => match event {
        Ok(event) => ServerWsMessage::Quiz { event },
        Err(RecvError::Lagged(skipped)) => {
          warn!(target: "quizchain_backend", skipped, "WS client lagging behind quiz events");
          continue;
        }
        Err(RecvError::Closed) => break,
      },
      changed = progress.changed() => {
        if changed.is_err() {
          break;
        }
        let record = progress.borrow_and_update().clone();
        ServerWsMessage::Progress { progress: ProgressOut { badges: badges(&record), progress: record } }
      }
    };

    if !send(&mut socket, &outgoing).await {
      break;
    }
  }
  info!(target: "quizchain_backend", "WebSocket disconnected");
}

fn error_msg(e: ApiError) -> ServerWsMessage {
  ServerWsMessage::Error { message: e.to_string() }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartQuiz { quiz_id } => match logic::start_quiz(state, &quiz_id).await {
      Ok(view) => {
        info!(target: "quiz", quiz = %quiz_id, "WS quiz started");
        ServerWsMessage::Session { session: Some(view) }
      }
      Err(e) => error_msg(e),
    },

    ClientWsMessage::Retake => match state.runner.retake().await {
      Ok(view) => ServerWsMessage::Session { session: Some(view) },
      Err(e) => error_msg(e.into()),
    },

    ClientWsMessage::GetSession => ServerWsMessage::Session { session: state.runner.snapshot().await },

    ClientWsMessage::Select { option } => match state.runner.select(option).await {
      Ok(view) => ServerWsMessage::Session { session: Some(view) },
      Err(e) => error_msg(e.into()),
    },

    ClientWsMessage::Submit => match state.runner.submit().await {
      Ok(reply) => {
        info!(target: "quiz", question = %reply.outcome.question_id, correct = reply.outcome.correct, "WS answer submitted");
        ServerWsMessage::Submitted { reply }
      }
      Err(e) => error_msg(e.into()),
    },

    ClientWsMessage::Previous => match state.runner.previous().await {
      Ok(view) => ServerWsMessage::Session { session: Some(view) },
      Err(e) => error_msg(e.into()),
    },

    ClientWsMessage::DismissExplanation => match state.runner.dismiss_explanation().await {
      Ok(view) => ServerWsMessage::Session { session: Some(view) },
      Err(e) => error_msg(e.into()),
    },

    ClientWsMessage::Abandon => ServerWsMessage::Abandoned { had_session: state.runner.abandon().await },

    ClientWsMessage::IssueCertificate { name } => match logic::issue_certificate(state, name.as_deref()).await {
      Ok(certificate) => ServerWsMessage::Certificate { certificate },
      Err(e) => error_msg(e),
    },

    ClientWsMessage::CancelCertificate => match state.runner.cancel_certificate().await {
      Ok(()) => ServerWsMessage::CertificateCancelled,
      Err(e) => error_msg(e.into()),
    },

    ClientWsMessage::GetProgress => ServerWsMessage::Progress { progress: logic::progress_out(state) },
  }
}
