//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Catalog
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/courses", get(http::http_get_courses))
        .route("/api/v1/courses/:id", get(http::http_get_course))
        .route("/api/v1/quizzes", get(http::http_get_quizzes))
        // Active session
        .route("/api/v1/quiz", get(http::http_get_session).delete(http::http_delete_session))
        .route("/api/v1/quiz/start", post(http::http_post_start))
        .route("/api/v1/quiz/retake", post(http::http_post_retake))
        .route("/api/v1/quiz/select", post(http::http_post_select))
        .route("/api/v1/quiz/submit", post(http::http_post_submit))
        .route("/api/v1/quiz/previous", post(http::http_post_previous))
        .route("/api/v1/quiz/dismiss_explanation", post(http::http_post_dismiss_explanation))
        // Certificates + progress
        .route("/api/v1/certificate", post(http::http_post_certificate))
        .route("/api/v1/certificate/cancel", post(http::http_post_certificate_cancel))
        .route("/api/v1/certificates", get(http::http_get_certificates))
        .route("/api/v1/progress", get(http::http_get_progress))
        .route(
            "/api/v1/profile",
            get(http::http_get_profile).put(http::http_put_profile).delete(http::http_delete_profile),
        )
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::catalog::Catalog;
    use crate::config::Settings;
    use crate::progress::ChainReceipt;
    use crate::storage::MemoryStore;
    use crate::wallet::{DisconnectedWallet, HostWallet};

    fn app_state() -> Arc<AppState> {
        Arc::new(AppState::with_parts(
            Catalog::from_config(None),
            Arc::new(MemoryStore::new()),
            HostWallet::Disconnected(DisconnectedWallet),
            Settings::default(),
        ))
    }

    async fn call(state: &Arc<AppState>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = build_router(state.clone()).oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    /// Presentation index of the correct option for the current question.
    async fn correct_choice(state: &Arc<AppState>) -> usize {
        let (_, view) = call(state, Method::GET, "/api/v1/quiz", None).await;
        let quiz = state.catalog.quiz(view["quiz_id"].as_str().unwrap()).unwrap();
        let question_id = view["question"]["id"].as_str().unwrap();
        let question = quiz.questions.iter().find(|q| q.id == question_id).unwrap();
        let right = &question.options[question.correct];
        view["question"]["options"].as_array().unwrap().iter().position(|o| o == right.as_str()).unwrap()
    }

    #[tokio::test]
    async fn health_and_catalog() {
        let state = app_state();
        let (status, body) = call(&state, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let (_, quizzes) = call(&state, Method::GET, "/api/v1/quizzes", None).await;
        assert_eq!(quizzes.as_array().unwrap().len(), 3);
        assert_eq!(quizzes[0]["id"], "blockchain-fundamentals");
        assert_eq!(quizzes[0]["completed"], false);

        let (status, course) = call(&state, Method::GET, "/api/v1/courses/blockchain-101", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(course["quizzes"][0]["id"], "blockchain-fundamentals");

        let (status, err) = call(&state, Method::GET, "/api/v1/courses/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(err["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn session_errors_map_to_status_codes() {
        let state = app_state();
        let (status, _) = call(&state, Method::GET, "/api/v1/quiz", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&state, Method::POST, "/api/v1/quiz/start", Some(json!({ "quizId": "missing" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, view) =
            call(&state, Method::POST, "/api/v1/quiz/start", Some(json!({ "quizId": "crypto-basics" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["total"], 3);
        assert_eq!(view["position"], 0);

        let (status, _) = call(&state, Method::POST, "/api/v1/quiz/submit", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&state, Method::POST, "/api/v1/quiz/select", Some(json!({ "option": 9 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&state, Method::DELETE, "/api/v1/quiz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["had_session"], true);
        let (status, _) = call(&state, Method::POST, "/api/v1/certificate", Some(json!({ "name": "Ada" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn perfect_run_issues_certificate_and_updates_progress() {
        let state = app_state();
        call(&state, Method::POST, "/api/v1/quiz/start", Some(json!({ "quizId": "blockchain-fundamentals" }))).await;

        let mut last = Value::Null;
        for answered in 1..=4 {
            let option = correct_choice(&state).await;
            let (status, _) = call(&state, Method::POST, "/api/v1/quiz/select", Some(json!({ "option": option }))).await;
            assert_eq!(status, StatusCode::OK);
            let (status, reply) = call(&state, Method::POST, "/api/v1/quiz/submit", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(reply["outcome"]["correct"], true);
            assert_eq!(reply["session"]["score"]["raw"], 25 * answered);
            assert_eq!(reply["session"]["passing"], answered * 25 >= 80);
            last = reply;
        }
        assert_eq!(last["session"]["score"]["percent"], 100);
        assert_eq!(last["result"]["score"]["percent"], 100);
        assert_eq!(last["result"]["passed"], true);

        let (status, issued) = call(&state, Method::POST, "/api/v1/certificate", Some(json!({ "name": "  Ada " }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issued["record"]["displayName"], "Ada");
        assert_eq!(issued["chain"]["status"], "skipped");

        let (_, progress) = call(&state, Method::GET, "/api/v1/progress", None).await;
        assert_eq!(progress["totalXp"], 50);
        assert_eq!(progress["certificates"], 1);
        assert_eq!(progress["level"], 1);
        assert_eq!(progress["streakDays"], 1);

        let (_, certs) = call(&state, Method::GET, "/api/v1/certificates", None).await;
        assert_eq!(certs.as_array().unwrap().len(), 1);
        assert_eq!(certs[0]["score"], 100);
        assert_eq!(certs[0]["confirmed"], Value::Null);

        state
            .store
            .record_receipt(&ChainReceipt {
                certificate_id: certs[0]["id"].as_str().unwrap().to_string(),
                transaction_hash: "0xfeed".into(),
                confirmed: true,
                recorded_at: chrono::Utc::now(),
            })
            .unwrap();
        let (_, certs) = call(&state, Method::GET, "/api/v1/certificates", None).await;
        assert_eq!(certs[0]["confirmed"], true);
        assert_eq!(certs[0]["transactionHash"], "0xfeed");
        assert_eq!(certs[0]["explorerUrl"], "https://explorer.aptoslabs.com/txn/0xfeed?network=devnet");

        let (_, quizzes) = call(&state, Method::GET, "/api/v1/quizzes", None).await;
        assert_eq!(quizzes[0]["completed"], true);
    }

    #[tokio::test]
    async fn profile_name_is_validated_and_used_as_default() {
        let state = app_state();
        let (_, profile) = call(&state, Method::GET, "/api/v1/profile", None).await;
        assert_eq!(profile["username"], "CryptoLearner");
        assert_eq!(profile["walletAddress"], Value::Null);

        let (status, _) = call(&state, Method::PUT, "/api/v1/profile", Some(json!({ "username": "   " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, profile) = call(&state, Method::PUT, "/api/v1/profile", Some(json!({ "username": "Grace" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["username"], "Grace");

        let (status, profile) = call(&state, Method::DELETE, "/api/v1/profile", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["username"], "CryptoLearner");
    }
}
