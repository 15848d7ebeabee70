//! REST endpoints for admission, worker callbacks, and operator actions.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::ApiError;
use crate::mail::{ApproveRequest, AssistantResponseRequest, IncomingMail, ValidateRequest};
use crate::orchestrator::{Orchestrator, ResultOutcome};

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the service router.
pub fn api_routes(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };
    Router::new()
        .route("/process", post(process))
        .route("/validate_processed_message", post(validate_processed_message))
        .route("/processed", get(list_processed))
        .route("/approve", post(approve))
        .route("/add-assistant-response", post(add_assistant_response))
        .route("/hierarchy", get(hierarchy))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /process
///
/// Admit a mail and queue it for classification.
async fn process(
    State(state): State<ApiState>,
    body: Result<Json<IncomingMail>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(incoming) = body?;
    let id = state.orchestrator.admit(incoming).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"status": "queued", "id": id})),
    ))
}

/// POST /validate_processed_message
///
/// Worker callback. A rejected result still gets a 200: the callback was
/// handled, and `outcome` says whether the task was requeued or escalated.
async fn validate_processed_message(
    State(state): State<ApiState>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let outcome = state
        .orchestrator
        .validate_result(
            &req.id,
            &req.classification,
            req.model_answer.as_deref().map(|raw| raw.get()),
        )
        .await?;

    let body = match outcome {
        ResultOutcome::Accepted => json!({"status": "accepted", "outcome": "committed"}),
        ResultOutcome::Requeued { attempts } => {
            json!({"status": "accepted", "outcome": "requeued", "attempts": attempts})
        }
        ResultOutcome::Escalated => json!({"status": "accepted", "outcome": "escalated"}),
        ResultOutcome::Ignored { status } => {
            json!({"status": "accepted", "outcome": "ignored", "message_status": status})
        }
    };
    Ok(Json(body))
}

/// GET /processed
async fn list_processed(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let messages = state.orchestrator.list_processed().await?;
    Ok(Json(json!({"messages": messages})))
}

/// POST /approve
async fn approve(
    State(state): State<ApiState>,
    body: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    state.orchestrator.approve(&req.id).await?;
    Ok(Json(json!({"status": "approved", "id": req.id})))
}

/// POST /add-assistant-response
async fn add_assistant_response(
    State(state): State<ApiState>,
    body: Result<Json<AssistantResponseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    state
        .orchestrator
        .attach_assistant_response(
            &req.id,
            req.assistant_response.as_deref().map(|raw| raw.get()),
            req.mark_processed,
        )
        .await?;
    Ok(Json(json!({"status": "saved", "id": req.id})))
}

/// GET /hierarchy
async fn hierarchy(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.orchestrator.hierarchy().to_value())
}

/// GET /healthz
async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::orchestrator::test_support::setup;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let (orch, _store, _publisher) = setup(5).await;
        let app = api_routes(Arc::new(orch));
        let (status, body) = call(app, Request::get("/healthz").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn bad_json_is_400_with_error_body() {
        let (orch, _store, _publisher) = setup(5).await;
        let app = api_routes(Arc::new(orch));
        let (status, body) = call(app, post_json("/approve", "{\"id\":")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn missing_content_type_is_400() {
        let (orch, _store, _publisher) = setup(5).await;
        let app = api_routes(Arc::new(orch));
        let request = Request::post("/process")
            .body(Body::from(r#"{"input":"hi"}"#))
            .unwrap();
        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_processed_list() {
        let (orch, _store, _publisher) = setup(5).await;
        let app = api_routes(Arc::new(orch));
        let (status, body) = call(app, Request::get("/processed").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"messages": []}));
    }
}
