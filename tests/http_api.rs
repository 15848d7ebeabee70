//! Integration tests for the mail triage HTTP API.
//!
//! Each test spins up an Axum server on a random port backed by an
//! in-memory store and the in-process publisher, then drives it with reqwest.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use mail_triage::api::api_routes;
use mail_triage::hierarchy::OrgHierarchy;
use mail_triage::mail::{ClassificationTask, DeadLetterEvent, MailStatus, ProcessedEvent};
use mail_triage::orchestrator::{Orchestrator, OrchestratorConfig};
use mail_triage::queue::MemoryPublisher;
use mail_triage::store::{LibSqlBackend, MailStore};

struct TestServer {
    base: String,
    client: reqwest::Client,
    store: Arc<LibSqlBackend>,
    publisher: Arc<MemoryPublisher>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

/// Start an Axum server on a random port.
async fn start_server(max_attempts: u32) -> TestServer {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let publisher = MemoryPublisher::new();

    let mut nodes = serde_json::Map::new();
    nodes.insert("support".into(), json!({"lead": "lead@x.com"}));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        publisher.clone(),
        OrchestratorConfig {
            max_attempts,
            ..OrchestratorConfig::default()
        },
        Arc::new(OrgHierarchy::new(nodes)),
    ));
    let app = api_routes(orchestrator);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        store,
        publisher,
    }
}

fn mail_body(id: &str) -> Value {
    json!({"id": id, "input": "Where is my invoice?", "from": "a@x.com", "to": "support@x.com"})
}

#[tokio::test]
async fn healthz_ok() {
    let server = start_server(5).await;
    let (status, body) = server.get("/healthz").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn process_queues_and_publishes_task() {
    let server = start_server(5).await;

    let (status, body) = server.post("/process", mail_body("m1")).await;
    assert_eq!(status, 202);
    assert_eq!(body, json!({"status": "queued", "id": "m1"}));

    let tasks = server.publisher.records_for("messages_to_process").await;
    assert_eq!(tasks.len(), 1);
    let task: ClassificationTask = tasks[0].decode().unwrap();
    assert_eq!(task.input, "Where is my invoice?");
}

#[tokio::test]
async fn process_generates_id_when_missing() {
    let server = start_server(5).await;
    let (status, body) = server
        .post("/process", json!({"input": "hi", "from": "a@x.com", "to": "b@x.com"}))
        .await;
    assert_eq!(status, 202);
    let id = body["id"].as_str().unwrap();
    assert!(!id.is_empty());
    assert!(server.store.get_mail(id).await.unwrap().is_some());
}

#[tokio::test]
async fn process_rejects_bad_address() {
    let server = start_server(5).await;
    let (status, body) = server
        .post("/process", json!({"id": "m1", "input": "hi", "from": "nope", "to": "b@x.com"}))
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("from"));
    assert!(server.store.get_mail("m1").await.unwrap().is_none());
    assert!(server.publisher.records().await.is_empty());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let server = start_server(5).await;
    let resp = server
        .client
        .post(server.url("/process"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn valid_result_is_committed_and_listed() {
    let server = start_server(5).await;
    server.post("/process", mail_body("m1")).await;

    let (status, body) = server
        .post(
            "/validate_processed_message",
            json!({"id": "m1", "classification": "billing", "model_answer": {"summary": "invoice"}}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["outcome"], "committed");

    let out = server.publisher.records_for("processed_messages").await;
    let event: ProcessedEvent = out[0].decode().unwrap();
    assert_eq!(event.classification, "billing");

    let (status, body) = server.get("/processed").await;
    assert_eq!(status, 200);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    let message = &messages[0];
    assert_eq!(message["id"], "m1");
    assert_eq!(message["status"], "processed");
    assert_eq!(message["classification"], "billing");
    assert_eq!(message["model_answer"], json!({"summary": "invoice"}));
    assert_eq!(message["attempts"], 0);
    assert_eq!(message["approved"], false);
    assert_eq!(message["from"], "a@x.com");
}

#[tokio::test]
async fn rejected_results_requeue_then_dead_letter() {
    let server = start_server(2).await;
    server.post("/process", mail_body("m1")).await;

    let bad = json!({"id": "m1", "classification": "", "model_answer": {}});

    let (status, body) = server.post("/validate_processed_message", bad.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "requeued");
    assert_eq!(body["attempts"], 1);

    let (status, body) = server.post("/validate_processed_message", bad.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "escalated");

    let (status, body) = server.post("/validate_processed_message", bad).await;
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["message_status"], "failed");

    let dead = server.publisher.records_for("messages_failed").await;
    assert_eq!(dead.len(), 1);
    let event: DeadLetterEvent = dead[0].decode().unwrap();
    assert!(event.reason.starts_with("max attempts reached"));

    let mail = server.store.get_mail("m1").await.unwrap().unwrap();
    assert_eq!(mail.status, MailStatus::Failed);
}

#[tokio::test]
async fn result_after_commit_is_conflict() {
    let server = start_server(5).await;
    server.post("/process", mail_body("m1")).await;
    let good = json!({"id": "m1", "classification": "billing", "model_answer": "ok"});
    server.post("/validate_processed_message", good.clone()).await;

    let (status, body) = server.post("/validate_processed_message", good).await;
    assert_eq!(status, 409);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn result_for_unknown_id_is_not_found() {
    let server = start_server(5).await;
    let (status, _) = server
        .post(
            "/validate_processed_message",
            json!({"id": "ghost", "classification": "billing", "model_answer": {}}),
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn approve_and_assistant_response() {
    let server = start_server(5).await;
    server.post("/process", mail_body("m1")).await;

    let (status, body) = server.post("/approve", json!({"id": "m1"})).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "approved", "id": "m1"}));

    let (status, body) = server
        .post(
            "/add-assistant-response",
            json!({"id": "m1", "assistant_response": {"reply": "Attached."}, "mark_processed": true}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "saved", "id": "m1"}));

    let (_, body) = server.get("/processed").await;
    let message = &body["messages"][0];
    assert_eq!(message["approved"], true);
    assert_eq!(message["assistant_response"], json!({"reply": "Attached."}));
}

#[tokio::test]
async fn operator_actions_on_unknown_id() {
    let server = start_server(5).await;
    let (status, _) = server.post("/approve", json!({"id": "ghost"})).await;
    assert_eq!(status, 404);

    let (status, _) = server
        .post(
            "/add-assistant-response",
            json!({"id": "ghost", "assistant_response": {"reply": "x"}}),
        )
        .await;
    assert_eq!(status, 404);

    let (status, _) = server
        .post("/add-assistant-response", json!({"id": "ghost"}))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn hierarchy_is_served() {
    let server = start_server(5).await;
    let (status, body) = server.get("/hierarchy").await;
    assert_eq!(status, 200);
    assert_eq!(body["support"]["lead"], "lead@x.com");
}

#[tokio::test]
async fn committed_payload_is_listed_unchanged() {
    let server = start_server(5).await;
    server.post("/process", mail_body("m1")).await;

    let raw = r#"{"zeta":1,"alpha":{"ticket":18446744073709551617}}"#;
    let resp = server
        .client
        .post(server.url("/validate_processed_message"))
        .header("content-type", "application/json")
        .body(format!(r#"{{"id":"m1","classification":"billing","model_answer":{raw}}}"#))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let out = server.publisher.records_for("processed_messages").await;
    let event: ProcessedEvent = out[0].decode().unwrap();
    assert_eq!(event.model_answer.get(), raw);

    let text = server
        .client
        .get(server.url("/processed"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains(raw), "listing: {text}");
}
