//! Broker publisher over a REST proxy (`POST {base}/topics/{topic}`).
//!
//! Each call is one request with a bounded timeout; failures are returned,
//! never retried here.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, error};

use super::traits::Publisher;
use crate::error::PublishError;

/// Content type understood by Kafka-compatible REST proxies for JSON records.
const RECORDS_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

pub struct HttpPublisher {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<SecretString>,
    timeout: Duration,
}

impl HttpPublisher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            timeout,
        }
    }

    pub fn with_auth_token(mut self, token: SecretString) -> Self {
        self.auth_token = Some(token);
        self
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{topic}", self.base_url)
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        if topic.is_empty() {
            return Err(PublishError::EmptyTopic);
        }

        let value: Value = serde_json::from_slice(payload)?;
        let body = serde_json::json!({
            "records": [{ "key": key, "value": value }]
        });

        let mut request = self
            .client
            .post(self.topic_url(topic))
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, RECORDS_CONTENT_TYPE)
            .body(body.to_string());
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PublishError::Timeout {
                    topic: topic.to_string(),
                    timeout: self.timeout,
                }
            } else {
                PublishError::Transport {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(topic = topic, key = key, status = %status, "Broker rejected publish");
            return Err(PublishError::Rejected {
                topic: topic.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(topic = topic, key = key, "Record published to broker");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn publish_posts_keyed_record() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/topics/messages_to_process"))
            .and(header("content-type", RECORDS_CONTENT_TYPE))
            .and(body_json(serde_json::json!({
                "records": [{"key": "m1", "value": {"id": "m1", "input": "hi"}}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(server.uri(), Duration::from_secs(2));
        publisher
            .publish("messages_to_process", "m1", br#"{"id":"m1","input":"hi"}"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bearer_token_is_sent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(format!("{}/", server.uri()), Duration::from_secs(2))
            .with_auth_token(SecretString::from("t0ken"));
        publisher.publish("out", "m1", b"{}").await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("broker down"))
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(server.uri(), Duration::from_secs(2));
        let err = publisher.publish("out", "m1", b"{}").await.unwrap_err();
        match err {
            PublishError::Rejected { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "broker down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_broker_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let publisher = HttpPublisher::new(server.uri(), Duration::from_millis(50));
        let err = publisher.publish("out", "m1", b"{}").await.unwrap_err();
        assert!(matches!(err, PublishError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn non_json_payload_is_encode_error() {
        let publisher = HttpPublisher::new("http://127.0.0.1:9", Duration::from_millis(50));
        let err = publisher.publish("out", "m1", b"not json").await.unwrap_err();
        assert!(matches!(err, PublishError::Encode(_)));
    }
}
