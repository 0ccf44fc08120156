//! Notification REST API client.

use async_trait::async_trait;
use praxis_core::NotificationRecord;
use praxis_settings::NotificationSettings;
use serde::Deserialize;
use std::time::Duration;

use crate::errors::{NotifyError, Result};

/// Longest error body echoed back into a [`NotifyError::Api`].
const ERROR_BODY_LIMIT: usize = 256;

/// The notification endpoints the poller depends on.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Fetch the full notification list.
    async fn list(&self) -> Result<Vec<NotificationRecord>>;

    /// Fetch the unread count.
    async fn unread_count(&self) -> Result<u64>;

    /// Mark one notification read.
    async fn mark_read(&self, id: &str) -> Result<()>;

    /// Mark every notification read.
    async fn mark_all_read(&self) -> Result<()>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnreadCountBody {
    count: u64,
}

/// Production client over `reqwest`.
pub struct RestNotificationApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestNotificationApi {
    /// Build a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &NotificationSettings) -> Result<Self> {
        Self::new(
            &settings.api_base_url,
            Duration::from_millis(settings.request_timeout_ms),
        )
    }

    /// Authenticate requests with a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut message = response.text().await.unwrap_or_default();
        message.truncate(ERROR_BODY_LIMIT);
        Err(NotifyError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl NotificationApi for RestNotificationApi {
    async fn list(&self) -> Result<Vec<NotificationRecord>> {
        let response = self.request(reqwest::Method::GET, "/notifications").send().await?;
        let records = Self::check(response).await?.json().await?;
        Ok(records)
    }

    async fn unread_count(&self) -> Result<u64> {
        let response = self
            .request(reqwest::Method::GET, "/notifications/unread-count")
            .send()
            .await?;
        let body: UnreadCountBody = Self::check(response).await?.json().await?;
        Ok(body.count)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::PATCH, &format!("/notifications/{id}/read"))
            .send()
            .await?;
        let _ = Self::check(response).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::PATCH, "/notifications/read-all")
            .send()
            .await?;
        let _ = Self::check(response).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> RestNotificationApi {
        RestNotificationApi::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn list_parses_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "n1", "read": false, "createdAt": "2026-08-01T10:00:00Z",
                 "payload": {"kind": "appointment.created"}},
                {"id": "n2", "read": true, "createdAt": "2026-08-02T10:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let records = client_for(&server).await.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "n1");
        assert!(records[1].read);
    }

    #[tokio::test]
    async fn list_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.list().await.unwrap_err();
        assert_matches!(err, NotifyError::Api { status: 503, ref message } if message == "maintenance");
    }

    #[tokio::test]
    async fn unread_count_reads_count_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/unread-count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 12})))
            .mount(&server)
            .await;

        let count = client_for(&server).await.unread_count().await.unwrap();
        assert_eq!(count, 12);
    }

    #[tokio::test]
    async fn mark_read_hits_the_record_path() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/notifications/n42/read"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).await.mark_read("n42").await.unwrap();
    }

    #[tokio::test]
    async fn mark_all_read_propagates_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/notifications/read-all"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.mark_all_read().await.unwrap_err();
        assert_matches!(err, NotifyError::Api { status: 403, .. });
    }

    #[tokio::test]
    async fn bearer_token_is_sent_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications/unread-count"))
            .and(header("authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 0})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await.with_token("T1");
        assert_eq!(client.unread_count().await.unwrap(), 0);
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client =
            RestNotificationApi::new("http://api.example.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "http://api.example.com");
    }
}
