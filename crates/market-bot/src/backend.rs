//! Thin client for the marketplace backend REST API
//!
//! The backend owns all business state; the bot only relays thread chatter
//! and looks up which threads a user belongs to. Payloads are opaque JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Serialize)]
struct ThreadMessage<'a> {
    author_id: &'a str,
    name: &'a str,
    thread_id: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserThreads {
    thread_ids: Vec<String>,
}

#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Relay a message posted in an order thread to the backend.
    pub async fn post_thread_message(
        &self,
        author_id: &str,
        author_name: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<()> {
        let url = format!("{}/threads/message", self.base_url);
        debug!("Relaying thread message to {}", url);
        self.client
            .post(&url)
            .json(&ThreadMessage {
                author_id,
                name: author_name,
                thread_id,
                content,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Thread ids the given user participates in.
    pub async fn user_threads(&self, user_id: u64) -> Result<Vec<String>> {
        let url = format!("{}/threads/user/{}", self.base_url, user_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<UserThreads>()
            .await?;
        Ok(response.thread_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_thread_message_sends_expected_json() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/threads/message")
                    .json_body(serde_json::json!({
                        "author_id": "42",
                        "name": "buyer",
                        "thread_id": "555",
                        "content": "hello"
                    }));
                then.status(200);
            })
            .await;

        let client = BackendClient::new(server.base_url());
        client
            .post_thread_message("42", "buyer", "555", "hello")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_thread_message_surfaces_http_errors() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.any_request();
                then.status(500);
            })
            .await;

        let client = BackendClient::new(server.base_url());
        let result = client.post_thread_message("42", "buyer", "555", "hi").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_user_threads_parses_ids() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/threads/user/42");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"thread_ids": ["100", "200"]}"#);
            })
            .await;

        let client = BackendClient::new(server.base_url());
        let threads = client.user_threads(42).await.unwrap();
        assert_eq!(threads, vec!["100", "200"]);
    }

    #[tokio::test]
    async fn test_base_url_trailing_slash_is_tolerated() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/threads/user/7");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"thread_ids": []}"#);
            })
            .await;

        let client = BackendClient::new(format!("{}/", server.base_url()));
        let threads = client.user_threads(7).await.unwrap();
        assert!(threads.is_empty());
        mock.assert_async().await;
    }
}
