//! Chat notifications for phase reports.
//!
//! The webhook URL lives in an SSM parameter and is fetched on every
//! send, so rotating it needs no redeploy. Notification failures are
//! logged and swallowed; a missing or broken webhook never fails a
//! phase.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::cloud::SecretStore;

/// Upper bound on the serialized payload, below the webhook's hard
/// message limit. Applied before wrapping so the code fence stays
/// intact on truncation.
const MAX_PAYLOAD_LEN: usize = 3900;

/// Webhook notifier for phase summaries.
pub struct Notifier {
    http: reqwest::Client,
    secrets: Arc<dyn SecretStore>,
    webhook_param: String,
}

impl Notifier {
    /// Creates a notifier reading the webhook URL from `webhook_param`.
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretStore>, webhook_param: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secrets,
            webhook_param: webhook_param.into(),
        }
    }

    /// Posts a heading plus a code-fenced payload to the webhook.
    ///
    /// Never returns an error; all failures are reported through logs.
    pub async fn notify(&self, heading: &str, payload: &str) {
        let url = match self.secrets.get_secret(&self.webhook_param).await {
            Ok(url) => url,
            Err(e) => {
                warn!(param = %self.webhook_param, error = %e, "Webhook URL unavailable");
                return;
            }
        };

        let message = render(heading, payload);

        let result = self
            .http
            .post(&url)
            .json(&json!({ "text": message }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(heading, "Notification sent");
            }
            Ok(response) => {
                warn!(heading, status = %response.status(), "Webhook rejected notification");
            }
            Err(e) => {
                warn!(heading, error = %e, "Webhook request failed");
            }
        }
    }
}

/// Renders the webhook message with the payload capped to fit.
fn render(heading: &str, payload: &str) -> String {
    let payload = truncate(payload, MAX_PAYLOAD_LEN);
    format!(":broom: {heading}\n```{payload}```")
}

/// Truncates at a char boundary at or below `max` bytes.
fn truncate(message: &str, max: usize) -> String {
    if message.len() <= max {
        return message.to_string();
    }
    let mut end = max;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::Result;

    use super::*;

    struct FixedSecret {
        value: String,
    }

    #[async_trait]
    impl SecretStore for FixedSecret {
        async fn get_secret(&self, _name: &str) -> Result<String> {
            Ok(self.value.clone())
        }
    }

    #[tokio::test]
    async fn test_posts_formatted_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({
                "text": ":broom: Cleanup planned\n```{\"planned\":2}```"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = Notifier::new(
            Arc::new(FixedSecret {
                value: format!("{}/hook", server.uri()),
            }),
            "/cleanup/webhook",
        );

        notifier.notify("Cleanup planned", r#"{"planned":2}"#).await;
    }

    #[tokio::test]
    async fn test_server_error_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = Notifier::new(
            Arc::new(FixedSecret {
                value: server.uri(),
            }),
            "/cleanup/webhook",
        );

        // Must not panic or error.
        notifier.notify("Cleanup planned", "{}").await;
    }

    #[test]
    fn test_truncate_short_message_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let message = "ab\u{00e9}cd";
        let cut = truncate(message, 3);
        assert!(cut.len() <= 3);
        assert!(message.starts_with(&cut));
    }

    #[test]
    fn test_truncate_long_payload() {
        let long = "x".repeat(MAX_PAYLOAD_LEN + 100);
        assert_eq!(truncate(&long, MAX_PAYLOAD_LEN).len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_render_keeps_closing_fence_on_truncation() {
        let long = "x".repeat(MAX_PAYLOAD_LEN + 100);
        let message = render("Cleanup executed", &long);
        assert!(message.starts_with(":broom: Cleanup executed\n```"));
        assert!(message.ends_with("```"));
        assert!(message.contains(&"x".repeat(MAX_PAYLOAD_LEN)));
    }
}
