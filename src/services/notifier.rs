//! Webhook notifications for terminal agent failures.
//!
//! Delivery is best-effort: a webhook that is down must never affect the
//! pipeline outcome, so errors are logged and swallowed.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FailureNotifier {
    client: reqwest::Client,
    webhooks: Vec<String>,
}

impl FailureNotifier {
    pub fn new(webhooks: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, webhooks }
    }

    pub fn is_empty(&self) -> bool {
        self.webhooks.is_empty()
    }

    /// Post a failure payload to every configured webhook.
    pub async fn notify_failure(&self, agent: &str, error: &str) {
        if self.webhooks.is_empty() {
            return;
        }

        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "agent": agent,
            "error": error,
            "service": "argus-pipeline",
        });

        for url in &self.webhooks {
            match self.client.post(url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(agent, url = %url, "failure notification delivered");
                }
                Ok(response) => {
                    warn!(
                        agent,
                        url = %url,
                        status = %response.status(),
                        "failure notification rejected"
                    );
                }
                Err(err) => {
                    warn!(agent, url = %url, error = %err, "failure notification failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_posts_payload_to_webhook() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/pipeline")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "agent": "ab_testing",
                "error": "exit code 2",
                "service": "argus-pipeline",
            })))
            .with_status(200)
            .create_async()
            .await;

        let notifier = FailureNotifier::new(vec![format!("{}/hooks/pipeline", server.url())]);
        notifier.notify_failure("ab_testing", "exit code 2").await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_swallowed() {
        let notifier = FailureNotifier::new(vec!["http://127.0.0.1:1/unreachable".to_string()]);
        // Must not panic or error.
        notifier.notify_failure("insights_engine", "boom").await;
    }

    #[tokio::test]
    async fn test_no_webhooks_is_noop() {
        let notifier = FailureNotifier::new(vec![]);
        assert!(notifier.is_empty());
        notifier.notify_failure("ab_testing", "ignored").await;
    }
}
