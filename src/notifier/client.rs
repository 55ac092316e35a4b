//! Webhook client
//!
//! Posts a [`NotifyRequest`] to a tenant URL and decodes the
//! [`NotifyResponse`]. Delivery is attempted once; the caller decides
//! what to do with a failure.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::types::{NotifyRequest, NotifyResponse};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Webhook returned HTTP {0}")]
    Status(u16),

    #[error("Malformed webhook response: {0}")]
    Malformed(String),

    #[error("Webhook rejected the notification")]
    Rejected,
}

pub struct Notifier {
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Deliver `req` to `url`
    ///
    /// `Ok` only when the webhook answered `{"success": true}`.
    pub async fn notify(&self, url: &str, req: &NotifyRequest) -> Result<NotifyResponse, NotifyError> {
        if req.transactions.is_empty() {
            return Ok(NotifyResponse { success: true });
        }

        let response = self
            .client
            .post(url)
            .json(req)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Webhook returned error status");
            return Err(NotifyError::Status(status.as_u16()));
        }

        let body: NotifyResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Malformed(e.to_string()))?;
        if !body.success {
            return Err(NotifyError::Rejected);
        }

        debug!(url, count = req.transactions.len(), "Webhook delivered");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_batch_is_not_sent() {
        let notifier = Notifier::new(Duration::from_millis(100)).unwrap();
        // Unroutable URL: any request would fail
        let resp = notifier
            .notify("http://127.0.0.1:1/notify", &NotifyRequest::default())
            .await
            .unwrap();
        assert!(resp.success);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_transport_error() {
        let notifier = Notifier::new(Duration::from_millis(500)).unwrap();
        let req = NotifyRequest {
            transactions: vec![Default::default()],
        };
        let err = notifier
            .notify("http://127.0.0.1:1/notify", &req)
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
