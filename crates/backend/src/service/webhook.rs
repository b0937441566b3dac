//! Copy notification webhook.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Details of one successful copy
#[derive(Debug, Clone, Serialize)]
pub struct CopyNotice {
  pub source: String,
  pub destination: String,
  pub size_bytes: u64,
  pub hash: String,
  pub elapsed_seconds: f64,
  pub compressed: bool,
}

#[derive(Debug, Serialize)]
struct WebhookEvent<'a> {
  event: &'static str,
  timestamp: DateTime<Utc>,
  data: &'a CopyNotice,
}

/// POSTs a JSON event after every successful copy. Delivery is best effort.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
  client: reqwest::Client,
  url: String,
}

impl WebhookNotifier {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url: url.into() })
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Send a `file_copied` event. Failures are logged, never returned.
  pub async fn file_copied(&self, notice: &CopyNotice) {
    let event = WebhookEvent {
      event: "file_copied",
      timestamp: Utc::now(),
      data: notice,
    };

    match self.client.post(&self.url).json(&event).send().await {
      Ok(response) if response.status().is_success() => {
        debug!(url = %self.url, destination = %notice.destination, "Webhook delivered");
      }
      Ok(response) => {
        warn!(url = %self.url, status = %response.status(), "Webhook rejected");
      }
      Err(e) => {
        warn!(url = %self.url, error = %e, "Webhook delivery failed");
      }
    }
  }
}
