//! Discord webhook delivery.
//!
//! Each notification becomes a single embed. Delivery failures are logged
//! at warn level and swallowed.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::{Notification, Notifier};

/// Discord rejects embed descriptions longer than this.
const MAX_DESCRIPTION_CHARS: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: String,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    color: u32,
    description: String,
    footer: Footer,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct Footer {
    text: &'static str,
}

/// Posts notifications to a Discord channel webhook.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: reqwest::Client,
    url: String,
}

impl DiscordNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client for notifications");
                reqwest::Client::new()
            });

        DiscordNotifier {
            client,
            url: url.into(),
        }
    }

    fn message(&self, notification: &Notification, now: DateTime<Utc>) -> WebhookMessage {
        let icon = notification.severity.icon();
        let branch = &notification.branch;

        let mut description = format!(
            "{icon} Docktainer: {} {icon}\r\n\r\nBranch: {branch}\r\nURL: {}",
            notification.message, notification.site_url
        );
        if let Some(output) = notification.output.as_deref().filter(|o| !o.is_empty()) {
            description.push_str("\r\n\r\nBuild Output:\r\n");
            description.push_str(output);
        }

        WebhookMessage {
            content: String::new(),
            embeds: vec![Embed {
                title: format!("{branch} {}", notification.state),
                color: notification.severity.color(),
                description: truncate_chars(description, MAX_DESCRIPTION_CHARS),
                footer: Footer { text: "docktainer" },
                timestamp: now.to_rfc3339(),
            }],
        }
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, notification: Notification) -> impl Future<Output = ()> + Send {
        async move {
            let body = self.message(&notification, Utc::now());
            let result = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match result {
                Ok(_) => debug!(branch = %notification.branch, state = notification.state, "Notification delivered"),
                Err(e) => warn!(
                    branch = %notification.branch,
                    state = notification.state,
                    error = %e,
                    "Failed to send notification"
                ),
            }
        }
    }
}

/// Keeps at most `max` characters, marking the cut with an ellipsis.
fn truncate_chars(text: String, max: usize) -> String {
    if text.chars().count() <= max {
        return text;
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
