//! Outbound status notifications.
//!
//! Pipelines report progress through a [`Notifier`]. Delivery is best
//! effort: implementations log failures and never return them, so a broken
//! notification endpoint cannot affect a build.

pub mod discord;

use std::future::Future;

use crate::types::BranchName;

pub use discord::DiscordNotifier;

/// Kind of event being reported; selects colour and icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Started,
    Succeeded,
    Failed,
    Deleted,
}

impl Severity {
    /// Embed colour as `0xRRGGBB`.
    pub fn color(self) -> u32 {
        match self {
            Severity::Started => 0xFFFF00,
            Severity::Succeeded => 0x00FF00,
            Severity::Failed => 0xFF0000,
            Severity::Deleted => 0xFFA500,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Severity::Started => "⚡️",
            Severity::Succeeded => "🎉",
            Severity::Failed => "💀",
            Severity::Deleted => "🗑️",
        }
    }
}

/// A status message about one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub branch: BranchName,
    /// Human readable sentence, e.g. "A build has started for `main`".
    pub message: String,
    /// Short state label, e.g. "Build Started".
    pub state: &'static str,
    pub severity: Severity,
    /// Public URL of the branch's site.
    pub site_url: String,
    /// Tool output attached to failures.
    pub output: Option<String>,
}

impl Notification {
    pub fn build_started(branch: &BranchName, site_url: impl Into<String>) -> Self {
        Notification {
            branch: branch.clone(),
            message: format!("A new build has started for `{branch}`"),
            state: "Build Started",
            severity: Severity::Started,
            site_url: site_url.into(),
            output: None,
        }
    }

    pub fn build_succeeded(branch: &BranchName, site_url: impl Into<String>) -> Self {
        Notification {
            branch: branch.clone(),
            message: format!("A build has completed for `{branch}`"),
            state: "Build Successful",
            severity: Severity::Succeeded,
            site_url: site_url.into(),
            output: None,
        }
    }

    pub fn build_failed(
        branch: &BranchName,
        site_url: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Notification {
            branch: branch.clone(),
            message: format!("A build has failed for `{branch}`"),
            state: "Build Failed",
            severity: Severity::Failed,
            site_url: site_url.into(),
            output: Some(output.into()),
        }
    }

    pub fn branch_deleted(branch: &BranchName, site_url: impl Into<String>) -> Self {
        Notification {
            branch: branch.clone(),
            message: format!("A deployment for `{branch}` has been deleted"),
            state: "Branch Deleted",
            severity: Severity::Deleted,
            site_url: site_url.into(),
            output: None,
        }
    }
}

/// Delivers notifications. Never fails from the caller's point of view.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification) -> impl Future<Output = ()> + Send;
}

/// Discards every notification. Used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, notification: Notification) -> impl Future<Output = ()> + Send {
        tracing::trace!(branch = %notification.branch, state = notification.state, "Notification dropped (no endpoint)");
        std::future::ready(())
    }
}

/// The notifier chosen from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredNotifier {
    Discord(DiscordNotifier),
    Noop(NoopNotifier),
}

impl ConfiguredNotifier {
    /// Discord when an endpoint is configured, otherwise no-op.
    pub fn from_config(config: &crate::config::Config) -> Self {
        match &config.notify_url {
            Some(url) => ConfiguredNotifier::Discord(DiscordNotifier::new(url.clone())),
            None => ConfiguredNotifier::Noop(NoopNotifier),
        }
    }
}

impl Notifier for ConfiguredNotifier {
    fn notify(&self, notification: Notification) -> impl Future<Output = ()> + Send {
        async move {
            match self {
                ConfiguredNotifier::Discord(n) => n.notify(notification).await,
                ConfiguredNotifier::Noop(n) => n.notify(notification).await,
            }
        }
    }
}
