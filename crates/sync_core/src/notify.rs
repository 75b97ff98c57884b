//! Failure notifications surfaced to the user.

use std::{fmt, sync::Arc};

use client_core::ApiCallError;
use tokio::sync::broadcast;

use crate::intents::IntentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Auth,
    Transport,
    NotFound,
    Unknown,
}

/// The one error kind the orchestrator models: a remote call of some intent
/// failed. Carried to the notifier, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCallFailure {
    intent: IntentKind,
    category: FailureCategory,
    message: String,
}

impl RemoteCallFailure {
    pub fn new(intent: IntentKind, error: &anyhow::Error) -> Self {
        let message = format!("{error:#}");
        let category = match error.downcast_ref::<ApiCallError>() {
            Some(ApiCallError::Transport(err)) if err.status().is_none() => {
                FailureCategory::Transport
            }
            Some(ApiCallError::Status { source, .. }) if source.requires_reauth() => {
                FailureCategory::Auth
            }
            Some(api_error) => match api_error.status() {
                Some(401 | 403) => FailureCategory::Auth,
                Some(404) => FailureCategory::NotFound,
                _ => classify_message(&message),
            },
            None => classify_message(&message),
        };

        Self {
            intent,
            category,
            message,
        }
    }

    pub fn intent(&self) -> IntentKind {
        self.intent
    }

    pub fn category(&self) -> FailureCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == FailureCategory::Auth
    }
}

impl fmt::Display for RemoteCallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.intent.name(), self.message)
    }
}

fn classify_message(message: &str) -> FailureCategory {
    let lower = message.to_ascii_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("token expired")
    {
        FailureCategory::Auth
    } else if lower.contains("404") || lower.contains("not found") {
        FailureCategory::NotFound
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("dns")
        || lower.contains("unavailable")
    {
        FailureCategory::Transport
    } else {
        FailureCategory::Unknown
    }
}

/// Display-only sink for failures. Fire-and-forget: implementations must not
/// block and nothing is acknowledged.
pub trait Notifier: Send + Sync {
    fn notify(&self, failure: &RemoteCallFailure);
}

/// Fans failures out to any number of listeners (toast area, status line).
pub struct ChannelNotifier {
    tx: broadcast::Sender<RemoteCallFailure>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteCallFailure> {
        self.tx.subscribe()
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, failure: &RemoteCallFailure) {
        let _ = self.tx.send(failure.clone());
    }
}

/// Sink that only writes failures to the tracing log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, failure: &RemoteCallFailure) {
        tracing::warn!(
            intent = failure.intent().name(),
            category = ?failure.category(),
            "{failure}"
        );
    }
}

/// Every notifier in the list sees every failure, in order.
impl Notifier for Vec<Arc<dyn Notifier>> {
    fn notify(&self, failure: &RemoteCallFailure) {
        for notifier in self {
            notifier.notify(failure);
        }
    }
}
