//! Intent intake from the render layer to the orchestrator queue.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    watch,
};

use crate::{intents::Intent, orchestration::Activity};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("intent queue is full; {0} was not queued")]
    QueueFull(&'static str),
    #[error("orchestrator stopped; {0} was not queued")]
    Closed(&'static str),
}

/// Cloneable handle that enqueues intents without waiting.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Intent>,
    activity: Arc<watch::Sender<Activity>>,
}

impl Dispatcher {
    pub(crate) fn new(tx: mpsc::Sender<Intent>, activity: Arc<watch::Sender<Activity>>) -> Self {
        Self { tx, activity }
    }

    pub fn dispatch(&self, intent: Intent) -> Result<(), DispatchError> {
        let name = intent.kind().name();
        // Counted before sending so the consumer can never decrement first.
        self.activity.send_modify(|activity| activity.queued += 1);

        match self.tx.try_send(intent) {
            Ok(()) => {
                tracing::debug!(intent = name, "queued intent");
                Ok(())
            }
            Err(err) => {
                self.activity
                    .send_modify(|activity| activity.queued = activity.queued.saturating_sub(1));
                match err {
                    TrySendError::Full(_) => {
                        tracing::warn!(intent = name, "intent queue is full");
                        Err(DispatchError::QueueFull(name))
                    }
                    TrySendError::Closed(_) => {
                        tracing::warn!(intent = name, "intent queue is closed");
                        Err(DispatchError::Closed(name))
                    }
                }
            }
        }
    }
}
