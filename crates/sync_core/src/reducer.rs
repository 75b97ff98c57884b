//! Last-known-good projection of synchronized calendar state and the
//! reducer-like transitions that are the only way to change it.

use serde::Serialize;
use shared::protocol::{
    CalendarListEntry, EventListQuery, GoogleCalendarEvent, WatchedProjectLink,
};
use tokio::sync::{broadcast, RwLock};

use crate::intents::IntentKind;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSyncState {
    /// Google token expiry in epoch milliseconds, 0 when logged out.
    pub expiration_time: i64,
    pub calendar_list: Vec<CalendarListEntry>,
    pub event_list: Vec<GoogleCalendarEvent>,
    /// Range the current `event_list` was fetched for.
    pub event_query: Option<EventListQuery>,
    pub watched_project: Option<WatchedProjectLink>,
}

impl CalendarSyncState {
    pub fn logged_in(&self) -> bool {
        self.expiration_time != 0
    }

    fn reduce(&mut self, update: StoreUpdate) -> &'static [StateField] {
        match update {
            StoreUpdate::ExpirationTimeReceived { expiration_time } => {
                self.expiration_time = expiration_time;
                &[StateField::ExpirationTime]
            }
            StoreUpdate::CalendarListReceived { calendar_list } => {
                self.calendar_list = calendar_list;
                &[StateField::CalendarList]
            }
            StoreUpdate::EventListReceived { query, events } => {
                self.event_list = events;
                self.event_query = Some(query);
                &[StateField::EventList, StateField::EventQuery]
            }
            StoreUpdate::WatchedProjectReceived { link } => {
                self.watched_project = link;
                &[StateField::WatchedProject]
            }
        }
    }
}

/// Success update produced by a handler. Collections are replaced
/// wholesale, never merged.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreUpdate {
    ExpirationTimeReceived {
        expiration_time: i64,
    },
    CalendarListReceived {
        calendar_list: Vec<CalendarListEntry>,
    },
    EventListReceived {
        query: EventListQuery,
        events: Vec<GoogleCalendarEvent>,
    },
    WatchedProjectReceived {
        link: Option<WatchedProjectLink>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    ExpirationTime,
    CalendarList,
    EventList,
    EventQuery,
    WatchedProject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub cause: IntentKind,
    pub fields: Vec<StateField>,
}

pub struct SyncStore {
    state: RwLock<CalendarSyncState>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStore {
    pub fn new() -> Self {
        Self::with_state(CalendarSyncState::default())
    }

    pub fn with_state(state: CalendarSyncState) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(state),
            changes,
        }
    }

    pub async fn snapshot(&self) -> CalendarSyncState {
        self.state.read().await.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&CalendarSyncState) -> R) -> R {
        let guard = self.state.read().await;
        f(&guard)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Applies every update of one handler run in a single write.
    pub(crate) async fn apply(&self, cause: IntentKind, updates: Vec<StoreUpdate>) {
        if updates.is_empty() {
            return;
        }

        let mut fields = Vec::new();
        {
            let mut state = self.state.write().await;
            for update in updates {
                for field in state.reduce(update) {
                    if !fields.contains(field) {
                        fields.push(*field);
                    }
                }
            }
        }

        tracing::debug!(intent = cause.name(), ?fields, "store updated");
        let _ = self.changes.send(StoreChange { cause, fields });
    }
}
