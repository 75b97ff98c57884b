//! Calendar-sync core: typed intents, the per-kind latest-wins effect
//! orchestrator, and the store it alone writes to.

pub mod dispatcher;
mod handlers;
pub mod intents;
pub mod notify;
pub mod orchestration;
pub mod reducer;

pub use dispatcher::{DispatchError, Dispatcher};
pub use intents::{Intent, IntentKind};
pub use notify::{ChannelNotifier, FailureCategory, LogNotifier, Notifier, RemoteCallFailure};
pub use orchestration::{Activity, Orchestrator};
pub use reducer::{CalendarSyncState, StateField, StoreChange, StoreUpdate, SyncStore};
