//! One effect handler per intent kind. Handlers perform the remote calls and
//! return the store updates to apply; they never write to the store.

use anyhow::Result;
use client_core::CalendarApi;
use shared::{
    domain::{CalendarId, ProjectId},
    protocol::{EventListQuery, GoogleCalendarEvent, WatchedProjectLink},
};
use tracing::{debug, info, warn};

use crate::{
    intents::Intent,
    reducer::{StoreUpdate, SyncStore},
};

pub(crate) async fn run(
    intent: &Intent,
    api: &dyn CalendarApi,
    store: &SyncStore,
) -> Result<Vec<StoreUpdate>> {
    match intent {
        Intent::RefreshLoginStatus => refresh_login_status(api).await,
        Intent::RefreshEventList(query) => refresh_event_list(api, query).await,
        Intent::CreateEvents { project_id, events } => {
            create_events(api, *project_id, events).await
        }
        Intent::RefreshWatchedProject { calendar_id } => {
            refresh_watched_project(api, calendar_id).await
        }
        Intent::Watch {
            calendar_id,
            project_id,
        } => watch(api, calendar_id, *project_id).await,
        Intent::Unwatch { calendar_id } => unwatch(api, calendar_id).await,
        Intent::ImportSelected {
            project_id,
            event_ids,
        } => import_selected(api, store, *project_id, event_ids).await,
    }
}

/// The calendar list is only fetched when a token is present, and both
/// fields are written together once every call has succeeded.
async fn refresh_login_status(api: &dyn CalendarApi) -> Result<Vec<StoreUpdate>> {
    let status = api.login_status().await?;
    let expiration_time = status.effective_expiration();
    let mut updates = vec![StoreUpdate::ExpirationTimeReceived { expiration_time }];

    if expiration_time != 0 {
        let calendar_list = api.calendar_list().await?;
        debug!(calendars = calendar_list.len(), "calendar list received");
        updates.push(StoreUpdate::CalendarListReceived { calendar_list });
    } else {
        debug!("google account not linked; calendar list not fetched");
    }

    Ok(updates)
}

async fn refresh_event_list(
    api: &dyn CalendarApi,
    query: &EventListQuery,
) -> Result<Vec<StoreUpdate>> {
    let events = api.event_list(query).await?;
    debug!(
        calendar_id = %query.calendar_id,
        events = events.len(),
        "event list received"
    );
    Ok(vec![StoreUpdate::EventListReceived {
        query: query.clone(),
        events,
    }])
}

async fn create_events(
    api: &dyn CalendarApi,
    project_id: ProjectId,
    events: &[GoogleCalendarEvent],
) -> Result<Vec<StoreUpdate>> {
    api.create_events(project_id, events).await?;
    info!(project_id = project_id.0, count = events.len(), "events created");
    Ok(Vec::new())
}

async fn refresh_watched_project(
    api: &dyn CalendarApi,
    calendar_id: &CalendarId,
) -> Result<Vec<StoreUpdate>> {
    let project = api.watched_project(calendar_id).await?;
    let link = project
        .filter(|project| project.has_id())
        .map(|project| WatchedProjectLink {
            calendar_id: calendar_id.clone(),
            project,
        });
    Ok(vec![StoreUpdate::WatchedProjectReceived { link }])
}

async fn watch(
    api: &dyn CalendarApi,
    calendar_id: &CalendarId,
    project_id: ProjectId,
) -> Result<Vec<StoreUpdate>> {
    let project = api.watch_calendar(calendar_id, project_id).await?;
    Ok(vec![StoreUpdate::WatchedProjectReceived {
        link: Some(WatchedProjectLink {
            calendar_id: calendar_id.clone(),
            project,
        }),
    }])
}

async fn unwatch(api: &dyn CalendarApi, calendar_id: &CalendarId) -> Result<Vec<StoreUpdate>> {
    api.unwatch_calendar(calendar_id).await?;
    Ok(vec![StoreUpdate::WatchedProjectReceived { link: None }])
}

/// Resolves against whatever event list the store holds right now; the list
/// is not re-fetched.
async fn import_selected(
    api: &dyn CalendarApi,
    store: &SyncStore,
    project_id: ProjectId,
    event_ids: &[String],
) -> Result<Vec<StoreUpdate>> {
    let loaded = store.read(|state| state.event_list.clone()).await;
    if loaded.is_empty() {
        info!(
            project_id = project_id.0,
            requested = event_ids.len(),
            "no event list loaded; nothing to import"
        );
        return Ok(Vec::new());
    }

    let selected = select_events(&loaded, event_ids);
    let unresolved = selected.iter().filter(|slot| slot.is_none()).count();
    api.import_events(project_id, &selected).await?;
    info!(
        project_id = project_id.0,
        count = selected.len(),
        unresolved,
        "events imported"
    );
    Ok(Vec::new())
}

/// One slot per requested id, in request order: the first loaded entry with
/// that id, or `None` when there is none. Duplicate ids select the same entry
/// again.
pub(crate) fn select_events(
    loaded: &[GoogleCalendarEvent],
    event_ids: &[String],
) -> Vec<Option<GoogleCalendarEvent>> {
    event_ids
        .iter()
        .map(|id| {
            let found = loaded.iter().find(|event| event.ical_uid == *id);
            if found.is_none() {
                warn!(ical_uid = %id, "selected event is not in the loaded event list");
            }
            found.cloned()
        })
        .collect()
}
