use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{CalendarId, ProjectId, ProjectType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStatus {
    pub logged_in: bool,
    /// Token expiry in epoch milliseconds; 0 when there is no token.
    #[serde(default)]
    pub expiration_time: i64,
}

impl LoginStatus {
    /// Expiration the client should record: the reported value when logged
    /// in, otherwise 0.
    pub fn effective_expiration(&self) -> i64 {
        if self.logged_in {
            self.expiration_time
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalendarAccessRole {
    Owner,
    Writer,
    Reader,
    FreeBusyReader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    pub id: CalendarId,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_role: Option<CalendarAccessRole>,
    #[serde(default)]
    pub primary: bool,
}

/// An event as listed from a Google calendar.
///
/// Only `iCalUID` is interpreted by the client. Everything else (the task
/// projection, schedule fields, content) is kept verbatim so that an event
/// picked for import is sent back exactly as it was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleCalendarEvent {
    #[serde(rename = "iCalUID")]
    pub ical_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl GoogleCalendarEvent {
    pub fn new(ical_uid: impl Into<String>) -> Self {
        Self {
            ical_uid: ical_uid.into(),
            content: None,
            details: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<ProjectType>,
    #[serde(default)]
    pub shared: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Project {
    pub fn with_id(id: ProjectId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// A project returned without an id stands for "no project".
    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListQuery {
    pub calendar_id: CalendarId,
    pub timezone: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Body of the create and import calls. Imports send `Option` entries so an
/// id with no loaded event keeps its slot as `null`.
#[derive(Debug, Serialize)]
pub struct EventsRequest<'a, E> {
    pub events: &'a [E],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchCalendarRequest {
    pub project_id: ProjectId,
}

/// Link between an external calendar and the project it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedProjectLink {
    pub calendar_id: CalendarId,
    pub project: Project,
}
