//! Typed synchronization intents queued from the render layer.

use std::fmt;

use shared::{
    domain::{CalendarId, ProjectId},
    protocol::{EventListQuery, GoogleCalendarEvent},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    RefreshLoginStatus,
    RefreshEventList(EventListQuery),
    CreateEvents {
        project_id: ProjectId,
        events: Vec<GoogleCalendarEvent>,
    },
    RefreshWatchedProject {
        calendar_id: CalendarId,
    },
    Watch {
        calendar_id: CalendarId,
        project_id: ProjectId,
    },
    Unwatch {
        calendar_id: CalendarId,
    },
    ImportSelected {
        project_id: ProjectId,
        /// `iCalUID`s picked from the last fetched event list.
        event_ids: Vec<String>,
    },
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::RefreshLoginStatus => IntentKind::RefreshLoginStatus,
            Intent::RefreshEventList(_) => IntentKind::RefreshEventList,
            Intent::CreateEvents { .. } => IntentKind::CreateEvents,
            Intent::RefreshWatchedProject { .. } => IntentKind::RefreshWatchedProject,
            Intent::Watch { .. } => IntentKind::Watch,
            Intent::Unwatch { .. } => IntentKind::Unwatch,
            Intent::ImportSelected { .. } => IntentKind::ImportSelected,
        }
    }
}

/// Payload-free discriminant of [`Intent`]. At most one run per kind is
/// live at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntentKind {
    RefreshLoginStatus,
    RefreshEventList,
    CreateEvents,
    RefreshWatchedProject,
    Watch,
    Unwatch,
    ImportSelected,
}

impl IntentKind {
    pub const ALL: [IntentKind; 7] = [
        IntentKind::RefreshLoginStatus,
        IntentKind::RefreshEventList,
        IntentKind::CreateEvents,
        IntentKind::RefreshWatchedProject,
        IntentKind::Watch,
        IntentKind::Unwatch,
        IntentKind::ImportSelected,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IntentKind::RefreshLoginStatus => "refresh_login_status",
            IntentKind::RefreshEventList => "refresh_event_list",
            IntentKind::CreateEvents => "create_events",
            IntentKind::RefreshWatchedProject => "refresh_watched_project",
            IntentKind::Watch => "watch_calendar",
            IntentKind::Unwatch => "unwatch_calendar",
            IntentKind::ImportSelected => "import_selected_events",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
