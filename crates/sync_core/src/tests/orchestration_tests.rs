use std::sync::Mutex as StdMutex;

use super::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    domain::{CalendarId, ProjectId},
    protocol::{
        CalendarListEntry, EventListQuery, GoogleCalendarEvent, LoginStatus, Project,
        WatchedProjectLink,
    },
};
use tokio::sync::{mpsc, oneshot};

use crate::{dispatcher::DispatchError, reducer::CalendarSyncState};

#[derive(Debug)]
enum Reply {
    Login(LoginStatus),
    Calendars(Vec<CalendarListEntry>),
    Events(Vec<GoogleCalendarEvent>),
    Project(Option<Project>),
    Done,
    Fail(String),
    Panic,
}

/// A remote call the handler is suspended on until the test answers it.
struct PendingCall {
    op: &'static str,
    calendar_id: Option<CalendarId>,
    project_id: Option<ProjectId>,
    events: Vec<Option<GoogleCalendarEvent>>,
    reply: oneshot::Sender<Reply>,
}

impl PendingCall {
    fn answer(self, reply: Reply) {
        // The run may have been superseded and dropped its receiver.
        let _ = self.reply.send(reply);
    }
}

struct ScriptedCalendarApi {
    calls: mpsc::UnboundedSender<PendingCall>,
}

struct Remote {
    calls: mpsc::UnboundedReceiver<PendingCall>,
}

impl Remote {
    async fn next(&mut self) -> PendingCall {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.calls.recv())
            .await
            .expect("remote call within 5s")
            .expect("remote open")
    }

    fn assert_no_calls(&mut self) {
        assert!(self.calls.try_recv().is_err(), "unexpected remote call");
    }

    /// Answers every future call with `reply_for` from a background task.
    fn auto_reply(mut self, reply_for: impl Fn(&PendingCall) -> Reply + Send + 'static) {
        tokio::spawn(async move {
            while let Some(call) = self.calls.recv().await {
                let reply = reply_for(&call);
                call.answer(reply);
            }
        });
    }
}

fn scripted_api() -> (Arc<ScriptedCalendarApi>, Remote) {
    let (calls, rx) = mpsc::unbounded_channel();
    (Arc::new(ScriptedCalendarApi { calls }), Remote { calls: rx })
}

impl ScriptedCalendarApi {
    async fn call(
        &self,
        op: &'static str,
        calendar_id: Option<&CalendarId>,
        project_id: Option<ProjectId>,
        events: Vec<Option<GoogleCalendarEvent>>,
    ) -> Result<Reply> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(PendingCall {
                op,
                calendar_id: calendar_id.cloned(),
                project_id,
                events,
                reply,
            })
            .map_err(|_| anyhow!("remote closed"))?;
        match rx.await.map_err(|_| anyhow!("call abandoned"))? {
            Reply::Fail(message) => Err(anyhow!(message)),
            Reply::Panic => panic!("{op} handler blew up"),
            reply => Ok(reply),
        }
    }
}

#[async_trait]
impl CalendarApi for ScriptedCalendarApi {
    async fn login_status(&self) -> Result<LoginStatus> {
        match self.call("login_status", None, None, Vec::new()).await? {
            Reply::Login(status) => Ok(status),
            other => Err(anyhow!("unexpected reply {other:?}")),
        }
    }

    async fn calendar_list(&self) -> Result<Vec<CalendarListEntry>> {
        match self.call("calendar_list", None, None, Vec::new()).await? {
            Reply::Calendars(list) => Ok(list),
            other => Err(anyhow!("unexpected reply {other:?}")),
        }
    }

    async fn event_list(&self, query: &EventListQuery) -> Result<Vec<GoogleCalendarEvent>> {
        match self
            .call("event_list", Some(&query.calendar_id), None, Vec::new())
            .await?
        {
            Reply::Events(events) => Ok(events),
            other => Err(anyhow!("unexpected reply {other:?}")),
        }
    }

    async fn create_events(
        &self,
        project_id: ProjectId,
        events: &[GoogleCalendarEvent],
    ) -> Result<()> {
        let events = events.iter().cloned().map(Some).collect();
        self.call("create_events", None, Some(project_id), events)
            .await
            .map(|_| ())
    }

    async fn watched_project(&self, calendar_id: &CalendarId) -> Result<Option<Project>> {
        match self
            .call("watched_project", Some(calendar_id), None, Vec::new())
            .await?
        {
            Reply::Project(project) => Ok(project),
            other => Err(anyhow!("unexpected reply {other:?}")),
        }
    }

    async fn watch_calendar(
        &self,
        calendar_id: &CalendarId,
        project_id: ProjectId,
    ) -> Result<Project> {
        match self
            .call("watch_calendar", Some(calendar_id), Some(project_id), Vec::new())
            .await?
        {
            Reply::Project(Some(project)) => Ok(project),
            other => Err(anyhow!("unexpected reply {other:?}")),
        }
    }

    async fn unwatch_calendar(&self, calendar_id: &CalendarId) -> Result<()> {
        self.call("unwatch_calendar", Some(calendar_id), None, Vec::new())
            .await
            .map(|_| ())
    }

    async fn import_events(
        &self,
        project_id: ProjectId,
        events: &[Option<GoogleCalendarEvent>],
    ) -> Result<()> {
        self.call("import_events", None, Some(project_id), events.to_vec())
            .await
            .map(|_| ())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: StdMutex<Vec<String>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<String> {
        self.notices.lock().expect("notices").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, failure: &RemoteCallFailure) {
        self.notices.lock().expect("notices").push(failure.to_string());
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    remote: Remote,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new() -> Self {
        Self::with_state(CalendarSyncState::default())
    }

    fn with_state(state: CalendarSyncState) -> Self {
        let (api, remote) = scripted_api();
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = Orchestrator::new(
            api,
            Arc::new(SyncStore::with_state(state)),
            notifier.clone(),
        );
        Self {
            orchestrator,
            remote,
            notifier,
        }
    }

    async fn state(&self) -> CalendarSyncState {
        self.orchestrator.store().snapshot().await
    }
}

fn query(calendar_id: &str) -> EventListQuery {
    EventListQuery {
        calendar_id: CalendarId::new(calendar_id),
        timezone: "America/New_York".to_string(),
        start_date: NaiveDate::from_ymd_opt(2020, 5, 1).expect("date"),
        end_date: NaiveDate::from_ymd_opt(2020, 5, 31).expect("date"),
    }
}

fn events(ids: &[&str]) -> Vec<GoogleCalendarEvent> {
    ids.iter().map(|id| GoogleCalendarEvent::new(*id)).collect()
}

fn ical_uids(events: &[GoogleCalendarEvent]) -> Vec<String> {
    events.iter().map(|event| event.ical_uid.clone()).collect()
}

fn slot_uids(events: &[Option<GoogleCalendarEvent>]) -> Vec<Option<String>> {
    events
        .iter()
        .map(|event| event.as_ref().map(|event| event.ical_uid.clone()))
        .collect()
}

fn some(ids: &[&str]) -> Vec<Option<String>> {
    ids.iter().map(|id| Some(id.to_string())).collect()
}

fn loaded_state() -> CalendarSyncState {
    CalendarSyncState {
        expiration_time: 1_700_000_000_000,
        calendar_list: vec![CalendarListEntry {
            id: CalendarId::new("primary"),
            summary: "Personal".to_string(),
            description: None,
            time_zone: None,
            background_color: None,
            foreground_color: None,
            access_role: None,
            primary: true,
        }],
        event_list: events(&["e1", "e2", "e3"]),
        event_query: Some(query("primary")),
        watched_project: Some(WatchedProjectLink {
            calendar_id: CalendarId::new("primary"),
            project: Project::with_id(ProjectId(4)),
        }),
    }
}

#[tokio::test]
async fn login_status_with_token_fetches_calendar_list() {
    let mut h = Harness::new();
    h.orchestrator.submit(Intent::RefreshLoginStatus).await;

    let call = h.remote.next().await;
    assert_eq!(call.op, "login_status");
    call.answer(Reply::Login(LoginStatus {
        logged_in: true,
        expiration_time: 1_700_000_000_000,
    }));
    let call = h.remote.next().await;
    assert_eq!(call.op, "calendar_list");
    call.answer(Reply::Calendars(loaded_state().calendar_list));

    h.orchestrator.settle().await;
    let state = h.state().await;
    assert_eq!(state.expiration_time, 1_700_000_000_000);
    assert_eq!(state.calendar_list.len(), 1);
    assert!(h.notifier.notices().is_empty());
}

#[tokio::test]
async fn login_status_without_token_never_fetches_calendar_list() {
    for status in [
        LoginStatus {
            logged_in: false,
            expiration_time: 1_700_000_000_000,
        },
        LoginStatus {
            logged_in: true,
            expiration_time: 0,
        },
    ] {
        let mut h = Harness::new();
        h.orchestrator.submit(Intent::RefreshLoginStatus).await;
        h.remote.next().await.answer(Reply::Login(status));

        h.orchestrator.settle().await;
        h.remote.assert_no_calls();
        assert_eq!(h.state().await.expiration_time, 0);
        assert!(!h.state().await.logged_in());
    }
}

#[tokio::test]
async fn calendar_list_failure_leaves_expiration_untouched() {
    let mut h = Harness::new();
    h.orchestrator.submit(Intent::RefreshLoginStatus).await;
    h.remote.next().await.answer(Reply::Login(LoginStatus {
        logged_in: true,
        expiration_time: 99,
    }));
    h.remote
        .next()
        .await
        .answer(Reply::Fail("calendar list unavailable".to_string()));

    h.orchestrator.settle().await;
    assert_eq!(h.state().await, CalendarSyncState::default());
    assert_eq!(
        h.notifier.notices(),
        ["refresh_login_status failed: calendar list unavailable"]
    );
}

#[tokio::test]
async fn event_list_refresh_replaces_list_wholesale() {
    let mut h = Harness::with_state(loaded_state());
    h.orchestrator
        .submit(Intent::RefreshEventList(query("team")))
        .await;
    let call = h.remote.next().await;
    assert_eq!(call.calendar_id, Some(CalendarId::new("team")));
    call.answer(Reply::Events(events(&["t1"])));

    h.orchestrator.settle().await;
    let state = h.state().await;
    assert_eq!(ical_uids(&state.event_list), ["t1"]);
    assert_eq!(state.event_query, Some(query("team")));
}

#[tokio::test]
async fn only_the_latest_same_kind_intent_is_applied() {
    let mut h = Harness::new();
    h.orchestrator
        .submit(Intent::RefreshEventList(query("first")))
        .await;
    let first = h.remote.next().await;
    assert!(h.orchestrator.is_in_flight(IntentKind::RefreshEventList).await);

    h.orchestrator
        .submit(Intent::RefreshEventList(query("second")))
        .await;
    let second = h.remote.next().await;
    assert_eq!(second.calendar_id, Some(CalendarId::new("second")));

    second.answer(Reply::Events(events(&["s1", "s2"])));
    first.answer(Reply::Events(events(&["f1"])));

    h.orchestrator.settle().await;
    let state = h.state().await;
    assert_eq!(ical_uids(&state.event_list), ["s1", "s2"]);
    assert_eq!(state.event_query, Some(query("second")));
    assert!(!h.orchestrator.is_in_flight(IntentKind::RefreshEventList).await);
}

#[tokio::test]
async fn superseded_failure_is_not_reported() {
    let mut h = Harness::new();
    h.orchestrator
        .submit(Intent::RefreshWatchedProject {
            calendar_id: CalendarId::new("a"),
        })
        .await;
    let first = h.remote.next().await;
    h.orchestrator
        .submit(Intent::RefreshWatchedProject {
            calendar_id: CalendarId::new("b"),
        })
        .await;
    let second = h.remote.next().await;

    first.answer(Reply::Fail("stale failure".to_string()));
    second.answer(Reply::Project(Some(Project::with_id(ProjectId(2)))));

    h.orchestrator.settle().await;
    assert!(h.notifier.notices().is_empty());
    let link = h.state().await.watched_project.expect("link");
    assert_eq!(link.calendar_id, CalendarId::new("b"));
    assert_eq!(link.project.id, Some(ProjectId(2)));
}

#[tokio::test]
async fn superseded_then_latest_failure_reports_once() {
    let mut h = Harness::with_state(loaded_state());
    let mut pending = Vec::new();
    for calendar in ["a", "b", "c"] {
        h.orchestrator
            .submit(Intent::RefreshEventList(query(calendar)))
            .await;
        pending.push(h.remote.next().await);
    }
    for call in pending {
        call.answer(Reply::Fail("backend down".to_string()));
    }

    h.orchestrator.settle().await;
    assert_eq!(
        h.notifier.notices(),
        ["refresh_event_list failed: backend down"]
    );
    assert_eq!(h.state().await, loaded_state());
}

#[tokio::test]
async fn dispatched_burst_applies_only_the_last_intent() {
    let h = Harness::new();
    h.remote.auto_reply(|call| {
        let id = match call.calendar_id.as_ref().map(CalendarId::as_str) {
            Some("a") => 1,
            Some("b") => 2,
            _ => 3,
        };
        Reply::Project(Some(Project::with_id(ProjectId(id))))
    });
    let (dispatcher, _intake) = h.orchestrator.start(16);

    for calendar in ["a", "b", "c"] {
        dispatcher
            .dispatch(Intent::RefreshWatchedProject {
                calendar_id: CalendarId::new(calendar),
            })
            .expect("dispatch");
    }

    h.orchestrator.settle().await;
    let link = h
        .orchestrator
        .store()
        .snapshot()
        .await
        .watched_project
        .expect("link");
    assert_eq!(link.calendar_id, CalendarId::new("c"));
    assert_eq!(link.project.id, Some(ProjectId(3)));
    assert!(h.orchestrator.activity().is_idle());
}

#[tokio::test]
async fn watched_project_without_id_clears_the_link() {
    for reply in [None, Some(Project::default())] {
        let mut h = Harness::with_state(loaded_state());
        h.orchestrator
            .submit(Intent::RefreshWatchedProject {
                calendar_id: CalendarId::new("primary"),
            })
            .await;
        h.remote.next().await.answer(Reply::Project(reply));

        h.orchestrator.settle().await;
        assert!(h.state().await.watched_project.is_none());
    }
}

#[tokio::test]
async fn watched_project_with_id_sets_the_link() {
    let mut h = Harness::new();
    h.orchestrator
        .submit(Intent::RefreshWatchedProject {
            calendar_id: CalendarId::new("primary"),
        })
        .await;
    h.remote
        .next()
        .await
        .answer(Reply::Project(Some(Project::with_id(ProjectId(7)))));

    h.orchestrator.settle().await;
    let link = h.state().await.watched_project.expect("link");
    assert_eq!(link.calendar_id, CalendarId::new("primary"));
    assert_eq!(link.project.id, Some(ProjectId(7)));
}

#[tokio::test]
async fn watch_sets_link_to_returned_project_unconditionally() {
    let mut h = Harness::new();
    h.orchestrator
        .submit(Intent::Watch {
            calendar_id: CalendarId::new("5"),
            project_id: ProjectId(9),
        })
        .await;
    let call = h.remote.next().await;
    assert_eq!(call.op, "watch_calendar");
    assert_eq!(call.project_id, Some(ProjectId(9)));
    call.answer(Reply::Project(Some(Project::default())));

    h.orchestrator.settle().await;
    let link = h.state().await.watched_project.expect("link");
    assert_eq!(link.calendar_id, CalendarId::new("5"));
    assert!(!link.project.has_id());
}

#[tokio::test]
async fn unwatch_settling_after_watch_ends_with_link_cleared() {
    let mut h = Harness::new();
    h.orchestrator
        .submit(Intent::Watch {
            calendar_id: CalendarId::new("5"),
            project_id: ProjectId(9),
        })
        .await;
    h.orchestrator
        .submit(Intent::Unwatch {
            calendar_id: CalendarId::new("5"),
        })
        .await;

    let mut watch_call = None;
    let mut unwatch_call = None;
    for _ in 0..2 {
        let call = h.remote.next().await;
        match call.op {
            "watch_calendar" => watch_call = Some(call),
            "unwatch_calendar" => unwatch_call = Some(call),
            other => panic!("unexpected call {other}"),
        }
    }

    // Different kinds do not supersede each other: both settle, last one wins.
    watch_call
        .expect("watch call")
        .answer(Reply::Project(Some(Project::with_id(ProjectId(9)))));
    while h.orchestrator.is_in_flight(IntentKind::Watch).await {
        tokio::task::yield_now().await;
    }
    assert!(h.state().await.watched_project.is_some());

    unwatch_call.expect("unwatch call").answer(Reply::Done);
    h.orchestrator.settle().await;
    assert!(h.state().await.watched_project.is_none());
    assert!(h.notifier.notices().is_empty());
}

#[tokio::test]
async fn import_without_loaded_events_is_a_silent_no_op() {
    let mut h = Harness::new();
    h.orchestrator
        .submit(Intent::ImportSelected {
            project_id: ProjectId(12),
            event_ids: vec!["e1".to_string()],
        })
        .await;

    h.orchestrator.settle().await;
    h.remote.assert_no_calls();
    assert_eq!(h.state().await, CalendarSyncState::default());
    assert!(h.notifier.notices().is_empty());
}

#[tokio::test]
async fn import_submits_selected_events_in_request_order() {
    let mut h = Harness::with_state(loaded_state());
    h.orchestrator
        .submit(Intent::ImportSelected {
            project_id: ProjectId(12),
            event_ids: vec!["e1".to_string(), "e3".to_string()],
        })
        .await;

    let call = h.remote.next().await;
    assert_eq!(call.op, "import_events");
    assert_eq!(call.project_id, Some(ProjectId(12)));
    assert_eq!(slot_uids(&call.events), some(&["e1", "e3"]));
    call.answer(Reply::Done);

    h.orchestrator.settle().await;
    assert_eq!(h.state().await, loaded_state());
}

#[tokio::test]
async fn import_keeps_an_empty_slot_for_unknown_ids() {
    let mut h = Harness::with_state(loaded_state());
    h.orchestrator
        .submit(Intent::ImportSelected {
            project_id: ProjectId(12),
            event_ids: vec!["e1".to_string(), "nope".to_string(), "e3".to_string()],
        })
        .await;

    let call = h.remote.next().await;
    assert_eq!(
        slot_uids(&call.events),
        [Some("e1".to_string()), None, Some("e3".to_string())]
    );
    call.answer(Reply::Done);

    h.orchestrator.settle().await;
    assert!(h.notifier.notices().is_empty());
}

#[tokio::test]
async fn import_resolves_against_the_list_present_when_it_runs() {
    let mut h = Harness::with_state(loaded_state());
    h.orchestrator
        .submit(Intent::RefreshEventList(query("team")))
        .await;
    let refresh = h.remote.next().await;

    // The refresh has not settled, so the import still sees e1..e3.
    h.orchestrator
        .submit(Intent::ImportSelected {
            project_id: ProjectId(1),
            event_ids: vec!["e2".to_string(), "t1".to_string()],
        })
        .await;
    let import = h.remote.next().await;
    assert_eq!(slot_uids(&import.events), [Some("e2".to_string()), None]);

    import.answer(Reply::Done);
    refresh.answer(Reply::Events(events(&["t1"])));
    h.orchestrator.settle().await;
    assert_eq!(ical_uids(&h.state().await.event_list), ["t1"]);
}

#[tokio::test]
async fn create_events_failure_notifies_without_touching_state() {
    let mut h = Harness::with_state(loaded_state());
    h.orchestrator
        .submit(Intent::CreateEvents {
            project_id: ProjectId(3),
            events: events(&["n1"]),
        })
        .await;
    let call = h.remote.next().await;
    assert_eq!(slot_uids(&call.events), some(&["n1"]));
    call.answer(Reply::Fail("quota exceeded".to_string()));

    h.orchestrator.settle().await;
    assert_eq!(h.state().await, loaded_state());
    assert_eq!(h.notifier.notices(), ["create_events failed: quota exceeded"]);
}

#[tokio::test]
async fn every_failing_intent_leaves_state_unchanged_and_notifies_once() {
    let intents = vec![
        Intent::RefreshLoginStatus,
        Intent::RefreshEventList(query("primary")),
        Intent::CreateEvents {
            project_id: ProjectId(1),
            events: events(&["x"]),
        },
        Intent::RefreshWatchedProject {
            calendar_id: CalendarId::new("primary"),
        },
        Intent::Watch {
            calendar_id: CalendarId::new("primary"),
            project_id: ProjectId(1),
        },
        Intent::Unwatch {
            calendar_id: CalendarId::new("primary"),
        },
        Intent::ImportSelected {
            project_id: ProjectId(1),
            event_ids: vec!["e1".to_string()],
        },
    ];

    for intent in intents {
        let kind = intent.kind();
        let h = Harness::with_state(loaded_state());
        h.remote
            .auto_reply(|_| Reply::Fail("503 service unavailable".to_string()));
        h.orchestrator.submit(intent).await;
        h.orchestrator.settle().await;

        let state = h.orchestrator.store().snapshot().await;
        assert_eq!(state, loaded_state(), "{kind} mutated state");
        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1, "{kind}: {notices:?}");
        assert!(notices[0].starts_with(kind.name()), "{notices:?}");
    }
}

#[tokio::test]
async fn failure_does_not_affect_the_next_intent() {
    let mut h = Harness::new();
    h.orchestrator
        .submit(Intent::Unwatch {
            calendar_id: CalendarId::new("5"),
        })
        .await;
    h.remote
        .next()
        .await
        .answer(Reply::Fail("timeout".to_string()));
    h.orchestrator.settle().await;

    h.orchestrator
        .submit(Intent::Watch {
            calendar_id: CalendarId::new("5"),
            project_id: ProjectId(9),
        })
        .await;
    h.remote
        .next()
        .await
        .answer(Reply::Project(Some(Project::with_id(ProjectId(9)))));
    h.orchestrator.settle().await;

    assert_eq!(h.notifier.notices().len(), 1);
    assert!(h.state().await.watched_project.is_some());
}

#[tokio::test]
async fn store_subscribers_see_one_change_per_settled_run() {
    let mut h = Harness::new();
    let mut changes = h.orchestrator.store().subscribe();
    h.orchestrator.submit(Intent::RefreshLoginStatus).await;
    h.remote.next().await.answer(Reply::Login(LoginStatus {
        logged_in: true,
        expiration_time: 5,
    }));
    h.remote.next().await.answer(Reply::Calendars(Vec::new()));
    h.orchestrator.settle().await;

    let change = changes.recv().await.expect("change");
    assert_eq!(change.cause, IntentKind::RefreshLoginStatus);
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn dispatch_after_intake_stops_is_rejected() {
    let h = Harness::new();
    let (dispatcher, intake) = h.orchestrator.start(4);
    intake.abort();
    let _ = intake.await;

    let err = dispatcher
        .dispatch(Intent::RefreshLoginStatus)
        .expect_err("must fail");
    assert_eq!(err, DispatchError::Closed("refresh_login_status"));
    assert!(h.orchestrator.activity().is_idle());
}

#[tokio::test]
async fn full_queue_is_reported_to_the_caller() {
    let h = Harness::new();
    let (tx, _rx) = mpsc::channel(1);
    let dispatcher = Dispatcher::new(tx, Arc::clone(&h.orchestrator.activity));

    dispatcher
        .dispatch(Intent::RefreshLoginStatus)
        .expect("first fits");
    let err = dispatcher
        .dispatch(Intent::Unwatch {
            calendar_id: CalendarId::new("5"),
        })
        .expect_err("queue full");
    assert_eq!(err, DispatchError::QueueFull("unwatch_calendar"));
    assert_eq!(h.orchestrator.activity().queued, 1);
}

#[test]
fn intent_names_are_unique() {
    let mut names = IntentKind::ALL.map(IntentKind::name).to_vec();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), IntentKind::ALL.len());
}

#[tokio::test]
async fn panicking_run_returns_its_lane_to_idle() {
    let mut h = Harness::new();
    h.orchestrator
        .submit(Intent::Unwatch {
            calendar_id: CalendarId::new("5"),
        })
        .await;
    h.remote.next().await.answer(Reply::Panic);

    tokio::time::timeout(std::time::Duration::from_secs(5), h.orchestrator.settle())
        .await
        .expect("settles after a panicking run");
    assert!(!h.orchestrator.is_in_flight(IntentKind::Unwatch).await);
    assert!(h.notifier.notices().is_empty());

    h.orchestrator
        .submit(Intent::Unwatch {
            calendar_id: CalendarId::new("5"),
        })
        .await;
    h.remote.next().await.answer(Reply::Fail("still down".to_string()));
    h.orchestrator.settle().await;
    assert_eq!(h.notifier.notices(), ["unwatch_calendar failed: still down"]);
}

#[tokio::test]
async fn aborted_intake_releases_queued_intents() {
    let h = Harness::new();
    let (dispatcher, intake) = h.orchestrator.start(4);
    dispatcher
        .dispatch(Intent::RefreshLoginStatus)
        .expect("first fits");
    dispatcher
        .dispatch(Intent::Unwatch {
            calendar_id: CalendarId::new("5"),
        })
        .expect("second fits");
    assert_eq!(h.orchestrator.activity().queued, 2);

    intake.abort();
    let _ = intake.await;

    assert_eq!(h.orchestrator.activity().queued, 0);
    tokio::time::timeout(std::time::Duration::from_secs(5), h.orchestrator.settle())
        .await
        .expect("settles once the queue is gone");
    assert_eq!(
        dispatcher.dispatch(Intent::RefreshLoginStatus),
        Err(DispatchError::Closed("refresh_login_status"))
    );
}
