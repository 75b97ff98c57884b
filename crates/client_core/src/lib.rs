use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{CalendarId, ProjectId},
    protocol::{
        CalendarListEntry, EventListQuery, EventsRequest, GoogleCalendarEvent, LoginStatus,
        Project, WatchCalendarRequest,
    },
};
use tracing::debug;
use url::Url;

pub mod error;

pub use error::ApiCallError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const GOOGLE_CALENDAR_PREFIX: [&str; 3] = ["api", "calendar", "google"];

/// Remote calls the calendar-sync core depends on. One method per remote
/// operation; transport, auth and endpoint layout belong to the implementor.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn login_status(&self) -> Result<LoginStatus>;
    async fn calendar_list(&self) -> Result<Vec<CalendarListEntry>>;
    async fn event_list(&self, query: &EventListQuery) -> Result<Vec<GoogleCalendarEvent>>;
    async fn create_events(&self, project_id: ProjectId, events: &[GoogleCalendarEvent])
        -> Result<()>;
    /// `None` when the API answers with an empty or `null` body.
    async fn watched_project(&self, calendar_id: &CalendarId) -> Result<Option<Project>>;
    async fn watch_calendar(
        &self,
        calendar_id: &CalendarId,
        project_id: ProjectId,
    ) -> Result<Project>;
    async fn unwatch_calendar(&self, calendar_id: &CalendarId) -> Result<()>;
    /// `events` holds one slot per requested id, `None` where the id had no
    /// loaded event.
    async fn import_events(
        &self,
        project_id: ProjectId,
        events: &[Option<GoogleCalendarEvent>],
    ) -> Result<()>;
}

pub struct MissingCalendarApi;

#[async_trait]
impl CalendarApi for MissingCalendarApi {
    async fn login_status(&self) -> Result<LoginStatus> {
        Err(anyhow!("calendar API is unavailable"))
    }

    async fn calendar_list(&self) -> Result<Vec<CalendarListEntry>> {
        Err(anyhow!("calendar API is unavailable"))
    }

    async fn event_list(&self, query: &EventListQuery) -> Result<Vec<GoogleCalendarEvent>> {
        Err(anyhow!(
            "calendar API is unavailable for calendar {}",
            query.calendar_id
        ))
    }

    async fn create_events(
        &self,
        project_id: ProjectId,
        _events: &[GoogleCalendarEvent],
    ) -> Result<()> {
        Err(anyhow!("calendar API is unavailable for project {project_id}"))
    }

    async fn watched_project(&self, calendar_id: &CalendarId) -> Result<Option<Project>> {
        Err(anyhow!(
            "calendar API is unavailable for calendar {calendar_id}"
        ))
    }

    async fn watch_calendar(
        &self,
        calendar_id: &CalendarId,
        _project_id: ProjectId,
    ) -> Result<Project> {
        Err(anyhow!(
            "calendar API is unavailable for calendar {calendar_id}"
        ))
    }

    async fn unwatch_calendar(&self, calendar_id: &CalendarId) -> Result<()> {
        Err(anyhow!(
            "calendar API is unavailable for calendar {calendar_id}"
        ))
    }

    async fn import_events(
        &self,
        project_id: ProjectId,
        _events: &[Option<GoogleCalendarEvent>],
    ) -> Result<()> {
        Err(anyhow!("calendar API is unavailable for project {project_id}"))
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub auth_token: Option<String>,
}

impl ClientSettings {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth_token: None,
        }
    }
}

/// [`CalendarApi`] over the BuJo HTTP API.
pub struct HttpCalendarClient {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpCalendarClient {
    pub fn new(settings: ClientSettings) -> std::result::Result<Self, ApiCallError> {
        if settings.base_url.cannot_be_a_base() {
            return Err(ApiCallError::InvalidBaseUrl(settings.base_url.to_string()));
        }
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(ApiCallError::Client)?;
        Ok(Self {
            http,
            base_url: settings.base_url,
            auth_token: settings.auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/api/calendar/google/{segments...}` with every segment
    /// percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, ApiCallError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiCallError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(GOOGLE_CALENDAR_PREFIX)
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, ApiCallError> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiCallError::from_status(status.as_u16(), &body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> std::result::Result<T, ApiCallError> {
        debug!(%url, "calendar api: GET");
        let response = self.send(self.http.get(url)).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_events<E: Serialize>(
        &self,
        url: Url,
        events: &[E],
    ) -> std::result::Result<(), ApiCallError> {
        debug!(%url, count = events.len(), "calendar api: POST events");
        self.send(self.http.post(url).json(&EventsRequest { events }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CalendarApi for HttpCalendarClient {
    async fn login_status(&self) -> Result<LoginStatus> {
        let url = self.endpoint(&["loginStatus"])?;
        self.get_json(url)
            .await
            .context("failed to fetch google login status")
    }

    async fn calendar_list(&self) -> Result<Vec<CalendarListEntry>> {
        let url = self.endpoint(&["calendarList"])?;
        self.get_json(url)
            .await
            .context("failed to fetch google calendar list")
    }

    async fn event_list(&self, query: &EventListQuery) -> Result<Vec<GoogleCalendarEvent>> {
        let mut url = self.endpoint(&["calendars", query.calendar_id.as_str(), "eventList"])?;
        url.query_pairs_mut()
            .append_pair("timezone", &query.timezone)
            .append_pair("startDate", &query.start_date.format("%Y-%m-%d").to_string())
            .append_pair("endDate", &query.end_date.format("%Y-%m-%d").to_string());
        self.get_json(url).await.with_context(|| {
            format!(
                "failed to fetch events for calendar {} between {} and {}",
                query.calendar_id, query.start_date, query.end_date
            )
        })
    }

    async fn create_events(
        &self,
        project_id: ProjectId,
        events: &[GoogleCalendarEvent],
    ) -> Result<()> {
        let url = self.endpoint(&["projects", &project_id.to_string(), "events"])?;
        self.post_events(url, events)
            .await
            .with_context(|| format!("failed to create events in project {project_id}"))
    }

    async fn watched_project(&self, calendar_id: &CalendarId) -> Result<Option<Project>> {
        let url = self.endpoint(&["calendars", calendar_id.as_str(), "watchedProject"])?;
        debug!(%url, "calendar api: GET");
        let response = self
            .send(self.http.get(url))
            .await
            .with_context(|| format!("failed to fetch watched project of calendar {calendar_id}"))?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read watched project of calendar {calendar_id}"))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice::<Option<Project>>(&bytes)
            .with_context(|| format!("failed to decode watched project of calendar {calendar_id}"))
    }

    async fn watch_calendar(
        &self,
        calendar_id: &CalendarId,
        project_id: ProjectId,
    ) -> Result<Project> {
        let url = self.endpoint(&["calendars", calendar_id.as_str(), "watch"])?;
        debug!(%url, project_id = project_id.0, "calendar api: POST watch");
        let response = self
            .send(
                self.http
                    .post(url)
                    .json(&WatchCalendarRequest { project_id }),
            )
            .await
            .with_context(|| {
                format!("failed to watch calendar {calendar_id} into project {project_id}")
            })?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode project watching calendar {calendar_id}"))
    }

    async fn unwatch_calendar(&self, calendar_id: &CalendarId) -> Result<()> {
        let url = self.endpoint(&["calendars", calendar_id.as_str(), "unwatch"])?;
        debug!(%url, "calendar api: POST unwatch");
        self.send(self.http.post(url))
            .await
            .with_context(|| format!("failed to unwatch calendar {calendar_id}"))?;
        Ok(())
    }

    async fn import_events(
        &self,
        project_id: ProjectId,
        events: &[Option<GoogleCalendarEvent>],
    ) -> Result<()> {
        let url = self.endpoint(&["projects", &project_id.to_string(), "importEvents"])?;
        self.post_events(url, events)
            .await
            .with_context(|| format!("failed to import events into project {project_id}"))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
