mod config;

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use client_core::{CalendarApi, HttpCalendarClient, MissingCalendarApi};
use shared::{
    domain::{CalendarId, ProjectId},
    protocol::{EventListQuery, GoogleCalendarEvent},
};
use sync_core::{
    ChannelNotifier, Dispatcher, Intent, LogNotifier, Notifier, Orchestrator, SyncStore,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, Settings};

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(about = "Synchronize BuJo projects with Google Calendar")]
struct Cli {
    /// Settings file; defaults to ./sync_cli.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct RangeArgs {
    #[arg(long)]
    calendar: String,
    #[arg(long)]
    start: NaiveDate,
    #[arg(long)]
    end: NaiveDate,
    #[arg(long, default_value = "UTC")]
    timezone: String,
}

impl RangeArgs {
    fn query(&self) -> Result<EventListQuery> {
        if self.end < self.start {
            bail!("--end {} is before --start {}", self.end, self.start);
        }
        Ok(EventListQuery {
            calendar_id: CalendarId::new(self.calendar.as_str()),
            timezone: self.timezone.clone(),
            start_date: self.start,
            end_date: self.end,
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh login status and, when linked, the calendar list.
    Status,
    /// Fetch calendar events for a date range.
    Events {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Push events from a JSON array file into a project.
    CreateEvents {
        #[arg(long)]
        project: i64,
        #[arg(long)]
        file: PathBuf,
    },
    /// Show the project watching a calendar.
    Watched {
        #[arg(long)]
        calendar: String,
    },
    Watch {
        #[arg(long)]
        calendar: String,
        #[arg(long)]
        project: i64,
    },
    Unwatch {
        #[arg(long)]
        calendar: String,
    },
    /// Fetch a range, then import the chosen events into a project.
    Import {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        project: i64,
        /// iCalUID of an event to import; repeatable.
        #[arg(long = "event", required = true)]
        events: Vec<String>,
    },
}

/// Intents grouped into stages; each stage settles before the next is
/// dispatched.
fn plan(command: Command) -> Result<Vec<Vec<Intent>>> {
    let stages = match command {
        Command::Status => vec![vec![Intent::RefreshLoginStatus]],
        Command::Events { range } => vec![vec![Intent::RefreshEventList(range.query()?)]],
        Command::CreateEvents { project, file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let events: Vec<GoogleCalendarEvent> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of events", file.display()))?;
            vec![vec![Intent::CreateEvents {
                project_id: ProjectId(project),
                events,
            }]]
        }
        Command::Watched { calendar } => vec![vec![Intent::RefreshWatchedProject {
            calendar_id: CalendarId::new(calendar),
        }]],
        Command::Watch { calendar, project } => vec![vec![Intent::Watch {
            calendar_id: CalendarId::new(calendar),
            project_id: ProjectId(project),
        }]],
        Command::Unwatch { calendar } => vec![vec![Intent::Unwatch {
            calendar_id: CalendarId::new(calendar),
        }]],
        Command::Import {
            range,
            project,
            events,
        } => vec![
            vec![Intent::RefreshEventList(range.query()?)],
            vec![Intent::ImportSelected {
                project_id: ProjectId(project),
                event_ids: events,
            }],
        ],
    };
    Ok(stages)
}

fn calendar_api(settings: &Settings) -> Result<Arc<dyn CalendarApi>> {
    match settings.client_settings()? {
        Some(client_settings) => {
            let client = HttpCalendarClient::new(client_settings)?;
            info!(base_url = %client.base_url(), "sync: using calendar api");
            Ok(Arc::new(client))
        }
        None => {
            warn!("sync: no api_base_url configured; remote calls will fail");
            Ok(Arc::new(MissingCalendarApi))
        }
    }
}

/// Failures go to the log; the channel only lets the caller count them.
fn failure_notifier(channel: Arc<ChannelNotifier>) -> Arc<dyn Notifier> {
    let log: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let channel: Arc<dyn Notifier> = channel;
    let notifiers: Vec<Arc<dyn Notifier>> = vec![log, channel];
    Arc::new(notifiers)
}

async fn run_stages(
    orchestrator: &Orchestrator,
    dispatcher: &Dispatcher,
    stages: Vec<Vec<Intent>>,
) -> Result<()> {
    for stage in stages {
        for intent in stage {
            dispatcher.dispatch(intent)?;
        }
        orchestrator.settle().await;
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let channel = Arc::new(ChannelNotifier::new(NOTIFICATION_CAPACITY));
    let mut failures = channel.subscribe();
    let orchestrator = Orchestrator::new(
        calendar_api(&settings)?,
        Arc::new(SyncStore::new()),
        failure_notifier(channel),
    );
    let (dispatcher, intake) = orchestrator.start(settings.dispatch_queue_capacity);

    run_stages(&orchestrator, &dispatcher, plan(cli.command)?).await?;
    drop(dispatcher);
    intake.await.context("intent intake task failed")?;

    let mut failed = 0usize;
    while let Ok(failure) = failures.try_recv() {
        failed += 1;
        if failure.requires_reauth() {
            eprintln!("hint: sign in to Google again from the BuJo web app");
        }
    }

    let snapshot = orchestrator.store().snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if failed > 0 {
        bail!("{failed} intent(s) failed");
    }
    Ok(())
}
