//! Effect orchestration: one lane per intent kind, latest intent wins.
//!
//! Each lane is Idle or In-Flight. Submitting an intent bumps the lane's
//! generation and aborts the superseded run, so its remote call is dropped at
//! the next suspension point. A run that completes anyway only applies its
//! outcome while its generation is still current; the check and the store
//! write happen under the lane lock, which supersession also takes.

use std::{collections::HashMap, sync::Arc};

use client_core::CalendarApi;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::{
    dispatcher::Dispatcher,
    handlers,
    intents::{Intent, IntentKind},
    notify::{Notifier, RemoteCallFailure},
    reducer::SyncStore,
};

/// Work the orchestrator has not finished yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activity {
    /// Dispatched but not yet picked up from the queue.
    pub queued: usize,
    /// Lanes with a live run.
    pub in_flight: usize,
}

impl Activity {
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.in_flight == 0
    }
}

#[derive(Default)]
struct Lane {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Receiving end of the dispatcher queue. Dropping it, whether the loop ended
/// or its task was aborted, closes the queue and takes every intent that will
/// never be submitted back out of `Activity::queued`.
struct Intake {
    intents: mpsc::Receiver<Intent>,
    activity: Arc<watch::Sender<Activity>>,
    in_hand: bool,
}

impl Drop for Intake {
    fn drop(&mut self) {
        self.intents.close();
        let mut dropped = usize::from(self.in_hand);
        while self.intents.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "sync: intake stopped with intents still queued");
            self.activity
                .send_modify(|activity| activity.queued = activity.queued.saturating_sub(dropped));
        }
    }
}

/// Armed for the lifetime of a run. If the run ends without reaching its
/// settle step (a panic, or an abort), the lane is released asynchronously;
/// release is a no-op once the lane has moved on to a newer generation.
struct RunGuard {
    orchestrator: Option<Arc<Orchestrator>>,
    kind: IntentKind,
    generation: u64,
}

impl RunGuard {
    fn disarm(mut self) {
        self.orchestrator = None;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let Some(orchestrator) = self.orchestrator.take() else {
            return;
        };
        let (kind, generation) = (self.kind, self.generation);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { orchestrator.release_lane(kind, generation).await });
        }
    }
}

pub struct Orchestrator {
    api: Arc<dyn CalendarApi>,
    store: Arc<SyncStore>,
    notifier: Arc<dyn Notifier>,
    lanes: Mutex<HashMap<IntentKind, Lane>>,
    activity: Arc<watch::Sender<Activity>>,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn CalendarApi>,
        store: Arc<SyncStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let (activity, _) = watch::channel(Activity::default());
        Arc::new(Self {
            api,
            store,
            notifier,
            lanes: Mutex::new(HashMap::new()),
            activity: Arc::new(activity),
        })
    }

    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }

    /// Spawns the intake loop and returns the dispatcher feeding it. The
    /// loop ends once every dispatcher clone is dropped.
    pub fn start(self: &Arc<Self>, queue_capacity: usize) -> (Dispatcher, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let dispatcher = Dispatcher::new(tx, Arc::clone(&self.activity));
        let intake = Intake {
            intents: rx,
            activity: Arc::clone(&self.activity),
            in_hand: false,
        };
        let task = tokio::spawn(Arc::clone(self).run(intake));
        (dispatcher, task)
    }

    async fn run(self: Arc<Self>, mut intake: Intake) {
        info!("sync: orchestrator started");
        while let Some(intent) = intake.intents.recv().await {
            intake.in_hand = true;
            self.submit(intent).await;
            intake.in_hand = false;
            self.activity
                .send_modify(|activity| activity.queued = activity.queued.saturating_sub(1));
        }
        info!("sync: intent queue closed; orchestrator stopped");
    }

    /// Starts handling `intent`, superseding any unfinished run of the same
    /// kind.
    pub async fn submit(self: &Arc<Self>, intent: Intent) {
        let kind = intent.kind();
        let run_id = Uuid::new_v4();

        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry(kind).or_default();
        lane.generation += 1;
        let generation = lane.generation;
        if let Some(previous) = lane.task.take() {
            previous.abort();
            debug!(intent = kind.name(), %run_id, "sync: superseding in-flight run");
        }

        let span = tracing::info_span!("intent", intent = kind.name(), %run_id);
        let orchestrator = Arc::clone(self);
        lane.task = Some(tokio::spawn(
            async move { orchestrator.execute(intent, generation).await }.instrument(span),
        ));
        self.publish_in_flight(&lanes);
    }

    async fn execute(self: Arc<Self>, intent: Intent, generation: u64) {
        let kind = intent.kind();
        let guard = RunGuard {
            orchestrator: Some(Arc::clone(&self)),
            kind,
            generation,
        };
        info!("sync: handling intent");
        let outcome = handlers::run(&intent, self.api.as_ref(), &self.store).await;

        let mut lanes = self.lanes.lock().await;
        let current = lanes
            .get(&kind)
            .is_some_and(|lane| lane.generation == generation);
        if !current {
            debug!("sync: discarding result of superseded run");
            guard.disarm();
            return;
        }

        match outcome {
            Ok(updates) => {
                debug!(updates = updates.len(), "sync: intent settled");
                self.store.apply(kind, updates).await;
            }
            Err(err) => {
                let failure = RemoteCallFailure::new(kind, &err);
                debug!(category = ?failure.category(), "sync: reporting failure");
                self.notifier.notify(&failure);
            }
        }

        if let Some(lane) = lanes.get_mut(&kind) {
            lane.task = None;
        }
        self.publish_in_flight(&lanes);
        guard.disarm();
    }

    async fn release_lane(&self, kind: IntentKind, generation: u64) {
        let mut lanes = self.lanes.lock().await;
        match lanes.get_mut(&kind) {
            Some(lane) if lane.generation == generation && lane.task.is_some() => {
                error!(intent = kind.name(), "sync: run ended without settling; lane released");
                lane.task = None;
            }
            _ => return,
        }
        self.publish_in_flight(&lanes);
    }

    fn publish_in_flight(&self, lanes: &HashMap<IntentKind, Lane>) {
        let in_flight = lanes.values().filter(|lane| lane.task.is_some()).count();
        self.activity
            .send_modify(|activity| activity.in_flight = in_flight);
    }

    pub async fn is_in_flight(&self, kind: IntentKind) -> bool {
        self.lanes
            .lock()
            .await
            .get(&kind)
            .is_some_and(|lane| lane.task.is_some())
    }

    pub fn activity(&self) -> Activity {
        *self.activity.borrow()
    }

    /// Waits until nothing is queued and every lane is Idle.
    pub async fn settle(&self) {
        let mut activity = self.activity.subscribe();
        let _ = activity.wait_for(Activity::is_idle).await;
    }
}

#[cfg(test)]
#[path = "tests/orchestration_tests.rs"]
mod tests;
