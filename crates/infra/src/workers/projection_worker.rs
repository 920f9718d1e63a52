use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use streamfold_entity::EntityEvent;
use streamfold_events::bus::RecvError;
use streamfold_events::{EventBus, EventEnvelope, Projection, ProjectionCursor, ProjectionError, Subscription};

use crate::config::{DaemonConfig, ErrorPolicy};
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::projections::{CheckpointStore, decode_envelope};
use crate::read_model::StoreError;

/// A projection the daemon can drive.
pub type EntityProjection = dyn Projection<Ev = EntityEvent>;

/// Observable state of one projection worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionHealth {
    /// Spawned, checkpoint not loaded yet.
    Starting,
    Running { position: u64 },
    /// Halted on a non-skipped error; only a rebuild restarts the worker.
    Faulted { position: u64, error: ProjectionError },
    Stopped { position: u64 },
}

impl ProjectionHealth {
    /// Last checkpointed sequence.
    pub fn position(&self) -> u64 {
        match self {
            ProjectionHealth::Starting => 0,
            ProjectionHealth::Running { position }
            | ProjectionHealth::Faulted { position, .. }
            | ProjectionHealth::Stopped { position } => *position,
        }
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, ProjectionHealth::Faulted { .. })
    }
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("projection '{0}' is already registered")]
    DuplicateProjection(String),

    #[error("unknown projection '{0}'")]
    UnknownProjection(String),

    #[error("projection '{name}' did not reach sequence {sequence} within {timeout:?}")]
    Timeout {
        name: String,
        sequence: u64,
        timeout: Duration,
    },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),
}

/// Handle to stop and join one worker task.
#[derive(Debug)]
struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the task to stop.
    async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            warn!(error = %err, "projection worker task ended abnormally");
        }
    }
}

struct Worker {
    projection: Arc<EntityProjection>,
    health: watch::Receiver<ProjectionHealth>,
    handle: Option<WorkerHandle>,
}

struct WorkerContext<S, C> {
    projection: Arc<EntityProjection>,
    store: Arc<S>,
    checkpoints: Arc<C>,
    config: DaemonConfig,
}

/// Runs every registered projection as its own tokio task.
///
/// Each worker:
/// - loads its checkpoint and reads the log after it, `batch_size` events at a time
/// - decodes, applies and then checkpoints each batch
/// - sleeps when the log is drained until a bus wake-up, a poll tick or shutdown
///
/// Workers are independent: a faulted projection halts alone while the others
/// keep running.
pub struct ProjectionDaemon<S, C, B> {
    store: Arc<S>,
    checkpoints: Arc<C>,
    bus: Arc<B>,
    config: DaemonConfig,
    workers: BTreeMap<&'static str, Worker>,
}

impl<S, C, B> ProjectionDaemon<S, C, B>
where
    S: EventStore + 'static,
    C: CheckpointStore + 'static,
    B: EventBus<u64> + 'static,
{
    pub fn new(store: Arc<S>, checkpoints: Arc<C>, bus: Arc<B>, config: DaemonConfig) -> Self {
        Self {
            store,
            checkpoints,
            bus,
            config,
            workers: BTreeMap::new(),
        }
    }

    /// Register a projection and start its worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&mut self, projection: Arc<EntityProjection>) -> Result<(), DaemonError> {
        let name = projection.name();
        if self.workers.contains_key(name) {
            return Err(DaemonError::DuplicateProjection(name.to_string()));
        }
        let worker = self.start_worker(projection);
        self.workers.insert(name, worker);
        Ok(())
    }

    fn start_worker(&self, projection: Arc<EntityProjection>) -> Worker {
        let (health_tx, health_rx) = watch::channel(ProjectionHealth::Starting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Subscribe before the first read so no announcement slips between them.
        let wakeups = self.bus.subscribe();

        let ctx = WorkerContext {
            projection: Arc::clone(&projection),
            store: Arc::clone(&self.store),
            checkpoints: Arc::clone(&self.checkpoints),
            config: self.config.clone(),
        };
        let join = tokio::spawn(run_worker(ctx, shutdown_rx, wakeups, health_tx));

        Worker {
            projection,
            health: health_rx,
            handle: Some(WorkerHandle {
                shutdown: shutdown_tx,
                join,
            }),
        }
    }

    pub fn projections(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.workers.keys().copied()
    }

    pub fn health(&self, name: &str) -> Option<ProjectionHealth> {
        self.workers.get(name).map(|w| w.health.borrow().clone())
    }

    /// Wait until a projection has checkpointed `sequence`, or has stopped or
    /// faulted, and return its health at that point.
    pub async fn wait_for_position(
        &self,
        name: &str,
        sequence: u64,
        timeout: Duration,
    ) -> Result<ProjectionHealth, DaemonError> {
        let mut health = self
            .workers
            .get(name)
            .map(|w| w.health.clone())
            .ok_or_else(|| DaemonError::UnknownProjection(name.to_string()))?;

        let settled = |h: &ProjectionHealth| match h {
            ProjectionHealth::Starting => false,
            ProjectionHealth::Running { position } => *position >= sequence,
            ProjectionHealth::Faulted { .. } | ProjectionHealth::Stopped { .. } => true,
        };

        let outcome = tokio::time::timeout(timeout, health.wait_for(settled))
            .await
            .map(|reached| reached.map(|h| h.clone()));

        match outcome {
            Ok(Ok(reached)) => Ok(reached),
            // The worker is gone; its last reported state is final.
            Ok(Err(_)) => Ok(health.borrow().clone()),
            Err(_) => Err(DaemonError::Timeout {
                name: name.to_string(),
                sequence,
                timeout,
            }),
        }
    }

    /// Wait until every projection has caught up with the current log head.
    ///
    /// A faulted projection is reported as an error.
    pub async fn catch_up(&self, timeout: Duration) -> Result<u64, DaemonError> {
        let head = self.store.head().await?;
        let names: Vec<&'static str> = self.projections().collect();
        for name in names {
            if let ProjectionHealth::Faulted { error, .. } = self.wait_for_position(name, head, timeout).await? {
                return Err(DaemonError::Projection(error));
            }
        }
        Ok(head)
    }

    /// Stop a projection, clear its read model and checkpoint, and replay it
    /// from the start of the log.
    ///
    /// This is also how a faulted projection is recovered.
    pub async fn rebuild(&mut self, name: &str) -> Result<(), DaemonError> {
        let projection = {
            let worker = self
                .workers
                .get_mut(name)
                .ok_or_else(|| DaemonError::UnknownProjection(name.to_string()))?;
            if let Some(handle) = worker.handle.take() {
                handle.shutdown().await;
            }
            Arc::clone(&worker.projection)
        };

        info!(projection = name, "rebuilding projection from the start of the log");
        projection.reset().await?;
        self.checkpoints.reset(name).await?;

        let worker = self.start_worker(projection);
        if let Some(slot) = self.workers.get_mut(name) {
            *slot = worker;
        }
        Ok(())
    }

    /// Stop every worker and wait for them to finish.
    pub async fn shutdown(mut self) {
        for (name, worker) in std::mem::take(&mut self.workers) {
            if let Some(handle) = worker.handle {
                handle.shutdown().await;
                debug!(projection = name, "projection worker joined");
            }
        }
    }
}

async fn run_worker<S, C>(
    ctx: WorkerContext<S, C>,
    mut shutdown: watch::Receiver<bool>,
    mut wakeups: Subscription<u64>,
    health: watch::Sender<ProjectionHealth>,
) where
    S: EventStore,
    C: CheckpointStore,
{
    let name = ctx.projection.name();
    let policy = ctx.config.error_policy;

    let mut cursor = match ctx.checkpoints.load(name).await {
        Ok(position) => ProjectionCursor::at(position),
        Err(err) => {
            fault(&health, name, 0, err.into());
            return;
        }
    };
    health.send_replace(ProjectionHealth::Running {
        position: cursor.last_sequence(),
    });
    info!(projection = name, position = cursor.last_sequence(), "projection worker started");

    let mut wakeups_open = true;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let stored = match ctx.store.read_all(cursor.last_sequence(), ctx.config.batch_size).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(projection = name, error = %err, "failed to read the event log, will retry");
                if idle(&mut shutdown, &mut wakeups, &mut wakeups_open, ctx.config.poll_interval).await {
                    break;
                }
                continue;
            }
        };

        if stored.is_empty() {
            if idle(&mut shutdown, &mut wakeups, &mut wakeups_open, ctx.config.poll_interval).await {
                break;
            }
            continue;
        }

        let raw: Vec<EventEnvelope<JsonValue>> = stored.iter().map(StoredEvent::to_envelope).collect();
        let position = match cursor.check_batch(&raw) {
            Ok(position) => position,
            Err(err) => {
                fault(&health, name, cursor.last_sequence(), err);
                return;
            }
        };

        let batch = match decode_batch(name, raw, &policy) {
            Ok(batch) => batch,
            Err(err) => {
                fault(&health, name, cursor.last_sequence(), err);
                return;
            }
        };

        let applied = tokio::select! {
            result = apply_with_policy(ctx.projection.as_ref(), &batch, &policy) => Some(result),
            _ = shutdown_requested(&mut shutdown) => None,
        };
        let Some(result) = applied else {
            info!(
                projection = name,
                position = cursor.last_sequence(),
                "shutdown during a batch; it will be re-applied on restart"
            );
            break;
        };
        if let Err(err) = result {
            fault(&health, name, cursor.last_sequence(), err);
            return;
        }

        if let Err(err) = ctx.checkpoints.save(name, position).await {
            fault(&health, name, cursor.last_sequence(), err.into());
            return;
        }
        cursor.advance_to(position);
        health.send_replace(ProjectionHealth::Running { position });
        debug!(projection = name, position, events = batch.len(), "batch applied");
    }

    health.send_replace(ProjectionHealth::Stopped {
        position: cursor.last_sequence(),
    });
    info!(projection = name, position = cursor.last_sequence(), "projection worker stopped");
}

fn fault(health: &watch::Sender<ProjectionHealth>, name: &str, position: u64, err: ProjectionError) {
    error!(projection = name, position, error = %err, "projection halted");
    health.send_replace(ProjectionHealth::Faulted { position, error: err });
}

/// Wait for something to do. Returns `true` when the worker should stop.
async fn idle(
    shutdown: &mut watch::Receiver<bool>,
    wakeups: &mut Subscription<u64>,
    wakeups_open: &mut bool,
    poll_interval: Duration,
) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        message = wakeups.recv(), if *wakeups_open => {
            // Lagged still means "the log moved"; Closed leaves only polling.
            if let Err(RecvError::Closed) = message {
                *wakeups_open = false;
            }
            false
        }
        _ = tokio::time::sleep(poll_interval) => false,
    }
}

/// Resolves once shutdown is requested (or the daemon is gone).
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn decode_batch(
    name: &str,
    raw: Vec<EventEnvelope<JsonValue>>,
    policy: &ErrorPolicy,
) -> Result<Vec<EventEnvelope<EntityEvent>>, ProjectionError> {
    let mut decoded = Vec::with_capacity(raw.len());
    for env in raw {
        match decode_envelope(env) {
            Ok(env) => decoded.push(env),
            Err(err) if skippable(&err, policy) => {
                warn!(projection = name, error = %err, "skipping undecodable event");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(decoded)
}

fn skippable(err: &ProjectionError, policy: &ErrorPolicy) -> bool {
    (err.is_serialization() && policy.skip_serialization_errors)
        || (err.is_unknown_event() && policy.skip_unknown_events)
}

/// Apply a batch; with `skip_apply_errors` a failed batch is retried one
/// event at a time and the failing events are dropped.
async fn apply_with_policy(
    projection: &EntityProjection,
    batch: &[EventEnvelope<EntityEvent>],
    policy: &ErrorPolicy,
) -> Result<(), ProjectionError> {
    match projection.apply_batch(batch).await {
        Ok(()) => Ok(()),
        Err(err) if !policy.skip_apply_errors => Err(err),
        Err(err) => {
            warn!(projection = projection.name(), error = %err, "batch failed, retrying event by event");
            for env in batch {
                if let Err(err) = projection.apply_batch(std::slice::from_ref(env)).await {
                    warn!(
                        projection = projection.name(),
                        sequence = env.sequence(),
                        error = %err,
                        "skipping event that failed to apply"
                    );
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    use streamfold_core::{AggregateId, EventId, ExpectedVersion};
    use streamfold_entity::{ENTITY_STREAM_TYPE, EntityId};
    use streamfold_events::InMemoryEventBus;

    use super::*;
    use crate::event_store::{InMemoryEventStore, PublishingEventStore, UncommittedEvent};
    use crate::projections::test_support::*;
    use crate::projections::{AUDIT_LOG_PROJECTION, AuditLog, AuditLogProjection, InMemoryCheckpointStore};
    use crate::read_model::InMemoryDocumentStore;

    const WAIT: Duration = Duration::from_secs(5);

    type Store = PublishingEventStore<InMemoryEventStore, Arc<InMemoryEventBus<u64>>>;

    /// Records every sequence it sees; fails on sequences listed in `fail_on`.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u64>>,
        fail_on: Vec<u64>,
    }

    impl Recorder {
        fn failing_on(fail_on: Vec<u64>) -> Self {
            Self {
                seen: Mutex::new(vec![]),
                fail_on,
            }
        }

        fn seen(&self) -> Vec<u64> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Projection for Recorder {
        type Ev = EntityEvent;

        fn name(&self) -> &'static str {
            "test.recorder"
        }

        async fn apply_batch(&self, batch: &[EventEnvelope<EntityEvent>]) -> Result<(), ProjectionError> {
            for env in batch {
                if self.fail_on.contains(&env.sequence()) {
                    return Err(ProjectionError::apply(self.name(), env, "boom"));
                }
                self.seen.lock().unwrap().push(env.sequence());
            }
            Ok(())
        }

        async fn reset(&self) -> Result<(), ProjectionError> {
            self.seen.lock().unwrap().clear();
            Ok(())
        }
    }

    /// Records each batch it is handed, then parks inside `apply_batch` while
    /// `blocking` is set.
    struct Gate {
        blocking: AtomicBool,
        entered: Notify,
        batches: Mutex<Vec<Vec<u64>>>,
    }

    impl Gate {
        fn blocking() -> Self {
            Self {
                blocking: AtomicBool::new(true),
                entered: Notify::new(),
                batches: Mutex::new(vec![]),
            }
        }

        fn batches(&self) -> Vec<Vec<u64>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Projection for Gate {
        type Ev = EntityEvent;

        fn name(&self) -> &'static str {
            "test.gate"
        }

        async fn apply_batch(&self, batch: &[EventEnvelope<EntityEvent>]) -> Result<(), ProjectionError> {
            self.batches
                .lock()
                .unwrap()
                .push(batch.iter().map(|env| env.sequence()).collect());
            self.entered.notify_one();
            if self.blocking.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn reset(&self) -> Result<(), ProjectionError> {
            Ok(())
        }
    }

    type Daemon = ProjectionDaemon<Store, InMemoryCheckpointStore, InMemoryEventBus<u64>>;

    struct Harness {
        store: Arc<Store>,
        checkpoints: Arc<InMemoryCheckpointStore>,
        bus: Arc<InMemoryEventBus<u64>>,
        daemon: Daemon,
    }

    fn harness(config: DaemonConfig) -> Harness {
        let bus = Arc::new(InMemoryEventBus::<u64>::new());
        let store = Arc::new(PublishingEventStore::new(InMemoryEventStore::new(), Arc::clone(&bus)));
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let daemon = ProjectionDaemon::new(Arc::clone(&store), Arc::clone(&checkpoints), Arc::clone(&bus), config);
        Harness {
            store,
            checkpoints,
            bus,
            daemon,
        }
    }

    fn fast_config() -> DaemonConfig {
        DaemonConfig {
            batch_size: 2,
            poll_interval: Duration::from_millis(10),
            ..DaemonConfig::default()
        }
    }

    async fn append(store: &Store, event: EntityEvent, expected: ExpectedVersion) {
        let payload = event.to_payload().unwrap();
        let uncommitted = UncommittedEvent::from_typed(EventId::new(), ENTITY_STREAM_TYPE, &event, payload);
        store.append(vec![uncommitted], expected).await.unwrap();
    }

    async fn append_raw(store: &Store, event_type: &str) {
        append_raw_payload(store, event_type, json!({})).await;
    }

    async fn append_raw_payload(store: &Store, event_type: &str, payload: JsonValue) {
        let uncommitted = UncommittedEvent {
            event_id: EventId::new(),
            aggregate_id: AggregateId::new(),
            aggregate_type: ENTITY_STREAM_TYPE.to_string(),
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload,
        };
        store.append(vec![uncommitted], ExpectedVersion::NoStream).await.unwrap();
    }

    async fn seed(store: &Store, entities: usize) {
        for _ in 0..entities {
            let id = new_entity_id();
            append(store, created(id, "A", "d"), ExpectedVersion::NoStream).await;
            append(store, description_updated(id, "d2"), ExpectedVersion::Exact(1)).await;
        }
    }

    #[tokio::test]
    async fn worker_applies_the_log_in_batches_and_checkpoints() {
        let mut h = harness(fast_config());
        seed(&h.store, 3).await;

        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder.clone()).unwrap();

        let health = h.daemon.wait_for_position("test.recorder", 6, WAIT).await.unwrap();
        assert_eq!(health, ProjectionHealth::Running { position: 6 });
        assert_eq!(recorder.seen(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(h.checkpoints.load("test.recorder").await.unwrap(), 6);

        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn worker_wakes_up_for_new_appends() {
        let mut h = harness(DaemonConfig {
            poll_interval: Duration::from_secs(60),
            ..fast_config()
        });
        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder.clone()).unwrap();
        h.daemon.wait_for_position("test.recorder", 0, WAIT).await.unwrap();

        seed(&h.store, 1).await;

        assert_eq!(h.daemon.catch_up(WAIT).await.unwrap(), 2);
        assert_eq!(recorder.seen(), vec![1, 2]);
        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn worker_resumes_after_its_checkpoint() {
        let mut h = harness(fast_config());
        seed(&h.store, 2).await;
        h.checkpoints.save("test.recorder", 3).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder.clone()).unwrap();
        h.daemon.catch_up(WAIT).await.unwrap();

        assert_eq!(recorder.seen(), vec![4]);
        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn apply_error_faults_only_that_worker() {
        let mut h = harness(fast_config());
        seed(&h.store, 2).await;

        let failing = Arc::new(Recorder::failing_on(vec![3]));
        let audit_store: Arc<InMemoryDocumentStore<EntityId, AuditLog>> = Arc::new(InMemoryDocumentStore::new());
        let audit = Arc::new(AuditLogProjection::new(audit_store));
        h.daemon.spawn(failing.clone()).unwrap();
        h.daemon.spawn(audit).unwrap();

        let health = h.daemon.wait_for_position("test.recorder", 4, WAIT).await.unwrap();
        assert!(health.is_faulted());
        assert_eq!(health.position(), 2);
        assert_eq!(h.checkpoints.load("test.recorder").await.unwrap(), 2);

        let audit_health = h
            .daemon
            .wait_for_position(AUDIT_LOG_PROJECTION, 4, WAIT)
            .await
            .unwrap();
        assert_eq!(audit_health, ProjectionHealth::Running { position: 4 });

        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn skip_apply_errors_drops_only_the_failing_event() {
        let mut config = fast_config();
        config.error_policy.skip_apply_errors = true;
        let mut h = harness(config);
        seed(&h.store, 2).await;

        let failing = Arc::new(Recorder::failing_on(vec![3]));
        h.daemon.spawn(failing.clone()).unwrap();
        h.daemon.catch_up(WAIT).await.unwrap();

        assert_eq!(failing.seen(), vec![1, 2, 4]);
        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_event_types_halt_by_default() {
        let mut h = harness(fast_config());
        seed(&h.store, 1).await;
        append_raw(&h.store, "entity.archived").await;

        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder.clone()).unwrap();

        let health = h.daemon.wait_for_position("test.recorder", 3, WAIT).await.unwrap();
        match health {
            ProjectionHealth::Faulted { position, error } => {
                assert_eq!(position, 2);
                assert!(error.is_unknown_event());
            }
            other => panic!("expected a fault, got {other:?}"),
        }
        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_event_types_can_be_skipped() {
        let mut config = fast_config();
        config.error_policy.skip_unknown_events = true;
        let mut h = harness(config);
        append_raw(&h.store, "entity.archived").await;
        seed(&h.store, 1).await;

        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder.clone()).unwrap();
        h.daemon.catch_up(WAIT).await.unwrap();

        assert_eq!(recorder.seen(), vec![2, 3]);
        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_payloads_halt_by_default() {
        let mut h = harness(fast_config());
        seed(&h.store, 1).await;
        append_raw_payload(&h.store, EntityEvent::CREATED, json!({ "name": 7 })).await;

        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder.clone()).unwrap();

        let health = h.daemon.wait_for_position("test.recorder", 3, WAIT).await.unwrap();
        match health {
            ProjectionHealth::Faulted { position, error } => {
                assert_eq!(position, 2);
                assert!(error.is_serialization());
            }
            other => panic!("expected a fault, got {other:?}"),
        }
        assert_eq!(recorder.seen(), vec![1, 2]);
        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_payloads_can_be_skipped() {
        let mut config = fast_config();
        config.error_policy.skip_serialization_errors = true;
        let mut h = harness(config);
        append_raw_payload(&h.store, EntityEvent::CREATED, json!({ "name": 7 })).await;
        seed(&h.store, 1).await;

        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder.clone()).unwrap();
        h.daemon.catch_up(WAIT).await.unwrap();

        assert_eq!(recorder.seen(), vec![2, 3]);
        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_mid_batch_keeps_the_checkpoint_and_reapplies_on_restart() {
        let mut h = harness(fast_config());
        seed(&h.store, 1).await;

        let gate = Arc::new(Gate::blocking());
        h.daemon.spawn(gate.clone()).unwrap();
        tokio::time::timeout(WAIT, gate.entered.notified()).await.unwrap();

        let health = h.daemon.workers["test.gate"].health.clone();
        h.daemon.shutdown().await;

        assert_eq!(*health.borrow(), ProjectionHealth::Stopped { position: 0 });
        assert_eq!(h.checkpoints.load("test.gate").await.unwrap(), 0);

        gate.blocking.store(false, Ordering::SeqCst);
        let mut restarted: Daemon = ProjectionDaemon::new(
            Arc::clone(&h.store),
            Arc::clone(&h.checkpoints),
            Arc::clone(&h.bus),
            fast_config(),
        );
        restarted.spawn(gate.clone()).unwrap();
        assert_eq!(restarted.catch_up(WAIT).await.unwrap(), 2);

        assert_eq!(gate.batches(), vec![vec![1, 2], vec![1, 2]]);
        assert_eq!(h.checkpoints.load("test.gate").await.unwrap(), 2);
        restarted.shutdown().await;
    }

    #[tokio::test]
    async fn rebuild_replays_from_the_start() {
        let mut h = harness(fast_config());
        seed(&h.store, 2).await;

        let failing = Arc::new(Recorder::failing_on(vec![3]));
        h.daemon.spawn(failing.clone()).unwrap();
        let health = h.daemon.wait_for_position("test.recorder", 4, WAIT).await.unwrap();
        assert!(health.is_faulted());

        // A rebuild alone does not fix a poison event; the worker faults again.
        h.daemon.rebuild("test.recorder").await.unwrap();
        let health = h.daemon.wait_for_position("test.recorder", 4, WAIT).await.unwrap();
        assert!(health.is_faulted());
        assert_eq!(failing.seen(), vec![1, 2]);

        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn rebuild_restores_a_cleared_read_model() {
        let mut h = harness(fast_config());
        seed(&h.store, 1).await;

        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder.clone()).unwrap();
        h.daemon.catch_up(WAIT).await.unwrap();

        h.daemon.rebuild("test.recorder").await.unwrap();
        h.daemon.catch_up(WAIT).await.unwrap();

        assert_eq!(recorder.seen(), vec![1, 2]);
        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_and_unknown_names_are_rejected() {
        let mut h = harness(fast_config());
        h.daemon.spawn(Arc::new(Recorder::default())).unwrap();

        let err = h.daemon.spawn(Arc::new(Recorder::default())).unwrap_err();
        assert!(matches!(err, DaemonError::DuplicateProjection(_)));

        let err = h.daemon.rebuild("missing").await.unwrap_err();
        assert!(matches!(err, DaemonError::UnknownProjection(_)));
        assert!(h.daemon.health("missing").is_none());

        h.daemon.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_reports_stopped() {
        let mut h = harness(fast_config());
        let recorder = Arc::new(Recorder::default());
        h.daemon.spawn(recorder).unwrap();
        h.daemon.wait_for_position("test.recorder", 0, WAIT).await.unwrap();

        let mut health = h.daemon.workers["test.recorder"].health.clone();
        h.daemon.shutdown().await;

        assert_eq!(*health.borrow_and_update(), ProjectionHealth::Stopped { position: 0 });
    }

    #[test]
    fn health_position_defaults_to_zero_while_starting() {
        assert_eq!(ProjectionHealth::Starting.position(), 0);
        assert!(!ProjectionHealth::Running { position: 3 }.is_faulted());
    }
}
