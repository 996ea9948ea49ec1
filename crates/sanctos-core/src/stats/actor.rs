use super::{StatsError, StatsEvent, StatsSnapshot, StatsState, StatsStorage};
use crate::{
    config::StatsConfig,
    stats::{FileStatsStorage, MemoryStatsStorage},
    utils::SharedClock,
};
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

#[derive(Debug)]
enum StatsCommand {
    Bump { event: StatsEvent, at_ms: u64, ack: Option<oneshot::Sender<()>> },
    Get(oneshot::Sender<StatsSnapshot>),
    Ping(oneshot::Sender<PingReply>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReply {
    pub ok: bool,
    pub class: &'static str,
    pub has_state: bool,
    pub start_time: u64,
}

struct StatsActor {
    storage: Arc<dyn StatsStorage>,
    clock: SharedClock,
    retained_days: usize,
    state: Option<StatsState>,
}

impl StatsActor {
    async fn run(mut self, mut rx: mpsc::Receiver<StatsCommand>) {
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        tracing::debug!("stats actor stopped");
    }

    async fn handle(&mut self, command: StatsCommand) {
        match command {
            StatsCommand::Bump { event, at_ms, ack } => {
                let retained_days = self.retained_days;
                self.state().await.apply(event, at_ms, retained_days);
                self.persist().await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            StatsCommand::Get(reply) => {
                let now_ms = self.clock.now_ms();
                let snapshot = self.state().await.snapshot(now_ms);
                let _ = reply.send(snapshot);
            }
            StatsCommand::Ping(reply) => {
                let start_time = self.state().await.start_time;
                let _ = reply.send(PingReply {
                    ok: true,
                    class: "StatsActor",
                    has_state: true,
                    start_time,
                });
            }
        }
    }

    /// Loads the state on first use, creating and persisting a fresh one if
    /// storage is empty or unreadable.
    async fn state(&mut self) -> &mut StatsState {
        if self.state.is_none() {
            let loaded = match self.storage.load().await {
                Ok(Some(mut state)) => {
                    for bucket in state.traffic.rates.values_mut() {
                        bucket.normalize();
                    }
                    state
                }
                Ok(None) => self.initialize().await,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load stats state, starting fresh");
                    self.initialize().await
                }
            };
            self.state = Some(loaded);
        }
        let now_ms = self.clock.now_ms();
        self.state.get_or_insert_with(|| StatsState::new(now_ms))
    }

    async fn initialize(&self) -> StatsState {
        let state = StatsState::new(self.clock.now_ms());
        if let Err(e) = self.storage.save(&state).await {
            tracing::warn!(error = %e, "failed to persist initial stats state");
        }
        state
    }

    async fn persist(&self) {
        let Some(state) = self.state.as_ref() else {
            return;
        };
        if let Err(e) = self.storage.save(state).await {
            tracing::warn!(error = %e, "failed to persist stats state");
        }
    }
}

/// Cloneable sender side of the stats actor.
#[derive(Clone)]
pub struct StatsHandle {
    tx: mpsc::Sender<StatsCommand>,
    clock: SharedClock,
    timeout: Duration,
}

impl fmt::Debug for StatsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsHandle")
            .field("closed", &self.tx.is_closed())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Starts the stats actor and returns its handle.
pub fn spawn_stats_actor(
    storage: Arc<dyn StatsStorage>,
    clock: SharedClock,
    config: &StatsConfig,
) -> (StatsHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let actor = StatsActor {
        storage,
        clock: Arc::clone(&clock),
        retained_days: config.retained_days,
        state: None,
    };
    let task = tokio::spawn(actor.run(rx));
    let handle =
        StatsHandle { tx, clock, timeout: Duration::from_millis(config.request_timeout_ms) };
    (handle, task)
}

/// File storage when a path is configured, otherwise in-memory.
#[must_use]
pub fn storage_from_config(config: &StatsConfig) -> Arc<dyn StatsStorage> {
    match config.storage_path.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => Arc::new(FileStatsStorage::new(path)),
        None => Arc::new(MemoryStatsStorage::new()),
    }
}

impl StatsHandle {
    /// A handle whose actor is already gone. Every call fails fast, so
    /// readers always get the degraded snapshot.
    #[must_use]
    pub fn disconnected(clock: SharedClock) -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx, clock, timeout: Duration::from_millis(100) }
    }

    /// Queues an event without waiting for it to be applied. When the channel
    /// is full this waits for a free slot, so no event is lost while the
    /// actor is alive.
    pub async fn bump(&self, event: StatsEvent) {
        let command = StatsCommand::Bump { event, at_ms: self.clock.now_ms(), ack: None };
        if self.tx.send(command).await.is_err() {
            tracing::debug!("stats actor closed, event dropped");
            metrics::counter!("sanctos_stats_dropped_total").increment(1);
        }
    }

    /// Records an event and waits until it has been applied and persisted.
    ///
    /// # Errors
    ///
    /// [`StatsError::Unavailable`] if the actor is gone, [`StatsError::Timeout`]
    /// if it does not acknowledge in time.
    pub async fn bump_and_wait(&self, event: StatsEvent) -> Result<(), StatsError> {
        let at_ms = self.clock.now_ms();
        self.request(|ack| StatsCommand::Bump { event, at_ms, ack: Some(ack) }).await
    }

    /// # Errors
    ///
    /// Same as [`StatsHandle::bump_and_wait`].
    pub async fn get(&self) -> Result<StatsSnapshot, StatsError> {
        self.request(StatsCommand::Get).await
    }

    /// The current snapshot, or a zeroed degraded one if the actor cannot be
    /// reached.
    pub async fn get_or_degraded(&self) -> StatsSnapshot {
        match self.get().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "stats unavailable, serving degraded snapshot");
                metrics::counter!("sanctos_stats_degraded_total").increment(1);
                StatsSnapshot::degraded(self.clock.now_ms(), &e.to_string())
            }
        }
    }

    /// # Errors
    ///
    /// Same as [`StatsHandle::bump_and_wait`].
    pub async fn ping(&self) -> Result<PingReply, StatsError> {
        self.request(StatsCommand::Ping).await
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> StatsCommand,
    ) -> Result<R, StatsError> {
        let (tx, rx) = oneshot::channel();
        let exchange = async {
            self.tx.send(make(tx)).await.map_err(|_| StatsError::Unavailable)?;
            rx.await.map_err(|_| StatsError::Unavailable)
        };
        tokio::time::timeout(self.timeout, exchange).await.map_err(|_| StatsError::Timeout)?
    }
}
