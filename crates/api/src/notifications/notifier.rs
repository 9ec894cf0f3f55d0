//! The notifier task and its handle.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use imgq_core::result::RESULT_TTL;
use imgq_core::store::ResultStore;
use imgq_core::types::ClientId;
use imgq_events::ResultReady;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::notifications::watch_set::WatchSet;
use crate::ws::registry::{ConnectionRegistry, LiveChannel, SendOutcome};

/// Text pushed to a client once its result is stored.
pub fn result_ready_message(raw: &str) -> String {
    format!("Result Ready: {raw}")
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Backstop scan interval for results whose event was missed.
    pub poll_interval: Duration,
    /// Push a result on connect when it was observed with no channel.
    pub redeliver_on_connect: bool,
    /// How long a watched or undelivered id is remembered.
    pub watch_ttl: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            redeliver_on_connect: true,
            watch_ttl: RESULT_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifierStats {
    pub watching: usize,
    pub connections: usize,
    pub undelivered: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("Notifier task is not running")]
pub struct NotifierStopped;

enum Command {
    Watch(ClientId),
    Unwatch(ClientId),
    Register {
        client_id: ClientId,
        channel: LiveChannel,
    },
    Unregister {
        client_id: ClientId,
        conn_id: Uuid,
    },
    Stats(oneshot::Sender<NotifierStats>),
}

/// Cloneable handle to the notifier task.
///
/// Commands are processed in the order they are sent.
#[derive(Clone)]
pub struct NotifierHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl NotifierHandle {
    /// Start watching `client_id` for a result.
    pub fn watch(&self, client_id: ClientId) {
        self.send(Command::Watch(client_id));
    }

    pub fn unwatch(&self, client_id: ClientId) {
        self.send(Command::Unwatch(client_id));
    }

    /// Route pushes for `client_id` to `channel`, replacing any previous one.
    pub fn register(&self, client_id: ClientId, channel: LiveChannel) {
        self.send(Command::Register { client_id, channel });
    }

    /// Remove `client_id`'s channel if it is still connection `conn_id`.
    pub fn unregister(&self, client_id: ClientId, conn_id: Uuid) {
        self.send(Command::Unregister { client_id, conn_id });
    }

    pub async fn stats(&self) -> Result<NotifierStats, NotifierStopped> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats(reply))
            .map_err(|_| NotifierStopped)?;
        rx.await.map_err(|_| NotifierStopped)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Notifier task is not running, command dropped");
        }
    }
}

/// Owner of the watch set and the connection registry.
pub struct Notifier {
    store: Arc<dyn ResultStore>,
    config: NotifierConfig,
    watch: WatchSet,
    registry: ConnectionRegistry,
}

impl Notifier {
    /// Spawn the notifier task.
    ///
    /// `completions` wakes it as soon as a result is written; the poll tick
    /// covers lagged or lost events. The task closes every live channel and
    /// exits when `cancel` fires.
    pub fn spawn(
        store: Arc<dyn ResultStore>,
        completions: broadcast::Receiver<ResultReady>,
        config: NotifierConfig,
        cancel: CancellationToken,
    ) -> (NotifierHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Self {
            store,
            config,
            watch: WatchSet::new(),
            registry: ConnectionRegistry::new(),
        };
        let handle = tokio::spawn(notifier.run(rx, completions, cancel));
        (NotifierHandle { commands: tx }, handle)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: broadcast::Receiver<ResultReady>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            redeliver_on_connect = self.config.redeliver_on_connect,
            "Notifier started",
        );

        loop {
            // The tick goes first so a busy command stream cannot starve the
            // sweep. Commands precede events: a watch must land before its
            // completion is handled.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.sweep().await,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                event = completions.recv(), if events_open => match event {
                    Ok(event) => self.on_result_ready(&event.client_id).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notifier lagged behind completion events");
                        self.sweep().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("Completion events closed, relying on polling");
                        events_open = false;
                    }
                },
            }
        }

        let closed = self.registry.close_all();
        tracing::info!(closed, "Notifier stopped, live channels closed");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Watch(client_id) => self.watch.watch(client_id),
            Command::Unwatch(client_id) => {
                self.watch.unwatch(&client_id);
            }
            Command::Register { client_id, channel } => {
                if self.registry.register(client_id.clone(), channel).is_some() {
                    tracing::debug!(client_id = %client_id, "Live channel replaced");
                }
                self.on_connect(&client_id).await;
            }
            Command::Unregister { client_id, conn_id } => {
                self.registry.unregister(&client_id, conn_id);
            }
            Command::Stats(reply) => {
                let _ = reply.send(NotifierStats {
                    watching: self.watch.len(),
                    connections: self.registry.len(),
                    undelivered: self.watch.undelivered_len(),
                });
            }
        }
    }

    /// A channel just registered: push anything already waiting for it.
    ///
    /// The undelivered mark is cleared by `deliver`, so a failed store read
    /// leaves it in place for the next connect.
    async fn on_connect(&mut self, client_id: &ClientId) {
        let redeliver =
            self.config.redeliver_on_connect && self.watch.is_undelivered(client_id);
        if !redeliver && !self.watch.contains(client_id) {
            return;
        }
        if let Some(raw) = self.read(client_id).await {
            self.deliver(client_id, &raw);
        }
    }

    async fn on_result_ready(&mut self, client_id: &ClientId) {
        if !self.watch.contains(client_id) {
            tracing::trace!(client_id = %client_id, "Completion for unwatched id ignored");
            return;
        }
        if let Some(raw) = self.read(client_id).await {
            self.deliver(client_id, &raw);
        }
    }

    /// Check every watched id against the store, then prune stale entries.
    async fn sweep(&mut self) {
        for client_id in self.watch.ids() {
            if let Some(raw) = self.read(&client_id).await {
                self.deliver(&client_id, &raw);
            }
        }
        let pruned = self.watch.prune(self.config.watch_ttl);
        if pruned > 0 {
            tracing::info!(pruned, "Expired watch entries pruned");
        }
    }

    async fn read(&self, client_id: &ClientId) -> Option<String> {
        match self.store.get(client_id).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "Result lookup failed");
                None
            }
        }
    }

    /// Push `raw` to `client_id` and settle its watch entry.
    fn deliver(&mut self, client_id: &ClientId, raw: &str) {
        let message = Message::Text(result_ready_message(raw).into());
        let delivered = match self.registry.send(client_id, message) {
            SendOutcome::Delivered => {
                tracing::info!(client_id = %client_id, "Result pushed to client");
                true
            }
            SendOutcome::NoChannel => {
                tracing::debug!(client_id = %client_id, "Result ready but no live channel");
                false
            }
            SendOutcome::Failed => {
                tracing::warn!(client_id = %client_id, "Push failed, channel removed");
                false
            }
        };
        self.watch
            .settle(client_id, !delivered && self.config.redeliver_on_connect);
    }
}
