use std::collections::HashMap;

use axum::extract::ws::Message;
use imgq_core::types::ClientId;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// An open push connection for one client id.
pub struct LiveChannel {
    /// Identifies the socket, so a stale socket's cleanup cannot remove
    /// the registration that replaced it.
    pub conn_id: Uuid,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
}

impl LiveChannel {
    pub fn new(conn_id: Uuid, sender: WsSender) -> Self {
        Self { conn_id, sender }
    }
}

/// Result of pushing a message to a client id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// No channel is registered for the id.
    NoChannel,
    /// The channel's receiver is gone; the registration was removed.
    Failed,
}

/// Live push channels keyed by client id, at most one per id.
///
/// Not synchronised: the notifier task owns the only instance.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: HashMap<ClientId, LiveChannel>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` for `client_id`. Last registration wins: a
    /// replaced channel is sent a Close frame and returned.
    pub fn register(&mut self, client_id: ClientId, channel: LiveChannel) -> Option<LiveChannel> {
        let replaced = self.channels.insert(client_id, channel);
        if let Some(old) = &replaced {
            let _ = old.sender.send(Message::Close(None));
        }
        replaced
    }

    /// Remove the registration for `client_id` if it still belongs to
    /// `conn_id`. Returns whether anything was removed.
    pub fn unregister(&mut self, client_id: &ClientId, conn_id: Uuid) -> bool {
        match self.channels.get(client_id) {
            Some(channel) if channel.conn_id == conn_id => {
                self.channels.remove(client_id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, client_id: &ClientId) -> Option<&LiveChannel> {
        self.channels.get(client_id)
    }

    /// Push `message` to the channel registered for `client_id`.
    pub fn send(&mut self, client_id: &ClientId, message: Message) -> SendOutcome {
        let Some(channel) = self.lookup(client_id) else {
            return SendOutcome::NoChannel;
        };
        if channel.sender.send(message).is_ok() {
            SendOutcome::Delivered
        } else {
            self.channels.remove(client_id);
            SendOutcome::Failed
        }
    }

    /// Return the current number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send a Close frame to every channel, then clear the map.
    ///
    /// Returns how many channels were closed.
    pub fn close_all(&mut self) -> usize {
        let count = self.channels.len();
        for channel in self.channels.values() {
            let _ = channel.sender.send(Message::Close(None));
        }
        self.channels.clear();
        count
    }
}
