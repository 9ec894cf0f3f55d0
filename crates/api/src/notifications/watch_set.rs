use std::collections::HashMap;
use std::time::Duration;

use imgq_core::types::ClientId;
use tokio::time::Instant;

/// Client ids awaiting push delivery.
///
/// Also remembers ids whose result was observed while no channel was
/// registered, so a later connection can still receive it.
#[derive(Default)]
pub struct WatchSet {
    watched: HashMap<ClientId, Instant>,
    undelivered: HashMap<ClientId, Instant>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, client_id: ClientId) {
        self.watched.insert(client_id, Instant::now());
    }

    pub fn unwatch(&mut self, client_id: &ClientId) -> bool {
        self.watched.remove(client_id).is_some()
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.watched.contains_key(client_id)
    }

    /// Snapshot of the watched ids.
    pub fn ids(&self) -> Vec<ClientId> {
        self.watched.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    pub fn undelivered_len(&self) -> usize {
        self.undelivered.len()
    }

    /// A result was observed for `client_id`: stop watching it, and with
    /// `remember` keep the id for delivery on a later connect.
    pub fn settle(&mut self, client_id: &ClientId, remember: bool) {
        self.watched.remove(client_id);
        if remember {
            self.undelivered.insert(client_id.clone(), Instant::now());
        } else {
            self.undelivered.remove(client_id);
        }
    }

    /// Whether a result for `client_id` was observed but never pushed.
    /// The entry stays until a later [`settle`](Self::settle) or prune.
    pub fn is_undelivered(&self, client_id: &ClientId) -> bool {
        self.undelivered.contains_key(client_id)
    }

    /// Forget entries older than `ttl`; their results have expired too.
    /// Returns the number of entries removed.
    pub fn prune(&mut self, ttl: Duration) -> usize {
        let before = self.watched.len() + self.undelivered.len();
        self.watched.retain(|_, since| since.elapsed() < ttl);
        self.undelivered.retain(|_, since| since.elapsed() < ttl);
        before - self.watched.len() - self.undelivered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_removes_id_and_optionally_remembers_it() {
        let mut set = WatchSet::new();
        set.watch(ClientId::from("a"));
        set.watch(ClientId::from("b"));

        set.settle(&ClientId::from("a"), false);
        set.settle(&ClientId::from("b"), true);

        assert!(set.is_empty());
        assert_eq!(set.undelivered_len(), 1);
        assert!(!set.is_undelivered(&ClientId::from("a")));
        assert!(set.is_undelivered(&ClientId::from("b")));

        set.settle(&ClientId::from("b"), false);
        assert!(!set.is_undelivered(&ClientId::from("b")));
    }

    #[test]
    fn unwatch_reports_membership() {
        let mut set = WatchSet::new();
        set.watch(ClientId::from("a"));
        assert!(set.unwatch(&ClientId::from("a")));
        assert!(!set.unwatch(&ClientId::from("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_only_entries_past_ttl() {
        let ttl = Duration::from_secs(3600);
        let mut set = WatchSet::new();
        set.watch(ClientId::from("old"));
        set.settle(&ClientId::from("old-undelivered"), true);

        tokio::time::advance(Duration::from_secs(3000)).await;
        set.watch(ClientId::from("new"));
        assert_eq!(set.prune(ttl), 0);

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(set.prune(ttl), 2);
        assert_eq!(set.ids(), vec![ClientId::from("new")]);
        assert_eq!(set.undelivered_len(), 0);
    }
}
