//! Outstanding request tracking.
//!
//! Each outbound request gets an id and an entry holding the oneshot sender
//! its caller waits on. A reply removes the entry and completes it, so every
//! entry completes at most once and late or duplicate replies find nothing.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicI32, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{RequestError, RequestResult};

/// A request waiting for its reply.
#[derive(Debug)]
pub struct PendingRequest {
    name: String,
    slot: oneshot::Sender<RequestResult>,
}

impl PendingRequest {
    /// Handler name the request was sent to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hands the outcome to the waiting caller.
    pub fn complete(self, result: RequestResult) {
        if self.slot.send(result).is_err() {
            debug!(name = %self.name, "request caller went away before completion");
        }
    }
}

/// Pending requests keyed by `(scope, id)`.
///
/// The scope distinguishes peers that share one id counter: `()` for the
/// single server, the client id for requests a server sends to clients.
#[derive(Debug)]
pub struct PendingTable<S: Eq + Hash> {
    next_id: AtomicI32,
    entries: DashMap<(S, i32), PendingRequest>,
}

impl<S: Eq + Hash> Default for PendingTable<S> {
    fn default() -> Self {
        Self {
            next_id: AtomicI32::new(0),
            entries: DashMap::new(),
        }
    }
}

impl<S> PendingTable<S>
where
    S: Eq + Hash + Copy + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Next request id. Wraps around after `i32::MAX`.
    pub fn allocate(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Records a pending request and returns the receiver its caller awaits.
    pub fn store(
        &self,
        scope: S,
        id: i32,
        name: impl Into<String>,
    ) -> oneshot::Receiver<RequestResult> {
        let (slot, receiver) = oneshot::channel();
        let entry = PendingRequest {
            name: name.into(),
            slot,
        };
        if let Some(stale) = self.entries.insert((scope, id), entry) {
            warn!(?scope, id, name = %stale.name, "request id reused while still pending");
            stale.complete(Err(RequestError::Disconnected));
        }
        receiver
    }

    /// Removes and returns the entry, if still pending.
    pub fn take(&self, scope: S, id: i32) -> Option<PendingRequest> {
        self.entries.remove(&(scope, id)).map(|(_, entry)| entry)
    }

    /// Completes the request with its reply. Returns false when nothing was
    /// pending under that id.
    pub fn complete(&self, scope: S, id: i32, payload: Bytes) -> bool {
        match self.take(scope, id) {
            Some(entry) => {
                entry.complete(Ok(payload));
                true
            }
            None => {
                warn!(?scope, id, "resolve for unknown request id");
                false
            }
        }
    }

    /// Fails the request. Returns false when nothing was pending under that id.
    pub fn fail(&self, scope: S, id: i32, error: RequestError) -> bool {
        match self.take(scope, id) {
            Some(entry) => {
                entry.complete(Err(error));
                true
            }
            None => {
                warn!(?scope, id, "rejection for unknown request id");
                false
            }
        }
    }

    /// Fails every request pending under `scope`. Returns how many there were.
    pub fn fail_scope(&self, scope: S, error: impl Fn() -> RequestError) -> usize {
        let ids: Vec<i32> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == scope)
            .map(|entry| entry.key().1)
            .collect();

        ids.into_iter()
            .filter_map(|id| self.take(scope, id))
            .map(|entry| entry.complete(Err(error())))
            .count()
    }

    pub fn contains(&self, scope: S, id: i32) -> bool {
        self.entries.contains_key(&(scope, id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ClientId;

    #[test]
    fn ids_increase_and_wrap() {
        let table = PendingTable::<()>::new();
        assert_eq!(table.allocate(), 0);
        assert_eq!(table.allocate(), 1);

        table.next_id.store(i32::MAX, Ordering::Relaxed);
        assert_eq!(table.allocate(), i32::MAX);
        assert_eq!(table.allocate(), i32::MIN);
    }

    #[tokio::test]
    async fn complete_delivers_once() {
        let table = PendingTable::<()>::new();
        let id = table.allocate();
        let receiver = table.store((), id, "ping");
        assert!(table.contains((), id));

        assert!(table.complete((), id, Bytes::from_static(b"pong")));
        assert!(!table.complete((), id, Bytes::from_static(b"again")));
        assert!(table.is_empty());

        let reply = receiver.await.unwrap().unwrap();
        assert_eq!(&reply[..], b"pong");
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let table = PendingTable::<ClientId>::new();
        let first = table.store(ClientId(1), 7, "a");
        let _second = table.store(ClientId(2), 7, "b");

        assert!(table.fail(ClientId(1), 7, RequestError::Disconnected));
        assert!(table.contains(ClientId(2), 7));
        assert!(matches!(
            first.await.unwrap(),
            Err(RequestError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn fail_scope_only_touches_that_scope() {
        let table = PendingTable::<ClientId>::new();
        let a = table.store(ClientId(1), 0, "a");
        let b = table.store(ClientId(1), 1, "b");
        let _c = table.store(ClientId(2), 2, "c");

        assert_eq!(table.fail_scope(ClientId(1), || RequestError::Disconnected), 2);
        assert_eq!(table.len(), 1);
        assert!(matches!(a.await.unwrap(), Err(RequestError::Disconnected)));
        assert!(matches!(b.await.unwrap(), Err(RequestError::Disconnected)));
    }

    #[test]
    fn completing_after_caller_dropped_is_harmless() {
        let table = PendingTable::<()>::new();
        drop(table.store((), 0, "gone"));
        assert!(table.complete((), 0, Bytes::new()));
    }
}
