//! Correlation registry for in-flight requests.
//!
//! Outgoing transaction ids map to one-shot resolvers. The receive loop
//! completes entries as replies arrive; timeouts and cancellation remove
//! them; session teardown drains every holder with
//! [`SessionError::NotConnected`]. Critical sections never span I/O.

use std::{collections::HashMap, sync::Mutex};

use tokio::sync::oneshot;

use super::error::SessionError;
use crate::transaction::Transaction;

type Resolver = oneshot::Sender<Result<Transaction, SessionError>>;

/// Map of transaction id to reply resolver.
///
/// A drained registry refuses further inserts, so requests racing a
/// disconnect fail fast instead of waiting out their deadline.
#[derive(Debug)]
pub(crate) struct PendingReplies {
    inner: Mutex<Option<HashMap<u32, Resolver>>>,
}

impl PendingReplies {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Register `id` and return the receiver the caller awaits.
    pub(crate) fn insert(
        &self,
        id: u32,
    ) -> Result<oneshot::Receiver<Result<Transaction, SessionError>>, SessionError> {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(map) = guard.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        map.insert(id, tx);
        Ok(rx)
    }

    /// Resolve `id` with a reply frame. Returns `false` for unknown ids.
    pub(crate) fn complete(&self, id: u32, reply: Transaction) -> bool {
        let resolver = {
            let mut guard = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.as_mut().and_then(|map| map.remove(&id))
        };
        resolver.is_some_and(|tx| tx.send(Ok(reply)).is_ok())
    }

    /// Drop the entry for `id`, leaving a late reply to be discarded.
    pub(crate) fn remove(&self, id: u32) {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(map) = guard.as_mut() {
            map.remove(&id);
        }
    }

    /// Fail every holder with [`SessionError::NotConnected`] and refuse
    /// further inserts.
    pub(crate) fn drain(&self) {
        let map = {
            let mut guard = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.take()
        };
        if let Some(map) = map {
            for (_, resolver) in map {
                let _: Result<_, _> = resolver.send(Err(SessionError::NotConnected));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{FrameHeader, Transaction};

    fn reply(id: u32) -> Transaction {
        Transaction {
            header: FrameHeader {
                flags: 0,
                is_reply: 1,
                ty: 300,
                id,
                error: 0,
                total_size: 0,
                data_size: 0,
            },
            payload: Vec::new(),
        }
    }

    #[tokio::test]
    async fn completes_exactly_one_waiter() {
        let pending = PendingReplies::new();
        let rx = pending.insert(7).unwrap();
        assert!(pending.complete(7, reply(7)));
        assert!(!pending.complete(7, reply(7)));
        let got = rx.await.unwrap().unwrap();
        assert_eq!(got.header.id, 7);
    }

    #[tokio::test]
    async fn removed_entries_discard_late_replies() {
        let pending = PendingReplies::new();
        let rx = pending.insert(1).unwrap();
        pending.remove(1);
        assert!(!pending.complete(1, reply(1)));
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn drain_fails_all_holders_and_closes() {
        let pending = PendingReplies::new();
        let rx_a = pending.insert(1).unwrap();
        let rx_b = pending.insert(2).unwrap();
        pending.drain();
        assert!(matches!(
            rx_a.await.unwrap(),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            rx_b.await.unwrap(),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            pending.insert(3),
            Err(SessionError::NotConnected)
        ));
    }
}
