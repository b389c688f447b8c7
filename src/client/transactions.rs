//! Transaction correlation
//!
//! Outbound commands carry a transaction id; the server echoes it in the
//! reply. Replies land here, either handed straight to a caller blocked in
//! `call` or parked until someone asks for them with `get_response`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::protocol::command::Response;

#[derive(Debug, Default)]
struct Pending {
    responses: HashMap<u32, Response>,
    waiters: HashMap<u32, oneshot::Sender<Response>>,
}

/// Transaction id allocator plus response table for one connection
#[derive(Debug, Default)]
pub struct TransactionTable {
    last_id: AtomicU32,
    pending: Mutex<Pending>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id; the first one is 1
    pub fn next_id(&self) -> u32 {
        self.last_id.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a reply
    ///
    /// Goes to the registered waiter if there is one still listening,
    /// otherwise replaces whatever was stored for `id`.
    pub fn store(&self, id: u32, response: Response) {
        let mut pending = self.lock();
        let response = match pending.waiters.remove(&id) {
            Some(waiter) => match waiter.send(response) {
                Ok(()) => return,
                Err(response) => response,
            },
            None => response,
        };
        if pending.responses.insert(id, response).is_some() {
            tracing::warn!(transaction_id = id, "Unclaimed response overwritten");
        }
    }

    /// Non-blocking take; each stored reply is returned at most once
    pub fn take(&self, id: u32) -> Option<Response> {
        self.lock().responses.remove(&id)
    }

    /// Register interest in the reply to `id`
    pub fn register_waiter(&self, id: u32) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();
        match pending.responses.remove(&id) {
            Some(response) => {
                let _ = tx.send(response);
            }
            None => {
                pending.waiters.insert(id, tx);
            }
        }
        rx
    }

    /// Forget the waiter and any stored reply for `id`
    pub fn cancel(&self, id: u32) {
        let mut pending = self.lock();
        pending.waiters.remove(&id);
        pending.responses.remove(&id);
    }

    /// Wait for the reply registered with [`register_waiter`](Self::register_waiter)
    ///
    /// On timeout the transaction is cancelled; a reply that shows up later
    /// is stored and can still be taken.
    pub async fn wait(
        &self,
        id: u32,
        waiter: oneshot::Receiver<Response>,
        deadline: Duration,
    ) -> Result<Response> {
        match tokio::time::timeout(deadline, waiter).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped: table was cleared by a reset
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.cancel(id);
                Err(Error::ResponseTimeout { transaction_id: id })
            }
        }
    }

    /// Drop every waiter and stored reply
    pub fn clear(&self) {
        let mut pending = self.lock();
        pending.waiters.clear();
        pending.responses.clear();
    }

    pub fn pending_count(&self) -> usize {
        let pending = self.lock();
        pending.waiters.len() + pending.responses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::command::Command;
    use std::sync::Arc;

    fn reply(id: u32) -> Response {
        Command::new("_result", id)
    }

    #[test]
    fn test_ids_strictly_increase_from_one() {
        let table = TransactionTable::new();
        let ids: Vec<u32> = (0..5).map(|_| table.next_id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let table = Arc::new(TransactionTable::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || (0..250).map(|_| table.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert_eq!(all[0], 1);
        assert_eq!(all[999], 1000);
    }

    #[test]
    fn test_single_delivery() {
        let table = TransactionTable::new();
        table.store(4, reply(4));
        assert_eq!(table.take(4), Some(reply(4)));
        assert_eq!(table.take(4), None);
        assert_eq!(table.take(5), None);
    }

    #[test]
    fn test_unclaimed_response_overwritten() {
        let table = TransactionTable::new();
        table.store(2, reply(2));
        table.store(2, Command::new("_error", 2));
        assert_eq!(table.take(2).map(|r| r.name), Some("_error".to_string()));
    }

    #[tokio::test]
    async fn test_waiter_receives_reply() {
        let table = Arc::new(TransactionTable::new());
        let id = (0..7).map(|_| table.next_id()).last().unwrap();
        assert_eq!(id, 7);

        let waiter = table.register_waiter(id);
        let router = table.clone();
        tokio::spawn(async move { router.store(7, reply(7)) });

        let response = table
            .wait(id, waiter, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.transaction(), Some(7));
        assert_eq!(table.take(7), None);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_waiter_registered_after_reply() {
        let table = TransactionTable::new();
        table.store(3, reply(3));
        let waiter = table.register_waiter(3);
        assert!(table.wait(3, waiter, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_nothing_behind() {
        let table = TransactionTable::new();
        let id = table.next_id();
        let waiter = table.register_waiter(id);

        let err = table
            .wait(id, waiter, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResponseTimeout { transaction_id } if transaction_id == id));
        assert_eq!(table.take(id), None);
        assert_eq!(table.pending_count(), 0);

        // Late reply is still retrievable
        table.store(id, reply(id));
        assert_eq!(table.take(id), Some(reply(id)));
    }

    #[tokio::test]
    async fn test_clear_wakes_waiters() {
        let table = TransactionTable::new();
        let waiter = table.register_waiter(1);
        table.clear();
        let err = table
            .wait(1, waiter, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
