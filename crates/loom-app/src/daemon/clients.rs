//! The set of attached clients and the fan-out to them.
//!
//! Each client owns a bounded queue of pre-encoded frames drained by its own
//! writer task. Broadcasting never awaits: a client whose queue is full or
//! closed is dropped on the spot so one slow reader cannot stall the rest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::events::{SessionEvent, SessionObserver};

pub type ClientId = u64;

pub type FrameSender = mpsc::Sender<Bytes>;

pub struct ClientSet {
    clients: Mutex<HashMap<ClientId, FrameSender>>,
    next_id: AtomicU64,
}

impl ClientSet {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, client: ClientId, sender: FrameSender) {
        self.lock().insert(client, sender);
    }

    /// Returns `false` if the client was already gone.
    pub fn remove(&self, client: ClientId) -> bool {
        self.lock().remove(&client).is_some()
    }

    /// Queue `frame` for every client. Returns the clients that were dropped.
    pub fn broadcast(&self, frame: &Bytes) -> Vec<ClientId> {
        let snapshot: Vec<(ClientId, FrameSender)> = self
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let failed: Vec<ClientId> = snapshot
            .into_iter()
            .filter(|(_, tx)| tx.try_send(frame.clone()).is_err())
            .map(|(id, _)| id)
            .collect();

        if !failed.is_empty() {
            let mut clients = self.lock();
            for id in &failed {
                clients.remove(id);
            }
        }
        failed
    }

    /// Queue `frame` for one client. Returns `false` if it is unknown or its
    /// queue could not take the frame.
    pub fn send_to(&self, client: ClientId, frame: Bytes) -> bool {
        let sender = self.lock().get(&client).cloned();
        match sender {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget every client. Their writer tasks end once queued frames drain.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, FrameSender>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ClientSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Client set plus observer, shared by the session and every output pump.
#[derive(Clone)]
pub struct Broadcaster {
    clients: Arc<ClientSet>,
    observer: Arc<dyn SessionObserver>,
}

impl Broadcaster {
    pub fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            clients: Arc::new(ClientSet::new()),
            observer,
        }
    }

    pub fn clients(&self) -> &ClientSet {
        &self.clients
    }

    pub fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&event);
    }

    pub fn broadcast(&self, frame: &Bytes) {
        for client in self.clients.broadcast(frame) {
            self.emit(SessionEvent::ClientDropped { client });
        }
    }
}

/// Drain a client's frame queue onto its socket. Ends when the queue closes
/// or a write fails.
pub async fn write_loop<W>(client: ClientId, mut writer: W, mut frames: mpsc::Receiver<Bytes>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            log::debug!("client {client} write failed: {e}");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::events::testing::RecordingObserver;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_ids_are_unique() {
        let set = ClientSet::new();
        let a = set.allocate_id();
        let b = set.allocate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_broadcast_reaches_every_client() {
        let set = ClientSet::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        set.insert(1, tx1);
        set.insert(2, tx2);

        let frame = Bytes::from_static(b"\x08\x00\x00\x00\x02hi");
        assert!(set.broadcast(&frame).is_empty());
        assert_eq!(rx1.try_recv().unwrap(), frame);
        assert_eq!(rx2.try_recv().unwrap(), frame);
    }

    #[test]
    fn test_full_queue_drops_only_that_client() {
        let set = ClientSet::new();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        set.insert(1, slow_tx);
        set.insert(2, fast_tx);

        assert!(set.broadcast(&Bytes::from_static(b"a")).is_empty());
        assert_eq!(set.broadcast(&Bytes::from_static(b"b")), vec![1]);
        assert_eq!(set.len(), 1);
        assert_eq!(fast_rx.try_recv().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(fast_rx.try_recv().unwrap(), Bytes::from_static(b"b"));
    }

    #[test]
    fn test_closed_queue_is_dropped() {
        let observer = Arc::new(RecordingObserver::default());
        let broadcaster = Broadcaster::new(observer.clone());
        let (tx, rx) = mpsc::channel(4);
        broadcaster.clients().insert(7, tx);
        drop(rx);

        broadcaster.broadcast(&Bytes::from_static(b"x"));
        assert!(broadcaster.clients().is_empty());
        assert_eq!(observer.events(), vec![SessionEvent::ClientDropped { client: 7 }]);
    }

    #[test]
    fn test_send_to_unknown_client() {
        let set = ClientSet::new();
        assert!(!set.send_to(99, Bytes::from_static(b"x")));
        assert!(!set.remove(99));
    }

    #[tokio::test]
    async fn test_write_loop_writes_frames_in_order() {
        let (client_end, mut server_end) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(write_loop(1, client_end, rx));

        tx.send(Bytes::from_static(b"one,")).await.unwrap();
        tx.send(Bytes::from_static(b"two")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let mut out = Vec::new();
        server_end.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"one,two");
    }
}
