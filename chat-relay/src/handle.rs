use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{
    Notify,
    mpsc::{self, error::TrySendError},
};

use crate::error::SendError;

/// Process-unique identity of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Send-capable reference to a live connection.
///
/// Clones share one bounded outbound queue, which is drained by the single
/// writer that owns the transport, so writes from any task are serialized.
/// A handle never keeps the socket open by itself: once the owner closes the
/// [`Outbox`], every clone starts failing with [`SendError::Closed`].
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    frames: mpsc::Sender<String>,
    close: Arc<Notify>,
}

impl ConnectionHandle {
    /// Creates a handle and the outbox its owner must drain.
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, Outbox) {
        let (frames, rx) = mpsc::channel(capacity.max(1));
        let close = Arc::new(Notify::new());
        let handle = Self {
            id,
            frames,
            close: Arc::clone(&close),
        };
        let outbox = Outbox {
            frames: rx,
            close,
            closing: false,
        };
        (handle, outbox)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.id == other.id
    }

    /// Best-effort delivery that never waits on a slow peer.
    pub fn send(&self, frame: String) -> Result<(), SendError> {
        self.frames.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => SendError::Backlogged,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Queues a reply, waiting for room in the outbound queue.
    pub async fn reply(&self, frame: String) -> Result<(), SendError> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| SendError::Closed)
    }

    /// Asks the writer to flush what is queued and shut the transport down.
    pub fn close(&self) {
        self.close.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving side of a [`ConnectionHandle`], owned by the connection writer.
pub struct Outbox {
    frames: mpsc::Receiver<String>,
    close: Arc<Notify>,
    closing: bool,
}

impl Outbox {
    /// Next frame to write, or `None` once closed and drained.
    ///
    /// After [`ConnectionHandle::close`] new sends are refused but frames
    /// already queued are still returned.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            tokio::select! {
                biased;
                _ = self.close.notified(), if !self.closing => {
                    self.closing = true;
                    self.frames.close();
                }
                frame = self.frames.recv() => return frame,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn send_reports_backlog_when_queue_is_full() {
        let (handle, mut outbox) = ConnectionHandle::new(ConnectionId::next(), 1);
        handle.send("one".into()).expect("first send fits");
        assert_eq!(handle.send("two".into()), Err(SendError::Backlogged));
        assert_eq!(outbox.next().await.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn close_drains_queued_frames_then_refuses_sends() {
        let (handle, mut outbox) = ConnectionHandle::new(ConnectionId::next(), 4);
        handle.reply("queued".into()).await.expect("reply queued");
        handle.close();

        assert_eq!(outbox.next().await.as_deref(), Some("queued"));
        assert_eq!(outbox.next().await, None);
        assert!(handle.is_closed());
        assert_eq!(handle.send("late".into()), Err(SendError::Closed));
        assert_eq!(handle.reply("late".into()).await, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn dropped_outbox_closes_every_clone() {
        let (handle, outbox) = ConnectionHandle::new(ConnectionId::next(), 4);
        let clone = handle.clone();
        drop(outbox);
        assert!(clone.same_connection(&handle));
        assert_eq!(clone.send("hi".into()), Err(SendError::Closed));
    }
}
