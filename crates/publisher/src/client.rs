//! Per-client connection state and writer task
//!
//! Each connected client owns a bounded outbound queue of pre-encoded
//! frames. Producers enqueue with `try_send`; a dedicated writer task
//! drains the queue in bulk and is the only code that touches the socket's
//! write half, giving per-client FIFO for free.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::subscription::Subscription;

/// Bytes coalesced per socket write
const WRITE_COALESCE_BYTES: usize = 64 * 1024;

/// Outcome of enqueueing a frame for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnqueueOutcome {
    Enqueued,
    /// Queue full; `lossless` tells the caller which drop counter to bump
    Dropped { lossless: bool },
    Closed,
}

/// State for one accepted connection
pub(crate) struct ClientConn {
    pub(crate) id: u64,
    pub(crate) addr: SocketAddr,
    authenticated: AtomicBool,
    closed: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
    outbound: mpsc::Sender<Bytes>,
    /// Cancelling tears the connection down; the writer drains first
    pub(crate) token: CancellationToken,
    pub(crate) frames_sent: AtomicU64,
    pub(crate) frames_dropped: AtomicU64,
}

impl ClientConn {
    pub(crate) fn new(
        id: u64,
        addr: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            addr,
            authenticated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            outbound,
            token: CancellationToken::new(),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        })
    }

    #[inline]
    pub(crate) fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Relaxed)
    }

    pub(crate) fn set_authenticated(&self) {
        self.authenticated.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.outbound.is_closed()
    }

    /// Transition to CLOSED; idempotent
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            self.token.cancel();
        }
    }

    pub(crate) fn add_subscriptions(&self, subs: Vec<Subscription>) {
        self.subscriptions.lock().extend(subs);
    }

    /// Remove the listed patterns (exact string match)
    pub(crate) fn remove_subscriptions(&self, patterns: &[String]) -> usize {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|sub| !patterns.iter().any(|p| p == sub.pattern()));
        before - subs.len()
    }

    pub(crate) fn matches(&self, topic: &str) -> bool {
        self.subscriptions.lock().iter().any(|sub| sub.matches(topic))
    }

    fn any_lossless(&self) -> bool {
        self.subscriptions.lock().iter().any(Subscription::lossless)
    }

    /// Enqueue pre-encoded bytes for this client
    pub(crate) fn enqueue(&self, bytes: Bytes) -> EnqueueOutcome {
        if self.is_closed() {
            return EnqueueOutcome::Closed;
        }
        match self.outbound.try_send(bytes) {
            Ok(()) => EnqueueOutcome::Enqueued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Dropped {
                    lossless: self.any_lossless(),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }
}

/// Drain the outbound queue and write to the socket until the client closes
///
/// Writes are coalesced up to [`WRITE_COALESCE_BYTES`] per syscall. On a
/// write error the client transitions to CLOSED; on cancellation the
/// remaining queue is flushed best-effort before the socket is shut down.
pub(crate) async fn writer_loop(
    conn: Arc<ClientConn>,
    mut rx: mpsc::Receiver<Bytes>,
    mut write_half: OwnedWriteHalf,
    sent_counter: Arc<spine_metrics::Counter>,
) {
    let mut write_buf = BytesMut::with_capacity(WRITE_COALESCE_BYTES);

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(first) = maybe else { break };

                write_buf.clear();
                write_buf.extend_from_slice(&first);
                let mut batched = 1u64;
                while write_buf.len() < WRITE_COALESCE_BYTES {
                    match rx.try_recv() {
                        Ok(bytes) => {
                            write_buf.extend_from_slice(&bytes);
                            batched += 1;
                        }
                        Err(_) => break,
                    }
                }

                if let Err(e) = write_half.write_all(&write_buf).await {
                    tracing::debug!(client = conn.id, addr = %conn.addr, error = %e, "write failed, closing client");
                    conn.close();
                    break;
                }
                conn.frames_sent.fetch_add(batched, Ordering::Relaxed);
                sent_counter.add(batched);
            }
            _ = conn.token.cancelled() => {
                // Flush whatever is already queued (e.g. a final ack)
                while let Ok(bytes) = rx.try_recv() {
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                let _ = write_half.shutdown().await;
                break;
            }
        }
    }
}
