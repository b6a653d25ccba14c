//! Publisher server: accept loop, control protocol, heartbeats, fan-out
//!
//! The server task owns the listener; each accepted connection gets a
//! reader task (control protocol + state machine) and a writer task
//! (outbound queue -> socket). `Publisher` is the cheap handle other
//! components use to publish.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use spine_metrics::{Counter, Gauge, MetricsCollector};
use spine_protocol::{
    encode_frame, encoded_len, ControlAckBody, Frame, HeartbeatBody, ACK_BAD_REQUEST, ACK_OK,
    ACK_UNAUTHORIZED,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{writer_loop, ClientConn, EnqueueOutcome};
use crate::control::{parse_control_line, peek_op, ControlRequest};
use crate::subscription::Subscription;
use crate::{PublishSink, PublisherError};

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Bind address, e.g. "0.0.0.0"
    pub address: String,
    /// Listen port; 0 picks an ephemeral port (tests)
    pub port: u16,
    /// Shared secret for the `auth` op
    pub auth_token: String,
    /// Per-client outbound queue capacity
    pub client_queue_capacity: usize,
    /// Heartbeat cadence
    pub heartbeat_interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 9100,
            auth_token: "devtoken".into(),
            client_queue_capacity: 10_000,
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

struct Counters {
    frames_published: Arc<Counter>,
    frames_sent: Arc<Counter>,
    dropped_queue_full: Arc<Counter>,
    dropped_backpressure: Arc<Counter>,
    auth_failures: Arc<Counter>,
    subscriptions: Arc<Counter>,
    connections: Arc<Counter>,
    active_clients: Arc<Gauge>,
}

impl Counters {
    fn new(metrics: &MetricsCollector) -> Self {
        Self {
            frames_published: metrics.counter("publisher_frames_published_total"),
            frames_sent: metrics.counter("publisher_frames_sent_total"),
            dropped_queue_full: metrics.counter("publisher_frames_dropped_queue_full"),
            dropped_backpressure: metrics.counter("publisher_frames_dropped_backpressure"),
            auth_failures: metrics.counter("publisher_auth_failures_total"),
            subscriptions: metrics.counter("publisher_subscriptions_total"),
            connections: metrics.counter("publisher_connections_total"),
            active_clients: metrics.gauge("publisher_active_clients"),
        }
    }
}

struct Shared {
    config: PublisherConfig,
    clients: Mutex<Vec<Arc<ClientConn>>>,
    virtual_prefixes: Mutex<HashSet<String>>,
    counters: Counters,
    next_client_id: AtomicU64,
}

impl Shared {
    fn remove_client(&self, id: u64) {
        let mut clients = self.clients.lock();
        clients.retain(|c| c.id != id);
        self.counters.active_clients.set(clients.len() as f64);
    }
}

/// Cheap publishing handle; clone freely
#[derive(Clone)]
pub struct Publisher {
    shared: Arc<Shared>,
}

impl Publisher {
    /// Remote addresses of currently connected clients
    pub fn active_clients(&self) -> Vec<String> {
        self.shared
            .clients
            .lock()
            .iter()
            .map(|c| c.addr.to_string())
            .collect()
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.lock().len()
    }
}

impl PublishSink for Publisher {
    fn publish(&self, topic: &str, frame: &Frame) -> usize {
        let shared = &self.shared;
        shared.counters.frames_published.inc();

        let snapshot: Vec<Arc<ClientConn>> = shared.clients.lock().clone();
        if snapshot.is_empty() {
            return 0;
        }

        // Encode once; every matching client gets a cheap Bytes clone
        let mut buf = BytesMut::with_capacity(encoded_len(frame));
        encode_frame(frame, &mut buf);
        let bytes = buf.freeze();

        let mut enqueued = 0;
        for client in &snapshot {
            if !client.is_authenticated() || client.is_closed() {
                continue;
            }
            if !client.matches(topic) {
                continue;
            }
            match client.enqueue(bytes.clone()) {
                EnqueueOutcome::Enqueued => enqueued += 1,
                EnqueueOutcome::Dropped { lossless: true } => {
                    shared.counters.dropped_backpressure.inc();
                }
                EnqueueOutcome::Dropped { lossless: false } => {
                    shared.counters.dropped_queue_full.inc();
                }
                EnqueueOutcome::Closed => {}
            }
        }
        enqueued
    }

    fn register_virtual_prefix(&self, prefix: &str) {
        self.shared
            .virtual_prefixes
            .lock()
            .insert(prefix.to_owned());
        tracing::info!(prefix, "virtual topic prefix registered");
    }

    fn unregister_virtual_prefix(&self, prefix: &str) {
        self.shared.virtual_prefixes.lock().remove(prefix);
        tracing::debug!(prefix, "virtual topic prefix unregistered");
    }
}

/// Running server: accept loop + heartbeat task
pub struct ServerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Stop accepting, close every client, join the server tasks
    pub async fn stop(self) {
        self.token.cancel();
        for client in self.shared.clients.lock().iter() {
            client.close();
        }
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!("publisher stopped");
    }
}

/// The pub/sub server before it is spawned
pub struct PublisherServer {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl PublisherServer {
    /// Bind the listener and build the shared state
    pub async fn bind(
        config: PublisherConfig,
        metrics: &MetricsCollector,
    ) -> Result<Self, PublisherError> {
        let addr = format!("{}:{}", config.address, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| PublisherError::Listen { addr, source })?;

        let shared = Arc::new(Shared {
            counters: Counters::new(metrics),
            config,
            clients: Mutex::new(Vec::new()),
            virtual_prefixes: Mutex::new(HashSet::new()),
            next_client_id: AtomicU64::new(1),
        });

        Ok(Self { listener, shared })
    }

    /// Actual bound address (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, PublisherError> {
        self.listener
            .local_addr()
            .map_err(PublisherError::ClientIo)
    }

    /// Publishing handle, valid after `spawn` consumes the server
    pub fn handle(&self) -> Publisher {
        Publisher {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Spawn the accept loop and the heartbeat task
    pub fn spawn(self) -> ServerHandle {
        let token = CancellationToken::new();
        let shared = Arc::clone(&self.shared);

        let accept_task = {
            let shared = Arc::clone(&shared);
            let token = token.clone();
            let listener = self.listener;
            tokio::spawn(async move {
                match listener.local_addr() {
                    Ok(addr) => tracing::info!(%addr, "publisher listening"),
                    Err(_) => tracing::info!("publisher listening"),
                }
                loop {
                    tokio::select! {
                        accepted = listener.accept() => match accepted {
                            Ok((stream, addr)) => {
                                let shared = Arc::clone(&shared);
                                tokio::spawn(async move {
                                    handle_connection(stream, addr, shared).await;
                                });
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "accept failed");
                            }
                        },
                        _ = token.cancelled() => break,
                    }
                }
            })
        };

        let heartbeat_task = {
            let shared = Arc::clone(&shared);
            let token = token.clone();
            tokio::spawn(async move {
                heartbeat_loop(shared, token).await;
            })
        };

        ServerHandle {
            token,
            tasks: vec![accept_task, heartbeat_task],
            shared,
        }
    }
}

/// Encode a single-frame message for enqueueing
fn encode_bytes(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(frame));
    encode_frame(frame, &mut buf);
    buf.freeze()
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Once per second: reap closed clients, push a heartbeat to the rest
async fn heartbeat_loop(shared: Arc<Shared>, token: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = token.cancelled() => break,
        }

        let snapshot: Vec<Arc<ClientConn>> = {
            let mut clients = shared.clients.lock();
            clients.retain(|c| !c.is_closed());
            shared.counters.active_clients.set(clients.len() as f64);
            clients.clone()
        };

        if snapshot.is_empty() {
            continue;
        }

        let heartbeat = encode_bytes(&Frame::from(HeartbeatBody { ts_ns: now_ns() }));
        for client in snapshot {
            if client.is_authenticated() {
                match client.enqueue(heartbeat.clone()) {
                    EnqueueOutcome::Dropped { lossless: true } => {
                        shared.counters.dropped_backpressure.inc();
                    }
                    EnqueueOutcome::Dropped { lossless: false } => {
                        shared.counters.dropped_queue_full.inc();
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Reader side of one connection: control protocol + state machine
async fn handle_connection(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared>) {
    let id = shared.next_client_id.fetch_add(1, Ordering::Relaxed);
    shared.counters.connections.inc();

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(client = id, error = %e, "set_nodelay failed");
    }

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(shared.config.client_queue_capacity);
    let conn = ClientConn::new(id, addr, outbound_tx);

    {
        let mut clients = shared.clients.lock();
        clients.push(Arc::clone(&conn));
        shared.counters.active_clients.set(clients.len() as f64);
    }
    tracing::info!(client = id, %addr, "client connected");

    let writer = tokio::spawn(writer_loop(
        Arc::clone(&conn),
        outbound_rx,
        write_half,
        Arc::clone(&shared.counters.frames_sent),
    ));

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_line(&mut line) => read,
            _ = conn.token.cancelled() => break,
        };

        match read {
            Ok(0) => break, // EOF
            Ok(_) => {
                if !process_control_line(&line, &conn, &shared) {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(client = id, error = %e, "read failed");
                break;
            }
        }
    }

    conn.close();
    let _ = writer.await;
    shared.remove_client(id);
    tracing::info!(
        client = id,
        %addr,
        sent = conn.frames_sent.load(Ordering::Relaxed),
        dropped = conn.frames_dropped.load(Ordering::Relaxed),
        "client disconnected"
    );
}

/// Apply one control line; returns false when the connection must close
fn process_control_line(line: &str, conn: &Arc<ClientConn>, shared: &Arc<Shared>) -> bool {
    if line.trim().is_empty() {
        return true;
    }

    // UNAUTH accepts only the auth op; anything else recognizable is
    // answered 401 even when its fields would not parse
    if !conn.is_authenticated() {
        if let Some(op) = peek_op(line) {
            if op != "auth" {
                send_ack(conn, ACK_UNAUTHORIZED);
                return true;
            }
        }
    }

    let request = match parse_control_line(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(client = conn.id, error = %e, "bad control message");
            send_ack(conn, ACK_BAD_REQUEST);
            return true;
        }
    };

    match request {
        ControlRequest::Auth { token } => {
            if conn.is_authenticated() {
                // Re-auth is not an accepted op in AUTH
                send_ack(conn, ACK_BAD_REQUEST);
                return true;
            }
            if token == shared.config.auth_token {
                // Ack goes on the queue before the auth flag flips so it
                // always precedes the first heartbeat or data frame
                send_ack(conn, ACK_OK);
                conn.set_authenticated();
                tracing::info!(client = conn.id, addr = %conn.addr, "client authenticated");
                true
            } else {
                shared.counters.auth_failures.inc();
                send_ack(conn, ACK_UNAUTHORIZED);
                tracing::warn!(client = conn.id, addr = %conn.addr, "authentication failed");
                false
            }
        }
        ControlRequest::Subscribe { topics, lossless } => {
            let mut compiled = Vec::with_capacity(topics.len());
            for pattern in &topics {
                match Subscription::new(pattern, lossless) {
                    Ok(sub) => compiled.push(sub),
                    Err(e) => {
                        tracing::debug!(client = conn.id, pattern = %pattern, error = %e, "unusable pattern");
                        send_ack(conn, ACK_BAD_REQUEST);
                        return true;
                    }
                }
            }

            shared.counters.subscriptions.add(compiled.len() as u64);
            tracing::info!(
                client = conn.id,
                topics = ?topics,
                lossless,
                "client subscribed"
            );
            conn.add_subscriptions(compiled);
            send_ack(conn, ACK_OK);
            true
        }
        ControlRequest::Unsubscribe { topics } => {
            let removed = conn.remove_subscriptions(&topics);
            tracing::info!(client = conn.id, topics = ?topics, removed, "client unsubscribed");
            send_ack(conn, ACK_OK);
            true
        }
    }
}

fn send_ack(conn: &Arc<ClientConn>, code: u32) {
    // Acks bypass the authenticated/matching checks but share the queue,
    // preserving ordering with data frames
    let bytes = encode_bytes(&Frame::from(ControlAckBody::new(code)));
    let _ = conn.enqueue(bytes);
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
