//! Non-blocking framed TCP transport
//!
//! One `Transport` owns one session's socket. The tick loop only ever touches
//! two queues and a lifecycle value:
//! - `send` appends to the outbound queue and never blocks
//! - `poll_inbound` drains whatever the receive worker has decoded so far
//! - `state` reads the current `ConnectionState`
//!
//! Behind it a small dedicated runtime runs the connection attempt and then
//! exactly two workers: the send worker (which is the connect/accept task
//! continuing after establishment) and the receive worker. Workers stop as
//! soon as the lifecycle reaches a terminal state, whoever caused it.

use crate::config::NetConfig;
use crate::error::TransportError;
use crate::framing::{encode_batch, FrameDecoder};
use crate::protocol::Message;
use log::{debug, error, info, warn};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    fn can_become(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed | Failed, _) => false,
            (New, Connecting) | (Connecting, Connected) => true,
            (_, Closed | Failed) => true,
            _ => false,
        }
    }
}

/// Lifecycle value published by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub state: ConnectionState,
    pub peer: Option<SocketAddr>,
}

/// Shared handle onto a connection's lifecycle
///
/// Transitions are monotonic: once `Closed` or `Failed` is reached every
/// further transition is refused, so concurrent failures on both workers
/// still produce a single terminal transition.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<Link>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Link {
            state: ConnectionState::New,
            peer: None,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ConnectionState {
        self.tx.borrow().state
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.tx.borrow().peer
    }

    pub fn subscribe(&self) -> watch::Receiver<Link> {
        self.tx.subscribe()
    }

    /// Applies `next` if allowed; returns whether the state changed
    pub fn transition(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|link| {
            if !link.state.can_become(next) {
                return false;
            }
            info!("Connection {:?} -> {:?}", link.state, next);
            link.state = next;
            true
        })
    }

    /// Marks the session connected to `peer`
    pub fn connected(&self, peer: SocketAddr) -> bool {
        self.tx.send_if_modified(|link| {
            if !link.state.can_become(ConnectionState::Connected) {
                return false;
            }
            info!("Connection {:?} -> Connected ({})", link.state, peer);
            link.state = ConnectionState::Connected;
            link.peer = Some(peer);
            true
        })
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the watched lifecycle is terminal
async fn terminated(watch: &mut watch::Receiver<Link>) {
    loop {
        if watch.borrow_and_update().state.is_terminal() {
            return;
        }
        if watch.changed().await.is_err() {
            return;
        }
    }
}

/// Running totals kept by the workers
#[derive(Debug, Default)]
struct Counters {
    writes: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    records_discarded: AtomicU64,
}

/// Point-in-time copy of a connection's traffic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportStats {
    /// Socket writes issued by the send worker, one per batch
    pub writes: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Malformed records plus protocol violations
    pub records_discarded: u64,
}

/// Worker-side ends of the two queues
struct Pipes {
    outbound: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<Message>,
    counters: Arc<Counters>,
}

/// Framed, non-blocking message pipe to a single peer
pub struct Transport {
    role: Role,
    lifecycle: Lifecycle,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Message>,
    listen_addr: Option<SocketAddr>,
    counters: Arc<Counters>,
    runtime: Option<Runtime>,
}

impl Transport {
    /// Opens a session in the background
    ///
    /// The host binds `address` (default `0.0.0.0:<port>`) and accepts exactly
    /// one peer. The client connects to `address`, which is required. Only
    /// local setup problems are returned as errors; the outcome of the
    /// connection attempt is reported through `state()`.
    pub fn open(
        role: Role,
        address: Option<SocketAddr>,
        config: &NetConfig,
    ) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("net-io")
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;

        let lifecycle = Lifecycle::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let pipes = Pipes {
            outbound: outbound_rx,
            inbound: inbound_tx,
            counters: counters.clone(),
        };

        let listen_addr = match role {
            Role::Host => {
                let addr = address
                    .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)));
                let listener = {
                    let _guard = runtime.enter();
                    bind_listener(addr).map_err(|source| TransportError::Bind { addr, source })?
                };
                let bound = listener.local_addr().unwrap_or(addr);
                info!("Waiting for a peer on {}", bound);

                lifecycle.transition(ConnectionState::Connecting);
                runtime.spawn(accept_peer(
                    listener,
                    lifecycle.clone(),
                    pipes,
                    config.clone(),
                ));
                Some(bound)
            }
            Role::Client => {
                let peer = address
                    .ok_or_else(|| TransportError::InvalidAddress("<none>".to_string()))?;
                info!("Connecting to {}", peer);

                lifecycle.transition(ConnectionState::Connecting);
                runtime.spawn(connect_peer(peer, lifecycle.clone(), pipes, config.clone()));
                None
            }
        };

        Ok(Self {
            role,
            lifecycle,
            outbound: outbound_tx,
            inbound: inbound_rx,
            listen_addr,
            counters,
            runtime: Some(runtime),
        })
    }

    /// Host convenience: listen on `bind`
    pub fn host(bind: SocketAddr, config: &NetConfig) -> Result<Self, TransportError> {
        Self::open(Role::Host, Some(bind), config)
    }

    /// Client convenience: parse `address` and connect to it
    pub fn connect(address: &str, config: &NetConfig) -> Result<Self, TransportError> {
        let peer = address
            .parse::<SocketAddr>()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;
        Self::open(Role::Client, Some(peer), config)
    }

    /// Queues a message for the send worker; never blocks
    ///
    /// Messages queued before the connection is up are flushed once it is.
    /// After the session ended they are dropped.
    pub fn send(&self, message: Message) {
        if self.lifecycle.state().is_terminal() {
            debug!("Dropping {} on a closed connection", message.kind());
            return;
        }
        if let Err(e) = self.outbound.send(message) {
            debug!("Dropping {}: send worker gone", e.0.kind());
        }
    }

    /// Drains every message received so far, in arrival order
    pub fn poll_inbound(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.peer()
    }

    /// Address the host is listening on (resolves port 0)
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            records_discarded: self.counters.records_discarded.load(Ordering::Relaxed),
        }
    }

    /// Ends the session; safe to call repeatedly
    pub fn close(&self) {
        if self.lifecycle.transition(ConnectionState::Closed) {
            info!("Connection closed locally");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    // Accepted sockets inherit SO_KEEPALIVE from the listener
    socket.set_keepalive(true)?;
    socket.bind(addr)?;
    socket.listen(1)
}

async fn open_stream(peer: SocketAddr) -> std::io::Result<TcpStream> {
    let socket = if peer.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;
    socket.connect(peer).await
}

async fn accept_peer(listener: TcpListener, lifecycle: Lifecycle, pipes: Pipes, config: NetConfig) {
    let mut watch = lifecycle.subscribe();

    let accepted = tokio::select! {
        accepted = listener.accept() => accepted,
        _ = terminated(&mut watch) => {
            debug!("Stopped waiting for a peer");
            return;
        }
    };
    // Single peer per session
    drop(listener);

    match accepted {
        Ok((stream, peer)) => run_session(stream, peer, lifecycle, pipes, &config).await,
        Err(e) => {
            error!("Failed to accept peer: {}", e);
            lifecycle.transition(ConnectionState::Failed);
        }
    }
}

async fn connect_peer(peer: SocketAddr, lifecycle: Lifecycle, pipes: Pipes, config: NetConfig) {
    let mut watch = lifecycle.subscribe();

    let attempt = tokio::time::timeout(config.connect_timeout, open_stream(peer));
    let result = tokio::select! {
        result = attempt => result,
        _ = terminated(&mut watch) => {
            debug!("Connection attempt to {} cancelled", peer);
            return;
        }
    };

    match result {
        Ok(Ok(stream)) => run_session(stream, peer, lifecycle, pipes, &config).await,
        Ok(Err(e)) => {
            warn!("Connection to {} failed: {}", peer, e);
            lifecycle.transition(ConnectionState::Failed);
        }
        Err(_) => {
            warn!(
                "Connection to {} timed out after {:?}",
                peer, config.connect_timeout
            );
            lifecycle.transition(ConnectionState::Failed);
        }
    }
}

/// Starts the receive worker and becomes the send worker
async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    lifecycle: Lifecycle,
    pipes: Pipes,
    config: &NetConfig,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to disable Nagle on {}: {}", peer, e);
    }

    let (reader, writer) = stream.into_split();
    if !lifecycle.connected(peer) {
        debug!("Session ended before {} was connected", peer);
        return;
    }

    tokio::spawn(receive_loop(
        reader,
        pipes.inbound,
        pipes.counters.clone(),
        lifecycle.clone(),
        config.read_buffer,
    ));
    send_loop(
        writer,
        pipes.outbound,
        pipes.counters,
        lifecycle,
        config.batch_size,
    )
    .await;
}

/// Moves `first` plus up to `batch_size - 1` already-queued messages into `batch`
fn fill_batch(
    first: Message,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    batch_size: usize,
    batch: &mut Vec<Message>,
) {
    batch.push(first);
    while batch.len() < batch_size.max(1) {
        match outbound.try_recv() {
            Ok(message) => batch.push(message),
            Err(_) => break,
        }
    }
}

async fn send_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    counters: Arc<Counters>,
    lifecycle: Lifecycle,
    batch_size: usize,
) {
    let mut watch = lifecycle.subscribe();
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        let first = tokio::select! {
            message = outbound.recv() => message,
            _ = terminated(&mut watch) => None,
        };
        let first = match first {
            Some(message) => message,
            None => break,
        };

        fill_batch(first, &mut outbound, batch_size, &mut batch);
        let bytes = encode_batch(&batch);
        let count = batch.len() as u64;
        debug!("Writing {} messages ({} bytes)", count, bytes.len());
        batch.clear();

        let written = tokio::select! {
            result = writer.write_all(&bytes) => result,
            _ = terminated(&mut watch) => break,
        };
        if let Err(e) = written {
            warn!("Send failed: {}", e);
            lifecycle.transition(ConnectionState::Closed);
            break;
        }
        counters.writes.fetch_add(1, Ordering::Relaxed);
        counters.messages_sent.fetch_add(count, Ordering::Relaxed);
    }

    outbound.close();
    let mut discarded = 0;
    while outbound.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!("Discarded {} queued outbound messages", discarded);
    }

    let _ = writer.shutdown().await;
}

async fn receive_loop(
    mut reader: OwnedReadHalf,
    inbound: mpsc::UnboundedSender<Message>,
    counters: Arc<Counters>,
    lifecycle: Lifecycle,
    buffer_size: usize,
) {
    let mut watch = lifecycle.subscribe();
    let mut decoder = FrameDecoder::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];

    'receive: loop {
        let read = tokio::select! {
            read = reader.read(&mut buffer) => read,
            _ = terminated(&mut watch) => break,
        };

        match read {
            Ok(0) => {
                info!("Peer closed the connection");
                lifecycle.transition(ConnectionState::Closed);
                break;
            }
            Ok(len) => {
                let discarded_before = decoder.discarded();
                let messages = decoder.feed(&buffer[..len]);
                counters
                    .records_discarded
                    .fetch_add(decoder.discarded() - discarded_before, Ordering::Relaxed);
                for message in messages {
                    counters.messages_received.fetch_add(1, Ordering::Relaxed);
                    if inbound.send(message).is_err() {
                        debug!("Inbound queue dropped, stopping receive worker");
                        lifecycle.transition(ConnectionState::Closed);
                        break 'receive;
                    }
                }
            }
            Err(e) => {
                warn!("Receive failed: {}", e);
                lifecycle.transition(ConnectionState::Closed);
                break;
            }
        }
    }

    if decoder.discarded() > 0 {
        info!(
            "Receive worker discarded {} malformed and {} invalid records",
            decoder.malformed(),
            decoder.violations()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ConnectionState::New);
        assert!(lifecycle.transition(ConnectionState::Connecting));
        assert!(lifecycle.connected("127.0.0.1:9999".parse().unwrap()));
        assert_eq!(lifecycle.state(), ConnectionState::Connected);
        assert_eq!(lifecycle.peer(), Some("127.0.0.1:9999".parse().unwrap()));
    }

    #[test]
    fn test_terminal_transition_happens_once() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(ConnectionState::Connecting);
        assert!(lifecycle.transition(ConnectionState::Closed));
        assert!(!lifecycle.transition(ConnectionState::Closed));
        assert!(!lifecycle.transition(ConnectionState::Failed));
        assert!(!lifecycle.transition(ConnectionState::Connected));
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_lifecycle_rejects_backwards_moves() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.transition(ConnectionState::Connected));
        lifecycle.transition(ConnectionState::Connecting);
        lifecycle.transition(ConnectionState::Connected);
        assert!(!lifecycle.transition(ConnectionState::Connecting));
        assert!(!lifecycle.transition(ConnectionState::New));
    }

    #[test]
    fn test_terminated_wakes_on_close() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(ConnectionState::Connecting);
        let mut watch = lifecycle.subscribe();

        let mut wait = tokio_test::task::spawn(terminated(&mut watch));
        tokio_test::assert_pending!(wait.poll());

        lifecycle.transition(ConnectionState::Closed);
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }

    #[test]
    fn test_terminated_resolves_when_already_failed() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(ConnectionState::Failed);
        let mut watch = lifecycle.subscribe();
        tokio_test::block_on(terminated(&mut watch));
    }

    #[test]
    fn test_fill_batch_caps_at_batch_size() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..12 {
            tx.send(Message::Explosion {
                x: i as f32,
                y: 0.0,
            })
            .unwrap();
        }

        let mut sizes = Vec::new();
        let mut order = Vec::new();
        let mut batch = Vec::new();
        while let Ok(first) = rx.try_recv() {
            fill_batch(first, &mut rx, 5, &mut batch);
            sizes.push(batch.len());
            for message in batch.drain(..) {
                if let Message::Explosion { x, .. } = message {
                    order.push(x as u32);
                }
            }
        }

        assert_eq!(sizes, vec![5, 5, 2]);
        assert_eq!(order, (0..12).collect::<Vec<u32>>());
    }

    #[test]
    fn test_client_requires_address() {
        let result = Transport::open(Role::Client, None, &NetConfig::default());
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[test]
    fn test_connect_rejects_unparseable_address() {
        let result = Transport::connect("not-an-address", &NetConfig::default());
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[test]
    fn test_host_waits_in_connecting_and_closes_cleanly() {
        let host = Transport::host(loopback(), &NetConfig::default()).unwrap();
        assert_eq!(host.state(), ConnectionState::Connecting);
        assert!(host.listen_addr().is_some());

        host.close();
        host.close();
        assert_eq!(host.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_refused_connection_fails() {
        // Grab a free port and release it so nothing is listening there
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let config = NetConfig {
            connect_timeout: Duration::from_secs(2),
            ..NetConfig::default()
        };
        let client = Transport::connect(&format!("127.0.0.1:{}", port), &config).unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            client.state() == ConnectionState::Failed
        }));
    }

    #[test]
    fn test_connect_timeout_fails() {
        // Never accepted from: once the backlog is full further SYNs go unanswered
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut held = Vec::new();
        let backlog_full = (0..1024).any(|_| {
            match std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(100)) {
                Ok(stream) => {
                    held.push(stream);
                    false
                }
                Err(_) => true,
            }
        });
        assert!(backlog_full);

        let config = NetConfig {
            connect_timeout: Duration::from_millis(200),
            ..NetConfig::default()
        };
        let started = Instant::now();
        let client = Transport::connect(&addr.to_string(), &config).unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            client.state() == ConnectionState::Failed
        }));
        assert!(started.elapsed() >= config.connect_timeout);
    }

    #[test]
    fn test_loopback_exchange() {
        let config = NetConfig::default();
        let mut host = Transport::host(loopback(), &config).unwrap();
        let addr = host.listen_addr().unwrap();
        let mut client = Transport::open(Role::Client, Some(addr), &config).unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            host.state() == ConnectionState::Connected
                && client.state() == ConnectionState::Connected
        }));
        assert!(host.peer_addr().is_some());

        client.send(Message::PlayerJoin {
            player_id: 1,
            name: "Bob".to_string(),
        });

        let mut received = Vec::new();
        assert!(wait_until(Duration::from_secs(5), || {
            received.extend(host.poll_inbound());
            !received.is_empty()
        }));
        assert_eq!(
            received,
            vec![Message::PlayerJoin {
                player_id: 1,
                name: "Bob".to_string()
            }]
        );

        host.close();
        assert!(wait_until(Duration::from_secs(5), || {
            client.state() == ConnectionState::Closed
        }));
        assert!(client.poll_inbound().is_empty());
    }
}
