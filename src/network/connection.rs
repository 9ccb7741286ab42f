//! A single socket to a single broker endpoint.
//!
//! `open()` resolves once the transport is up and a background reader task
//! is already forwarding frames into the shared `CallbackQueue`. Callers
//! that need an "on connected, do X" hook (the `ApiVersionNegotiator`)
//! simply call it after `open()` returns.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio_util::codec::Framed;

use crate::config::ClientConfig;
use crate::errors::{Error, Result};
use crate::network::callback_queue::CallbackQueue;
use crate::network::frame::{Frame, KafkaFrameCodec};
use crate::protocol::ApiVersionMap;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// `{host, port}` with the derived `"host:port"` pool key.
/// IPv6 hosts are stored unwrapped; `addr()` re-brackets them for
/// `ToSocketAddrs`/display purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        BrokerEndpoint { host: host.into(), port }
    }

    /// The pool key: `host:port`, with IPv6 hosts bracketed.
    pub fn key(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn socket_addr_string(&self) -> String {
        self.key()
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Lifecycle events emitted upward by a single connection.
#[derive(Debug, Clone)]
pub enum ConnEvent {
    Connected,
    Ready,
    Reconnect,
    Error(String),
    Close,
    SocketError(String),
}

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type FramedStream = Framed<Box<dyn AsyncStream>, KafkaFrameCodec>;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// A live (or draining) socket to one broker, plus the state needed to
/// decide whether it's usable: connected, ready, idle, closing.
pub struct BrokerConnection {
    pub endpoint: BrokerEndpoint,
    pub socket_id: u64,
    pub longpolling: bool,

    write_half: AsyncMutex<SplitSink<FramedStream, Bytes>>,
    callback_queue: CallbackQueue,

    connected: AtomicBool,
    closing: AtomicBool,
    waiting: AtomicBool,
    close_emitted: AtomicBool,
    sticky_error: parking_lot::Mutex<Option<String>>,
    api_support: parking_lot::Mutex<Option<ApiVersionMap>>,
    last_activity: parking_lot::Mutex<Instant>,
    idle_timeout: parking_lot::Mutex<Duration>,

    events: broadcast::Sender<ConnEvent>,
}

impl fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("endpoint", &self.endpoint)
            .field("socket_id", &self.socket_id)
            .field("longpolling", &self.longpolling)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl BrokerConnection {
    /// Opens a TCP (optionally TLS) connection to `endpoint` and starts the
    /// background reader task that feeds `callback_queue`. On success the
    /// connection is `isConnected()` but not yet `isReady()` — the caller
    /// (`ApiVersionNegotiator`) must still negotiate API versions.
    pub async fn open(
        endpoint: BrokerEndpoint,
        longpolling: bool,
        config: &ClientConfig,
        callback_queue: CallbackQueue,
    ) -> Result<Arc<BrokerConnection>> {
        let addr = resolve(&endpoint)?;

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))?
            .map_err(|e| Error::Connect { addr: endpoint.key(), source: e })?;

        configure_keepalive(&stream);

        let boxed: Box<dyn AsyncStream> = match &config.ssl_options {
            Some(ssl_options) => Box::new(upgrade_to_tls(stream, &endpoint, ssl_options, config.connect_timeout).await?),
            None => Box::new(stream),
        };
        let framed = Framed::new(boxed, KafkaFrameCodec);
        let (write_half, read_half) = framed.split();

        let socket_id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        let (events, _) = broadcast::channel(32);

        let conn = Arc::new(BrokerConnection {
            endpoint,
            socket_id,
            longpolling,
            write_half: AsyncMutex::new(write_half),
            callback_queue: callback_queue.clone(),
            connected: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
            close_emitted: AtomicBool::new(false),
            sticky_error: parking_lot::Mutex::new(None),
            api_support: parking_lot::Mutex::new(None),
            last_activity: parking_lot::Mutex::new(Instant::now()),
            idle_timeout: parking_lot::Mutex::new(config.idle_connection),
            events,
        });

        let _ = conn.events.send(ConnEvent::Connected);

        spawn_reader(conn.clone(), read_half, callback_queue);

        Ok(conn)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && self.sticky_error.lock().is_none()
    }

    pub fn is_ready(&self) -> bool {
        self.is_connected() && self.api_support.lock().is_some()
    }

    pub fn is_idle(&self) -> bool {
        let last = *self.last_activity.lock();
        last.elapsed() > *self.idle_timeout.lock()
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    pub fn set_waiting(&self, value: bool) {
        self.waiting.store(value, Ordering::Release);
    }

    pub fn api_support(&self) -> Option<ApiVersionMap> {
        self.api_support.lock().clone()
    }

    pub fn set_api_support(&self, versions: ApiVersionMap) {
        *self.api_support.lock() = Some(versions);
        let _ = self.events.send(ConnEvent::Ready);
    }

    /// Records `err` as the connection's sticky failure and notifies
    /// subscribers via `ConnEvent::Error`. Also emits `ConnEvent::SocketError`
    /// unless negotiation hasn't completed yet (`api_support` still unset),
    /// since a failure during the initial connect is already surfaced by
    /// the caller driving that connect.
    pub fn fail_connection(&self, err: Error) {
        let during_initial_connect = self.api_support.lock().is_none();
        *self.sticky_error.lock() = Some(err.to_string());
        let _ = self.events.send(ConnEvent::Error(err.to_string()));
        if !during_initial_connect {
            let _ = self.events.send(ConnEvent::SocketError(err.to_string()));
        }
    }

    /// Sends `ConnEvent::Close` exactly once per connection, regardless of
    /// how many of `close()`/the reader's disconnect path observe it dead.
    fn emit_close_once(&self) {
        if !self.close_emitted.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(ConnEvent::Close);
        }
    }

    /// Lowered to 5s by `ClientCore::close` so dead peers die fast.
    pub fn set_idle_timeout(&self, timeout: Duration) {
        *self.idle_timeout.lock() = timeout;
    }

    pub fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Queues a callback for `correlation_id`, writes `bytes`, and awaits
    /// the decoded response or timeout.
    pub async fn request<D>(
        &self,
        correlation_id: i32,
        timeout: Duration,
        decode: D,
        bytes: Bytes,
    ) -> Result<Bytes>
    where
        D: FnOnce(Bytes) -> Result<Bytes> + Send + 'static,
    {
        let receiver =
            self.callback_queue
                .queue(self.socket_id, correlation_id, self.longpolling, timeout, decode);

        if let Err(e) = self.write(bytes).await {
            self.callback_queue.unqueue(self.socket_id, correlation_id);
            return Err(e);
        }

        receiver
            .await
            .unwrap_or_else(|_| Err(Error::BrokerNotAvailable(self.endpoint.key())))
    }

    /// Enqueues a framed request; waits for the write to complete.
    pub async fn write(&self, bytes: Bytes) -> Result<()> {
        let mut sink = self.write_half.lock().await;
        sink.send(bytes).await?;
        *self.last_activity.lock() = Instant::now();
        Ok(())
    }

    /// Best-effort fire-and-forget write, used for `requireAcks = 0`.
    pub async fn write_async(&self, bytes: Bytes) {
        if let Ok(mut sink) = self.write_half.try_lock() {
            let _ = sink.send(bytes).await;
            *self.last_activity.lock() = Instant::now();
        }
    }

    /// Half-close then destroy.
    pub async fn close(&self) {
        self.mark_closing();
        if let Ok(mut sink) = self.write_half.try_lock() {
            let _ = sink.close().await;
        }
        self.connected.store(false, Ordering::Release);
        self.emit_close_once();
    }
}

fn resolve(endpoint: &BrokerEndpoint) -> Result<SocketAddr> {
    use std::net::ToSocketAddrs;

    (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|e| Error::Connect { addr: endpoint.key(), source: e })?
        .next()
        .ok_or_else(|| Error::Connect {
            addr: endpoint.key(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
        })
}

/// Upgrades a raw TCP stream to TLS using `config.ssl_options`. Boxed into
/// the same `dyn AsyncStream` as a plain connection, so the rest of
/// `open()` doesn't need to know which one it got.
#[cfg(feature = "tls")]
async fn upgrade_to_tls(
    stream: TcpStream,
    endpoint: &BrokerEndpoint,
    ssl_options: &crate::config::SslOptions,
    timeout: Duration,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let connector = crate::network::tls::build_connector(ssl_options)?;
    let server_name = rustls::pki_types::ServerName::try_from(endpoint.host.clone())
        .map_err(|e| Error::Tls(format!("invalid server name '{}': {e}", endpoint.host)))?;

    tokio::time::timeout(timeout, connector.connect(server_name, stream))
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(|e| Error::Tls(format!("TLS handshake with {endpoint} failed: {e}")))
}

#[cfg(not(feature = "tls"))]
async fn upgrade_to_tls(
    _stream: TcpStream,
    _endpoint: &BrokerEndpoint,
    _ssl_options: &crate::config::SslOptions,
    _timeout: Duration,
) -> Result<TcpStream> {
    Err(Error::Tls("this build was compiled without the `tls` feature".to_owned()))
}

fn configure_keepalive(stream: &TcpStream) {
    use socket2::{SockRef, TcpKeepalive};

    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_INTERVAL);
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        tracing::debug!(error = %e, "failed to configure tcp keepalive");
    }
}

fn spawn_reader(
    conn: Arc<BrokerConnection>,
    mut read_half: SplitStream<FramedStream>,
    callback_queue: CallbackQueue,
) {
    tokio::spawn(async move {
        loop {
            match read_half.next().await {
                Some(Ok(frame)) => {
                    *conn.last_activity.lock() = Instant::now();
                    callback_queue.resolve(conn.socket_id, frame);
                }
                Some(Err(e)) => {
                    tracing::warn!(endpoint = %conn.endpoint, error = %e, "connection read error");
                    conn.fail_connection(e);
                    break;
                }
                None => break,
            }
        }

        on_disconnect(&conn, &callback_queue);
    });
}

/// Tears down a connection once its reader loop ends: fails every pending
/// callback, marks the socket disconnected, and emits `Close` so that
/// `BrokerPool`'s supervisor can remove it from the pool and decide whether
/// to reconnect.
fn on_disconnect(conn: &BrokerConnection, callback_queue: &CallbackQueue) {
    let was_closing = conn.is_closing();
    conn.connected.store(false, Ordering::Release);

    let err = conn.sticky_error.lock().clone();
    if was_closing {
        callback_queue.fail(conn.socket_id, None);
    } else {
        let fail_err = err
            .clone()
            .map(|msg| Error::BrokerNotAvailable(msg))
            .unwrap_or_else(|| Error::BrokerNotAvailable(conn.endpoint.key()));
        callback_queue.fail(conn.socket_id, Some(fail_err));
    }

    conn.emit_close_once();
}
