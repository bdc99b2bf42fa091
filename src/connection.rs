use crate::config::ClientConfig;
use crate::error::{NadError, Result};
use crate::protocol::{self, ReplyLine, Request, REQUEST_TERMINATOR, STATUS_ALL_REQUEST};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};

/// Default telnet port of NAD amplifiers
pub const DEFAULT_PORT: u16 = 23;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const BULK_IDLE_TIMEOUT: Duration = Duration::from_millis(250);

const READ_CHUNK: usize = 512;

/// Request/reply transport to an amplifier
///
/// Implementations must serialize calls: the device protocol is half-duplex and
/// a reply can only be paired with the single request in flight.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the raw value of its paired reply
    async fn send(&self, request: &Request) -> Result<String>;

    /// Like `send`, but bounded by the shorter discovery-style timeout
    async fn probe(&self, request: &Request) -> Result<String> {
        self.send(request).await
    }

    /// Fetch the flat table of every setting the device reports
    async fn status_all(&self) -> Result<BTreeMap<String, String>>;
}

/// Open socket plus the bytes read but not yet consumed as lines
struct Session {
    stream: TcpStream,
    pending: Vec<u8>,
}

impl Session {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the next non-empty line, giving up at `deadline`.
    ///
    /// Only uses cancel-safe reads, so a timeout never loses buffered bytes.
    async fn next_line(&mut self, deadline: Instant) -> Result<String> {
        loop {
            while let Some(pos) = self.pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
                let raw: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw[..pos]).trim().to_string();
                if !line.is_empty() {
                    return Ok(line);
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            match timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Err(_) => return Err(NadError::Timeout),
                Ok(Ok(0)) => return Err(NadError::ConnectionClosed),
                Ok(Ok(n)) => self.pending.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Persistent telnet-style connection to one amplifier
///
/// The socket is opened on first use and reopened after any timeout or I/O
/// failure, so a late reply to an abandoned request can never be paired with
/// a later one.
pub struct Connection {
    host: String,
    port: u16,
    request_timeout: Duration,
    probe_timeout: Duration,
    bulk_idle: Duration,
    session: Mutex<Option<Session>>,
}

impl Connection {
    /// Create a connection that opens its socket lazily
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            request_timeout: REQUEST_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
            bulk_idle: BULK_IDLE_TIMEOUT,
            session: Mutex::new(None),
        }
    }

    /// Create a connection using the timeouts from `config`
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.host.clone(), config.port)
            .with_request_timeout(config.request_timeout())
            .with_probe_timeout(config.probe_timeout())
            .with_bulk_idle(config.bulk_idle())
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Quiet gap that ends a bulk status dump
    pub fn with_bulk_idle(mut self, bulk_idle: Duration) -> Self {
        self.bulk_idle = bulk_idle;
        self
    }

    /// Connect immediately instead of on first request
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        let connection = Self::new(host, port);
        connection.ensure_open().await?;
        Ok(connection)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether a socket is currently open
    pub async fn is_open(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Open the socket if it is not open yet
    pub async fn ensure_open(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        if slot.is_none() {
            *slot = Some(self.open(self.request_timeout).await?);
        }
        Ok(())
    }

    /// Drop the socket; the next request reconnects
    pub async fn close(&self) {
        if self.session.lock().await.take().is_some() {
            tracing::info!("Closed connection to {}:{}", self.host, self.port);
        }
    }

    async fn open(&self, bound: Duration) -> Result<Session> {
        tracing::info!("Connecting to {}:{}", self.host, self.port);
        let stream = match timeout(bound, TcpStream::connect((self.host.as_str(), self.port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!("Failed to connect to {}:{}: {}", self.host, self.port, e);
                return Err(NadError::Connection(e));
            }
            Err(_) => {
                tracing::warn!("Timed out connecting to {}:{}", self.host, self.port);
                return Err(NadError::Timeout);
            }
        };
        stream.set_nodelay(true)?;
        Ok(Session {
            stream,
            pending: Vec::new(),
        })
    }

    /// Take the open session, opening one if needed
    async fn session<'a>(&self, slot: &'a mut Option<Session>, bound: Duration) -> Result<&'a mut Session> {
        if slot.is_none() {
            *slot = Some(self.open(bound).await?);
        }
        slot.as_mut().ok_or(NadError::ConnectionClosed)
    }

    /// Run one request/reply exchange while holding the session lock
    async fn exchange(&self, request: &Request, bound: Duration) -> Result<String> {
        let line = request.encode()?;
        let mut slot = self.session.lock().await;
        let result = self.round_trip(&mut slot, request, &line, bound).await;
        discard_on_fault(&mut slot, &result);
        result
    }

    async fn round_trip(
        &self,
        slot: &mut Option<Session>,
        request: &Request,
        line: &str,
        bound: Duration,
    ) -> Result<String> {
        let session = self.session(slot, bound).await?;

        tracing::debug!("Sending: {}", line.trim_end_matches(REQUEST_TERMINATOR));
        session.write_line(line).await?;

        let deadline = Instant::now() + bound;
        loop {
            let reply = session.next_line(deadline).await?;
            tracing::debug!("Received: {}", reply);
            match protocol::pair_reply(request, &reply) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => tracing::debug!("Skipping unsolicited line: {}", reply),
                // banners and line noise are not replies
                Err(NadError::Protocol(e)) => tracing::debug!("Skipping line: {}", e),
                Err(e) => return Err(e),
            }
        }
    }

    async fn dump_status(&self) -> Result<BTreeMap<String, String>> {
        let mut slot = self.session.lock().await;
        let result = self.read_status_table(&mut slot).await;
        discard_on_fault(&mut slot, &result);
        result
    }

    async fn read_status_table(&self, slot: &mut Option<Session>) -> Result<BTreeMap<String, String>> {
        let session = self.session(slot, self.request_timeout).await?;

        tracing::debug!("Sending: {}", STATUS_ALL_REQUEST);
        session
            .write_line(&format!("{}{}", STATUS_ALL_REQUEST, REQUEST_TERMINATOR))
            .await?;

        let mut table = BTreeMap::new();
        let mut deadline = Instant::now() + self.request_timeout;
        loop {
            let line = match session.next_line(deadline).await {
                Ok(line) => line,
                // a quiet gap after at least one line ends the dump
                Err(NadError::Timeout) if !table.is_empty() => break,
                Err(e) => return Err(e),
            };
            match ReplyLine::parse(&line) {
                Ok(reply) => {
                    table.insert(protocol::normalize_key(&reply.key), reply.value);
                }
                Err(e) => tracing::warn!("Ignoring status line: {}", e),
            }
            deadline = Instant::now() + self.bulk_idle;
        }
        tracing::debug!("Status table has {} entries", table.len());
        Ok(table)
    }
}

/// Drop the socket after failures that leave the stream out of step
fn discard_on_fault<T>(slot: &mut Option<Session>, result: &Result<T>) {
    if let Err(e) = result {
        if e.is_connection_fault() && slot.take().is_some() {
            tracing::debug!("Discarding connection after error: {}", e);
        }
    }
}

#[async_trait]
impl Transport for Connection {
    async fn send(&self, request: &Request) -> Result<String> {
        self.exchange(request, self.request_timeout).await
    }

    async fn probe(&self, request: &Request) -> Result<String> {
        self.exchange(request, self.probe_timeout).await
    }

    async fn status_all(&self) -> Result<BTreeMap<String, String>> {
        let table = self.dump_status().await?;
        if table.is_empty() {
            return Err(NadError::NoData);
        }
        Ok(table)
    }
}
