//! Connection management and request/response correlation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{BusError, Result};
use crate::frame::{
    CALLBACK_ENUMERATE, EnumerateEvent, FUNCTION_ENUMERATE, FrameHeader, HEADER_LEN, encode_frame,
};

/// Fixed delay between reconnect attempts after the link drops.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// How long a request waits for its response before giving up.
const REQUEST_TIMEOUT: Duration = Duration::from_millis(2500);

/// Buffered events between the I/O task and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why a [`BusEvent::Connected`] event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReason {
    /// Connection established on explicit request.
    Request,
    /// Connection re-established by the client after the link dropped.
    AutoReconnect,
}

/// Asynchronous events delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A unit announcement, solicited by [`BusClient::enumerate`] or
    /// emitted spontaneously on hot-plug.
    Enumerate(EnumerateEvent),
    /// The connection to the daemon (re-)appeared.
    Connected(ConnectReason),
}

type PendingKey = (u32, u8, u8);

struct Response {
    error_code: u8,
    payload: Vec<u8>,
}

struct Shared {
    host: String,
    port: u16,
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: Mutex<HashMap<PendingKey, oneshot::Sender<Response>>>,
    sequence: AtomicU8,
}

impl Shared {
    /// Fail every in-flight request; their senders drop and the callers
    /// observe [`BusError::NotConnected`].
    async fn fail_pending(&self) {
        let dropped = self.pending.lock().await.drain().count();
        if dropped > 0 {
            debug!(dropped, "failed in-flight requests after link loss");
        }
    }
}

/// Handle to one brick daemon connection. Cheap to clone; all clones share
/// the underlying link.
#[derive(Clone)]
pub struct BusClient {
    shared: Arc<Shared>,
}

impl BusClient {
    /// Connect to a brick daemon.
    ///
    /// Returns the client handle and the stream of [`BusEvent`]s. The initial
    /// dial fails fast so callers can apply their own retry policy; once
    /// established, the link auto-reconnects forever.
    pub async fn connect(host: &str, port: u16) -> Result<(Self, mpsc::Receiver<BusEvent>)> {
        let stream = TcpStream::connect((host, port)).await?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            host: host.to_string(),
            port,
            writer: Mutex::new(Some(write_half)),
            pending: Mutex::new(HashMap::new()),
            sequence: AtomicU8::new(0),
        });

        tokio::spawn(io_task(shared.clone(), read_half, events_tx));

        Ok((Self { shared }, events_rx))
    }

    /// Ask the daemon to announce every attached unit.
    ///
    /// The announcements arrive as [`BusEvent::Enumerate`] events; the
    /// request itself has no response. Fails only while the link is down.
    pub async fn enumerate(&self) -> Result<()> {
        self.send(0, FUNCTION_ENUMERATE, 0, false, &[]).await
    }

    /// Issue a request and wait for the matching response payload.
    pub(crate) async fn request(
        &self,
        uid: u32,
        function_id: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let sequence = self.next_sequence();
        let key: PendingKey = (uid, function_id, sequence);

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(key, tx);

        if let Err(e) = self.send(uid, function_id, sequence, true, payload).await {
            self.shared.pending.lock().await.remove(&key);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => {
                if response.error_code != 0 {
                    Err(BusError::Device(response.error_code))
                } else {
                    Ok(response.payload)
                }
            }
            // Sender dropped: the link went down with the request in flight.
            Ok(Err(_)) => Err(BusError::NotConnected),
            Err(_) => {
                self.shared.pending.lock().await.remove(&key);
                Err(BusError::Timeout)
            }
        }
    }

    async fn send(
        &self,
        uid: u32,
        function_id: u8,
        sequence: u8,
        response_expected: bool,
        payload: &[u8],
    ) -> Result<()> {
        let frame = encode_frame(uid, function_id, sequence, response_expected, payload);

        let mut writer = self.shared.writer.lock().await;
        match writer.as_mut() {
            Some(w) => {
                if let Err(e) = w.write_all(&frame).await {
                    // Leave reconnection to the I/O task.
                    *writer = None;
                    Err(BusError::Io(e))
                } else {
                    Ok(())
                }
            }
            None => Err(BusError::NotConnected),
        }
    }

    fn next_sequence(&self) -> u8 {
        let n = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        (n % 15) + 1
    }
}

impl std::fmt::Debug for BusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusClient")
            .field("host", &self.shared.host)
            .field("port", &self.shared.port)
            .finish()
    }
}

enum LinkEnd {
    Lost(std::io::Error),
    ConsumerGone,
}

/// Owns the read half: parses frames, dispatches responses and callbacks,
/// and re-dials the daemon whenever the link drops.
async fn io_task(shared: Arc<Shared>, mut reader: OwnedReadHalf, events: mpsc::Sender<BusEvent>) {
    loop {
        match read_frames(&shared, &mut reader, &events).await {
            LinkEnd::ConsumerGone => return,
            LinkEnd::Lost(e) => warn!(error = %e, "bus link lost"),
        }

        *shared.writer.lock().await = None;
        shared.fail_pending().await;

        reader = loop {
            tokio::time::sleep(RECONNECT_BACKOFF).await;
            match TcpStream::connect((shared.host.as_str(), shared.port)).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    let (read_half, write_half) = stream.into_split();
                    *shared.writer.lock().await = Some(write_half);
                    debug!(host = %shared.host, port = shared.port, "bus link re-established");
                    break read_half;
                }
                Err(e) => trace!(error = %e, "reconnect attempt failed"),
            }
        };

        if events
            .send(BusEvent::Connected(ConnectReason::AutoReconnect))
            .await
            .is_err()
        {
            return;
        }
    }
}

async fn read_frames(
    shared: &Shared,
    reader: &mut OwnedReadHalf,
    events: &mpsc::Sender<BusEvent>,
) -> LinkEnd {
    let mut header_bytes = [0u8; HEADER_LEN];

    loop {
        if let Err(e) = reader.read_exact(&mut header_bytes).await {
            return LinkEnd::Lost(e);
        }

        let header = match FrameHeader::parse(&header_bytes) {
            Ok(header) => header,
            Err(e) => {
                return LinkEnd::Lost(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                ));
            }
        };

        let mut payload = vec![0u8; header.payload_len()];
        if let Err(e) = reader.read_exact(&mut payload).await {
            return LinkEnd::Lost(e);
        }

        if header.sequence == 0 {
            if header.function_id == CALLBACK_ENUMERATE {
                match EnumerateEvent::parse(&payload) {
                    Ok(event) => {
                        if events.send(BusEvent::Enumerate(event)).await.is_err() {
                            return LinkEnd::ConsumerGone;
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping malformed enumerate callback"),
                }
            } else {
                trace!(function_id = header.function_id, "ignoring unhandled callback");
            }
            continue;
        }

        let key: PendingKey = (header.uid, header.function_id, header.sequence);
        match shared.pending.lock().await.remove(&key) {
            Some(tx) => {
                let _ = tx.send(Response {
                    error_code: header.error_code,
                    payload,
                });
            }
            None => trace!(
                uid = header.uid,
                function_id = header.function_id,
                sequence = header.sequence,
                "unmatched response"
            ),
        }
    }
}
