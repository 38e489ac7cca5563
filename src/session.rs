//! Transport session: one live WebSocket connection.
//!
//! A session owns the socket (plain or TLS), runs the upgrade handshake once,
//! then moves to a reader task that decodes frames, answers pings, and emits
//! the heartbeat. All writes — handshake bytes, data frames, pings, pongs and
//! the close frame — funnel through a single write lock so frames are never
//! interleaved on the wire.
//!
//! Teardown is a single path regardless of trigger (peer close frame, I/O
//! failure, or caller stop): best-effort close frame with status 1000, stream
//! shutdown, then the `closed` event exactly once per session.

use crate::codec::FrameCodec;
use crate::config::ClientConfig;
use crate::error::WsError;
use crate::events::EventListeners;
use crate::frame::{Frame, Opcode};
use crate::handshake::Handshake;
use crate::stream::{Endpoint, MaybeTlsStream};
use bytes::BytesMut;
use parking_lot::Mutex as SyncMutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Budget for the best-effort close frame and stream shutdown at teardown.
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Erased byte stream so sessions over TCP, TLS and in-memory test pipes all
/// share one concrete type.
pub(crate) trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

type BoxStream = Box<dyn Transport>;

/// Frame reader over the read half of the stream.
///
/// Accumulates bytes in a buffer and decodes complete frames from it; a
/// zero-length read on the live stream is a disconnect, not progress.
struct FrameReader {
    reader: ReadHalf<BoxStream>,
    codec: FrameCodec,
    buffer: BytesMut,
}

impl FrameReader {
    fn new(reader: ReadHalf<BoxStream>, leftover: BytesMut, max_payload: usize) -> Self {
        FrameReader {
            reader,
            codec: FrameCodec::new().max_payload(max_payload),
            buffer: leftover,
        }
    }

    async fn next_frame(&mut self) -> Result<Frame, WsError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(frame);
            }
            let mut chunk = [0u8; 8192];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(WsError::StreamDisconnected);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Frame writer over the write half of the stream.
///
/// One async mutex covers encoding and the write, so a frame reaches the wire
/// whole and writes from concurrent callers are strictly serialized.
struct FrameWriter {
    inner: Mutex<WriterInner>,
    last_write: SyncMutex<TokioInstant>,
}

struct WriterInner {
    writer: WriteHalf<BoxStream>,
    codec: FrameCodec,
}

impl FrameWriter {
    fn new(writer: WriteHalf<BoxStream>) -> Self {
        FrameWriter {
            inner: Mutex::new(WriterInner {
                writer,
                codec: FrameCodec::new(),
            }),
            last_write: SyncMutex::new(TokioInstant::now()),
        }
    }

    async fn write_frame(&self, frame: Frame) -> Result<(), WsError> {
        let mut buf = BytesMut::new();
        let mut inner = self.inner.lock().await;
        inner.codec.encode(frame, &mut buf)?;
        inner.writer.write_all(&buf).await?;
        inner.writer.flush().await?;
        *self.last_write.lock() = TokioInstant::now();
        Ok(())
    }

    /// Instant of the last outbound write of any kind.
    fn last_write_at(&self) -> TokioInstant {
        *self.last_write.lock()
    }

    /// Time since the last outbound write of any kind.
    fn idle_for(&self) -> Duration {
        self.last_write.lock().elapsed()
    }

    async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        let _ = inner.writer.shutdown().await;
    }
}

/// State shared between the session handle and its reader task.
struct Shared {
    open: AtomicBool,
    closed: AtomicBool,
    token: CancellationToken,
    writer: FrameWriter,
    last_pong: SyncMutex<Option<Instant>>,
    events: Arc<EventListeners>,
    ping_interval: Duration,
}

impl Shared {
    /// Single teardown path. Idempotent: the first caller wins, everyone else
    /// returns immediately, so `closed` fires exactly once per session.
    async fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.open.store(false, Ordering::SeqCst);
        self.token.cancel();

        // Best effort: the stream may already be gone.
        let _ = tokio::time::timeout(
            CLOSE_WRITE_TIMEOUT,
            self.writer.write_frame(Frame::close(1000)),
        )
        .await;
        let _ = tokio::time::timeout(CLOSE_WRITE_TIMEOUT, self.writer.shutdown()).await;

        info!("websocket disconnected");
        self.events.emit_closed();
    }

    /// Handle one inbound frame. Returns false when the loop should exit.
    async fn dispatch(&self, frame: Frame) -> bool {
        match frame.opcode {
            Opcode::Text => {
                match String::from_utf8(frame.payload) {
                    Ok(text) => self.events.emit_message(&text),
                    // A malformed message drops, the connection survives.
                    Err(_) => warn!("dropping text frame with invalid UTF-8"),
                }
                true
            }
            Opcode::Close => {
                debug!(code = ?frame.close_code(), "close frame received");
                false
            }
            Opcode::Ping => {
                debug!("ping received");
                if let Err(error) = self.writer.write_frame(Frame::pong(frame.payload)).await {
                    warn!(%error, "pong reply failed");
                    return false;
                }
                true
            }
            Opcode::Pong => {
                // Liveness is observational only; a missed pong never tears
                // the session down.
                *self.last_pong.lock() = Some(Instant::now());
                debug!("pong received");
                true
            }
            Opcode::Binary | Opcode::Continuation => {
                debug!(
                    opcode = ?frame.opcode,
                    len = frame.payload.len(),
                    "accepted uninterpreted data frame"
                );
                true
            }
        }
    }
}

/// Read loop: runs as the session's one background task while open.
///
/// The heartbeat deadline is recomputed from the write clock on every
/// iteration, so each ping lands one interval after the previous outbound
/// write. A fixed-period timer would drift against the write timestamps and
/// skip every other tick.
async fn read_loop(shared: Arc<Shared>, mut reader: FrameReader) {
    loop {
        let ping_at = shared.writer.last_write_at() + shared.ping_interval;
        tokio::select! {
            _ = shared.token.cancelled() => break,
            _ = tokio::time::sleep_until(ping_at) => {
                if shared.writer.idle_for() >= shared.ping_interval {
                    if let Err(error) = shared.writer.write_frame(Frame::ping(Vec::new())).await {
                        warn!(%error, "heartbeat ping failed");
                        break;
                    }
                    debug!("heartbeat ping sent");
                }
            }
            result = reader.next_frame() => match result {
                Ok(frame) => {
                    if !shared.dispatch(frame).await {
                        break;
                    }
                }
                Err(error) => {
                    debug!(%error, "read loop terminating");
                    break;
                }
            }
        }
    }

    shared.teardown().await;
}

/// A live WebSocket connection after a successful handshake.
///
/// Created and discarded only by the connection supervisor; other callers
/// hold it just long enough to send or to check liveness.
pub(crate) struct Session {
    shared: Arc<Shared>,
    /// Reader held back until [`Session::activate`] starts the read loop.
    pending_reader: SyncMutex<Option<FrameReader>>,
    reader_task: SyncMutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl Session {
    /// Establish the stream for `endpoint` (TLS when the port designates a
    /// secure endpoint) and upgrade it.
    pub(crate) async fn open(
        endpoint: &Endpoint,
        config: &ClientConfig,
        events: Arc<EventListeners>,
    ) -> Result<Session, WsError> {
        let stream = MaybeTlsStream::connect(endpoint, config.connect_timeout).await?;
        Session::from_stream(stream, endpoint.host(), endpoint.port(), config, events).await
    }

    /// Upgrade an already-established stream. Split out from [`Session::open`]
    /// so sessions can run over in-memory pipes in tests.
    pub(crate) async fn from_stream(
        mut stream: impl Transport + 'static,
        host: &str,
        port: u16,
        config: &ClientConfig,
        events: Arc<EventListeners>,
    ) -> Result<Session, WsError> {
        let mut rng = StdRng::from_os_rng();
        let handshake = Handshake::new(host, port, &mut rng);
        stream.write_all(&handshake.request_bytes()).await?;

        // Bounded read of the upgrade response; on any failure the candidate
        // connection is discarded without touching the reconnect cadence.
        let mut buf = BytesMut::with_capacity(1024);
        let body_offset = tokio::time::timeout(config.handshake_timeout, async {
            loop {
                if let Some(offset) = handshake.validate(&buf)? {
                    return Ok::<usize, WsError>(offset);
                }
                let mut chunk = [0u8; 1024];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(WsError::StreamDisconnected);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        })
        .await
        .map_err(|_| WsError::HandshakeRejected("timed out waiting for upgrade response".into()))??;

        // Frame bytes that rode in with the response stay in the buffer.
        let leftover = buf.split_off(body_offset);

        let boxed: BoxStream = Box::new(stream);
        let (read_half, write_half) = tokio::io::split(boxed);

        let shared = Arc::new(Shared {
            open: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            token: CancellationToken::new(),
            writer: FrameWriter::new(write_half),
            last_pong: SyncMutex::new(None),
            events,
            ping_interval: config.ping_interval,
        });

        let reader = FrameReader::new(read_half, leftover, config.max_frame_payload);

        Ok(Session {
            shared,
            pending_reader: SyncMutex::new(Some(reader)),
            reader_task: SyncMutex::new(None),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Emit `opened` and start the read loop.
    ///
    /// Split from the handshake so the caller can publish the session handle
    /// first: an `opened` listener that immediately checks liveness or sends
    /// must observe a connected client. `opened` still precedes any `message`
    /// because the reader task is not spawned until after the emit.
    pub(crate) fn activate(&self) {
        info!("websocket connected");
        self.shared.events.emit_opened();

        if let Some(reader) = self.pending_reader.lock().take() {
            let task = tokio::spawn(read_loop(self.shared.clone(), reader));
            *self.reader_task.lock() = Some(task);
        }
    }

    /// Whether the session is live: handshake done and no teardown yet.
    pub(crate) fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Send a text frame. The caller is expected to have checked liveness;
    /// a failure here still marks the session for replacement.
    pub(crate) async fn send_text(&self, text: &str) -> Result<(), WsError> {
        if !self.is_open() {
            return Err(WsError::StreamDisconnected);
        }
        self.shared.writer.write_frame(Frame::text(text)).await
    }

    /// Tear down the connection and join the reader task with a bounded
    /// wait. A reader that overruns the join timeout is logged and left to
    /// finish on its own; shutdown proceeds anyway.
    pub(crate) async fn shutdown(&self) {
        self.shared.teardown().await;

        let task = self.reader_task.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(self.shutdown_timeout, task)
                .await
                .is_err()
            {
                warn!("reader task did not exit within the join timeout");
            }
        }
    }
}
