//! Reconnecting WebSocket client: the public lifecycle.
//!
//! [`WsClient`] owns a supervisor task that keeps zero-or-one transport
//! session alive. While started, the supervisor attempts a connection
//! whenever none is live and waits a fixed delay between attempts, success or
//! failure alike; the wait is interruptible so [`WsClient::stop`] takes
//! effect promptly. All connect and transport failures stay internal — the
//! collaborator only ever observes the opened/closed/message events and
//! [`WsClient::is_connected`].

use crate::config::ClientConfig;
use crate::error::WsError;
use crate::events::EventListeners;
use crate::session::Session;
use crate::stream::Endpoint;
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A reconnecting WebSocket client transport.
///
/// Cheap to clone; clones share the same connection and listeners.
///
/// ```no_run
/// # async fn demo() -> Result<(), ws_lite::WsError> {
/// let client = ws_lite::WsClient::new("display.local", 9010);
/// client.on_message(|msg| println!("<- {msg}"));
/// client.start()?;
/// client.send("brightness,128;").await;
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Endpoint,
    config: ClientConfig,
    events: Arc<EventListeners>,
    disposed: AtomicBool,
    /// Supervisor bookkeeping. Held only for brief non-async sections.
    supervisor: SyncMutex<SupervisorState>,
    /// The zero-or-one live session. The supervisor is the only writer; other
    /// callers clone the handle out for liveness checks and sends.
    session: SyncMutex<Option<Arc<Session>>>,
}

#[derive(Default)]
struct SupervisorState {
    task: Option<JoinHandle<()>>,
    token: Option<CancellationToken>,
}

impl WsClient {
    /// Create a client for `host:port` with default configuration.
    /// Port 443 implies TLS.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(host, port, ClientConfig::default())
    }

    /// Create a client with explicit configuration.
    pub fn with_config(host: impl Into<String>, port: u16, config: ClientConfig) -> Self {
        WsClient {
            inner: Arc::new(Inner {
                endpoint: Endpoint::new(host, port),
                config,
                events: Arc::new(EventListeners::new()),
                disposed: AtomicBool::new(false),
                supervisor: SyncMutex::new(SupervisorState::default()),
                session: SyncMutex::new(None),
            }),
        }
    }

    /// Register a listener for the `opened` event.
    pub fn on_open(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.events.on_open(listener);
    }

    /// Register a listener for the `closed` event.
    pub fn on_close(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner.events.on_close(listener);
    }

    /// Register a listener for inbound text messages.
    pub fn on_message(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.events.on_message(listener);
    }

    /// Start the supervisor loop. Idempotent while already running;
    /// restarting after [`WsClient::stop`] is supported. Returns
    /// [`WsError::InvalidState`] once the client has been disposed.
    pub fn start(&self) -> Result<(), WsError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(WsError::InvalidState("client has been disposed"));
        }

        let mut supervisor = self.inner.supervisor.lock();
        if let Some(task) = &supervisor.task {
            if !task.is_finished() {
                return Ok(());
            }
        }

        let token = CancellationToken::new();
        supervisor.token = Some(token.clone());
        supervisor.task = Some(tokio::spawn(supervisor_loop(self.inner.clone(), token)));
        info!(endpoint = %self.inner.endpoint, "supervisor started");
        Ok(())
    }

    /// Stop the supervisor and tear down any live session. The stop signal
    /// wakes the supervisor's inter-attempt wait immediately.
    pub async fn stop(&self) {
        let task = {
            let mut supervisor = self.inner.supervisor.lock();
            if let Some(token) = supervisor.token.take() {
                token.cancel();
            }
            supervisor.task.take()
        };

        // Join the supervisor before touching the session slot: it is the
        // only writer, so a connect attempt racing with this stop cannot
        // slip a fresh session in afterwards.
        if let Some(task) = task {
            if tokio::time::timeout(self.inner.config.shutdown_timeout, task)
                .await
                .is_err()
            {
                warn!("supervisor task did not exit within the join timeout");
            }
        }

        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            session.shutdown().await;
        }
    }

    /// Terminal shutdown: stops the client and rejects later `start` calls
    /// with [`WsError::InvalidState`].
    pub async fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            self.stop().await;
        }
    }

    /// Send a text message. Silently dropped (after logging) when not
    /// connected; callers check [`WsClient::is_connected`] or tolerate drops.
    pub async fn send(&self, text: &str) {
        let session = self.inner.session.lock().clone();
        match session {
            Some(session) if session.is_open() => {
                if let Err(error) = session.send_text(text).await {
                    warn!(%error, "send failed");
                }
            }
            _ => debug!("send dropped: not connected"),
        }
    }

    /// Whether a live, open session exists right now.
    pub fn is_connected(&self) -> bool {
        self.inner
            .session
            .lock()
            .as_ref()
            .is_some_and(|s| s.is_open())
    }
}

/// Supervisor loop: one connect attempt whenever no live session exists, then
/// an interruptible fixed-delay wait, regardless of the attempt's outcome.
async fn supervisor_loop(inner: Arc<Inner>, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            break;
        }

        let live = inner.session.lock().as_ref().is_some_and(|s| s.is_open());
        if !live {
            debug!(endpoint = %inner.endpoint, "attempting to connect");
            match Session::open(&inner.endpoint, &inner.config, inner.events.clone()).await {
                Ok(session) => {
                    // A stop issued mid-dial must not leave this session live.
                    if token.is_cancelled() {
                        session.shutdown().await;
                        break;
                    }
                    // Publish the handle before `opened` fires, so listeners
                    // observe a connected client.
                    let session = Arc::new(session);
                    *inner.session.lock() = Some(session.clone());
                    session.activate();
                }
                Err(error) => {
                    debug!(%error, "connect attempt failed");
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
        }
    }
    debug!("supervisor stopped");
}
