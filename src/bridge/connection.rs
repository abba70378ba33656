//! The bridge: post prompts, wait for the human.
//!
//! One bridge exists per hook invocation. On connect it asks the
//! [`ConnectionArbiter`] for the real-time lease: the winner opens Socket
//! Mode, everyone else polls the Web API against the same thread. Either
//! way the session's messages land in one persistent Slack thread, and
//! replies are matched by the [`EventRouter`].

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ensure_home, ConfigError, PolicyConfig, RelayConfig};
use crate::slack::{
    RealtimeTransport, SlackWebClient, SocketModeClient, ThreadStore, ThreadStoreError,
    Transport, TransportError,
};

use super::waiter;
use super::{ConnectionArbiter, EventRouter, LeaseError, ReplySignal};

/// Capacity of the routed-signal channel in real-time mode.
const SIGNAL_CHANNEL_CAPACITY: usize = 8;

/// Errors from bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ThreadStore(#[from] ThreadStoreError),
}

/// Tunables for a bridge, derived from the relay config and policy.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub channel_id: String,
    pub verified_user: Option<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl BridgeSettings {
    /// Settings from the loaded config and policy files.
    #[must_use]
    pub fn from_config(config: &RelayConfig, policy: &PolicyConfig) -> Self {
        Self {
            channel_id: config.dm_channel_id.clone(),
            verified_user: if config.user_id.is_empty() {
                None
            } else {
                Some(config.user_id.clone())
            },
            timeout: Duration::from_secs(config.timeout_secs()),
            poll_interval: Duration::from_secs(policy.poll_interval_secs.max(1)),
        }
    }
}

enum Mode {
    /// Holder of the system-wide lease, fed by the Socket Mode listener.
    Realtime {
        _lease: super::ConnectionLease,
        signals: mpsc::Receiver<ReplySignal>,
        shutdown: CancellationToken,
    },
    /// Flat-rate Web API polling against the same thread.
    Polling,
}

/// Bidirectional Slack bridge for one hook invocation.
pub struct Bridge<T: Transport> {
    transport: T,
    session_id: String,
    settings: BridgeSettings,
    router: Arc<Mutex<EventRouter>>,
    thread_store: ThreadStore,
    thread_ts: Option<String>,
    needs_header: bool,
    mode: Mode,
}

impl Bridge<SlackWebClient> {
    /// Connect for a session: authenticate, load the session's thread, and
    /// race for the real-time lease.
    ///
    /// Losing the race, or failing to open Socket Mode, degrades to polling
    /// and is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay home cannot be prepared or lease state
    /// cannot be examined.
    pub async fn connect(
        home: &Path,
        config: &RelayConfig,
        policy: &PolicyConfig,
        session_id: &str,
    ) -> Result<Self, BridgeError> {
        ensure_home(home)?;

        let web = SlackWebClient::new(config.bot_token.clone());
        let settings = BridgeSettings::from_config(config, policy);
        let thread_store = ThreadStore::new(home);
        let thread_ts = thread_store.load(session_id);

        let mut router = EventRouter::new(&settings.channel_id, settings.verified_user.clone());
        match web.auth_test().await {
            Ok(auth) => {
                tracing::debug!(bot_user = %auth.user_id, "authenticated");
                router.set_bot_user(auth.user_id);
            }
            Err(e) => tracing::debug!(error = %e, "auth.test failed, continuing without bot id"),
        }
        if let Some(ts) = &thread_ts {
            router.set_thread(ts.clone());
        }
        let router = Arc::new(Mutex::new(router));

        let arbiter = ConnectionArbiter::new(home);
        let mode = match arbiter.try_acquire()? {
            Some(lease) => {
                let socket = SocketModeClient::new(config.app_token.clone());
                let shutdown = CancellationToken::new();
                match socket.subscribe(shutdown.clone()).await {
                    Ok(stream) => {
                        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
                        tokio::spawn(waiter::route_realtime_events(
                            stream,
                            Arc::clone(&router),
                            signal_tx,
                        ));
                        tracing::debug!(session = %session_id, "acquired lease, using socket mode");
                        Mode::Realtime {
                            _lease: lease,
                            signals: signal_rx,
                            shutdown,
                        }
                    }
                    Err(e) => {
                        // Give the lease back so another process can try.
                        tracing::warn!(error = %e, "socket mode unavailable, falling back to polling");
                        drop(lease);
                        Mode::Polling
                    }
                }
            }
            None => {
                tracing::debug!(session = %session_id, "lease held by another bridge, using poll mode");
                Mode::Polling
            }
        };

        let needs_header = thread_ts.is_none();
        Ok(Self {
            transport: web,
            session_id: session_id.to_string(),
            settings,
            router,
            thread_store,
            thread_ts,
            needs_header,
            mode,
        })
    }
}

impl<T: Transport> Bridge<T> {
    /// Build a poll-mode bridge over an arbitrary transport.
    ///
    /// This is the entry point for tests with a mock transport; the real
    /// connection flow is [`Bridge::connect`].
    #[must_use]
    pub fn polling(
        transport: T,
        home: &Path,
        session_id: &str,
        settings: BridgeSettings,
    ) -> Self {
        let thread_store = ThreadStore::new(home);
        let thread_ts = thread_store.load(session_id);
        let mut router = EventRouter::new(&settings.channel_id, settings.verified_user.clone());
        if let Some(ts) = &thread_ts {
            router.set_thread(ts.clone());
        }
        let needs_header = thread_ts.is_none();
        Self {
            transport,
            session_id: session_id.to_string(),
            settings,
            router: Arc::new(Mutex::new(router)),
            thread_store,
            thread_ts,
            needs_header,
            mode: Mode::Polling,
        }
    }

    /// Whether this bridge holds the real-time connection.
    #[must_use]
    pub fn is_realtime(&self) -> bool {
        matches!(self.mode, Mode::Realtime { .. })
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the session already has a Slack thread.
    #[must_use]
    pub fn has_thread(&self) -> bool {
        self.thread_ts.is_some()
    }

    /// Post a message, creating or continuing the session's thread.
    ///
    /// `header` is prepended to the first message of a new thread only.
    ///
    /// # Errors
    ///
    /// Returns an error if posting fails; callers treat that as "proceed
    /// without remote interaction".
    pub async fn post(&mut self, text: &str, header: Option<&str>) -> Result<(), BridgeError> {
        let mut body = text.to_string();
        if self.needs_header {
            if let Some(header) = header {
                body = format!("{header}\n\n{text}");
                self.needs_header = false;
            }
        }

        let posted = self
            .transport
            .post(&self.settings.channel_id, self.thread_ts.as_deref(), &body)
            .await?;

        if self.thread_ts.is_none() {
            tracing::debug!(ts = %posted.ts, "new thread started");
            self.thread_ts = Some(posted.ts.clone());
        }

        {
            let mut router = self.router.lock().expect("router mutex poisoned");
            if let Some(ts) = &self.thread_ts {
                router.set_thread(ts.clone());
            }
            router.note_posted(posted.ts);
        }

        // Signals routed before this post answered an earlier prompt.
        if let Mode::Realtime { signals, .. } = &mut self.mode {
            while signals.try_recv().is_ok() {}
        }

        if let Some(ts) = &self.thread_ts {
            self.thread_store.save(&self.session_id, ts)?;
        }
        Ok(())
    }

    /// Block until the verified user replies or reacts, or the timeout
    /// elapses.
    ///
    /// Returns `None` on timeout; the per-hook-kind default applies then.
    /// There is no other way to end the wait early.
    pub async fn wait_for_reply(&mut self) -> Option<ReplySignal> {
        match &mut self.mode {
            Mode::Realtime { signals, .. } => {
                tracing::debug!(timeout = ?self.settings.timeout, "waiting for reply (socket)");
                (tokio::time::timeout(self.settings.timeout, signals.recv()).await)
                    .ok()
                    .flatten()
            }
            Mode::Polling => {
                tracing::debug!(timeout = ?self.settings.timeout, "waiting for reply (poll)");
                waiter::poll_for_signal(
                    &self.transport,
                    &self.router,
                    &self.settings.channel_id,
                    self.settings.timeout,
                    self.settings.poll_interval,
                )
                .await
            }
        }
    }
}

impl<T: Transport> Drop for Bridge<T> {
    fn drop(&mut self) {
        if let Mode::Realtime { shutdown, .. } = &self.mode {
            shutdown.cancel();
        }
    }
}
