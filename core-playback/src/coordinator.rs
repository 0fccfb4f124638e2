//! # Command Coordinator
//!
//! Owns the engine connection. The [`EngineSession`] lives inside a single
//! actor task, so every engine call happens on one execution context no
//! matter which thread submits the command.
//!
//! ## Connection lifecycle
//!
//! ```text
//! Connecting ──ok──▶ Connected ──lost──▶ Disconnected ──delay──▶ Connecting
//!     │                                                              ▲
//!     └──fail/timeout──▶ Failed ──backoff (initial·2^n, capped)──────┘
//! ```
//!
//! Retries never stop. A successful connect resets the backoff.
//!
//! ## Pending commands
//!
//! Commands submitted while not connected are buffered in submission order
//! and replayed once connected. The buffer is bounded; when full, the oldest
//! command is evicted with a warning and its submitter receives
//! [`CommandError::Evicted`].

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{
    BridgeError, ConnectionToken, EngineConnection, EngineConnector, EngineEventSender,
    EngineQueueEntry, EngineSession,
};
use core_async::sync::{mpsc, oneshot, watch, CancellationToken, Mutex};
use core_async::task::JoinHandle;
use core_async::time::{self, as_millis_u64, Duration, Sleep};
use core_async::{spawn, Backoff};
use core_runtime::events::{CommandEvent, ConnectionEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::config::PlaybackConfig;
use crate::error::{CommandError, ConnectionError};
use crate::session_state::PositionProbe;
use crate::tracker::TrackerHandle;
use crate::types::{ConnectionState, ErrorDescriptor, ErrorSource, PositionReport};

type CommandReply = oneshot::Sender<Result<Option<PositionReport>, CommandError>>;
type ConnectFuture =
    Pin<Box<dyn Future<Output = Result<EngineConnection, ConnectionError>> + Send>>;

/// Connection and buffering knobs, taken from [`PlaybackConfig`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub pending_capacity: usize,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub connect_attempt_timeout: Duration,
}

impl From<&PlaybackConfig> for CoordinatorSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            pending_capacity: config.pending_command_capacity,
            reconnect_initial_delay: config.reconnect_initial_delay,
            reconnect_max_delay: config.reconnect_max_delay,
            connect_attempt_timeout: config.connect_attempt_timeout,
        }
    }
}

enum Request {
    Submit {
        command: Command,
        reply: CommandReply,
    },
    Probe {
        reply: oneshot::Sender<Result<PositionReport, CommandError>>,
    },
    PendingCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable handle to the coordinator actor.
#[derive(Clone)]
pub struct CommandCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CommandCoordinator {
    /// Spawn the actor and begin connecting immediately.
    pub fn start(
        connector: Arc<dyn EngineConnector>,
        token: ConnectionToken,
        settings: CoordinatorSettings,
        engine_events: EngineEventSender,
        tracker: TrackerHandle,
        bus: EventBus,
    ) -> Self {
        let (requests, inbox) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let actor = EngineActor {
            backoff: Backoff::new(
                settings.reconnect_initial_delay,
                settings.reconnect_max_delay,
            ),
            connector,
            token,
            settings,
            engine_events,
            state: state_tx,
            tracker,
            bus,
            pending: VecDeque::new(),
            engine_queue: Vec::new(),
        };
        let task = spawn(actor.run(inbox, cancel.clone()));

        Self {
            inner: Arc::new(Inner {
                requests,
                state: state_rx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Submit a command.
    ///
    /// - Connected: returns after the engine executed the command.
    /// - Connecting: returns once the attempt settles (executed, or still
    ///   buffered if the attempt failed).
    /// - Disconnected / Failed: returns once the command is buffered.
    pub async fn submit(&self, command: Command) -> Result<(), CommandError> {
        self.dispatch(command).await.map(|_| ())
    }

    /// Like [`CommandCoordinator::submit`], also returning the position read
    /// back after execution (`None` when the command was only buffered).
    pub(crate) async fn dispatch(
        &self,
        command: Command,
    ) -> Result<Option<PositionReport>, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .requests
            .send(Request::Submit { command, reply })
            .map_err(|_| CommandError::Closed)?;
        rx.await.map_err(|_| CommandError::Closed)?
    }

    /// Read the engine position. Fails when not connected.
    pub async fn query_position(&self) -> Result<PositionReport, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .requests
            .send(Request::Probe { reply })
            .map_err(|_| CommandError::Closed)?;
        rx.await.map_err(|_| CommandError::Closed)?
    }

    /// Number of commands waiting for a connection.
    pub async fn pending_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self
            .inner
            .requests
            .send(Request::PendingCount { reply })
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Wait until connected, or fail after `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), ConnectionError> {
        let mut rx = self.inner.state.clone();
        let outcome = time::timeout(timeout, rx.wait_for(|s| s.is_connected()))
            .await
            .map(|res| res.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ConnectionError::Released),
            Err(_) => Err(ConnectionError::Timeout(timeout)),
        }
    }

    /// Release the engine connection and stop the actor. Buffered commands
    /// are dropped; their submitters receive [`CommandError::Closed`].
    pub async fn release(&self) {
        self.inner.cancel.cancel();
        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Coordinator task ended abnormally");
            }
        }
    }
}

#[async_trait]
impl PositionProbe for CommandCoordinator {
    async fn probe(&self) -> Result<PositionReport, CommandError> {
        self.query_position().await
    }
}

struct PendingCommand {
    command: Command,
    /// Taken once the submitter has been answered.
    reply: Option<CommandReply>,
}

struct Live {
    session: Box<dyn EngineSession>,
    disconnected: oneshot::Receiver<String>,
}

enum Step {
    Shutdown,
    Lost(String),
    Attempt(Result<EngineConnection, ConnectionError>),
    Retry,
    Request(Request),
}

struct EngineActor {
    connector: Arc<dyn EngineConnector>,
    token: ConnectionToken,
    settings: CoordinatorSettings,
    engine_events: EngineEventSender,
    state: watch::Sender<ConnectionState>,
    tracker: TrackerHandle,
    bus: EventBus,
    backoff: Backoff,
    pending: VecDeque<PendingCommand>,
    /// Media ids of the last queue handed to the engine.
    engine_queue: Vec<String>,
}

impl EngineActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Request>, cancel: CancellationToken) {
        let mut live: Option<Live> = None;
        let mut attempt: Option<ConnectFuture> = Some(self.begin_attempt());
        let mut retry: Option<Pin<Box<Sleep>>> = None;

        loop {
            let step = match live.as_mut() {
                Some(conn) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Shutdown,
                    reason = &mut conn.disconnected => Step::Lost(
                        reason.unwrap_or_else(|_| "engine dropped the connection".to_string()),
                    ),
                    request = inbox.recv() => match request {
                        Some(request) => Step::Request(request),
                        None => Step::Shutdown,
                    },
                },
                None => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Shutdown,
                    result = next_attempt(&mut attempt) => Step::Attempt(result),
                    _ = next_retry(&mut retry) => Step::Retry,
                    request = inbox.recv() => match request {
                        Some(request) => Step::Request(request),
                        None => Step::Shutdown,
                    },
                },
            };

            match step {
                Step::Shutdown => break,
                Step::Lost(reason) => {
                    if let Some(mut conn) = live.take() {
                        conn.session.release();
                    }
                    retry = Some(Box::pin(self.on_lost(reason)));
                }
                Step::Attempt(Ok(connection)) => {
                    attempt = None;
                    let mut conn = Live {
                        session: connection.session,
                        disconnected: connection.disconnected,
                    };
                    self.on_connected();
                    if let Err(reason) = self.replay_pending(&mut conn) {
                        conn.session.release();
                        retry = Some(Box::pin(self.on_lost(reason)));
                    } else {
                        live = Some(conn);
                    }
                }
                Step::Attempt(Err(e)) => {
                    attempt = None;
                    retry = Some(Box::pin(self.on_attempt_failed(e)));
                }
                Step::Retry => {
                    retry = None;
                    attempt = Some(self.begin_attempt());
                }
                Step::Request(request) => {
                    if let Some(reason) = self.on_request(live.as_mut(), request) {
                        if let Some(mut conn) = live.take() {
                            conn.session.release();
                        }
                        retry = Some(Box::pin(self.on_lost(reason)));
                    }
                }
            }
        }

        if let Some(mut conn) = live.take() {
            conn.session.release();
        }
        self.state.send_replace(ConnectionState::Disconnected);
        self.tracker.connection(ConnectionState::Disconnected);
        self.emit(ConnectionEvent::Released.into());
        info!(dropped = self.pending.len(), "Engine connection released");
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        self.tracker.connection(state);
    }

    fn emit(&self, event: CoreEvent) {
        // No subscribers is fine.
        let _ = self.bus.emit(event);
    }

    fn begin_attempt(&mut self) -> ConnectFuture {
        let attempt_no = self.backoff.attempts();
        self.set_state(ConnectionState::Connecting);
        self.emit(ConnectionEvent::Connecting { attempt: attempt_no }.into());
        debug!(
            attempt = attempt_no,
            token = %redact_if_sensitive("connection_token", self.token.as_str()),
            "Connecting to playback engine"
        );

        let connector = Arc::clone(&self.connector);
        let token = self.token.clone();
        let events = self.engine_events.clone();
        let budget = self.settings.connect_attempt_timeout;
        Box::pin(async move {
            match time::timeout(budget, connector.connect(&token, events)).await {
                Ok(Ok(connection)) => Ok(connection),
                Ok(Err(e)) => Err(ConnectionError::ConnectFailed(e.to_string())),
                Err(_) => Err(ConnectionError::Timeout(budget)),
            }
        })
    }

    fn on_connected(&mut self) {
        self.backoff.reset();
        self.set_state(ConnectionState::Connected);
        self.emit(ConnectionEvent::Connected.into());
        info!("Connected to playback engine");
    }

    fn on_attempt_failed(&mut self, e: ConnectionError) -> Sleep {
        let attempt = self.backoff.attempts();
        let delay = self.backoff.next_delay();
        warn!(
            attempt,
            error = %e,
            retry_in_ms = as_millis_u64(delay),
            "Engine connection attempt failed"
        );
        self.set_state(ConnectionState::Failed);
        self.tracker.failure(ErrorDescriptor::new(
            ErrorSource::Connection,
            "connect_failed",
            e.to_string(),
        ));
        self.emit(
            ConnectionEvent::AttemptFailed {
                attempt,
                message: e.to_string(),
                retry_in_ms: as_millis_u64(delay),
            }
            .into(),
        );

        // Submitters parked during the attempt get their answer now; the
        // commands stay buffered.
        for pending in self.pending.iter_mut() {
            if let Some(reply) = pending.reply.take() {
                let _ = reply.send(Ok(None));
            }
        }

        time::sleep(delay)
    }

    fn on_lost(&mut self, reason: String) -> Sleep {
        warn!(reason = %reason, "Engine connection lost");
        self.set_state(ConnectionState::Disconnected);
        self.tracker.failure(ErrorDescriptor::new(
            ErrorSource::Connection,
            "connection_lost",
            reason.clone(),
        ));
        self.emit(ConnectionEvent::Lost { reason }.into());
        self.backoff.reset();
        time::sleep(self.backoff.next_delay())
    }

    /// Drain buffered commands in submission order. Returns the disconnect
    /// reason if the connection dropped mid-replay; the unexecuted commands
    /// stay buffered.
    fn replay_pending(&mut self, conn: &mut Live) -> Result<(), String> {
        let mut replayed = 0usize;
        while let Some(mut pending) = self.pending.pop_front() {
            match self.execute(conn, &pending.command) {
                Err(e) if e.is_disconnect() => {
                    self.pending.push_front(pending);
                    return Err(e.to_string());
                }
                result => {
                    replayed += 1;
                    self.report_failure(&pending.command, &result);
                    if let Some(reply) = pending.reply.take() {
                        let _ = reply.send(result.map(Some));
                    }
                }
            }
        }
        if replayed > 0 {
            info!(count = replayed, "Replayed pending commands");
            self.emit(CommandEvent::Replayed { count: replayed }.into());
        }
        Ok(())
    }

    /// Handle one request. Returns a disconnect reason when the engine
    /// reported the connection gone.
    fn on_request(&mut self, live: Option<&mut Live>, request: Request) -> Option<String> {
        match request {
            Request::Submit { command, reply } => match live {
                Some(conn) => {
                    let result = self.execute(conn, &command);
                    self.report_failure(&command, &result);
                    let lost = match &result {
                        Err(e) if e.is_disconnect() => Some(e.to_string()),
                        _ => None,
                    };
                    let _ = reply.send(result.map(Some));
                    lost
                }
                None => {
                    self.enqueue(command, reply);
                    None
                }
            },
            Request::Probe { reply } => match live {
                Some(conn) => {
                    let result = read_report(conn.session.as_mut()).map_err(CommandError::Query);
                    let lost = match &result {
                        Err(e) if e.is_disconnect() => Some(e.to_string()),
                        _ => None,
                    };
                    let _ = reply.send(result);
                    lost
                }
                None => {
                    let _ = reply.send(Err(CommandError::NotConnected));
                    None
                }
            },
            Request::PendingCount { reply } => {
                let _ = reply.send(self.pending.len());
                None
            }
        }
    }

    fn enqueue(&mut self, command: Command, reply: CommandReply) {
        if self.pending.len() >= self.settings.pending_capacity {
            if let Some(evicted) = self.pending.pop_front() {
                let kind = evicted.command.kind();
                warn!(
                    command = %kind,
                    capacity = self.settings.pending_capacity,
                    "Pending command buffer full; evicting oldest command"
                );
                self.emit(
                    CommandEvent::Evicted {
                        command: kind.to_string(),
                        capacity: self.settings.pending_capacity,
                    }
                    .into(),
                );
                if let Some(reply) = evicted.reply {
                    let _ = reply.send(Err(CommandError::Evicted(kind)));
                }
            }
        }

        let kind = command.kind();
        let state = *self.state.borrow();
        // While an attempt is in flight the submitter waits for its outcome.
        let reply = if state == ConnectionState::Connecting {
            Some(reply)
        } else {
            let _ = reply.send(Ok(None));
            None
        };
        self.pending.push_back(PendingCommand { command, reply });
        debug!(command = %kind, pending = self.pending.len(), "Command queued until connected");
        self.emit(
            CommandEvent::Queued {
                command: kind.to_string(),
                pending: self.pending.len(),
            }
            .into(),
        );
    }

    fn execute(&mut self, conn: &mut Live, command: &Command) -> Result<PositionReport, CommandError> {
        let kind = command.kind();
        let session = conn.session.as_mut();
        let rejected = |source: BridgeError| CommandError::Rejected {
            command: kind,
            source,
        };

        match command {
            Command::Play => session.play().map_err(rejected)?,
            Command::Pause => session.pause().map_err(rejected)?,
            Command::Stop => session.stop().map_err(rejected)?,
            Command::SeekTo { position_ms, index } => {
                session.seek_to(*index, *position_ms).map_err(rejected)?
            }
            Command::SkipNext => session.skip_next().map_err(rejected)?,
            Command::SkipPrevious => session.skip_previous().map_err(rejected)?,
            Command::SetRepeatMode(mode) => session.set_repeat_mode(*mode).map_err(rejected)?,
            Command::SetShuffle(enabled) => session.set_shuffle(*enabled).map_err(rejected)?,
            Command::LoadQueue(request) => {
                let entries: Vec<EngineQueueEntry> = request
                    .items
                    .iter()
                    .map(|item| EngineQueueEntry {
                        media_id: item.track.key(),
                        url: item.source_url.clone(),
                        title: item.title.clone(),
                        duration_ms: item.duration_ms,
                    })
                    .collect();
                let media_ids = entries.iter().map(|e| e.media_id.clone()).collect();
                session
                    .set_queue(entries, request.start_index, request.start_position_ms)
                    .map_err(rejected)?;
                self.engine_queue = media_ids;
                if request.auto_play {
                    session.play().map_err(rejected)?;
                }
            }
            Command::PlayTrackImmediate(track) => {
                let key = track.key();
                let index = self
                    .engine_queue
                    .iter()
                    .position(|id| *id == key)
                    .ok_or_else(|| CommandError::NotInQueue(track.clone()))?;
                session.seek_to(Some(index), 0).map_err(rejected)?;
                session.play().map_err(rejected)?;
            }
        }

        let report = read_report(session).map_err(rejected)?;
        self.tracker.report(report);
        Ok(report)
    }

    fn report_failure(&self, command: &Command, result: &Result<PositionReport, CommandError>) {
        let Err(e) = result else {
            return;
        };
        let kind = command.kind();
        error!(command = %kind, error = %e, "Command failed");
        self.tracker.failure(ErrorDescriptor::new(
            ErrorSource::Command,
            kind.as_str(),
            e.to_string(),
        ));
        self.emit(
            CommandEvent::Failed {
                command: kind.to_string(),
                message: e.to_string(),
            }
            .into(),
        );
    }
}

fn read_report(session: &mut dyn EngineSession) -> Result<PositionReport, BridgeError> {
    let index = session.current_index()?;
    let position = session.position_ms()?;
    let duration = session.duration_ms()?;
    Ok(PositionReport::from_engine(index, position, duration))
}

async fn next_attempt(
    attempt: &mut Option<ConnectFuture>,
) -> Result<EngineConnection, ConnectionError> {
    match attempt {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn next_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}
