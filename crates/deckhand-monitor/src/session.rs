//! Stream session: owns the historical-then-live connection lifecycle for
//! one subject.
//!
//! All session state lives in a [`SessionState`] value published through a
//! `watch` channel and mutated exclusively on the session's driver task, so
//! consumers never need locks. Lifecycle notifications (completion, failure,
//! end-of-stream, retry exhaustion) arrive separately through a bounded
//! event channel; the channel is lossy when the consumer stops draining it,
//! and the watched state stays authoritative.

use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::errors::{MonitorError, SessionError};
use crate::event::{StreamEvent, classify};
use crate::status::{DeployState, StatusSnapshot};
use crate::subject::Subject;
use crate::transport::{HistoricalOutcome, LiveFeed, MonitorBackend};

/// Which phase of the historical-then-live flow the session is in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// `start()` has not run yet, or `reset()` returned the session here.
    #[default]
    Uninitialized,
    /// Looking up the stored outcome before deciding whether to go live.
    Historical,
    /// Following the live stream.
    Live,
}

/// Connection lifecycle for the live stream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection has been attempted.
    #[default]
    Idle,
    /// A connection attempt is in flight or a reconnect is scheduled.
    Connecting,
    /// The live stream is open and delivering frames.
    Open,
    /// The connection ended and no further attempt is scheduled.
    Closed,
}

/// Behavior options for a monitor session.
#[derive(Clone, Debug)]
pub struct MonitorOptions {
    /// Reconnect policy for the live stream.
    pub reconnect: ReconnectPolicy,
    /// Rolling cap on buffered lines; `None` keeps the full run.
    pub max_lines: Option<usize>,
    /// Bounded buffer size for the session event channel.
    ///
    /// Once the buffer is full, further notifications are dropped rather
    /// than stalling the driver; [`SessionState`] stays authoritative.
    pub event_buffer_capacity: usize,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            max_lines: None,
            event_buffer_capacity: 128,
        }
    }
}

impl MonitorOptions {
    /// Checks the option invariants enforced on every construction path.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.event_buffer_capacity == 0 {
            return Err(MonitorError::Validation(
                "event_buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_lines == Some(0) {
            return Err(MonitorError::Validation(
                "max_lines must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observable session state.
///
/// Mutated only on the session's driver task; consumers hold a
/// `watch::Receiver` and borrow snapshots.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionState {
    pub mode: SessionMode,
    pub connection: ConnectionState,
    /// Buffered output lines, oldest first.
    pub lines: Vec<String>,
    /// Count of every line ever appended, including lines the rolling cap
    /// has since evicted. Lets consumers diff consecutive snapshots.
    pub lines_seen: u64,
    /// Most recent lifecycle snapshot.
    pub status: Option<StatusSnapshot>,
    /// Failed connection attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Set once a terminal status or end-of-stream is observed; the session
    /// never reconnects past this point.
    pub terminal_reached: bool,
    /// True from `start()` until the first outcome or open connection.
    pub is_loading: bool,
    /// Fatal session error (subject failed, or retries exhausted).
    pub error: Option<String>,
}

/// Notifications delivered through [`MonitorSession::next_event`].
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// First successful terminal status observed by this session.
    Completed { status: StatusSnapshot },
    /// The subject reached the failed state.
    Failed { message: String },
    /// Non-fatal transport or upstream error; the session keeps going.
    Error { error: SessionError },
    /// The server closed the stream explicitly.
    Ended { message: Option<String> },
    /// Reconnect attempts ran out; the session stopped retrying.
    Exhausted { attempts: u32 },
}

/// Live monitor for one subject.
///
/// Created through [`crate::Monitor::session`]. `start()` spawns a driver
/// task that performs the historical lookup, then follows the live stream
/// with reconnect/backoff until a terminal status, an explicit end, retry
/// exhaustion, or `stop()`. Dropping the session stops it.
pub struct MonitorSession {
    subject: Subject,
    session_id: uuid::Uuid,
    options: MonitorOptions,
    backend: Arc<dyn MonitorBackend>,
    state_tx: Arc<watch::Sender<SessionState>>,
    state_rx: watch::Receiver<SessionState>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    stop_tx: Option<watch::Sender<bool>>,
    driver: Option<JoinHandle<()>>,
}

impl MonitorSession {
    pub(crate) fn new(
        subject: Subject,
        backend: Arc<dyn MonitorBackend>,
        options: MonitorOptions,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        // Capacity is nonzero: every public construction path runs
        // `MonitorOptions::validate` first.
        let (events_tx, events_rx) = mpsc::channel(options.event_buffer_capacity);
        Self {
            subject,
            session_id: uuid::Uuid::new_v4(),
            options,
            backend,
            state_tx: Arc::new(state_tx),
            state_rx,
            events_tx,
            events_rx,
            stop_tx: None,
            driver: None,
        }
    }

    /// Returns the watched subject.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Returns the session id used for log correlation.
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns a receiver for observing session state changes.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Returns a clone of the current session state.
    pub fn snapshot(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Starts the session driver.
    ///
    /// Calling `start()` while the session is already running is a no-op.
    pub fn start(&mut self) {
        if self.driver.is_some() {
            debug!(session_id = %self.session_id, subject = %self.subject, "start ignored; session already running");
            return;
        }
        info!(session_id = %self.session_id, subject = %self.subject, "starting monitor session");
        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = Driver {
            subject: self.subject.clone(),
            session_id: self.session_id,
            backend: self.backend.clone(),
            options: self.options.clone(),
            state: self.state_tx.clone(),
            events: self.events_tx.clone(),
            stop: stop_rx,
            completion_sent: false,
        };
        self.stop_tx = Some(stop_tx);
        self.driver = Some(tokio::spawn(driver.run()));
    }

    /// Waits for and returns the next session notification.
    ///
    /// Buffered notifications survive `stop()`; `reset()` discards them.
    /// Notifications that arrive while the buffer is full are dropped, so a
    /// consumer that only watches [`MonitorSession::state`] never stalls
    /// the driver.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Returns the next notification if one is already buffered.
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Stops the session, cancelling any pending reconnect and releasing the
    /// live connection.
    ///
    /// Idempotent; also invoked on drop.
    pub fn stop(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        driver.abort();
        self.state_tx.send_modify(|state| {
            if state.connection != ConnectionState::Idle {
                state.connection = ConnectionState::Closed;
            }
            state.is_loading = false;
        });
        info!(session_id = %self.session_id, subject = %self.subject, "monitor session stopped");
    }

    /// Stops the session and clears all accumulated state so the same
    /// session can be started again from scratch.
    pub fn reset(&mut self) {
        self.stop();
        while self.events_rx.try_recv().is_ok() {}
        self.state_tx
            .send_modify(|state| *state = SessionState::default());
        debug!(session_id = %self.session_id, subject = %self.subject, "monitor session reset");
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.stop();
    }
}

enum PumpEnd {
    Disconnected,
    Terminal,
    Stopped,
}

struct Driver {
    subject: Subject,
    session_id: uuid::Uuid,
    backend: Arc<dyn MonitorBackend>,
    options: MonitorOptions,
    state: Arc<watch::Sender<SessionState>>,
    events: mpsc::Sender<SessionEvent>,
    stop: watch::Receiver<bool>,
    completion_sent: bool,
}

impl Driver {
    async fn run(mut self) {
        if self.state.borrow().terminal_reached {
            debug!(session_id = %self.session_id, subject = %self.subject, "subject already terminal; nothing to drive");
            return;
        }

        self.update(|state| {
            state.mode = SessionMode::Historical;
            state.is_loading = true;
            state.error = None;
        });

        match self.backend.fetch_finished(&self.subject).await {
            Ok(HistoricalOutcome::Finished(record)) => {
                info!(
                    session_id = %self.session_id,
                    subject = %self.subject,
                    status = ?record.status.status,
                    "subject already finished; serving stored outcome"
                );
                let max_lines = self.options.max_lines;
                self.update(|state| {
                    state.lines = Vec::new();
                    if !record.logs.is_empty() {
                        push_lines(state, &record.logs, max_lines);
                    }
                    state.status = Some(record.status);
                    state.terminal_reached = true;
                    state.connection = ConnectionState::Closed;
                    state.is_loading = false;
                });
                return;
            }
            Ok(HistoricalOutcome::InProgress) => {
                debug!(session_id = %self.session_id, subject = %self.subject, "subject still in progress; going live");
            }
            Err(err) => {
                warn!(session_id = %self.session_id, subject = %self.subject, error = %err, "history lookup failed; going live anyway");
                self.emit(SessionEvent::Error { error: err.into() });
            }
        }

        self.update(|state| state.mode = SessionMode::Live);
        self.live_loop().await;
    }

    async fn live_loop(&mut self) {
        loop {
            self.update(|state| state.connection = ConnectionState::Connecting);

            let connected = tokio::select! {
                biased;
                _ = self.stop.changed() => return,
                result = self.backend.connect(&self.subject) => result,
            };

            let feed = match connected {
                Ok(feed) => feed,
                Err(err) => {
                    warn!(
                        session_id = %self.session_id,
                        subject = %self.subject,
                        attempts = self.state.borrow().reconnect_attempts,
                        error = %err,
                        "live connect failed"
                    );
                    self.emit(SessionEvent::Error { error: err.into() });
                    if !self.backoff_then_retry().await {
                        return;
                    }
                    continue;
                }
            };

            info!(session_id = %self.session_id, subject = %self.subject, "live stream open");
            self.update(|state| {
                state.connection = ConnectionState::Open;
                state.reconnect_attempts = 0;
                state.is_loading = false;
            });

            match self.pump(feed).await {
                PumpEnd::Terminal | PumpEnd::Stopped => return,
                PumpEnd::Disconnected => {
                    self.update(|state| state.connection = ConnectionState::Closed);
                    if !self.backoff_then_retry().await {
                        return;
                    }
                }
            }
        }
    }

    /// Waits out the backoff delay before the next connection attempt.
    ///
    /// Returns `false` when the retry budget is spent or a stop arrived
    /// during the wait.
    async fn backoff_then_retry(&mut self) -> bool {
        let attempts = self.state.borrow().reconnect_attempts;
        if !self.options.reconnect.can_retry(attempts) {
            warn!(session_id = %self.session_id, subject = %self.subject, attempts, "reconnect attempts exhausted");
            self.update(|state| {
                state.connection = ConnectionState::Closed;
                state.is_loading = false;
                state.error = Some(SessionError::Exhausted { attempts }.to_string());
            });
            self.emit(SessionEvent::Exhausted { attempts });
            return false;
        }

        let delay = self.options.reconnect.delay_for(attempts);
        debug!(
            session_id = %self.session_id,
            subject = %self.subject,
            attempt = attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        self.update(|state| {
            state.reconnect_attempts += 1;
            state.connection = ConnectionState::Connecting;
        });

        tokio::select! {
            biased;
            _ = self.stop.changed() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn pump(&mut self, mut feed: LiveFeed) -> PumpEnd {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.stop.changed() => return PumpEnd::Stopped,
                frame = feed.frames.next() => frame,
            };

            match frame {
                Some(Ok(raw)) => {
                    let event = match classify(&raw) {
                        Ok(event) => event,
                        Err(err) => {
                            debug!(session_id = %self.session_id, subject = %self.subject, error = %err, "discarding unclassifiable frame");
                            continue;
                        }
                    };
                    if let Some(end) = self.apply(event) {
                        return end;
                    }
                }
                Some(Err(err)) => {
                    warn!(session_id = %self.session_id, subject = %self.subject, error = %err, "live stream read failed");
                    self.emit(SessionEvent::Error { error: err.into() });
                    return PumpEnd::Disconnected;
                }
                None => {
                    debug!(session_id = %self.session_id, subject = %self.subject, "live stream closed");
                    return PumpEnd::Disconnected;
                }
            }
        }
    }

    /// Applies one classified event; returns how pumping should end, if at
    /// all.
    fn apply(&mut self, event: StreamEvent) -> Option<PumpEnd> {
        if self.state.borrow().terminal_reached {
            debug!(session_id = %self.session_id, subject = %self.subject, "ignoring event past terminal state");
            return None;
        }
        match event {
            StreamEvent::Log { line } => {
                let max_lines = self.options.max_lines;
                self.update(|state| push_lines(state, &line, max_lines));
                None
            }
            StreamEvent::Status { snapshot } => self.apply_status(snapshot),
            StreamEvent::Error { message } => {
                warn!(session_id = %self.session_id, subject = %self.subject, message = %message, "upstream error event");
                self.emit(SessionEvent::Error {
                    error: SessionError::upstream(message),
                });
                None
            }
            StreamEvent::End { message } => {
                info!(session_id = %self.session_id, subject = %self.subject, "server ended the stream");
                self.update(|state| {
                    state.terminal_reached = true;
                    state.connection = ConnectionState::Closed;
                    state.is_loading = false;
                });
                self.emit(SessionEvent::Ended { message });
                Some(PumpEnd::Terminal)
            }
        }
    }

    fn apply_status(&mut self, snapshot: StatusSnapshot) -> Option<PumpEnd> {
        let previous = self.state.borrow().status.as_ref().map(|s| s.status);
        if let Some(previous) = previous
            && !snapshot.status.can_follow(previous)
        {
            warn!(
                session_id = %self.session_id,
                subject = %self.subject,
                previous = ?previous,
                received = ?snapshot.status,
                "dropping out-of-order status event"
            );
            return None;
        }

        let terminal = snapshot.status.is_terminal();
        self.update(|state| {
            state.status = Some(snapshot.clone());
            if terminal {
                state.terminal_reached = true;
                state.connection = ConnectionState::Closed;
                state.is_loading = false;
            }
        });
        if !terminal {
            return None;
        }

        match snapshot.status {
            DeployState::Success => {
                if !self.completion_sent {
                    self.completion_sent = true;
                    info!(session_id = %self.session_id, subject = %self.subject, "subject completed");
                    self.emit(SessionEvent::Completed { status: snapshot });
                }
            }
            DeployState::Failed => {
                let message = snapshot
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "deployment failed".to_string());
                warn!(session_id = %self.session_id, subject = %self.subject, message = %message, "subject failed");
                self.update(|state| state.error = Some(message.clone()));
                self.emit(SessionEvent::Failed { message });
            }
            _ => {}
        }
        Some(PumpEnd::Terminal)
    }

    /// Mutates the published state unless a stop has been requested.
    ///
    /// `MonitorSession::stop` flips the flag before writing its own final
    /// state, and the check runs under the watch write lock, so a driver
    /// poll racing the teardown cannot land a mutation afterwards.
    fn update(&self, mutate: impl FnOnce(&mut SessionState)) {
        let stop = &self.stop;
        self.state.send_modify(|state| {
            if !*stop.borrow() {
                mutate(state);
            }
        });
    }

    /// Queues a notification without ever blocking the driver.
    fn emit(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(session_id = %self.session_id, ?event, "event buffer full; dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(session_id = %self.session_id, "session event receiver dropped");
            }
        }
    }
}

/// Appends a raw log payload, splitting embedded newlines, bumping the
/// `lines_seen` counter, and enforcing the rolling cap.
fn push_lines(state: &mut SessionState, raw: &str, max_lines: Option<usize>) {
    let before = state.lines.len();
    if raw.is_empty() {
        state.lines.push(String::new());
    } else {
        state.lines.extend(raw.lines().map(ToOwned::to_owned));
    }
    state.lines_seen += (state.lines.len() - before) as u64;
    if let Some(cap) = max_lines
        && state.lines.len() > cap
    {
        let excess = state.lines.len() - cap;
        state.lines.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use crate::transport::FinishedRecord;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum ConnectScript {
        Fail(TransportError),
        Frames(Vec<Result<String, TransportError>>),
        FramesThenPending(Vec<Result<String, TransportError>>),
        Pending,
    }

    struct FakeBackend {
        history: Result<HistoricalOutcome, TransportError>,
        scripts: Mutex<VecDeque<ConnectScript>>,
        history_calls: Arc<AtomicUsize>,
        connect_calls: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        fn new(
            history: Result<HistoricalOutcome, TransportError>,
            scripts: Vec<ConnectScript>,
        ) -> Self {
            Self {
                history,
                scripts: Mutex::new(scripts.into()),
                history_calls: Arc::new(AtomicUsize::new(0)),
                connect_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn in_progress(scripts: Vec<ConnectScript>) -> Self {
            Self::new(Ok(HistoricalOutcome::InProgress), scripts)
        }

        fn finished(record: FinishedRecord) -> Self {
            Self::new(Ok(HistoricalOutcome::Finished(record)), Vec::new())
        }
    }

    #[async_trait::async_trait]
    impl MonitorBackend for FakeBackend {
        async fn fetch_finished(
            &self,
            _subject: &Subject,
        ) -> Result<HistoricalOutcome, TransportError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            self.history.clone()
        }

        async fn connect(&self, _subject: &Subject) -> Result<LiveFeed, TransportError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().expect("scripts lock").pop_front();
            match script {
                Some(ConnectScript::Fail(err)) => Err(err),
                Some(ConnectScript::Frames(frames)) => Ok(LiveFeed {
                    frames: Box::pin(stream::iter(frames)),
                }),
                Some(ConnectScript::FramesThenPending(frames)) => Ok(LiveFeed {
                    frames: Box::pin(stream::iter(frames).chain(stream::pending())),
                }),
                Some(ConnectScript::Pending) => Ok(LiveFeed {
                    frames: Box::pin(stream::pending()),
                }),
                None => Err(TransportError::io("no scripted connection left")),
            }
        }
    }

    fn fail() -> ConnectScript {
        ConnectScript::Fail(TransportError::io("connection refused"))
    }

    fn log_frame(line: &str) -> Result<String, TransportError> {
        Ok(serde_json::json!({"type": "log", "data": line}).to_string())
    }

    fn status_frame(status: &str, progress: u8) -> Result<String, TransportError> {
        Ok(
            serde_json::json!({"type": "status", "data": {"status": status, "progress": progress}})
                .to_string(),
        )
    }

    fn failed_frame(message: &str) -> Result<String, TransportError> {
        Ok(serde_json::json!({
            "type": "status",
            "data": {"status": "failed", "progress": 80, "errorMessage": message}
        })
        .to_string())
    }

    fn error_frame(message: &str) -> Result<String, TransportError> {
        Ok(serde_json::json!({"type": "error", "data": message}).to_string())
    }

    fn end_frame() -> Result<String, TransportError> {
        Ok(serde_json::json!({"type": "end"}).to_string())
    }

    fn session_with(backend: FakeBackend, options: MonitorOptions) -> MonitorSession {
        MonitorSession::new(Subject::deployment("dep-1"), Arc::new(backend), options)
    }

    #[tokio::test(start_paused = true)]
    async fn completes_exactly_once_for_duplicate_success_frames() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Frames(vec![
            status_frame("building", 50),
            status_frame("success", 100),
            status_frame("success", 100),
            log_frame("late line"),
        ])]);
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.terminal_reached)
            .await
            .expect("terminal state");

        let first = session.next_event().await.expect("completion event");
        assert!(
            matches!(first, SessionEvent::Completed { ref status } if status.status == DeployState::Success)
        );
        let extra = tokio::time::timeout(Duration::from_secs(5), session.next_event()).await;
        assert!(extra.is_err(), "expected no further events, got {extra:?}");

        let snapshot = session.snapshot();
        assert!(snapshot.terminal_reached);
        assert!(!snapshot.lines.iter().any(|line| line.contains("late")));
    }

    #[tokio::test]
    async fn ignores_events_after_a_terminal_status() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Frames(vec![
            status_frame("success", 100),
            log_frame("should not appear"),
            status_frame("building", 10),
        ])]);
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.terminal_reached)
            .await
            .expect("terminal state");

        let snapshot = session.snapshot();
        assert!(snapshot.lines.is_empty());
        assert_eq!(
            snapshot.status.map(|s| s.status),
            Some(DeployState::Success)
        );
        assert_eq!(snapshot.connection, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn drops_regressive_status_events() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Frames(vec![
            status_frame("deploying", 80),
            status_frame("building", 40),
            end_frame(),
        ])]);
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.terminal_reached)
            .await
            .expect("terminal state");

        let snapshot = session.snapshot();
        let status = snapshot.status.expect("status");
        assert_eq!(status.status, DeployState::Deploying);
        assert_eq!(status.progress, 80);
        assert_eq!(
            session.next_event().await,
            Some(SessionEvent::Ended { message: None })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_exhausting_reconnect_attempts() {
        let backend =
            FakeBackend::in_progress(vec![fail(), fail(), fail(), fail(), fail(), fail()]);
        let connect_calls = backend.connect_calls.clone();
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut transport_errors = 0;
        let attempts = loop {
            match session.next_event().await {
                Some(SessionEvent::Error {
                    error: SessionError::Transport { .. },
                }) => transport_errors += 1,
                Some(SessionEvent::Exhausted { attempts }) => break attempts,
                other => panic!("unexpected event: {other:?}"),
            }
        };

        assert_eq!(attempts, 5);
        assert_eq!(transport_errors, 6);
        assert_eq!(connect_calls.load(Ordering::SeqCst), 6);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Closed);
        assert!(
            snapshot
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("5 reconnect attempts")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn undrained_event_buffer_never_stalls_the_live_tail() {
        let backend = FakeBackend::in_progress(vec![
            fail(),
            fail(),
            ConnectScript::FramesThenPending(vec![log_frame("still alive")]),
        ]);
        let options = MonitorOptions {
            event_buffer_capacity: 1,
            ..MonitorOptions::default()
        };
        let mut session = session_with(backend, options);
        session.start();

        // Nobody drains events here; the second connect failure overflows
        // the one-slot buffer and gets dropped instead of queued.
        let mut state = session.state();
        state
            .wait_for(|s| !s.lines.is_empty())
            .await
            .expect("live line");

        assert_eq!(session.snapshot().lines, vec!["still alive".to_string()]);
        assert!(matches!(
            session.try_next_event(),
            Some(SessionEvent::Error { .. })
        ));
        assert_eq!(session.try_next_event(), None);
        session.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_resets_the_attempt_counter() {
        let backend = FakeBackend::in_progress(vec![
            fail(),
            ConnectScript::FramesThenPending(vec![log_frame("back online")]),
        ]);
        let connect_calls = backend.connect_calls.clone();
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.connection == ConnectionState::Open && s.reconnect_attempts == 0)
            .await
            .expect("reconnected");
        state
            .wait_for(|s| !s.lines.is_empty())
            .await
            .expect("live line");

        assert_eq!(session.snapshot().lines, vec!["back online".to_string()]);
        assert_eq!(connect_calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            session.next_event().await,
            Some(SessionEvent::Error {
                error: SessionError::Transport { .. }
            })
        ));
        session.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stream_read_errors_trigger_reconnect() {
        let backend = FakeBackend::in_progress(vec![
            ConnectScript::Frames(vec![
                log_frame("a"),
                Err(TransportError::io("reset by peer")),
            ]),
            ConnectScript::FramesThenPending(vec![log_frame("b")]),
        ]);
        let connect_calls = backend.connect_calls.clone();
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.lines.len() == 2)
            .await
            .expect("both lines");

        let snapshot = session.snapshot();
        assert_eq!(snapshot.lines, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(snapshot.reconnect_attempts, 0);
        assert_eq!(connect_calls.load(Ordering::SeqCst), 2);
        session.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_a_pending_reconnect() {
        let backend = FakeBackend::in_progress(vec![fail(), ConnectScript::Pending]);
        let connect_calls = backend.connect_calls.clone();
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.reconnect_attempts == 1)
            .await
            .expect("reconnect scheduled");
        session.stop();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.snapshot().connection, ConnectionState::Closed);
    }

    #[test]
    fn stopped_driver_no_longer_mutates_state() {
        let (state_tx, _state_rx) = watch::channel(SessionState::default());
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let driver = Driver {
            subject: Subject::deployment("dep-1"),
            session_id: uuid::Uuid::new_v4(),
            backend: Arc::new(FakeBackend::in_progress(Vec::new())),
            options: MonitorOptions::default(),
            state: Arc::new(state_tx),
            events: events_tx,
            stop: stop_rx,
            completion_sent: false,
        };

        driver.update(|state| state.lines.push("before stop".into()));
        assert_eq!(driver.state.borrow().lines, vec!["before stop".to_string()]);

        stop_tx.send(true).expect("stop flag");
        driver.update(|state| state.lines.push("after stop".into()));
        assert_eq!(driver.state.borrow().lines, vec!["before stop".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn historical_complete_never_opens_a_live_connection() {
        let record = FinishedRecord {
            status: StatusSnapshot {
                status: DeployState::Success,
                stage: None,
                progress: 100,
                error_message: None,
                duration_seconds: Some(33),
            },
            logs: "step 1\nstep 2\nstep 3".into(),
        };
        let backend = FakeBackend::finished(record);
        let history_calls = backend.history_calls.clone();
        let connect_calls = backend.connect_calls.clone();
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.terminal_reached)
            .await
            .expect("terminal state");

        let snapshot = session.snapshot();
        assert_eq!(connect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(history_calls.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.mode, SessionMode::Historical);
        assert_eq!(snapshot.connection, ConnectionState::Closed);
        assert_eq!(snapshot.lines, vec!["step 1", "step 2", "step 3"]);
        assert_eq!(snapshot.lines_seen, 3);
        assert!(!snapshot.is_loading);

        // Opening an already-finished subject is a read, not a completion.
        let extra = tokio::time::timeout(Duration::from_secs(5), session.next_event()).await;
        assert!(extra.is_err(), "expected no events, got {extra:?}");
    }

    #[tokio::test]
    async fn start_is_idempotent_while_running() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Pending]);
        let history_calls = backend.history_calls.clone();
        let connect_calls = backend.connect_calls.clone();
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.connection == ConnectionState::Open)
            .await
            .expect("open");

        session.start();
        assert_eq!(history_calls.load(Ordering::SeqCst), 1);
        assert_eq!(connect_calls.load(Ordering::SeqCst), 1);
        session.stop();
    }

    #[tokio::test]
    async fn reset_clears_state_and_allows_reuse() {
        let backend = FakeBackend::in_progress(vec![
            ConnectScript::FramesThenPending(vec![log_frame("first run")]),
            ConnectScript::FramesThenPending(vec![log_frame("second run")]),
        ]);
        let history_calls = backend.history_calls.clone();
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| !s.lines.is_empty())
            .await
            .expect("first line");

        session.reset();
        assert_eq!(session.snapshot(), SessionState::default());
        assert_eq!(session.try_next_event(), None);

        session.start();
        let mut state = session.state();
        state
            .wait_for(|s| !s.lines.is_empty())
            .await
            .expect("second line");
        assert_eq!(session.snapshot().lines, vec!["second run".to_string()]);
        assert_eq!(history_calls.load(Ordering::SeqCst), 2);
        session.stop();
    }

    #[tokio::test]
    async fn rolling_line_cap_keeps_the_newest_lines() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Frames(vec![
            log_frame("l1\nl2"),
            log_frame("l3"),
            log_frame("l4"),
            end_frame(),
        ])]);
        let options = MonitorOptions {
            max_lines: Some(3),
            ..MonitorOptions::default()
        };
        let mut session = session_with(backend, options);
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.terminal_reached)
            .await
            .expect("terminal state");
        let snapshot = session.snapshot();
        assert_eq!(snapshot.lines, vec!["l2", "l3", "l4"]);
        // The counter keeps counting past evicted lines.
        assert_eq!(snapshot.lines_seen, 4);
    }

    #[tokio::test]
    async fn multiline_and_blank_log_frames_split_into_lines() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Frames(vec![
            log_frame("a\r\nb"),
            log_frame(""),
            end_frame(),
        ])]);
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.terminal_reached)
            .await
            .expect("terminal state");
        assert_eq!(session.snapshot().lines, vec!["a", "b", ""]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_emits_failed_and_latches_the_error() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Frames(vec![failed_frame(
            "build broke",
        )])]);
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        assert_eq!(
            session.next_event().await,
            Some(SessionEvent::Failed {
                message: "build broke".into()
            })
        );
        let extra = tokio::time::timeout(Duration::from_secs(5), session.next_event()).await;
        assert!(extra.is_err(), "expected no completion, got {extra:?}");

        let snapshot = session.snapshot();
        assert_eq!(snapshot.status.map(|s| s.status), Some(DeployState::Failed));
        assert_eq!(snapshot.error.as_deref(), Some("build broke"));
    }

    #[tokio::test]
    async fn upstream_errors_do_not_touch_status_or_latch() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Frames(vec![
            status_frame("building", 40),
            error_frame("disk almost full"),
            log_frame("retrying"),
            end_frame(),
        ])]);
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.terminal_reached)
            .await
            .expect("terminal state");

        assert_eq!(
            session.next_event().await,
            Some(SessionEvent::Error {
                error: SessionError::upstream("disk almost full")
            })
        );
        assert_eq!(
            session.next_event().await,
            Some(SessionEvent::Ended { message: None })
        );

        let snapshot = session.snapshot();
        assert_eq!(
            snapshot.status.map(|s| s.status),
            Some(DeployState::Building)
        );
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.lines, vec!["retrying".to_string()]);
    }

    #[tokio::test]
    async fn history_failure_still_goes_live() {
        let backend = FakeBackend::new(
            Err(TransportError::backend("boom", Some(500))),
            vec![ConnectScript::FramesThenPending(vec![log_frame(
                "live data",
            )])],
        );
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        assert!(matches!(
            session.next_event().await,
            Some(SessionEvent::Error {
                error: SessionError::Transport { message }
            }) if message.contains("boom")
        ));

        let mut state = session.state();
        state
            .wait_for(|s| !s.lines.is_empty())
            .await
            .expect("live line");
        let snapshot = session.snapshot();
        assert_eq!(snapshot.mode, SessionMode::Live);
        assert_eq!(snapshot.lines, vec!["live data".to_string()]);
        session.stop();
    }

    #[tokio::test]
    async fn unclassifiable_frames_are_discarded() {
        let backend = FakeBackend::in_progress(vec![ConnectScript::Frames(vec![
            Ok("}{ not json".into()),
            log_frame("good"),
            end_frame(),
        ])]);
        let mut session = session_with(backend, MonitorOptions::default());
        session.start();

        let mut state = session.state();
        state
            .wait_for(|s| s.terminal_reached)
            .await
            .expect("terminal state");
        assert_eq!(session.snapshot().lines, vec!["good".to_string()]);
        assert_eq!(
            session.next_event().await,
            Some(SessionEvent::Ended { message: None })
        );
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let backend = FakeBackend::in_progress(Vec::new());
        let mut session = session_with(backend, MonitorOptions::default());
        session.stop();
        assert_eq!(session.snapshot(), SessionState::default());
    }
}
