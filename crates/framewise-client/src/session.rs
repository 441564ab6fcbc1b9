//! Session orchestrator.
//!
//! A [`Session`] joins one meeting. It owns the [`Connection`], the
//! [`EventDispatcher`] and the receiving end of the outbound bridge, and
//! drives them from a single task:
//!
//! ```text
//! Idle -> Connecting -> Running -> Stopping -> Stopped
//!             ^            |
//!             +------------+   unexpected disconnect, after backoff
//!
//! Running -> Stopping -> Rejected   on connection_rejected
//! ```
//!
//! A rejection is final: the session never reconnects after one.
//!
//! # Example
//!
//! ```no_run
//! use framewise_client::{ClientConfig, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::builder(ClientConfig::load()?)
//!     .meeting_id("weekly-sync")
//!     .build()?;
//!
//! let sender = session.sender();
//! session.on_invoke(move |transcript| {
//!     sender
//!         .send_text(format!("You said: {}", transcript.text), true)
//!         .try_result()
//!         .transpose()?;
//!     Ok(())
//! });
//!
//! session.run().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use framewise_core::EventKind;
use framewise_protocol::{
    ConnectionRejected, InboundEvent, ParticipantEvent, TranscriptContent, UiElementResponse,
    decode_envelope_with_limit, decode_event, encode_with_limit,
};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::bridge::{OutboundRequest, OutboundSender};
use crate::config::ClientConfig;
use crate::connection::{Backoff, Connection};
use crate::dispatcher::{EventDispatcher, Handler, HandlerId, Payload};
use crate::error::{HandlerResult, SendError, SessionError, SessionResult};
use crate::shutdown::ShutdownHandle;
use crate::transport::{BoxFuture, Transport, WsTransport};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built but not started.
    Idle,
    /// Opening (or reopening) the socket.
    Connecting,
    /// Receiving and dispatching events.
    Running,
    /// Closing down.
    Stopping,
    /// Stopped on request or after the socket was lost for good.
    Stopped,
    /// The service rejected the connection. Terminal.
    Rejected,
}

impl SessionState {
    /// Returns true for states the session never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Rejected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// Shutdown was requested.
    Stopped,
    /// The service rejected the connection.
    Rejected(ConnectionRejected),
    /// The socket was lost and reconnecting is disabled.
    Disconnected,
}

/// Checks an API key once before the first connect.
pub trait Authenticator: Send + Sync {
    /// Returns `Ok(true)` if the key is valid.
    fn authenticate<'a>(&'a self, api_key: &'a str) -> BoxFuture<'a, Result<bool, String>>;
}

impl<F, Fut> Authenticator for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, String>> + Send + 'static,
{
    fn authenticate<'a>(&'a self, api_key: &'a str) -> BoxFuture<'a, Result<bool, String>> {
        Box::pin(self(api_key.to_string()))
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: ClientConfig,
    meeting_id: Option<String>,
    authenticator: Option<Arc<dyn Authenticator>>,
    shutdown: Option<ShutdownHandle>,
    dispatcher: Option<Arc<EventDispatcher>>,
}

impl SessionBuilder {
    /// Sets the meeting to join.
    pub fn meeting_id(mut self, meeting_id: impl Into<String>) -> Self {
        self.meeting_id = Some(meeting_id.into());
        self
    }

    /// Sets the API key check run once at startup.
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Uses an existing shutdown handle instead of a fresh one.
    pub fn shutdown_handle(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Shares handler registrations with another session.
    pub fn dispatcher(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Builds a session on a WebSocket transport.
    pub fn build(self) -> SessionResult<Session<WsTransport>> {
        let transport = WsTransport::new(self.config.connection.connect_timeout());
        self.build_with_transport(transport)
    }

    /// Builds a session on the given transport.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> SessionResult<Session<T>> {
        let meeting_id = self
            .meeting_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SessionError::Config("a meeting ID is required".into()))?;
        let api_key = self.config.api_key()?;
        let url = self.config.meeting_url(&meeting_id)?;

        let reconnect = &self.config.reconnect;
        let connection = Connection::new(transport, url)
            .with_backoff(Backoff::new(reconnect.initial_delay(), reconnect.max_delay()));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let span = info_span!(
            "session",
            meeting_id = %meeting_id,
            session_id = tracing::field::Empty
        );

        Ok(Session {
            meeting_id: Arc::from(meeting_id),
            api_key,
            reconnect_enabled: reconnect.enabled,
            max_frame_bytes: self.config.connection.max_frame_bytes,
            connection,
            dispatcher: self.dispatcher.unwrap_or_default(),
            authenticator: self.authenticator,
            outbound_tx,
            outbound_rx,
            state_tx,
            shutdown: self.shutdown.unwrap_or_default(),
            span,
        })
    }
}

/// Why the running loop returned.
enum LoopEnd {
    Shutdown,
    Disconnected,
    Rejected(ConnectionRejected),
}

/// A client session for one meeting.
pub struct Session<T: Transport = WsTransport> {
    meeting_id: Arc<str>,
    api_key: Option<String>,
    reconnect_enabled: bool,
    max_frame_bytes: usize,
    connection: Connection<T>,
    dispatcher: Arc<EventDispatcher>,
    authenticator: Option<Arc<dyn Authenticator>>,
    outbound_tx: mpsc::UnboundedSender<OutboundRequest>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundRequest>,
    state_tx: watch::Sender<SessionState>,
    shutdown: ShutdownHandle,
    span: Span,
}

impl Session<WsTransport> {
    /// Starts building a session.
    pub fn builder(config: ClientConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            meeting_id: None,
            authenticator: None,
            shutdown: None,
            dispatcher: None,
        }
    }
}

impl<T: Transport> Session<T> {
    /// Returns the meeting this session joins.
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// Returns the handler registry.
    pub fn dispatcher(&self) -> Arc<EventDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Returns a handle for sending messages from anywhere.
    pub fn sender(&self) -> OutboundSender {
        OutboundSender::new(
            self.outbound_tx.clone(),
            Arc::clone(&self.meeting_id),
            self.state_tx.subscribe(),
        )
    }

    /// Returns the handle that stops this session.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Watches the session state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Registers a handler for `kind`.
    pub fn on(&self, kind: impl Into<EventKind>, handler: Handler) -> HandlerId {
        self.dispatcher.register(kind, handler)
    }

    /// Removes a handler.
    pub fn off(&self, kind: impl Into<EventKind>, id: HandlerId) -> bool {
        self.dispatcher.unregister(kind, id)
    }

    /// Registers a suspending handler for `kind`.
    pub fn on_async<F, Fut>(&self, kind: impl Into<EventKind>, f: F) -> HandlerId
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on(kind, Handler::suspending(std::any::type_name::<F>(), f))
    }

    /// Called when a participant joins.
    pub fn on_join<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&ParticipantEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let name = std::any::type_name::<F>();
        self.on(
            EventKind::Join,
            Handler::sync(name, move |event| match event {
                InboundEvent::Join(participant) => f(participant),
                _ => Ok(()),
            }),
        )
    }

    /// Called when a participant leaves.
    pub fn on_exit<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&ParticipantEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let name = std::any::type_name::<F>();
        self.on(
            EventKind::Exit,
            Handler::sync(name, move |event| match event {
                InboundEvent::Exit(participant) => f(participant),
                _ => Ok(()),
            }),
        )
    }

    /// Called for every transcript fragment.
    pub fn on_transcript<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&TranscriptContent) -> HandlerResult + Send + Sync + 'static,
    {
        let name = std::any::type_name::<F>();
        self.on(
            EventKind::Transcript,
            Handler::sync(name, move |event| match event {
                InboundEvent::Transcript(transcript) => f(transcript),
                _ => Ok(()),
            }),
        )
    }

    /// Called for final transcripts that expect an answer.
    pub fn on_invoke<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&TranscriptContent) -> HandlerResult + Send + Sync + 'static,
    {
        let name = std::any::type_name::<F>();
        self.on(
            EventKind::Invoke,
            Handler::sync(name, move |event| match event {
                InboundEvent::Invoke(transcript) => f(transcript),
                _ => Ok(()),
            }),
        )
    }

    /// Called for custom UI responses whose subtype has no handler of its own.
    pub fn on_custom_ui_response<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&UiElementResponse) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_ui(EventKind::CustomUiResponse, f)
    }

    /// Called for responses of one UI element subtype, e.g. `"mcq_question"`.
    pub fn on_ui_element<F>(&self, element_type: &str, f: F) -> HandlerId
    where
        F: Fn(&UiElementResponse) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_ui(EventKind::from_name(element_type), f)
    }

    fn on_ui<F>(&self, kind: EventKind, f: F) -> HandlerId
    where
        F: Fn(&UiElementResponse) -> HandlerResult + Send + Sync + 'static,
    {
        let name = std::any::type_name::<F>();
        self.on(
            kind,
            Handler::sync(name, move |event| match event.ui_response() {
                Some(response) => f(response),
                None => Ok(()),
            }),
        )
    }

    /// Called when the service rejects the connection.
    pub fn on_connection_rejected<F>(&self, f: F) -> HandlerId
    where
        F: Fn(&ConnectionRejected) -> HandlerResult + Send + Sync + 'static,
    {
        let name = std::any::type_name::<F>();
        self.on(
            EventKind::ConnectionRejected,
            Handler::sync(name, move |event| match event {
                InboundEvent::ConnectionRejected(rejection) => f(rejection),
                _ => Ok(()),
            }),
        )
    }

    /// Runs the session until it is stopped, rejected, or (with reconnect
    /// disabled) disconnected.
    ///
    /// # Errors
    ///
    /// [`SessionError::Authentication`] if the API key check fails, and
    /// [`SessionError::Connect`] if connecting fails while reconnecting is
    /// disabled.
    pub async fn run(mut self) -> SessionResult<SessionExit> {
        let span = self.span.clone();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> SessionResult<SessionExit> {
        let checked = check_api_key(self.api_key.as_deref(), self.authenticator.as_deref()).await;
        if let Err(e) = checked {
            self.set_state(SessionState::Stopped);
            return Err(e);
        }
        self.install_default_rejection_handler();
        info!("session starting");

        loop {
            self.set_state(SessionState::Connecting);
            match self.connect_with_retry().await {
                Ok(true) => {}
                Ok(false) => return Ok(self.stop().await),
                Err(e) => {
                    self.fail_pending(|| SendError::SessionClosed);
                    self.set_state(SessionState::Stopped);
                    return Err(e);
                }
            }

            self.span.record("session_id", self.connection.session_id());
            self.set_state(SessionState::Running);

            match self.pump().await {
                LoopEnd::Shutdown => return Ok(self.stop().await),
                LoopEnd::Rejected(rejection) => {
                    self.set_state(SessionState::Stopping);
                    self.connection.disconnect().await;
                    self.fail_pending(|| SendError::SessionClosed);
                    self.set_state(SessionState::Rejected);
                    warn!(reason = %rejection.reason, "session rejected, not reconnecting");
                    return Ok(SessionExit::Rejected(rejection));
                }
                LoopEnd::Disconnected => {
                    if !self.reconnect_enabled {
                        self.connection_lost(SessionState::Stopping);
                        self.set_state(SessionState::Stopped);
                        info!("connection lost, reconnect disabled");
                        return Ok(SessionExit::Disconnected);
                    }
                    self.connection_lost(SessionState::Connecting);
                    let delay = self.connection.next_reconnect_delay();
                    info!(delay_secs = delay.as_secs(), "connection lost, reconnecting");
                    if !self.shutdown.sleep(delay).await {
                        return Ok(self.stop().await);
                    }
                }
            }
        }
    }

    fn install_default_rejection_handler(&self) {
        if self.dispatcher.has_handlers(&EventKind::ConnectionRejected) {
            return;
        }
        self.dispatcher.register(
            EventKind::ConnectionRejected,
            Handler::sync("default_connection_rejected", |event| {
                if let InboundEvent::ConnectionRejected(rejection) = event {
                    error!(
                        reason = %rejection.reason,
                        error_code = ?rejection.error_code,
                        "connection rejected by meeting service"
                    );
                }
                Ok(())
            }),
        );
    }

    /// Connects, retrying with backoff. Returns false if shut down first.
    async fn connect_with_retry(&mut self) -> SessionResult<bool> {
        loop {
            if self.shutdown.is_shutdown() {
                return Ok(false);
            }

            let shutdown = self.shutdown.triggered();
            let result = tokio::select! {
                result = self.connection.connect() => result,
                _ = shutdown => return Ok(false),
            };

            match result {
                Ok(()) => return Ok(true),
                Err(e) if !self.reconnect_enabled => return Err(e.into()),
                Err(_) => {
                    let delay = self.connection.next_reconnect_delay();
                    info!(delay_secs = delay.as_secs(), "retrying connect");
                    if !self.shutdown.sleep(delay).await {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Receives, dispatches and sends until the socket closes or the session ends.
    async fn pump(&mut self) -> LoopEnd {
        loop {
            if self.shutdown.is_shutdown() {
                return LoopEnd::Shutdown;
            }

            let shutdown = self.shutdown.triggered();
            tokio::select! {
                biased;
                _ = shutdown => return LoopEnd::Shutdown,
                Some(request) = self.outbound_rx.recv() => self.transmit(request).await,
                frame = self.connection.receive() => match frame {
                    Ok(text) => {
                        if let Some(rejection) = self.handle_frame(&text).await {
                            return LoopEnd::Rejected(rejection);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "connection lost");
                        return LoopEnd::Disconnected;
                    }
                },
            }
        }
    }

    /// Decodes one frame and dispatches it. Returns the rejection if the
    /// frame was one.
    async fn handle_frame(&mut self, text: &str) -> Option<ConnectionRejected> {
        let envelope = match decode_envelope_with_limit(text.as_bytes(), self.max_frame_bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "dropping undecodable frame");
                return None;
            }
        };
        debug!(kind = %envelope.kind, "received event");

        if envelope.kind != EventKind::ConnectionRejected {
            let kind = envelope.kind.clone();
            self.dispatch_while_sending(&kind, envelope.into()).await;
            return None;
        }

        let rejection = match decode_event(&envelope) {
            Ok(InboundEvent::ConnectionRejected(rejection)) => rejection,
            _ => {
                warn!(content = %envelope.content, "rejection without a readable reason");
                ConnectionRejected {
                    reason: "connection rejected".into(),
                    error_code: None,
                    meeting_id: Some(self.meeting_id.to_string()),
                }
            }
        };
        let event = InboundEvent::ConnectionRejected(rejection.clone());
        self.dispatch_while_sending(&EventKind::ConnectionRejected, event.into())
            .await;
        Some(rejection)
    }

    /// Dispatches one event while still writing queued sends, so a
    /// suspended handler can wait on its own ticket.
    async fn dispatch_while_sending(&mut self, kind: &EventKind, payload: Payload) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let dispatch = dispatcher.dispatch(kind, payload);
        tokio::pin!(dispatch);

        loop {
            tokio::select! {
                biased;
                summary = &mut dispatch => {
                    debug!(
                        kind = %summary.kind,
                        invoked = summary.invoked,
                        failed = summary.failed,
                        "dispatched"
                    );
                    return;
                }
                Some(request) = self.outbound_rx.recv() => self.transmit(request).await,
            }
        }
    }

    async fn transmit(&mut self, request: OutboundRequest) {
        let result = match encode_with_limit(&request.message, self.max_frame_bytes) {
            Ok(text) => self.connection.send(text).await,
            Err(e) => Err(SendError::Encode(e)),
        };
        match &result {
            Ok(()) => debug!(message_id = request.message.message_id(), "sent"),
            Err(e) => warn!(
                message_id = request.message.message_id(),
                error = %e,
                "send failed"
            ),
        }
        request.finish(result);
    }

    /// Leaves `Running` for `next`, then fails what was queued on the lost
    /// socket. Nothing scheduled after the drain can reach the queue.
    fn connection_lost(&mut self, next: SessionState) {
        self.set_state(next);
        self.fail_pending(|| SendError::NotConnected);
    }

    /// Fails every queued request.
    fn fail_pending(&mut self, error: impl Fn() -> SendError) {
        let mut failed = 0usize;
        while let Ok(request) = self.outbound_rx.try_recv() {
            request.finish(Err(error()));
            failed += 1;
        }
        if failed > 0 {
            debug!(failed, "failed queued sends");
        }
    }

    async fn stop(&mut self) -> SessionExit {
        self.set_state(SessionState::Stopping);
        self.connection.disconnect().await;
        self.fail_pending(|| SendError::SessionClosed);
        self.set_state(SessionState::Stopped);
        info!("session stopped");
        SessionExit::Stopped
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "session state");
        }
    }
}

/// Runs the API key check, if there is a key and a checker.
async fn check_api_key(
    api_key: Option<&str>,
    authenticator: Option<&dyn Authenticator>,
) -> SessionResult<()> {
    let Some(api_key) = api_key else {
        warn!("no API key configured, connecting unauthenticated");
        return Ok(());
    };
    let Some(authenticator) = authenticator else {
        debug!("no authenticator set, skipping API key check");
        return Ok(());
    };

    match authenticator.authenticate(api_key).await {
        Ok(true) => {
            debug!("API key accepted");
            Ok(())
        }
        Ok(false) => Err(SessionError::Authentication("API key rejected".into())),
        Err(e) => Err(SessionError::Authentication(e)),
    }
}
