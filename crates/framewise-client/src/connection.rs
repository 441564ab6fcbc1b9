//! One socket to the meeting service, with reconnect backoff.
//!
//! A [`Connection`] exclusively owns its [`Transport`]. It tracks whether the
//! socket is up, numbers every successful connect with a session ID, and
//! keeps the [`Backoff`] the session loop uses between attempts.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ConnectError, RecvError, SendError};
use crate::transport::Transport;

/// Socket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket is open.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// The socket is open.
    Connected,
    /// The socket is being closed.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Exponential reconnect delay.
///
/// Each call to [`Backoff::next_delay`] returns the current delay and doubles
/// it for the next call, up to the ceiling. [`Backoff::reset`] goes back to
/// the initial delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Backoff {
    /// Creates a backoff starting at `initial` and capped at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Returns the delay the next call to `next_delay` will return.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Goes back to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// A socket to one endpoint.
pub struct Connection<T: Transport> {
    transport: T,
    url: String,
    state: ConnectionState,
    backoff: Backoff,
    session_id: u64,
}

impl<T: Transport> Connection<T> {
    /// Creates a disconnected connection to `url`.
    pub fn new(transport: T, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            state: ConnectionState::Disconnected,
            backoff: Backoff::default(),
            session_id: 0,
        }
    }

    /// Builder: set the reconnect backoff.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true if the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Returns the ID of the current (or last) successful connect.
    ///
    /// Zero until the first connect succeeds.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Opens the socket.
    ///
    /// On success the backoff is reset and the session ID advances.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.is_connected() {
            return Err(ConnectError::AlreadyConnected);
        }

        self.state = ConnectionState::Connecting;
        debug!(url = %redact(&self.url), "connecting");
        match self.transport.open(&self.url).await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.session_id += 1;
                self.backoff.reset();
                info!(session_id = self.session_id, "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                warn!(error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Waits for the next text frame.
    ///
    /// Any error leaves the connection disconnected.
    pub async fn receive(&mut self) -> Result<String, RecvError> {
        if !self.is_connected() {
            return Err(RecvError::NotConnected);
        }
        let result = self.transport.next_frame().await;
        if let Err(ref e) = result {
            debug!(session_id = self.session_id, error = %e, "receive ended");
            self.state = ConnectionState::Disconnected;
        }
        result
    }

    /// Writes one text frame.
    pub async fn send(&mut self, text: String) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        self.transport.send_text(text).await
    }

    /// Closes the socket if it is open.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Closing;
        self.transport.close().await;
        self.state = ConnectionState::Disconnected;
        info!(session_id = self.session_id, "disconnected");
    }

    /// Returns the delay to wait before the next reconnect attempt.
    pub fn next_reconnect_delay(&mut self) -> Duration {
        self.backoff.next_delay()
    }
}

/// Strips the trailing API key segment from a URL for logging.
fn redact(url: &str) -> String {
    match url.match_indices("/ws/").next() {
        Some((idx, _)) => {
            let (origin, path) = url.split_at(idx + 4);
            match path.split_once('/') {
                Some((first, _)) => format!("{origin}{first}/***"),
                None => url.to_string(),
            }
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::transport::BoxFuture;

    /// What a scripted transport does on its next call.
    #[derive(Debug, Clone)]
    pub(crate) enum Step {
        /// `open` fails.
        RefuseConnect,
        /// `open` succeeds.
        Accept,
        /// `next_frame` yields this text.
        Frame(String),
        /// `next_frame` reports a close.
        Close,
    }

    /// Transport that replays a script and records what was sent.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) script: Arc<Mutex<VecDeque<Step>>>,
        pub(crate) sent: Arc<Mutex<Vec<String>>>,
        pub(crate) opens: Arc<Mutex<Vec<(String, tokio::time::Instant)>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            let transport = Self::default();
            transport.script.lock().unwrap().extend(steps);
            transport
        }

        pub(crate) fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn open_count(&self) -> usize {
            self.opens.lock().unwrap().len()
        }

        pub(crate) fn opened_urls(&self) -> Vec<String> {
            self.opens.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
        }

        pub(crate) fn open_times(&self) -> Vec<tokio::time::Instant> {
            self.opens.lock().unwrap().iter().map(|(_, at)| *at).collect()
        }

        fn pop(&self) -> Option<Step> {
            self.script.lock().unwrap().pop_front()
        }
    }

    impl Transport for ScriptedTransport {
        fn open<'a>(&'a mut self, url: &'a str) -> BoxFuture<'a, Result<(), ConnectError>> {
            Box::pin(async move {
                self.opens
                    .lock()
                    .unwrap()
                    .push((url.to_string(), tokio::time::Instant::now()));
                match self.pop() {
                    Some(Step::Accept) => Ok(()),
                    Some(Step::RefuseConnect) => Err(ConnectError::Transport("refused".into())),
                    // Nothing left to accept: hang like an unreachable host.
                    None => std::future::pending().await,
                    other => panic!("unexpected open, script has {other:?}"),
                }
            })
        }

        fn next_frame(&mut self) -> BoxFuture<'_, Result<String, RecvError>> {
            Box::pin(async move {
                match self.pop() {
                    Some(Step::Frame(text)) => Ok(text),
                    Some(Step::Close) => Err(RecvError::Closed {
                        code: 1000,
                        reason: "scripted".into(),
                    }),
                    Some(other) => {
                        // Put back connect steps so a later open sees them.
                        self.script.lock().unwrap().push_front(other);
                        Err(RecvError::Closed {
                            code: 1006,
                            reason: "scripted".into(),
                        })
                    }
                    // Script exhausted: stay quiet until cancelled.
                    None => std::future::pending().await,
                }
            })
        }

        fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), SendError>> {
            Box::pin(async move {
                self.sent.lock().unwrap().push(text);
                Ok(())
            })
        }

        fn close(&mut self) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn backoff_doubles_up_to_ceiling() {
        let mut backoff = Backoff::default();
        let delays: Vec<_> = (0..9).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, secs(&[1, 2, 4, 8, 16, 32, 60, 60, 60]));
    }

    #[test]
    fn backoff_reset() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), Duration::from_secs(4));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn backoff_ceiling_never_below_initial() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn connect_resets_backoff_and_advances_session() {
        let transport = ScriptedTransport::new([Step::RefuseConnect, Step::RefuseConnect, Step::Accept]);
        let mut conn = Connection::new(transport.clone(), "ws://test/ws/m");
        assert_eq!(conn.session_id(), 0);

        assert!(conn.connect().await.is_err());
        assert_eq!(conn.next_reconnect_delay(), Duration::from_secs(1));
        assert!(conn.connect().await.is_err());
        assert_eq!(conn.next_reconnect_delay(), Duration::from_secs(2));
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        conn.connect().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.session_id(), 1);
        assert_eq!(conn.next_reconnect_delay(), Duration::from_secs(1));
        assert_eq!(transport.open_count(), 3);
    }

    #[tokio::test]
    async fn double_connect_is_rejected() {
        let transport = ScriptedTransport::new([Step::Accept]);
        let mut conn = Connection::new(transport, "ws://test/ws/m");
        conn.connect().await.unwrap();
        assert!(matches!(
            conn.connect().await,
            Err(ConnectError::AlreadyConnected)
        ));
    }

    #[tokio::test]
    async fn receive_close_disconnects() {
        let transport = ScriptedTransport::new([
            Step::Accept,
            Step::Frame("{}".into()),
            Step::Close,
            Step::Accept,
        ]);
        let mut conn = Connection::new(transport, "ws://test/ws/m");
        conn.connect().await.unwrap();

        assert_eq!(conn.receive().await.unwrap(), "{}");
        assert!(matches!(
            conn.receive().await,
            Err(RecvError::Closed { code: 1000, .. })
        ));
        assert!(!conn.is_connected());
        assert!(matches!(conn.receive().await, Err(RecvError::NotConnected)));

        conn.connect().await.unwrap();
        assert_eq!(conn.session_id(), 2);
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let transport = ScriptedTransport::new([Step::Accept]);
        let mut conn = Connection::new(transport.clone(), "ws://test/ws/m");
        assert!(matches!(
            conn.send("x".into()).await,
            Err(SendError::NotConnected)
        ));

        conn.connect().await.unwrap();
        conn.send("x".into()).await.unwrap();
        conn.disconnect().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(transport.sent(), vec!["x".to_string()]);
    }

    #[test]
    fn redacts_api_key() {
        assert_eq!(
            redact("wss://host/ws/meeting-1/secret"),
            "wss://host/ws/meeting-1/***"
        );
        assert_eq!(redact("wss://host/ws/meeting-1"), "wss://host/ws/meeting-1");
    }
}
