//! Client error types.

use framewise_protocol::ProtocolError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type returned by event handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors raised while opening a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The endpoint URL could not be built or parsed.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// Connecting took longer than the configured timeout.
    #[error("connect timed out after {0}s")]
    Timeout(u64),

    /// The transport failed to open.
    #[error("connect failed: {0}")]
    Transport(String),

    /// A connect attempt was made while already connected.
    #[error("already connected")]
    AlreadyConnected,
}

/// Errors raised while waiting for the next frame.
#[derive(Debug, Error)]
pub enum RecvError {
    /// The peer closed the socket.
    #[error("connection closed (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    /// The socket failed.
    #[error("receive failed: {0}")]
    Transport(String),

    /// There is no open socket.
    #[error("not connected")]
    NotConnected,
}

/// Errors surfaced to callers of the outbound bridge.
#[derive(Debug, Error)]
pub enum SendError {
    /// No socket is open right now.
    #[error("not connected")]
    NotConnected,

    /// The session has stopped and will not send anything else.
    #[error("session closed")]
    SessionClosed,

    /// The request was dropped before the session answered it.
    #[error("send request dropped")]
    Dropped,

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    Transport(String),

    /// The message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),
}

/// A failure inside a registered handler.
///
/// Never propagated out of dispatch; only logged.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("{0}")]
    Failed(Box<dyn std::error::Error + Send + Sync>),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Creates a handler error from any error or message.
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }
}

impl From<SendError> for HandlerError {
    fn from(err: SendError) -> Self {
        Self::Failed(Box::new(err))
    }
}

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The API key was refused at startup.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Connecting failed and automatic reconnect is disabled.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The session could not be configured.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors from the HTTP meeting API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No API key is configured.
    #[error("no API key configured")]
    MissingApiKey,

    /// The request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("meeting service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The base URL is invalid.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Secret reference could not be resolved.
    #[error("{0}")]
    Secret(String),
}

/// Errors loading or interpreting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A secret reference could not be resolved.
    #[error("{0}")]
    Secret(String),

    /// A URL needs an API key but none is configured.
    #[error("no API key configured")]
    MissingApiKey,
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for the command-line client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Top-level errors reported by the `framewise` binary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to initialize logging: {0}")]
    Tracing(#[from] framewise_core::TracingError),
}
