//! Session runtime for Framewise meeting agents.
//!
//! A [`Session`] owns one WebSocket connection to a meeting, reconnects with
//! exponential backoff when it drops, decodes inbound events and hands them
//! to the handlers registered on its [`EventDispatcher`]. Handlers reply
//! through an [`OutboundSender`], which may be cloned freely and used from
//! any task or thread; the session loop is the only writer on the socket.
//!
//! ```no_run
//! use framewise_client::{ClientConfig, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load()?.with_api_key("env::FRAMEWISE_API_KEY");
//! let session = Session::builder(config).meeting_id("standup").build()?;
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
//! let exit = session.run().await?;
//! println!("session ended: {exit:?}");
//! # Ok(())
//! # }
//! ```
//!
//! Around the session sit the [`api`] module for registering meetings over
//! HTTP, [`discovery`] for waiting on meeting announcements, and [`agents`]
//! for running registered agents in announced meetings.

pub mod agents;
pub mod api;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod secret;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use agents::{AgentConnector, AgentRegistry};
pub use api::{MeetingApi, MeetingInfo};
pub use bridge::{OutboundSender, SendTicket};
pub use config::ClientConfig;
pub use connection::{Backoff, Connection, ConnectionState};
pub use discovery::{Announcement, DiscoveryListener, await_meeting};
pub use dispatcher::{DispatchSummary, EventDispatcher, Handler, HandlerId, Payload};
pub use error::{
    ApiError, ClientError, ClientResult, ConfigError, ConnectError, HandlerError, HandlerResult,
    RecvError, SendError, SessionError, SessionResult,
};
pub use session::{Authenticator, Session, SessionBuilder, SessionExit, SessionState};
pub use shutdown::ShutdownHandle;
pub use transport::{BoxFuture, Transport, WsTransport};
