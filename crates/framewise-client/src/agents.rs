//! Agent connector.
//!
//! An [`AgentRegistry`] maps agent names to factories that run one agent in
//! one meeting. The [`AgentConnector`] listens on the discovery socket and,
//! for every `{agent_name, meeting_id}` start command, runs the named agent
//! as its own tokio task. A worker that fails or panics does not affect the
//! connector or the other workers.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::ClientConfig;
use crate::discovery::{Announcement, DiscoveryListener};
use crate::dispatcher::panic_message;
use crate::error::{ConfigError, SessionResult};
use crate::session::SessionExit;
use crate::shutdown::ShutdownHandle;
use crate::transport::{BoxFuture, Transport, WsTransport};

type AgentFactory = Arc<dyn Fn(String) -> BoxFuture<'static, SessionResult<SessionExit>> + Send + Sync>;

/// Named agent factories.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentFactory>,
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous one.
    ///
    /// The factory receives the meeting ID and returns the agent's run
    /// future, typically `Session::run` of a freshly built session.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SessionResult<SessionExit>> + Send + 'static,
    {
        let name = name.into();
        info!(agent = %name, "registered agent");
        self.agents
            .insert(name, Arc::new(move |meeting_id| Box::pin(factory(meeting_id))));
    }

    /// Removes an agent. Returns true if it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.agents.remove(name).is_some();
        if removed {
            info!(agent = name, "unregistered agent");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn start(&self, name: &str, meeting_id: String) -> Option<BoxFuture<'static, SessionResult<SessionExit>>> {
        self.agents.get(name).map(|factory| factory(meeting_id))
    }
}

/// Runs registered agents in meetings announced on the discovery socket.
pub struct AgentConnector<T: Transport = WsTransport> {
    listener: DiscoveryListener<T>,
    registry: AgentRegistry,
    workers: JoinSet<()>,
}

impl AgentConnector<WsTransport> {
    /// Creates a connector for the configured API key.
    pub fn from_config(
        config: &ClientConfig,
        registry: AgentRegistry,
        shutdown: ShutdownHandle,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(DiscoveryListener::from_config(config, shutdown)?, registry))
    }
}

impl<T: Transport> AgentConnector<T> {
    pub fn new(listener: DiscoveryListener<T>, registry: AgentRegistry) -> Self {
        Self {
            listener,
            registry,
            workers: JoinSet::new(),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AgentRegistry {
        &mut self.registry
    }

    /// Returns the number of workers that have not been reaped yet.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Listens for start commands until shutdown, then stops all workers.
    pub async fn run(&mut self) {
        info!(agents = ?self.registry.names(), "agent connector listening");
        while let Some(announcement) = self.listener.next_announcement().await {
            self.reap_finished();
            self.handle_announcement(announcement);
        }
        self.stop().await;
    }

    /// Starts the agent named in a start command.
    ///
    /// Returns false if the command is incomplete or names an unknown agent.
    pub fn handle_announcement(&mut self, announcement: Announcement) -> bool {
        let (Some(agent), Some(meeting_id)) = (announcement.agent_name, announcement.meeting_id) else {
            warn!("start command without agent_name or meeting_id");
            return false;
        };

        let Some(run) = self.registry.start(&agent, meeting_id.clone()) else {
            error!(agent = %agent, "unknown agent");
            return false;
        };

        info!(agent = %agent, meeting_id = %meeting_id, "starting agent");
        let span = info_span!("agent", agent = %agent, meeting_id = %meeting_id);
        self.workers.spawn(
            async move {
                match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(Ok(exit)) => info!(?exit, "agent finished"),
                    Ok(Err(e)) => error!(error = %e, "agent failed"),
                    Err(panic) => error!(panic = %panic_message(&*panic), "agent panicked"),
                }
            }
            .instrument(span),
        );
        true
    }

    /// Stops listening and aborts every running worker.
    pub async fn stop(&mut self) {
        info!(workers = self.workers.len(), "stopping agent connector");
        self.listener.shutdown_handle().trigger();
        self.workers.abort_all();
        let mut aborted = 0;
        while let Some(result) = self.workers.join_next().await {
            if result.is_err() {
                aborted += 1;
            }
        }
        if aborted > 0 {
            info!(aborted, "aborted running agents");
        }
    }

    fn reap_finished(&mut self) {
        while self.workers.try_join_next().is_some() {}
    }
}
