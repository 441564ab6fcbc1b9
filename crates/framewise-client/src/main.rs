//! framewise CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use framewise_client::agents::{AgentConnector, AgentRegistry};
use framewise_client::cli::{Cli, Command, ConfigAction};
use framewise_client::config::ClientConfig;
use framewise_client::discovery::DiscoveryListener;
use framewise_client::error::{ClientResult, SessionResult};
use framewise_client::{MeetingApi, Session, SessionExit, ShutdownHandle};
use framewise_core::{TracingConfig, init_tracing};

/// Name the echo agent is registered under for `serve`.
const ECHO_AGENT: &str = "echo";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<ExitCode> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(api_key) = cli.api_key {
        config = config.with_api_key(api_key);
    }

    let tracing = if cli.debug {
        TracingConfig::debug()
    } else {
        config.logging.to_tracing_config()?
    };
    init_tracing(tracing)?;

    match cli.command {
        Command::Run { meeting_id } => {
            let shutdown = ShutdownHandle::new();
            shutdown.listen_for_signals();
            let exit = echo_agent(config, meeting_id, shutdown).await?;
            Ok(exit_code(&exit))
        }
        Command::AwaitMeeting { timeout } => {
            let shutdown = ShutdownHandle::new();
            shutdown.listen_for_signals();
            let mut listener = DiscoveryListener::from_config(&config, shutdown)?;
            match listener.await_meeting(timeout.map(Duration::from_secs)).await {
                Some(meeting_id) => {
                    println!("{meeting_id}");
                    Ok(ExitCode::SUCCESS)
                }
                None => Ok(ExitCode::FAILURE),
            }
        }
        Command::Serve => {
            let shutdown = ShutdownHandle::new();
            shutdown.listen_for_signals();

            let mut registry = AgentRegistry::new();
            let agent_config = config.clone();
            let agent_shutdown = shutdown.clone();
            registry.register(ECHO_AGENT, move |meeting_id| {
                echo_agent(agent_config.clone(), meeting_id, agent_shutdown.clone())
            });

            AgentConnector::from_config(&config, registry, shutdown)?
                .run()
                .await;
            Ok(ExitCode::SUCCESS)
        }
        Command::SetupMeeting { meeting_id } => {
            let info = MeetingApi::from_config(&config)?
                .setup_meeting(&meeting_id, None, None)
                .await?;
            println!("{}", info.meeting_id);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            match action {
                ConfigAction::Dump => print!("{}", config.to_toml()?),
                ConfigAction::Path => println!("{}", ClientConfig::default_path().display()),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Joins a meeting, greets participants and echoes final transcripts.
async fn echo_agent(
    config: ClientConfig,
    meeting_id: String,
    shutdown: ShutdownHandle,
) -> SessionResult<SessionExit> {
    let session = Session::builder(config)
        .meeting_id(meeting_id)
        .shutdown_handle(shutdown)
        .build()?;

    let sender = session.sender();
    session.on_join(move |participant| {
        let name = participant
            .participant_name
            .as_deref()
            .unwrap_or(&participant.participant_id);
        info!(participant = name, "participant joined");
        sender
            .send_text(format!("Welcome, {name}!"), true)
            .try_result()
            .transpose()?;
        Ok(())
    });

    let sender = session.sender();
    session.on_transcript(move |transcript| {
        if transcript.is_final && !transcript.text.trim().is_empty() {
            sender
                .send_text(format!("You said: {}", transcript.text), true)
                .try_result()
                .transpose()?;
        }
        Ok(())
    });

    session.on_connection_rejected(|rejection| {
        warn!(reason = %rejection.reason, "meeting refused the agent");
        Ok(())
    });

    session.run().await
}

fn exit_code(exit: &SessionExit) -> ExitCode {
    match exit {
        SessionExit::Stopped => ExitCode::SUCCESS,
        SessionExit::Rejected(_) => ExitCode::from(2),
        SessionExit::Disconnected => ExitCode::FAILURE,
    }
}
