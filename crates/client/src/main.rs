//! Inworld client - talk to a scene character from the terminal.
//!
//! Lines typed on stdin are sent as player text. `/cancel` stops the current
//! reply, `/trigger <name>` fires a trigger and `/quit` exits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use inworld_client::infrastructure::auth::HttpAuthClient;
use inworld_client::infrastructure::clock::SystemClock;
use inworld_client::infrastructure::transport::WebSocketTransport;
use inworld_client::{
    ClientConfig, ClientEvent, EventBus, SessionLifecycle, SessionRouter, SessionStatus,
};
use inworld_domain::PacketPayload;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TICK_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inworld_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env();
    let Some(scene) = config.scene.clone() else {
        bail!("INWORLD_SCENE is not set (expected workspaces/<workspace>/scenes/<scene>)");
    };

    let clock = Arc::new(SystemClock::new());
    let auth = Arc::new(HttpAuthClient::new(config.clone(), clock.clone()));
    let bus = EventBus::new();
    bus.subscribe(print_agent_text).await;

    let mut lifecycle = SessionLifecycle::new(
        config,
        auth,
        Arc::new(WebSocketTransport::new()),
        clock,
        bus,
    );

    lifecycle.initialize().await.context("initializing session")?;
    lifecycle.load_scene(&scene).await.context("loading scene")?;
    lifecycle.start_session().await.context("starting session")?;

    let mut router = SessionRouter::from_lifecycle(&lifecycle);
    let Some(mut agent_id) = first_character(&router) else {
        lifecycle.end_session().await;
        bail!("Scene {} has no characters", scene);
    };
    tracing::info!(agent_id = %agent_id, "Talking to character; type /quit to exit");

    let mut lines = spawn_stdin_reader();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                router.tick().await;
                if lifecycle.status() == SessionStatus::LostConnect {
                    tracing::warn!("Connection lost; reconnecting");
                    lifecycle.reconnect(&scene).await.context("reconnecting")?;
                    router = SessionRouter::from_lifecycle(&lifecycle);
                    match first_character(&router) {
                        Some(id) => agent_id = id,
                        None => bail!("Scene {} has no characters", scene),
                    }
                } else if lifecycle.status() == SessionStatus::Error {
                    bail!("Session failed: {}", lifecycle.last_error().unwrap_or_default());
                }
            }
            line = lines.recv() => {
                let Some(line) = line else { break };
                let Some(character) = router.character_mut(&agent_id) else { break };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/cancel" => {
                        character.cancel_response().await;
                    }
                    command if command.starts_with("/trigger ") => {
                        let name = command.trim_start_matches("/trigger ").trim();
                        if !character.send_trigger(name, Vec::new()) {
                            tracing::warn!(trigger = name, "Trigger not sent");
                        }
                    }
                    text => {
                        if !character.send_text(text).await {
                            tracing::warn!("Not connected; message dropped");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    lifecycle.end_session().await;
    Ok(())
}

fn first_character(router: &SessionRouter) -> Option<String> {
    router
        .characters()
        .first()
        .map(|session| session.live_session_id().to_string())
}

fn print_agent_text(event: ClientEvent) {
    let ClientEvent::PacketReceived { packet, .. } = event else {
        return;
    };
    if !packet.routing.is_from_agent() {
        return;
    }
    match &packet.payload {
        PacketPayload::Text(text) if text.is_final => {
            println!("{}: {}", packet.routing.source.name, text.text);
        }
        PacketPayload::Action(action) => println!("* {} *", action.narrated_action),
        _ => {}
    }
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
