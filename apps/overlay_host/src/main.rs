use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use overlay_core::{
    load_settings, ChannelEvent, CoordinatorOptions, KeyChannel, LifecycleRequest,
    OverlayCoordinator, OverlayEvent, WsKeyChannel,
};
use shared::domain::ScreenMetrics;
use storage::{ButtonConfigStore, DocumentStore, SqliteDocumentStore};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod surface;

use commands::{format_layout, parse_command, to_events, HostCommand, HELP};
use surface::{ControlDirectory, LoggingSurface, PromptKeyCapture};

#[derive(Parser, Debug)]
struct Args {
    /// Relay address, e.g. http://192.168.0.10:8079
    #[arg(long)]
    relay_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long, default_value_t = 1080)]
    screen_width: u32,
    #[arg(long, default_value_t = 2340)]
    screen_height: u32,
    /// Wait for an explicit `start` instead of connecting immediately.
    #[arg(long)]
    no_start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(relay_url) = args.relay_url {
        settings.relay_url = relay_url;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }

    let documents: Arc<dyn DocumentStore> = Arc::new(
        SqliteDocumentStore::new(&settings.database_url)
            .await
            .with_context(|| format!("failed to open layout database '{}'", settings.database_url))?,
    );
    let store = ButtonConfigStore::open(documents).await;
    info!(controls = store.len(), "layout loaded");

    let (channel_events_tx, channel_events_rx) = mpsc::unbounded_channel::<ChannelEvent>();
    let channel: Arc<dyn KeyChannel> = Arc::new(WsKeyChannel::with_reconnect(channel_events_tx, settings.reconnect()));
    let directory = ControlDirectory::default();
    let coordinator = OverlayCoordinator::new(
        store,
        channel,
        Box::new(LoggingSurface::new(directory.clone())),
        Box::new(PromptKeyCapture),
        CoordinatorOptions {
            relay_address: settings.relay_url.clone(),
            repeat: settings.repeat(),
            gesture: settings.gesture(),
            screen: ScreenMetrics::new(args.screen_width, args.screen_height),
        },
    );

    let layout = coordinator.layout();
    let (events, events_rx) = mpsc::unbounded_channel();
    if !args.no_start {
        events.send(OverlayEvent::Lifecycle(LifecycleRequest::Start))?;
    }
    let runner = tokio::spawn(coordinator.run(events_rx, channel_events_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                warn!(%err, "bad command");
                println!("{err}; type 'help' for commands");
                continue;
            }
        };
        match command {
            HostCommand::Help => {
                println!("{HELP}");
                continue;
            }
            HostCommand::List => {
                println!("{}", format_layout(&layout.borrow()));
                continue;
            }
            _ => {}
        }
        let stopping = command == HostCommand::Lifecycle(LifecycleRequest::Stop);
        match to_events(command, &directory) {
            Ok(batch) => {
                for event in batch {
                    if events.send(event).is_err() {
                        error!("coordinator stopped unexpectedly");
                        break;
                    }
                }
            }
            Err(err) => println!("{err}"),
        }
        if stopping {
            break;
        }
    }

    let _ = events.send(OverlayEvent::Lifecycle(LifecycleRequest::Stop));
    runner.await.context("coordinator task panicked")??;
    info!("overlay host exited");
    Ok(())
}
