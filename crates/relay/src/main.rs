use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientRole, RelayEvent};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{info, warn};

mod api;
mod app_state;
mod config;
mod keymap;

use api::{handle_client_text, ClientSession};
use app_state::AppState;
use config::load_settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let state = AppState::new(settings.relay_options());
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "relay listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<RelayEvent>();

    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session = ClientSession::default();
    let mut pc_forwarder: Option<JoinHandle<()>> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply = match handle_client_text(&state, &mut session, &text) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(code = ?error.code, message = %error.message, "rejected client frame");
                Some(RelayEvent::Error(error))
            }
        };
        // Subscribe before acknowledging so a PC never misses commands sent
        // right after its registration.
        if session.role == Some(ClientRole::Pc) && pc_forwarder.is_none() {
            pc_forwarder = Some(spawn_pc_forwarder(&state, outbound.clone()));
        }
        if let Some(reply) = reply {
            if outbound.send(reply).is_err() {
                break;
            }
        }
    }

    if let Some(forwarder) = pc_forwarder {
        forwarder.abort();
    }
    send_task.abort();
    info!(role = ?session.role, "client disconnected");
}

fn spawn_pc_forwarder(state: &AppState, outbound: mpsc::UnboundedSender<RelayEvent>) -> JoinHandle<()> {
    let mut commands = state.pc_commands.subscribe();
    tokio::spawn(async move {
        loop {
            match commands.recv().await {
                Ok(command) => {
                    if outbound.send(RelayEvent::Control(command)).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "pc client lagging; commands dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
