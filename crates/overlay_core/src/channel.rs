use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientMessage, ClientRole, InputCommand, KeyEventKind, RelayEvent};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Connection lifecycle notifications delivered to the coordinator's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected(String),
    Error(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("invalid peer address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("unsupported scheme '{0}'; expected http(s) or ws(s)")]
    UnsupportedScheme(String),
}

/// Logical outbound channel to the remote peer. Sends are fire-and-forget:
/// nothing is queued or retried while disconnected.
pub trait KeyChannel: Send + Sync {
    fn connect(&self, address: &str);
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn send(&self, kind: KeyEventKind, key_name: &str) -> bool;
}

/// Converts an http(s)/ws(s) peer address into the relay's websocket endpoint.
pub fn ws_url_for(address: &str) -> Result<String, ChannelError> {
    let invalid = |reason: String| ChannelError::InvalidAddress {
        address: address.to_string(),
        reason,
    };
    let mut url = Url::parse(address.trim()).map_err(|err| invalid(err.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ChannelError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch scheme to {scheme}")))?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/ws");
    }
    Ok(url.to_string())
}

/// Delay between reconnect attempts after the relay connection drops or a
/// connect attempt fails. Consecutive failures double the delay up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_RECONNECT_INITIAL_DELAY,
            max_delay: DEFAULT_RECONNECT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self, failures: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1 << failures.min(5))
            .min(self.max_delay)
    }
}

enum Outbound {
    Message(ClientMessage),
    Close,
}

enum SessionEnd {
    /// The client asked to close; no reconnect.
    Closed,
    /// An established session dropped.
    Lost,
    /// The connect or register step failed.
    Failed,
}

struct WsSession {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// WebSocket implementation of [`KeyChannel`] speaking the relay protocol.
/// Once connected it keeps reconnecting until [`KeyChannel::disconnect`].
pub struct WsKeyChannel {
    events: mpsc::UnboundedSender<ChannelEvent>,
    connected: Arc<AtomicBool>,
    reconnect: ReconnectPolicy,
    session: Mutex<Option<WsSession>>,
}

impl WsKeyChannel {
    pub fn new(events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self::with_reconnect(events, ReconnectPolicy::default())
    }

    pub fn with_reconnect(
        events: mpsc::UnboundedSender<ChannelEvent>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            events,
            connected: Arc::new(AtomicBool::new(false)),
            reconnect,
            session: Mutex::new(None),
        }
    }
}

impl KeyChannel for WsKeyChannel {
    fn connect(&self, address: &str) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = session.as_ref() {
            if !active.task.is_finished() {
                debug!(address, "key channel already active");
                if self.is_connected() {
                    let _ = self.events.send(ChannelEvent::Connected);
                }
                return;
            }
        }

        let url = match ws_url_for(address) {
            Ok(url) => url,
            Err(err) => {
                warn!(%err, "refusing to connect key channel");
                let _ = self.events.send(ChannelEvent::Error(err.to_string()));
                return;
            }
        };

        let (outbound, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_channel(
            url,
            rx,
            Arc::clone(&self.connected),
            self.events.clone(),
            self.reconnect,
        ));
        *session = Some(WsSession { outbound, task });
    }

    fn disconnect(&self) {
        let Some(active) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        if self.is_connected() {
            info!("closing key channel");
            let _ = active.outbound.send(Outbound::Close);
        } else {
            active.task.abort();
            let _ = self
                .events
                .send(ChannelEvent::Disconnected("connect aborted".to_string()));
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, kind: KeyEventKind, key_name: &str) -> bool {
        if !self.is_connected() {
            debug!(key = key_name, event = kind.as_str(), "dropping key event while disconnected");
            return false;
        }
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = session.as_ref() else {
            return false;
        };
        let message = ClientMessage::Input(InputCommand::new(kind, key_name));
        active.outbound.send(Outbound::Message(message)).is_ok()
    }
}

impl Drop for WsKeyChannel {
    fn drop(&mut self) {
        if let Some(active) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            active.task.abort();
        }
    }
}

async fn run_channel(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    reconnect: ReconnectPolicy,
) {
    let mut failures = 0u32;
    loop {
        let delay = match run_session(&url, &mut outbound, &connected, &events).await {
            SessionEnd::Closed => return,
            SessionEnd::Lost => {
                failures = 0;
                reconnect.delay(0)
            }
            SessionEnd::Failed => {
                let delay = reconnect.delay(failures);
                failures = failures.saturating_add(1);
                delay
            }
        };
        info!(%url, retry_in_ms = delay.as_millis() as u64, "key channel will reconnect");
        if !wait_for_retry(&mut outbound, delay).await {
            return;
        }
    }
}

/// Sleeps out the backoff. Returns false if the client closed meanwhile.
async fn wait_for_retry(outbound: &mut mpsc::UnboundedReceiver<Outbound>, delay: Duration) -> bool {
    let retry = tokio::time::sleep(delay);
    tokio::pin!(retry);
    loop {
        tokio::select! {
            () = &mut retry => return true,
            command = outbound.recv() => match command {
                Some(Outbound::Message(_)) => debug!("dropping key event queued before disconnect"),
                Some(Outbound::Close) | None => return false,
            },
        }
    }
}

async fn run_session(
    url: &str,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    connected: &AtomicBool,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) -> SessionEnd {
    info!(%url, "connecting key channel");
    let ws_stream = match connect_async(url).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!(%url, %err, "key channel connect failed");
            let _ = events.send(ChannelEvent::Error(format!(
                "failed to connect websocket: {err}"
            )));
            return SessionEnd::Failed;
        }
    };
    let (mut writer, mut reader) = ws_stream.split();

    let register = ClientMessage::Register {
        role: ClientRole::Controller,
    };
    if let Err(err) = writer.send(encode(&register)).await {
        let _ = events.send(ChannelEvent::Error(format!("register failed: {err}")));
        return SessionEnd::Failed;
    }
    connected.store(true, Ordering::SeqCst);
    info!(%url, "key channel connected");
    let _ = events.send(ChannelEvent::Connected);

    let (reason, end) = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Message(message)) => {
                    if let Err(err) = writer.send(encode(&message)).await {
                        break (format!("websocket send failed: {err}"), SessionEnd::Lost);
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = writer.send(Message::Close(None)).await;
                    break ("client disconnect".to_string(), SessionEnd::Closed);
                }
            },
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<RelayEvent>(&text) {
                    Ok(RelayEvent::Error(error)) => {
                        warn!(code = ?error.code, message = %error.message, "relay rejected input");
                    }
                    Ok(event) => debug!(?event, "relay event"),
                    Err(err) => debug!(%err, "ignoring unrecognised relay frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by peer".to_string());
                    break (reason, SessionEnd::Lost);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => break (format!("websocket receive failed: {err}"), SessionEnd::Lost),
                None => break ("connection closed".to_string(), SessionEnd::Lost),
            },
        }
    };

    connected.store(false, Ordering::SeqCst);
    info!(%reason, "key channel disconnected");
    let _ = events.send(ChannelEvent::Disconnected(reason));
    end
}

fn encode(message: &ClientMessage) -> Message {
    // ClientMessage only holds strings and enums, so encoding cannot fail.
    Message::Text(serde_json::to_string(message).unwrap_or_default())
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
