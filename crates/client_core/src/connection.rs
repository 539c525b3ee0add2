//! The single logical connection to the controller.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use shared::protocol::ClientCommand;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    codec::encode_command,
    dispatcher::{CommandSink, SendOutcome},
    error::EndpointError,
};

pub const LEGACY_RECONNECT_DELAY: Duration = Duration::from_millis(3000);
const MAX_BACKOFF_EXPONENT: u32 = 16;

type ControllerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Outbound = Option<mpsc::UnboundedSender<String>>;

/// Derives the realtime endpoint from the controller's page origin:
/// `http` becomes `ws`, `https` becomes `wss`, the path is always `/ws`.
pub fn controller_endpoint(origin: &str) -> Result<Url, EndpointError> {
    let mut url = Url::parse(origin).map_err(|source| EndpointError::InvalidOrigin {
        origin: origin.to_string(),
        source,
    })?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| EndpointError::UnsupportedScheme(url.scheme().to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt, retried forever.
    Fixed { delay: Duration },
    /// Doubling delay capped at `max`, with `jitter` as a fraction of the
    /// delay (`0.2` spreads attempts over ±20%). Also retried forever.
    Backoff {
        initial: Duration,
        max: Duration,
        jitter: f64,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Backoff {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    pub fn legacy() -> Self {
        Self::Fixed {
            delay: LEGACY_RECONNECT_DELAY,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay } => delay,
            Self::Backoff { initial, max, .. } => {
                let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
                initial.saturating_mul(factor).min(max)
            }
        }
    }

    pub fn next_delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        match *self {
            Self::Fixed { .. } => base,
            Self::Backoff { max, jitter, .. } => {
                if jitter.is_nan() || jitter <= 0.0 {
                    return base;
                }
                let jitter = jitter.min(1.0);
                let spread = rng.random_range(-jitter..=jitter);
                Duration::try_from_secs_f64(base.as_secs_f64() * (1.0 + spread))
                    .unwrap_or(base)
                    .min(max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Frame(String),
    /// A binary frame of the given length; not part of the protocol.
    Binary(usize),
}

/// Cheap handle used to push commands onto whichever socket is open.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    outbound: watch::Receiver<Outbound>,
}

impl ConnectionHandle {
    pub fn is_connected(&self) -> bool {
        self.outbound.borrow().is_some()
    }
}

impl CommandSink for ConnectionHandle {
    fn submit(&self, command: &ClientCommand) -> SendOutcome {
        let text = match encode_command(command) {
            Ok(text) => text,
            Err(err) => {
                error!(command = command.kind(), %err, "connection: failed to encode command");
                return SendOutcome::Failed;
            }
        };
        let sender = self.outbound.borrow().clone();
        let Some(sender) = sender else {
            warn!(
                command = command.kind(),
                "connection: not connected, command dropped"
            );
            return SendOutcome::NotConnected;
        };
        if sender.send(text).is_err() {
            warn!(
                command = command.kind(),
                "connection: socket is closing, command dropped"
            );
            return SendOutcome::NotConnected;
        }
        SendOutcome::Sent
    }
}

pub struct ConnectionManager {
    endpoint: Url,
    policy: ReconnectPolicy,
    outbound: watch::Sender<Outbound>,
}

impl ConnectionManager {
    pub fn new(endpoint: Url, policy: ReconnectPolicy) -> (Self, ConnectionHandle) {
        let (outbound, receiver) = watch::channel(None);
        let manager = Self {
            endpoint,
            policy,
            outbound,
        };
        (manager, ConnectionHandle { outbound: receiver })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Runs the connect/serve/reconnect loop until `events` is closed.
    pub fn spawn(self, events: mpsc::UnboundedSender<ConnectionEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    async fn run(self, events: mpsc::UnboundedSender<ConnectionEvent>) {
        let mut attempt: u32 = 0;
        loop {
            info!(endpoint = %self.endpoint, attempt, "connection: connecting to controller");
            match connect_async(self.endpoint.as_str()).await {
                Ok((stream, _)) => {
                    attempt = 0;
                    self.serve(stream, &events).await;
                }
                Err(err) => {
                    warn!(endpoint = %self.endpoint, %err, "connection: connect failed");
                }
            }

            self.outbound.send_replace(None);
            if events.send(ConnectionEvent::Disconnected).is_err() {
                debug!("connection: event receiver dropped, stopping");
                return;
            }

            let delay = self.policy.next_delay(attempt, &mut rand::rng());
            attempt = attempt.saturating_add(1);
            info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "connection: reconnect scheduled"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn serve(&self, stream: ControllerStream, events: &mpsc::UnboundedSender<ConnectionEvent>) {
        let (mut writer, mut reader) = stream.split();
        let (sender, mut outgoing) = mpsc::unbounded_channel::<String>();
        self.outbound.send_replace(Some(sender));
        info!(endpoint = %self.endpoint, "connection: connected");
        if events.send(ConnectionEvent::Connected).is_err() {
            return;
        }

        loop {
            tokio::select! {
                frame = reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(ConnectionEvent::Frame(text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if events.send(ConnectionEvent::Binary(bytes.len())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "connection: closed by controller");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%err, "connection: transport error");
                        break;
                    }
                    None => {
                        info!("connection: stream ended");
                        break;
                    }
                },
                Some(text) = outgoing.recv() => {
                    if let Err(err) = writer.send(Message::Text(text)).await {
                        warn!(%err, "connection: send failed");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
