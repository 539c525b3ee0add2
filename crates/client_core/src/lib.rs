use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::domain::{AuthorizationState, ChannelAddress, ChannelLayout, IgniterNr};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use url::Url;

pub mod auth;
pub mod channels;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod interlock;
pub mod maintenance;
pub mod session;

pub use connection::{controller_endpoint, ConnectionEvent, ConnectionHandle, ReconnectPolicy};
pub use dispatcher::{CommandDispatcher, CommandSink, DispatchOutcome, FireRejection, SendOutcome};
pub use error::{DecodeError, EndpointError, MaintenanceError};
pub use maintenance::{HttpMaintenanceApi, MaintenanceApi};
pub use session::{ChannelView, NotificationLevel, Session, SessionEffect};

use codec::decode_frame;
use connection::ConnectionManager;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn now(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// What the presentation layer is told about. Channel changes always carry
/// the full `disabled` projection so renderers never derive it themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connectivity { connected: bool },
    AuthPrompt { visible: bool },
    AuthorizationChanged(AuthorizationState),
    FireEnabledChanged(bool),
    ChannelsChanged(Vec<ChannelView>),
    Notification(Notification),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Page origin of the controller, e.g. `http://127.0.0.1:5000`.
    pub origin: String,
    pub layout: ChannelLayout,
    pub reconnect: ReconnectPolicy,
}

enum RuntimeInput {
    AvailabilityConfirmed { nr: IgniterNr, available: bool },
}

/// Owns the connection, the session task and the maintenance client.
///
/// All session mutations happen on one spawned task; this handle only reads
/// published snapshots of the session and sends commands.
pub struct FireControlClient {
    dispatcher: CommandDispatcher<ConnectionHandle>,
    maintenance: Arc<dyn MaintenanceApi>,
    session: watch::Receiver<Session>,
    events: broadcast::Sender<ClientEvent>,
    inputs: mpsc::UnboundedSender<RuntimeInput>,
    tasks: Vec<JoinHandle<()>>,
}

impl FireControlClient {
    /// Starts connecting immediately. Must be called inside a tokio runtime.
    pub fn start(config: ClientConfig) -> anyhow::Result<Self> {
        let origin = Url::parse(&config.origin)?;
        let maintenance = Arc::new(HttpMaintenanceApi::new(origin));
        Self::start_with_maintenance(config, maintenance)
    }

    pub fn start_with_maintenance(
        config: ClientConfig,
        maintenance: Arc<dyn MaintenanceApi>,
    ) -> anyhow::Result<Self> {
        let endpoint = controller_endpoint(&config.origin)?;
        info!(%endpoint, policy = ?config.reconnect, "client: starting");

        let (manager, handle) = ConnectionManager::new(endpoint, config.reconnect);
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();
        let (inputs, inputs_rx) = mpsc::unbounded_channel();
        let session = Session::new(config.layout);
        let (session_tx, session_rx) = watch::channel(session.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let runtime = SessionRuntime {
            session,
            published: session_tx,
            events: events.clone(),
        };
        let session_task = tokio::spawn(runtime.run(connection_rx, inputs_rx));
        let connection_task = manager.spawn(connection_tx);

        Ok(Self {
            dispatcher: CommandDispatcher::new(handle),
            maintenance,
            session: session_rx,
            events,
            inputs,
            tasks: vec![session_task, connection_task],
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Latest published session state.
    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Resolves once the session has changed since the last call.
    pub async fn session_changed(&mut self) -> bool {
        self.session.changed().await.is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.sink().is_connected()
    }

    pub fn start_auth(&self) -> DispatchOutcome {
        self.dispatcher.start_auth()
    }

    pub fn fire(&self, target: ChannelAddress) -> DispatchOutcome {
        let session = self.session.borrow();
        self.dispatcher.fire(&session, target)
    }

    pub fn reset(&self, target: ChannelAddress) -> DispatchOutcome {
        self.dispatcher.reset(target)
    }

    pub fn reset_all<F>(&self, confirm: F) -> DispatchOutcome
    where
        F: FnOnce() -> bool,
    {
        self.dispatcher.reset_all(confirm)
    }

    pub fn set_fire_enabled(&self, enabled: bool) -> DispatchOutcome {
        self.dispatcher.set_fire_enabled(enabled)
    }

    pub fn toggle_fire_enabled(&self) -> DispatchOutcome {
        let session = self.session.borrow();
        self.dispatcher.toggle_fire_enabled(&session)
    }

    /// Marks a direct igniter (un)available through the maintenance channel.
    /// Local state only changes once the controller reports success.
    pub async fn set_available(&self, nr: IgniterNr, available: bool) -> Result<(), MaintenanceError> {
        match self.maintenance.set_available(nr, available).await {
            Ok(()) => {
                if self
                    .inputs
                    .send(RuntimeInput::AvailabilityConfirmed { nr, available })
                    .is_err()
                {
                    warn!(%nr, "client: session task stopped, availability not applied");
                }
                Ok(())
            }
            Err(err) => {
                warn!(%nr, available, %err, "client: availability change failed");
                let _ = self.events.send(ClientEvent::Notification(Notification::now(
                    NotificationLevel::Error,
                    format!("Could not update direct igniter {nr}: {err}"),
                )));
                Err(err)
            }
        }
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for FireControlClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct SessionRuntime {
    session: Session,
    published: watch::Sender<Session>,
    events: broadcast::Sender<ClientEvent>,
}

impl SessionRuntime {
    async fn run(
        mut self,
        mut connection: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut inputs: mpsc::UnboundedReceiver<RuntimeInput>,
    ) {
        loop {
            let effects = tokio::select! {
                Some(event) = connection.recv() => self.on_connection(event),
                Some(input) = inputs.recv() => self.on_input(input),
                else => break,
            };
            self.publish(effects);
        }
        debug!("client: session task finished");
    }

    fn on_connection(&mut self, event: ConnectionEvent) -> Vec<SessionEffect> {
        match event {
            ConnectionEvent::Connected => self.session.set_connected(true),
            ConnectionEvent::Disconnected => self.session.set_connected(false),
            ConnectionEvent::Frame(text) => match decode_frame(&text) {
                Ok(event) => self.session.apply(event),
                Err(err) => {
                    warn!(%err, "client: discarding undecodable frame");
                    Vec::new()
                }
            },
            ConnectionEvent::Binary(len) => {
                warn!(len, "client: discarding binary frame");
                Vec::new()
            }
        }
    }

    fn on_input(&mut self, input: RuntimeInput) -> Vec<SessionEffect> {
        match input {
            RuntimeInput::AvailabilityConfirmed { nr, available } => {
                self.session.confirm_availability(nr, available)
            }
        }
    }

    fn publish(&self, effects: Vec<SessionEffect>) {
        if effects.is_empty() {
            return;
        }
        self.published.send_replace(self.session.clone());

        let mut channels_sent = false;
        for effect in effects {
            let event = match effect {
                SessionEffect::ConnectivityChanged(connected) => {
                    ClientEvent::Connectivity { connected }
                }
                SessionEffect::AuthPrompt { visible } => ClientEvent::AuthPrompt { visible },
                SessionEffect::AuthorizationChanged(state) => {
                    ClientEvent::AuthorizationChanged(state)
                }
                SessionEffect::FireEnabledChanged(enabled) => {
                    ClientEvent::FireEnabledChanged(enabled)
                }
                SessionEffect::ChannelsChanged => {
                    if channels_sent {
                        continue;
                    }
                    channels_sent = true;
                    ClientEvent::ChannelsChanged(self.session.projection())
                }
                SessionEffect::Notify { level, message } => {
                    ClientEvent::Notification(Notification::now(level, message))
                }
            };
            // No subscribers is fine; the watch channel still carries state.
            let _ = self.events.send(event);
        }
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
