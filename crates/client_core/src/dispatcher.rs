use shared::{domain::ChannelAddress, protocol::ClientCommand};
use tracing::{info, warn};

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// No open connection; the command was dropped, not queued.
    NotConnected,
    /// The command could not be encoded.
    Failed,
}

/// Seam between the dispatcher and the live connection.
pub trait CommandSink: Send + Sync {
    fn submit(&self, command: &ClientCommand) -> SendOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireRejection {
    NotAuthorized,
    InterlockDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    NotConnected,
    Failed,
    Rejected(FireRejection),
    /// The operator declined the confirmation step.
    Cancelled,
}

impl From<SendOutcome> for DispatchOutcome {
    fn from(value: SendOutcome) -> Self {
        match value {
            SendOutcome::Sent => Self::Sent,
            SendOutcome::NotConnected => Self::NotConnected,
            SendOutcome::Failed => Self::Failed,
        }
    }
}

/// Turns operator intents into controller commands.
///
/// Only `fire` is gated client-side (authorization + interlock). `reset` is
/// forwarded unconditionally; the controller has always accepted it that way.
/// Nothing here touches local channel state: `fired` only changes once the
/// controller confirms.
pub struct CommandDispatcher<S> {
    sink: S,
}

impl<S: CommandSink> CommandDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn fire(&self, session: &Session, target: ChannelAddress) -> DispatchOutcome {
        if !session.is_authorized() {
            warn!(%target, "dispatch: fire rejected, session is not authorized");
            return DispatchOutcome::Rejected(FireRejection::NotAuthorized);
        }
        if !session.fire_enabled() {
            warn!(%target, "dispatch: fire rejected, fire interlock is disabled");
            return DispatchOutcome::Rejected(FireRejection::InterlockDisabled);
        }
        info!(%target, "dispatch: fire");
        self.sink.submit(&ClientCommand::Fire { target }).into()
    }

    pub fn reset(&self, target: ChannelAddress) -> DispatchOutcome {
        info!(%target, "dispatch: reset");
        self.sink.submit(&ClientCommand::Reset { target }).into()
    }

    /// Sends `reset_all` only if `confirm` returns `true`.
    pub fn reset_all<F>(&self, confirm: F) -> DispatchOutcome
    where
        F: FnOnce() -> bool,
    {
        if !confirm() {
            info!("dispatch: reset_all cancelled by operator");
            return DispatchOutcome::Cancelled;
        }
        info!("dispatch: reset_all");
        self.sink.submit(&ClientCommand::ResetAll).into()
    }

    pub fn set_fire_enabled(&self, enabled: bool) -> DispatchOutcome {
        info!(enabled, "dispatch: set_fire_enabled");
        self.sink
            .submit(&ClientCommand::SetFireEnabled { enabled })
            .into()
    }

    /// Requests the opposite of the currently confirmed interlock value.
    pub fn toggle_fire_enabled(&self, session: &Session) -> DispatchOutcome {
        let command = session.interlock().toggle_request();
        info!(command = command.kind(), "dispatch: toggle fire interlock");
        self.sink.submit(&command).into()
    }

    pub fn start_auth(&self) -> DispatchOutcome {
        info!("dispatch: auth_start");
        self.sink.submit(&ClientCommand::AuthStart).into()
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
