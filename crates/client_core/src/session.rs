//! Session state and the single reducer that mutates it.
//!
//! Every controller message, connectivity change and confirmed maintenance
//! result flows through [`Session`] methods on one task. The methods return
//! [`SessionEffect`]s describing what the presentation layer should react to;
//! the session itself never renders or sends anything.

use shared::{
    domain::{AuthorizationState, ChannelAddress, ChannelLayout, ChannelState, IgniterNr},
    protocol::{ServerEvent, StateSnapshot},
};
use tracing::{debug, info, warn};

use crate::{
    auth::AuthorizationGate,
    channels::{AvailabilitySource, ChannelStateStore},
    interlock::FireInterlock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    AuthorizationChanged(AuthorizationState),
    AuthPrompt { visible: bool },
    FireEnabledChanged(bool),
    ConnectivityChanged(bool),
    /// The `disabled` projection must be re-read.
    ChannelsChanged,
    Notify {
        level: NotificationLevel,
        message: String,
    },
}

/// One channel as the presentation layer should draw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelView {
    pub address: ChannelAddress,
    pub state: ChannelState,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    auth: AuthorizationGate,
    interlock: FireInterlock,
    channels: ChannelStateStore,
    connected: bool,
}

impl Session {
    pub fn new(layout: ChannelLayout) -> Self {
        Self {
            channels: ChannelStateStore::with_layout(layout),
            ..Self::default()
        }
    }

    pub fn authorization(&self) -> AuthorizationState {
        self.auth.state()
    }

    pub fn is_authorized(&self) -> bool {
        self.auth.is_authorized()
    }

    pub fn auth_prompt_visible(&self) -> bool {
        self.auth.prompt_visible()
    }

    pub fn fire_enabled(&self) -> bool {
        self.interlock.is_enabled()
    }

    pub fn interlock(&self) -> &FireInterlock {
        &self.interlock
    }

    /// Connectivity flag. While `false` the rest of the session is stale.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn channel(&self, address: &ChannelAddress) -> ChannelState {
        self.channels.get(address)
    }

    pub fn channels(&self) -> &ChannelStateStore {
        &self.channels
    }

    pub fn is_disabled(&self, address: &ChannelAddress) -> bool {
        let state = self.channels.get(address);
        !self.interlock.is_enabled() || !self.auth.is_authorized() || state.fired || !state.available
    }

    pub fn projection(&self) -> Vec<ChannelView> {
        self.channels
            .iter()
            .map(|(address, state)| ChannelView {
                address: *address,
                state: *state,
                disabled: self.is_disabled(address),
            })
            .collect()
    }

    pub fn apply(&mut self, event: ServerEvent) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        let mut channels_changed = false;

        match event {
            ServerEvent::StateUpdate(snapshot) => {
                self.apply_snapshot(&snapshot, &mut effects);
                channels_changed = true;
            }
            ServerEvent::ChannelFired { target } => {
                debug!(%target, "session: channel fired");
                channels_changed = self.channels.set_fired(target, true);
            }
            ServerEvent::ChannelReset { target } => {
                debug!(%target, "session: channel reset");
                channels_changed = self.channels.set_fired(target, false);
            }
            ServerEvent::FireEnabledChanged { enabled } => {
                if self.interlock.confirm(enabled) {
                    info!(enabled, "session: fire interlock changed");
                    effects.push(SessionEffect::FireEnabledChanged(enabled));
                }
            }
            ServerEvent::AuthWaiting => self.auth.on_waiting(&mut effects),
            ServerEvent::AuthSuccess => self.auth.on_success(&mut effects),
            ServerEvent::AuthTimeout => self.auth.on_timeout(&mut effects),
            ServerEvent::DirectIgniterAvailableChanged { nr, available } => {
                channels_changed =
                    self.channels
                        .set_available(nr, available, AvailabilitySource::Broadcast);
            }
            ServerEvent::Error(err) => {
                warn!(message = %err.message, "session: controller reported an error");
                effects.push(SessionEffect::Notify {
                    level: NotificationLevel::Error,
                    message: err.message,
                });
            }
            ServerEvent::Unknown => {
                debug!("session: ignoring message of unknown type");
            }
        }

        if channels_changed || gates_changed(&effects) {
            effects.push(SessionEffect::ChannelsChanged);
        }
        effects
    }

    pub fn set_connected(&mut self, connected: bool) -> Vec<SessionEffect> {
        if self.connected == connected {
            return Vec::new();
        }
        self.connected = connected;
        vec![SessionEffect::ConnectivityChanged(connected)]
    }

    /// Applies a successful maintenance response.
    pub fn confirm_availability(&mut self, nr: IgniterNr, available: bool) -> Vec<SessionEffect> {
        let mut effects = vec![SessionEffect::Notify {
            level: NotificationLevel::Success,
            message: format!(
                "Direct igniter {nr} marked {}",
                if available { "available" } else { "unavailable" }
            ),
        }];
        if self
            .channels
            .set_available(nr, available, AvailabilitySource::Maintenance)
        {
            effects.push(SessionEffect::ChannelsChanged);
        }
        effects
    }

    fn apply_snapshot(&mut self, snapshot: &StateSnapshot, effects: &mut Vec<SessionEffect>) {
        debug!(
            authorized = snapshot.authorized,
            fire_enabled = snapshot.fire_enabled,
            cases = snapshot.koffer_states.len(),
            igniters = snapshot.direktzuender_states.len(),
            "session: applying snapshot"
        );
        self.auth.on_snapshot(snapshot.authorized, effects);
        if self.interlock.confirm(snapshot.fire_enabled) {
            effects.push(SessionEffect::FireEnabledChanged(snapshot.fire_enabled));
        }
        for nr in self.channels.replace_from_snapshot(snapshot) {
            warn!(
                %nr,
                "session: maintenance and realtime availability disagree for more than one cycle"
            );
        }
    }
}

fn gates_changed(effects: &[SessionEffect]) -> bool {
    effects.iter().any(|effect| {
        matches!(
            effect,
            SessionEffect::AuthorizationChanged(_) | SessionEffect::FireEnabledChanged(_)
        )
    })
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
