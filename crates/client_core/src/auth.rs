use shared::domain::AuthorizationState;
use tracing::debug;

use crate::session::{NotificationLevel, SessionEffect};

/// Authorization state machine. Only controller messages move it.
///
/// A handshake started from `Authorized` only shows the prompt: the controller
/// keeps the operator authorized when that handshake times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthorizationGate {
    state: AuthorizationState,
    reauthenticating: bool,
}

impl AuthorizationGate {
    pub fn state(&self) -> AuthorizationState {
        self.state
    }

    pub fn is_authorized(&self) -> bool {
        self.state.is_authorized()
    }

    pub fn prompt_visible(&self) -> bool {
        self.state == AuthorizationState::AwaitingHandshake || self.reauthenticating
    }

    pub fn on_waiting(&mut self, effects: &mut Vec<SessionEffect>) {
        if self.prompt_visible() {
            return;
        }
        if self.is_authorized() {
            self.reauthenticating = true;
            effects.push(SessionEffect::AuthPrompt { visible: true });
            return;
        }
        self.transition(AuthorizationState::AwaitingHandshake, effects);
        effects.push(SessionEffect::AuthPrompt { visible: true });
    }

    pub fn on_success(&mut self, effects: &mut Vec<SessionEffect>) {
        let was_waiting = self.prompt_visible();
        self.reauthenticating = false;
        self.transition(AuthorizationState::Authorized, effects);
        if was_waiting {
            effects.push(SessionEffect::AuthPrompt { visible: false });
        }
        effects.push(SessionEffect::Notify {
            level: NotificationLevel::Success,
            message: "Authorization successful".into(),
        });
    }

    pub fn on_timeout(&mut self, effects: &mut Vec<SessionEffect>) {
        if !self.prompt_visible() {
            debug!(state = ?self.state, "auth: ignoring timeout outside of a handshake");
            return;
        }
        if !self.reauthenticating {
            self.transition(AuthorizationState::Unauthorized, effects);
        }
        self.reauthenticating = false;
        effects.push(SessionEffect::AuthPrompt { visible: false });
        effects.push(SessionEffect::Notify {
            level: NotificationLevel::Error,
            message: "Authorization timed out".into(),
        });
    }

    /// Snapshots may jump straight to `Authorized` or revert any state to
    /// `Unauthorized`. A pending prompt is closed silently.
    pub fn on_snapshot(&mut self, authorized: bool, effects: &mut Vec<SessionEffect>) {
        let target = if authorized {
            AuthorizationState::Authorized
        } else {
            AuthorizationState::Unauthorized
        };
        if target == self.state {
            return;
        }
        let was_waiting = self.prompt_visible();
        self.reauthenticating = false;
        self.transition(target, effects);
        if was_waiting {
            effects.push(SessionEffect::AuthPrompt { visible: false });
        }
    }

    fn transition(&mut self, next: AuthorizationState, effects: &mut Vec<SessionEffect>) {
        if next == self.state {
            return;
        }
        debug!(from = ?self.state, to = ?next, "auth: state transition");
        self.state = next;
        effects.push(SessionEffect::AuthorizationChanged(next));
    }
}
