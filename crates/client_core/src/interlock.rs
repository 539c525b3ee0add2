use shared::protocol::ClientCommand;

/// Local mirror of the controller's master fire switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FireInterlock {
    enabled: bool,
}

impl FireInterlock {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Applies a confirmed value. Returns whether the flag changed.
    pub fn confirm(&mut self, enabled: bool) -> bool {
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    /// The command that asks the controller to flip the switch. The local
    /// flag stays untouched until the controller confirms.
    pub fn toggle_request(&self) -> ClientCommand {
        ClientCommand::SetFireEnabled {
            enabled: !self.enabled,
        }
    }
}
