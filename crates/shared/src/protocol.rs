use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChannelAddress, IgniterNr},
    error::{CaseKeyError, ControllerError},
};

/// Commands sent from the operator client to the controller.
///
/// Every frame is one flat JSON object: `type` names the command and the
/// payload fields sit beside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    AuthStart,
    Fire {
        #[serde(flatten)]
        target: ChannelAddress,
    },
    Reset {
        #[serde(flatten)]
        target: ChannelAddress,
    },
    ResetAll,
    SetFireEnabled {
        enabled: bool,
    },
}

impl ClientCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthStart => "auth_start",
            Self::Fire { .. } => "fire",
            Self::Reset { .. } => "reset",
            Self::ResetAll => "reset_all",
            Self::SetFireEnabled { .. } => "set_fire_enabled",
        }
    }
}

/// Authoritative full state pushed by the controller.
///
/// `koffer_states` is keyed by `"caseId-channelNr"`; `direktzuender_states`
/// by igniter number. Both are JSON object keys and therefore strings on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub authorized: bool,
    #[serde(default)]
    pub fire_enabled: bool,
    #[serde(default)]
    pub koffer_states: BTreeMap<String, bool>,
    #[serde(default)]
    pub direktzuender_states: BTreeMap<String, bool>,
}

impl StateSnapshot {
    pub fn case_channels(
        &self,
    ) -> impl Iterator<Item = (Result<ChannelAddress, CaseKeyError>, bool)> + '_ {
        self.koffer_states
            .iter()
            .map(|(key, fired)| (ChannelAddress::from_case_key(key), *fired))
    }

    pub fn direct_igniters(
        &self,
    ) -> impl Iterator<Item = (Result<ChannelAddress, CaseKeyError>, bool)> + '_ {
        self.direktzuender_states.iter().map(|(key, fired)| {
            let address = key
                .trim()
                .parse::<i64>()
                .map(ChannelAddress::direct_igniter)
                .map_err(|_| CaseKeyError::InvalidNumber(key.clone()));
            (address, *fired)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    StateUpdate(StateSnapshot),
    ChannelFired {
        #[serde(flatten)]
        target: ChannelAddress,
    },
    ChannelReset {
        #[serde(flatten)]
        target: ChannelAddress,
    },
    FireEnabledChanged {
        enabled: bool,
    },
    AuthWaiting,
    AuthSuccess,
    AuthTimeout,
    #[serde(rename = "direktzuender_available_changed")]
    DirectIgniterAvailableChanged {
        nr: IgniterNr,
        available: bool,
    },
    Error(ControllerError),
    /// Any `type` this client does not know. Ignored by the reducer.
    #[serde(other)]
    Unknown,
}

/// Body of `POST /api/direktzuender/{nr}/available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr: Option<IgniterNr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn commands_flatten_payload_beside_type() {
        let fire = ClientCommand::Fire {
            target: ChannelAddress::case_channel(2, 5),
        };
        assert_eq!(
            serde_json::to_value(&fire).expect("json"),
            json!({ "type": "fire", "target_type": "koffer", "koffer_id": 2, "kanal_nr": 5 })
        );

        let reset = ClientCommand::Reset {
            target: ChannelAddress::direct_igniter(4),
        };
        assert_eq!(
            serde_json::to_value(&reset).expect("json"),
            json!({ "type": "reset", "target_type": "direktzuender", "nr": 4 })
        );

        assert_eq!(
            serde_json::to_value(ClientCommand::AuthStart).expect("json"),
            json!({ "type": "auth_start" })
        );
        assert_eq!(
            serde_json::to_value(ClientCommand::ResetAll).expect("json"),
            json!({ "type": "reset_all" })
        );
        assert_eq!(
            serde_json::to_value(ClientCommand::SetFireEnabled { enabled: true }).expect("json"),
            json!({ "type": "set_fire_enabled", "enabled": true })
        );
    }

    #[test]
    fn decodes_state_update_with_string_igniter_keys() {
        let raw = r#"{
            "type": "state_update",
            "authorized": true,
            "fire_enabled": false,
            "koffer_states": { "2-5": true },
            "direktzuender_states": { "7": true, "8": false }
        }"#;
        let ServerEvent::StateUpdate(snapshot) = serde_json::from_str(raw).expect("event") else {
            panic!("expected state_update");
        };
        assert!(snapshot.authorized);
        assert!(!snapshot.fire_enabled);

        let cases: Vec<_> = snapshot
            .case_channels()
            .map(|(address, fired)| (address.expect("key"), fired))
            .collect();
        assert_eq!(cases, vec![(ChannelAddress::case_channel(2, 5), true)]);

        let igniters: Vec<_> = snapshot
            .direct_igniters()
            .map(|(address, fired)| (address.expect("key"), fired))
            .collect();
        assert_eq!(
            igniters,
            vec![
                (ChannelAddress::direct_igniter(7), true),
                (ChannelAddress::direct_igniter(8), false),
            ]
        );
    }

    #[test]
    fn state_update_maps_default_to_empty() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"state_update","authorized":false,"fire_enabled":true}"#)
                .expect("event");
        assert_eq!(
            event,
            ServerEvent::StateUpdate(StateSnapshot {
                authorized: false,
                fire_enabled: true,
                ..StateSnapshot::default()
            })
        );
    }

    #[test]
    fn decodes_deltas_by_target_type() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"channel_fired","target_type":"koffer","koffer_id":2,"kanal_nr":5}"#,
        )
        .expect("event");
        assert_eq!(
            event,
            ServerEvent::ChannelFired {
                target: ChannelAddress::case_channel(2, 5)
            }
        );

        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"channel_reset","target_type":"direktzuender","nr":3}"#,
        )
        .expect("event");
        assert_eq!(
            event,
            ServerEvent::ChannelReset {
                target: ChannelAddress::direct_igniter(3)
            }
        );
    }

    #[test]
    fn unknown_types_decode_to_unknown() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"weather_report","wind":12}"#).expect("event");
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn error_message_carries_text() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"error","message":"Nicht autorisiert"}"#)
                .expect("event");
        assert_eq!(
            event,
            ServerEvent::Error(ControllerError::new("Nicht autorisiert"))
        );
    }
}
