//! JSON framing for the controller socket.

use serde_json::error::Category;
use shared::protocol::{ClientCommand, ServerEvent};

use crate::error::DecodeError;

pub fn encode_command(command: &ClientCommand) -> serde_json::Result<String> {
    serde_json::to_string(command)
}

/// Decodes one text frame. Unrecognized `type` tags decode to
/// [`ServerEvent::Unknown`] rather than failing.
pub fn decode_frame(text: &str) -> Result<ServerEvent, DecodeError> {
    serde_json::from_str::<ServerEvent>(text).map_err(|err| match err.classify() {
        Category::Syntax | Category::Eof | Category::Io => DecodeError::NotJson(err),
        Category::Data => DecodeError::Payload(err),
    })
}

#[cfg(test)]
mod tests {
    use shared::domain::ChannelAddress;

    use super::*;

    #[test]
    fn encodes_fire_as_single_flat_object() {
        let text = encode_command(&ClientCommand::Fire {
            target: ChannelAddress::direct_igniter(9),
        })
        .expect("encode");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["type"], "fire");
        assert_eq!(value["target_type"], "direktzuender");
        assert_eq!(value["nr"], 9);
        assert_eq!(value.as_object().map(|o| o.len()), Some(3));
    }

    #[test]
    fn garbage_is_a_json_fault() {
        assert!(matches!(
            decode_frame("{not json"),
            Err(DecodeError::NotJson(_))
        ));
        assert!(matches!(decode_frame(""), Err(DecodeError::NotJson(_))));
    }

    #[test]
    fn known_type_with_bad_payload_is_a_payload_fault() {
        assert!(matches!(
            decode_frame(r#"{"type":"fire_enabled_changed","enabled":"yes"}"#),
            Err(DecodeError::Payload(_))
        ));
        assert!(matches!(
            decode_frame(r#"{"enabled":true}"#),
            Err(DecodeError::Payload(_))
        ));
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        assert_eq!(
            decode_frame(r#"{"type":"future_feature","x":1}"#).expect("decode"),
            ServerEvent::Unknown
        );
    }
}
