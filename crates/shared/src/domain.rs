use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CaseKeyError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(CaseId);
id_newtype!(ChannelNr);
id_newtype!(IgniterNr);

/// Address of a single firing circuit.
///
/// Case channels and direct igniters live in disjoint keyspaces: a case
/// channel is keyed by `(case_id, channel_nr)`, a direct igniter by `nr`.
/// The serde representation is the controller's wire shape
/// (`target_type` plus address fields) so it can be flattened straight into
/// command and event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "target_type")]
pub enum ChannelAddress {
    #[serde(rename = "koffer")]
    CaseChannel {
        #[serde(rename = "koffer_id")]
        case_id: CaseId,
        #[serde(rename = "kanal_nr")]
        channel_nr: ChannelNr,
    },
    #[serde(rename = "direktzuender")]
    DirectIgniter { nr: IgniterNr },
}

impl ChannelAddress {
    pub fn case_channel(case_id: i64, channel_nr: i64) -> Self {
        Self::CaseChannel {
            case_id: CaseId(case_id),
            channel_nr: ChannelNr(channel_nr),
        }
    }

    pub fn direct_igniter(nr: i64) -> Self {
        Self::DirectIgniter { nr: IgniterNr(nr) }
    }

    /// Composite snapshot key (`"caseId-channelNr"`) for case channels.
    pub fn case_key(&self) -> Option<String> {
        match self {
            Self::CaseChannel {
                case_id,
                channel_nr,
            } => Some(format!("{case_id}-{channel_nr}")),
            Self::DirectIgniter { .. } => None,
        }
    }

    /// Inverse of [`ChannelAddress::case_key`].
    pub fn from_case_key(key: &str) -> Result<Self, CaseKeyError> {
        let (case_id, channel_nr) = key
            .split_once('-')
            .ok_or_else(|| CaseKeyError::MissingSeparator(key.to_string()))?;
        let case_id = case_id
            .trim()
            .parse::<i64>()
            .map_err(|_| CaseKeyError::InvalidNumber(key.to_string()))?;
        let channel_nr = channel_nr
            .trim()
            .parse::<i64>()
            .map_err(|_| CaseKeyError::InvalidNumber(key.to_string()))?;
        Ok(Self::case_channel(case_id, channel_nr))
    }

    pub fn is_direct_igniter(&self) -> bool {
        matches!(self, Self::DirectIgniter { .. })
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaseChannel {
                case_id,
                channel_nr,
            } => write!(f, "case {case_id} channel {channel_nr}"),
            Self::DirectIgniter { nr } => write!(f, "direct igniter {nr}"),
        }
    }
}

/// Cached status of one channel. `available` only ever changes for direct
/// igniters; case channels stay available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub fired: bool,
    pub available: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            fired: false,
            available: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    #[default]
    Unauthorized,
    AwaitingHandshake,
    Authorized,
}

impl AuthorizationState {
    pub fn is_authorized(self) -> bool {
        self == Self::Authorized
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseLayout {
    pub id: CaseId,
    pub name: String,
    pub channels: i64,
}

/// Channel universe known ahead of any snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub cases: Vec<CaseLayout>,
    pub direct_igniters: i64,
}

impl ChannelLayout {
    pub fn addresses(&self) -> impl Iterator<Item = ChannelAddress> + '_ {
        let case_channels = self.cases.iter().flat_map(|case| {
            (1..=case.channels).map(move |nr| ChannelAddress::CaseChannel {
                case_id: case.id,
                channel_nr: ChannelNr(nr),
            })
        });
        let igniters = (1..=self.direct_igniters).map(ChannelAddress::direct_igniter);
        case_channels.chain(igniters)
    }
}
