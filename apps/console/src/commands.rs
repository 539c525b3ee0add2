use client_core::Session;
use shared::domain::{ChannelAddress, IgniterNr};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  auth                      start the hardware authorization handshake
  arm [on|off]              toggle or set the fire interlock
  fire case <id> <ch>       fire a case channel
  fire dz <nr>              fire a direct igniter
  reset case <id> <ch>      reset a case channel
  reset dz <nr>             reset a direct igniter
  reset-all                 reset every channel (asks for confirmation)
  available <nr> on|off     mark a direct igniter (un)available
  status                    print connection, gates and channels
  quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Auth,
    /// `None` toggles the confirmed interlock value.
    Arm(Option<bool>),
    Fire(ChannelAddress),
    Reset(ChannelAddress),
    ResetAll,
    Available { nr: IgniterNr, available: bool },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a number")]
    NotANumber(String),
}

/// Parses one operator line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (head.to_ascii_lowercase().as_str(), args) {
        ("auth", []) => Command::Auth,
        ("arm", []) => Command::Arm(None),
        ("arm", [state]) => Command::Arm(Some(
            parse_switch(state).ok_or(CommandError::Usage("arm [on|off]"))?,
        )),
        ("fire", target) => Command::Fire(parse_target(target, "fire case <id> <ch> | fire dz <nr>")?),
        ("reset", target) => {
            Command::Reset(parse_target(target, "reset case <id> <ch> | reset dz <nr>")?)
        }
        ("reset-all", []) => Command::ResetAll,
        ("available", [nr, state]) => Command::Available {
            nr: IgniterNr(parse_number(nr)?),
            available: parse_switch(state).ok_or(CommandError::Usage("available <nr> on|off"))?,
        },
        ("available", _) => return Err(CommandError::Usage("available <nr> on|off")),
        ("status", []) => Command::Status,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        ("auth" | "arm" | "reset-all" | "status" | "quit" | "exit", _) => {
            return Err(CommandError::Usage("command takes no extra arguments"))
        }
        _ => return Err(CommandError::Unknown(head.to_string())),
    };
    Ok(Some(command))
}

fn parse_target(args: &[&str], usage: &'static str) -> Result<ChannelAddress, CommandError> {
    match args {
        [kind, case_id, channel_nr] if kind.eq_ignore_ascii_case("case") => Ok(
            ChannelAddress::case_channel(parse_number(case_id)?, parse_number(channel_nr)?),
        ),
        [kind, nr] if kind.eq_ignore_ascii_case("dz") => {
            Ok(ChannelAddress::direct_igniter(parse_number(nr)?))
        }
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_number(raw: &str) -> Result<i64, CommandError> {
    raw.parse()
        .map_err(|_| CommandError::NotANumber(raw.to_string()))
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Why a channel may not be fired right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FireBlocked {
    #[error("has already fired")]
    AlreadyFired,
    #[error("is marked unavailable")]
    Unavailable,
    #[error("is locked, run 'auth' first")]
    NotAuthorized,
    #[error("is locked, run 'arm on' first")]
    NotArmed,
}

/// Checks the `disabled` projection before a fire leaves the console.
pub fn fire_blocker(session: &Session, target: &ChannelAddress) -> Option<FireBlocked> {
    if !session.is_disabled(target) {
        return None;
    }
    let state = session.channel(target);
    Some(if state.fired {
        FireBlocked::AlreadyFired
    } else if !state.available {
        FireBlocked::Unavailable
    } else if !session.is_authorized() {
        FireBlocked::NotAuthorized
    } else {
        FireBlocked::NotArmed
    })
}

/// Accepts `y`/`yes` only; anything else cancels.
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
