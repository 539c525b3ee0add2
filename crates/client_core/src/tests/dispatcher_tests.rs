use std::sync::Mutex;

use shared::protocol::{ServerEvent, StateSnapshot};

use super::*;

struct RecordingSink {
    connected: bool,
    sent: Mutex<Vec<ClientCommand>>,
}

impl RecordingSink {
    fn connected() -> Self {
        Self {
            connected: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn disconnected() -> Self {
        Self {
            connected: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<ClientCommand> {
        self.sent.lock().expect("sink lock").clone()
    }
}

impl CommandSink for RecordingSink {
    fn submit(&self, command: &ClientCommand) -> SendOutcome {
        if !self.connected {
            return SendOutcome::NotConnected;
        }
        self.sent.lock().expect("sink lock").push(command.clone());
        SendOutcome::Sent
    }
}

fn session(authorized: bool, fire_enabled: bool) -> Session {
    let mut session = Session::default();
    session.apply(ServerEvent::StateUpdate(StateSnapshot {
        authorized,
        fire_enabled,
        ..StateSnapshot::default()
    }));
    session
}

#[test]
fn fire_while_unauthorized_sends_nothing() {
    let dispatcher = CommandDispatcher::new(RecordingSink::connected());
    let outcome = dispatcher.fire(&session(false, true), ChannelAddress::case_channel(1, 1));

    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(FireRejection::NotAuthorized)
    );
    assert!(dispatcher.sink().sent().is_empty());
}

#[test]
fn fire_while_disarmed_sends_nothing() {
    let dispatcher = CommandDispatcher::new(RecordingSink::connected());
    let outcome = dispatcher.fire(&session(true, false), ChannelAddress::direct_igniter(2));

    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(FireRejection::InterlockDisabled)
    );
    assert!(dispatcher.sink().sent().is_empty());
}

#[test]
fn fire_when_armed_sends_address_and_leaves_state_alone() {
    let dispatcher = CommandDispatcher::new(RecordingSink::connected());
    let session = session(true, true);
    let target = ChannelAddress::case_channel(2, 5);

    assert_eq!(dispatcher.fire(&session, target), DispatchOutcome::Sent);
    assert_eq!(dispatcher.sink().sent(), vec![ClientCommand::Fire { target }]);
    assert!(!session.channel(&target).fired);
}

#[test]
fn fire_does_not_consult_fired_or_available() {
    let dispatcher = CommandDispatcher::new(RecordingSink::connected());
    let mut session = session(true, true);
    let target = ChannelAddress::direct_igniter(6);
    session.apply(ServerEvent::ChannelFired { target });
    session.confirm_availability(shared::domain::IgniterNr(6), false);
    assert!(session.is_disabled(&target));

    assert_eq!(dispatcher.fire(&session, target), DispatchOutcome::Sent);
}

#[test]
fn reset_is_sent_without_preconditions() {
    let dispatcher = CommandDispatcher::new(RecordingSink::connected());
    let target = ChannelAddress::case_channel(3, 4);

    assert_eq!(dispatcher.reset(target), DispatchOutcome::Sent);
    assert_eq!(dispatcher.sink().sent(), vec![ClientCommand::Reset { target }]);
}

#[test]
fn reset_all_requires_confirmation() {
    let dispatcher = CommandDispatcher::new(RecordingSink::connected());

    assert_eq!(dispatcher.reset_all(|| false), DispatchOutcome::Cancelled);
    assert!(dispatcher.sink().sent().is_empty());

    assert_eq!(dispatcher.reset_all(|| true), DispatchOutcome::Sent);
    assert_eq!(dispatcher.sink().sent(), vec![ClientCommand::ResetAll]);
}

#[test]
fn toggle_requests_the_inverse_without_predicting() {
    let dispatcher = CommandDispatcher::new(RecordingSink::connected());
    let session = session(true, false);

    dispatcher.toggle_fire_enabled(&session);
    assert!(!session.fire_enabled());
    assert_eq!(
        dispatcher.sink().sent(),
        vec![ClientCommand::SetFireEnabled { enabled: true }]
    );
}

#[test]
fn start_auth_and_explicit_interlock_commands() {
    let dispatcher = CommandDispatcher::new(RecordingSink::connected());
    dispatcher.start_auth();
    dispatcher.start_auth();
    dispatcher.set_fire_enabled(false);
    assert_eq!(
        dispatcher.sink().sent(),
        vec![
            ClientCommand::AuthStart,
            ClientCommand::AuthStart,
            ClientCommand::SetFireEnabled { enabled: false },
        ]
    );
}

#[test]
fn commands_while_disconnected_are_dropped() {
    let dispatcher = CommandDispatcher::new(RecordingSink::disconnected());
    assert_eq!(dispatcher.start_auth(), DispatchOutcome::NotConnected);
    assert_eq!(
        dispatcher.fire(&session(true, true), ChannelAddress::direct_igniter(1)),
        DispatchOutcome::NotConnected
    );
}
