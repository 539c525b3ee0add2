use std::collections::BTreeMap;

use shared::{
    domain::{ChannelAddress, ChannelLayout, ChannelState, IgniterNr},
    protocol::StateSnapshot,
};
use tracing::warn;

/// Where an availability value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilitySource {
    /// Confirmed response of the maintenance endpoint.
    Maintenance,
    /// `direktzuender_available_changed` pushed over the socket.
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct AvailabilityViews {
    maintenance: Option<bool>,
    broadcast: Option<bool>,
    diverged_cycles: u32,
}

impl AvailabilityViews {
    fn disagree(&self) -> bool {
        matches!((self.maintenance, self.broadcast), (Some(a), Some(b)) if a != b)
    }
}

/// Per-channel fired/available cache.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelStateStore {
    layout: ChannelLayout,
    channels: BTreeMap<ChannelAddress, ChannelState>,
    availability: BTreeMap<IgniterNr, AvailabilityViews>,
}

impl ChannelStateStore {
    pub fn with_layout(layout: ChannelLayout) -> Self {
        let channels = layout
            .addresses()
            .map(|address| (address, ChannelState::default()))
            .collect();
        Self {
            layout,
            channels,
            availability: BTreeMap::new(),
        }
    }

    pub fn get(&self, address: &ChannelAddress) -> ChannelState {
        self.channels.get(address).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelAddress, &ChannelState)> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Rebuilds the whole map from a snapshot and swaps it in.
    ///
    /// The snapshot carries `fired` only; direct igniter availability is
    /// kept from the previous map. Returns the igniters whose maintenance and
    /// realtime availability views have disagreed for more than one cycle.
    pub fn replace_from_snapshot(&mut self, snapshot: &StateSnapshot) -> Vec<IgniterNr> {
        let mut next: BTreeMap<ChannelAddress, ChannelState> = self
            .layout
            .addresses()
            .map(|address| (address, ChannelState::default()))
            .collect();

        for (address, fired) in snapshot.case_channels().chain(snapshot.direct_igniters()) {
            match address {
                Ok(address) => next.entry(address).or_default().fired = fired,
                Err(err) => warn!(%err, "channels: skipping unreadable snapshot key"),
            }
        }

        for (address, state) in next.iter_mut() {
            if address.is_direct_igniter() {
                state.available = self.get(address).available;
            }
        }
        // Igniters only ever marked unavailable must survive a snapshot that
        // no longer mentions them.
        for (address, state) in &self.channels {
            if address.is_direct_igniter() && !state.available {
                next.entry(*address).or_default().available = false;
            }
        }

        self.channels = next;
        self.reconcile_availability()
    }

    /// Applies a confirmed fire/reset delta. Unknown addresses are recorded.
    pub fn set_fired(&mut self, address: ChannelAddress, fired: bool) -> bool {
        let state = self.channels.entry(address).or_default();
        let changed = state.fired != fired;
        state.fired = fired;
        changed
    }

    /// Records a confirmed availability value; the most recent write wins.
    pub fn set_available(
        &mut self,
        nr: IgniterNr,
        available: bool,
        source: AvailabilitySource,
    ) -> bool {
        let views = self.availability.entry(nr).or_default();
        match source {
            AvailabilitySource::Maintenance => views.maintenance = Some(available),
            AvailabilitySource::Broadcast => views.broadcast = Some(available),
        }

        let state = self
            .channels
            .entry(ChannelAddress::DirectIgniter { nr })
            .or_default();
        let changed = state.available != available;
        state.available = available;
        changed
    }

    fn reconcile_availability(&mut self) -> Vec<IgniterNr> {
        let mut diverged = Vec::new();
        for (nr, views) in self.availability.iter_mut() {
            if views.disagree() {
                views.diverged_cycles += 1;
                if views.diverged_cycles > 1 {
                    diverged.push(*nr);
                }
            } else {
                views.diverged_cycles = 0;
            }
        }
        diverged
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::{CaseId, CaseLayout};

    use super::*;

    fn layout() -> ChannelLayout {
        ChannelLayout {
            cases: vec![CaseLayout {
                id: CaseId(1),
                name: "Stage left".into(),
                channels: 2,
            }],
            direct_igniters: 2,
        }
    }

    fn snapshot(cases: &[(&str, bool)], igniters: &[(&str, bool)]) -> StateSnapshot {
        StateSnapshot {
            authorized: true,
            fire_enabled: true,
            koffer_states: cases.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            direktzuender_states: igniters.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn unknown_addresses_default_to_ready() {
        let store = ChannelStateStore::default();
        assert_eq!(
            store.get(&ChannelAddress::case_channel(9, 9)),
            ChannelState::default()
        );
    }

    #[test]
    fn snapshot_replaces_fired_flags_wholesale() {
        let mut store = ChannelStateStore::with_layout(layout());
        store.set_fired(ChannelAddress::case_channel(1, 1), true);
        store.set_fired(ChannelAddress::case_channel(4, 4), true);

        store.replace_from_snapshot(&snapshot(&[("1-2", true)], &[("2", true)]));

        assert!(!store.get(&ChannelAddress::case_channel(1, 1)).fired);
        assert!(store.get(&ChannelAddress::case_channel(1, 2)).fired);
        assert!(store.get(&ChannelAddress::direct_igniter(2)).fired);
        assert!(!store
            .iter()
            .any(|(address, _)| *address == ChannelAddress::case_channel(4, 4)));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn snapshot_keeps_igniter_availability() {
        let mut store = ChannelStateStore::with_layout(layout());
        store.set_available(IgniterNr(1), false, AvailabilitySource::Maintenance);
        store.set_available(IgniterNr(30), false, AvailabilitySource::Broadcast);

        store.replace_from_snapshot(&snapshot(&[], &[]));

        assert!(!store.get(&ChannelAddress::direct_igniter(1)).available);
        assert!(!store.get(&ChannelAddress::direct_igniter(30)).available);
        assert!(store.get(&ChannelAddress::direct_igniter(2)).available);
    }

    #[test]
    fn unreadable_snapshot_keys_are_skipped() {
        let mut store = ChannelStateStore::default();
        store.replace_from_snapshot(&snapshot(&[("bogus", true), ("3-1", true)], &[("x", true)]));
        assert_eq!(store.len(), 1);
        assert!(store.get(&ChannelAddress::case_channel(3, 1)).fired);
    }

    #[test]
    fn delta_for_unknown_address_is_recorded() {
        let mut store = ChannelStateStore::default();
        assert!(store.set_fired(ChannelAddress::direct_igniter(44), true));
        assert!(store.get(&ChannelAddress::direct_igniter(44)).fired);
        assert!(!store.set_fired(ChannelAddress::direct_igniter(44), true));
    }

    #[test]
    fn availability_disagreement_is_flagged_after_two_cycles() {
        let mut store = ChannelStateStore::with_layout(layout());
        store.set_available(IgniterNr(1), false, AvailabilitySource::Maintenance);
        store.set_available(IgniterNr(1), true, AvailabilitySource::Broadcast);
        assert!(store.get(&ChannelAddress::direct_igniter(1)).available);

        assert!(store.replace_from_snapshot(&snapshot(&[], &[])).is_empty());
        assert_eq!(
            store.replace_from_snapshot(&snapshot(&[], &[])),
            vec![IgniterNr(1)]
        );

        store.set_available(IgniterNr(1), true, AvailabilitySource::Maintenance);
        assert!(store.replace_from_snapshot(&snapshot(&[], &[])).is_empty());
    }
}
