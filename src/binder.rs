//! Presence-driven bus binding
//!
//! Keeps remote channel strips in step with who is connected and who the
//! studio has put on air. Strips are created by the session manager when
//! audio actually arrives; this binder never creates one for a roster
//! entry alone, and it is the only writer of a remote source's `main` send.

use std::collections::BTreeSet;

use crate::mixer::{AudioSourceId, BusName, MixerStore, SendUpdate, SourceTarget};
use crate::protocol::PeerId;

/// Roster change between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub joined: Vec<PeerId>,
    pub left: Vec<PeerId>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

pub struct PresenceBinder {
    store: MixerStore,
    roster: BTreeSet<PeerId>,
    /// Presenters the studio has put on air
    admitted: BTreeSet<PeerId>,
}

impl PresenceBinder {
    pub fn new(store: MixerStore) -> Self {
        Self {
            store,
            roster: BTreeSet::new(),
            admitted: BTreeSet::new(),
        }
    }

    pub fn roster(&self) -> impl Iterator<Item = &PeerId> {
        self.roster.iter()
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.roster.contains(peer)
    }

    pub fn is_admitted(&self, peer: &PeerId) -> bool {
        self.admitted.contains(peer)
    }

    pub fn admitted(&self) -> impl Iterator<Item = &PeerId> {
        self.admitted.iter()
    }

    /// Diff a roster snapshot against the previous one.
    ///
    /// Departed presenters lose their admission and main send; their
    /// strips stay so settings survive a reconnect.
    pub fn apply_roster(&mut self, presenters: Vec<PeerId>) -> RosterDiff {
        let next: BTreeSet<PeerId> = presenters.into_iter().collect();
        let diff = RosterDiff {
            joined: next.difference(&self.roster).cloned().collect(),
            left: self.roster.difference(&next).cloned().collect(),
        };
        self.roster = next;

        for peer in &diff.joined {
            tracing::info!("Presenter {} connected", peer);
        }
        for peer in &diff.left {
            tracing::info!("Presenter {} disconnected", peer);
            if self.admitted.remove(peer) {
                self.write_main(peer, false);
            }
        }
        diff
    }

    /// Record the studio's on-air decision for `peer` and apply it to the
    /// strip if one exists. Returns whether a strip was updated.
    pub fn set_presenter_on_air(&mut self, peer: &PeerId, on_air: bool) -> bool {
        if on_air {
            self.admitted.insert(peer.clone());
        } else {
            self.admitted.remove(peer);
        }
        self.write_main(peer, on_air)
    }

    /// A strip for `source` now exists; apply any earlier admission
    pub fn on_source_attached(&mut self, source: &AudioSourceId) {
        let Some(peer) = source.peer_id() else {
            return;
        };
        if self.admitted.contains(peer) {
            let peer = peer.clone();
            self.write_main(&peer, true);
        }
    }

    /// Explicitly delete the strip for `peer`
    pub fn remove_source(&mut self, peer: &PeerId) -> bool {
        self.admitted.remove(peer);
        self.store.remove_source(&AudioSourceId::Remote(peer.clone()))
    }

    fn write_main(&self, peer: &PeerId, enabled: bool) -> bool {
        let source = AudioSourceId::Remote(peer.clone());
        if !self.store.snapshot().contains(&source) {
            return false;
        }
        if self.store.send_enabled(&source, BusName::Main) == enabled {
            return true;
        }
        match self.store.set_send(
            &SourceTarget::Source(source.clone()),
            BusName::Main,
            SendUpdate::enable(enabled),
        ) {
            Ok(()) => {
                tracing::info!("{} main send {}", source, if enabled { "on" } else { "off" });
                true
            }
            Err(e) => {
                tracing::warn!("Could not update main send of {}: {}", source, e);
                false
            }
        }
    }
}
