//! The address book: endpoints ever heard of (`known`) and the subset with
//! a live, handshaken session (`connected`).
use std::collections::HashSet;

use peersync_common::PeerEndpoint;

use crate::message::MAX_ADDR_PER_BATCH;

/// Tracks every endpoint this node has heard of and the subset it is
/// presently connected to.
///
/// Invariant: `connected ⊆ known`, enforced by every mutating method here —
/// [`AddressBook::mark_connected`] always inserts into `known` first.
#[derive(Debug, Default)]
pub struct AddressBook {
    known: HashSet<PeerEndpoint>,
    connected: HashSet<PeerEndpoint>,
}

impl AddressBook {
    /// An empty address book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an endpoint as known, without marking it connected.
    pub fn learn(&mut self, endpoint: PeerEndpoint) {
        self.known.insert(endpoint);
    }

    /// Record several endpoints as known, e.g. from an `addr` message.
    pub fn learn_many(&mut self, endpoints: impl IntoIterator<Item = PeerEndpoint>) {
        for endpoint in endpoints {
            self.learn(endpoint);
        }
    }

    /// Mark an endpoint connected. Implicitly marks it known first, so the
    /// `connected ⊆ known` invariant can never be violated.
    pub fn mark_connected(&mut self, endpoint: PeerEndpoint) {
        self.known.insert(endpoint.clone());
        self.connected.insert(endpoint);
    }

    /// Remove an endpoint from `connected` on session teardown. It remains
    /// in `known`.
    pub fn mark_disconnected(&mut self, endpoint: &PeerEndpoint) {
        self.connected.remove(endpoint);
    }

    /// Whether this endpoint currently has a live session.
    pub fn is_connected(&self, endpoint: &PeerEndpoint) -> bool {
        self.connected.contains(endpoint)
    }

    /// The number of connected endpoints.
    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// The number of known endpoints.
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// A snapshot copy of the connected set.
    pub fn connected_snapshot(&self) -> Vec<PeerEndpoint> {
        self.connected.iter().cloned().collect()
    }

    /// A snapshot copy of the known set.
    pub fn known_snapshot(&self) -> Vec<PeerEndpoint> {
        self.known.iter().cloned().collect()
    }

    /// Up to `MAX_ADDR_PER_BATCH` known endpoints, to answer a `getaddr`
    /// request.
    pub fn sample_for_addr(&self) -> Vec<PeerEndpoint> {
        self.known.iter().take(MAX_ADDR_PER_BATCH).cloned().collect()
    }

    /// Up to `count` endpoints in `known \ connected`, chosen at random,
    /// for discovery-driven dialing.
    pub fn sample_undialed(&self, count: usize, rng: &fastrand::Rng) -> Vec<PeerEndpoint> {
        let mut candidates: Vec<&PeerEndpoint> =
            self.known.iter().filter(|e| !self.connected.contains(*e)).collect();
        // Fisher-Yates partial shuffle, enough for a small candidate set.
        let n = candidates.len();
        let take = count.min(n);
        for i in 0..take {
            let j = i + rng.usize(0..(n - i));
            candidates.swap(i, j);
        }
        candidates.into_iter().take(take).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(port: u16) -> PeerEndpoint {
        PeerEndpoint::new("127.0.0.1", port)
    }

    #[test]
    fn connected_is_always_subset_of_known() {
        let mut book = AddressBook::new();
        book.mark_connected(ep(1));
        assert!(book.known_snapshot().contains(&ep(1)));
        assert!(book.connected_snapshot().contains(&ep(1)));
    }

    #[test]
    fn disconnect_retains_known_membership() {
        let mut book = AddressBook::new();
        book.mark_connected(ep(1));
        book.mark_disconnected(&ep(1));
        assert!(!book.is_connected(&ep(1)));
        assert!(book.known_snapshot().contains(&ep(1)));
    }

    #[test]
    fn sample_undialed_excludes_connected() {
        let mut book = AddressBook::new();
        book.learn_many([ep(1), ep(2), ep(3)]);
        book.mark_connected(ep(2));
        let rng = fastrand::Rng::new();
        let sample = book.sample_undialed(10, &rng);
        assert!(!sample.contains(&ep(2)));
        assert_eq!(sample.len(), 2);
    }

    #[test]
    fn sample_for_addr_caps_at_batch_limit() {
        let mut book = AddressBook::new();
        for port in 0..30u16 {
            book.learn(ep(port));
        }
        assert_eq!(book.sample_for_addr().len(), MAX_ADDR_PER_BATCH);
    }
}
