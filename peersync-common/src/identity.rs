//! Node identities: short opaque tokens used to detect self-connections.
use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque, short identity chosen once at node start.
///
/// Used only to detect a handshake looping back to ourselves; it carries no
/// other meaning and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    /// Generate a fresh identity: 8 lowercase hex-ish characters.
    pub fn generate(rng: &fastrand::Rng) -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdef";
        let id: String = (0..8)
            .map(|_| ALPHABET[rng.usize(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_eight_char_identity() {
        let rng = fastrand::Rng::new();
        let id = NodeIdentity::generate(&rng);
        assert_eq!(id.as_str().len(), 8);
    }

    #[test]
    fn distinct_identities_are_unlikely_to_collide() {
        let rng = fastrand::Rng::new();
        let a = NodeIdentity::generate(&rng);
        let b = NodeIdentity::generate(&rng);
        assert_ne!(a, b);
    }
}
