use serde::{Deserialize, Serialize};

/// Identifier of a simulated entity, shared with clients on the wire.
///
/// Ids are handed out by a [`crate::NetworkIdAllocator`] and are never
/// reused for the lifetime of that allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl NetworkId {
    pub fn to_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(val: u64) -> Self {
        Self(val)
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_id_u64_roundtrip() {
        let id = NetworkId(42);
        assert_eq!(NetworkId::from_u64(id.to_u64()), id);
    }

    #[test]
    fn network_id_serializes_as_bare_number() {
        let json = serde_json::to_string(&NetworkId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn network_id_display() {
        assert_eq!(NetworkId(12).to_string(), "N12");
    }
}
