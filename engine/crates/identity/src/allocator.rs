use crate::types::NetworkId;

/// Hands out monotonically increasing [`NetworkId`]s.
///
/// Unlike a generational slot allocator, released ids are never recycled:
/// a client that still holds a stale id can never observe it pointing at a
/// different entity. Each simulation owns its own allocator.
#[derive(Debug, Clone)]
pub struct NetworkIdAllocator {
    next: u64,
}

impl NetworkIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Allocator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    pub fn allocate(&mut self) -> NetworkId {
        let id = NetworkId(self.next);
        self.next += 1;
        id
    }
}

impl Default for NetworkIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_returns_increasing_ids() {
        let mut alloc = NetworkIdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(a, NetworkId(1));
        assert_eq!(b, NetworkId(2));
        assert!(b > a);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut alloc = NetworkIdAllocator::new();
        let issued: Vec<NetworkId> = (0..100).map(|_| alloc.allocate()).collect();
        let mut deduped = issued.clone();
        deduped.dedup();
        assert_eq!(issued.len(), deduped.len());
        assert_eq!(alloc.allocate(), NetworkId(101));
    }

    #[test]
    fn independent_allocators_do_not_share_state() {
        let mut a = NetworkIdAllocator::new();
        let mut b = NetworkIdAllocator::starting_at(500);
        a.allocate();
        a.allocate();
        assert_eq!(b.allocate(), NetworkId(500));
        assert_eq!(a.allocate(), NetworkId(3));
    }
}
