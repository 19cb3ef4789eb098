pub mod allocator;
pub mod types;

pub use allocator::NetworkIdAllocator;
pub use types::NetworkId;
