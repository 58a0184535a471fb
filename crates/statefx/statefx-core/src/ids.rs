//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Stable identity of an animator state, derived from its name.
///
/// Hosts whose animator already exposes name hashes can wrap them directly;
/// everything inside the engine compares states by this value only.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StateId(pub u32);

impl StateId {
    /// 32-bit FNV-1a over the UTF-8 bytes of `name`.
    pub fn from_name(name: &str) -> Self {
        const OFFSET: u32 = 0x811c_9dc5;
        const PRIME: u32 = 0x0100_0193;
        let mut h = OFFSET;
        for b in name.as_bytes() {
            h ^= u32::from(*b);
            h = h.wrapping_mul(PRIME);
        }
        StateId(h)
    }
}

impl From<&str> for StateId {
    fn from(name: &str) -> Self {
        StateId::from_name(name)
    }
}

/// Index of a binding in the engine's configuration order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BindingId(pub u32);

impl BindingId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle returned when registering a notification listener.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u32);

/// Monotonic allocator for BindingId and ListenerId.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_binding: u32,
    next_listener: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_binding(&mut self) -> BindingId {
        let id = BindingId(self.next_binding);
        self.next_binding = self.next_binding.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_listener(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
