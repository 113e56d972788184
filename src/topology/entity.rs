//! `EntityHandle`: a strong, zero-cost handle for entities in the mesh store
//!
//! Vertices, elements and entity sets are all addressed by an opaque handle.
//! `EntityHandle` wraps a nonzero `u64` so that 0 stays reserved as the
//! "no entity" sentinel, and so the handle can travel in tuple-list `ulong`
//! columns without any conversion table.

use std::{fmt, num::NonZeroU64};

/// Opaque handle of a mesh entity (vertex, element or entity set).
///
/// `repr(transparent)` over `NonZeroU64`, so `Option<EntityHandle>` is the
/// size of a `u64` and a handle is written to the wire as its raw value.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct EntityHandle(NonZeroU64);

impl EntityHandle {
    /// Creates a handle from a raw value; `None` for the reserved value 0.
    #[inline]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(EntityHandle)
    }

    /// Wraps an already non-zero value.
    #[inline]
    pub const fn from_nonzero(raw: NonZeroU64) -> Self {
        EntityHandle(raw)
    }

    /// Returns the raw `u64` value of this handle.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityHandle").field(&self.get()).finish()
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(EntityHandle::new(0).is_none());
    }

    #[test]
    fn debug_and_display() {
        let h = EntityHandle::new(7).unwrap();
        assert_eq!(format!("{:?}", h), "EntityHandle(7)");
        assert_eq!(format!("{}", h), "7");
    }

    #[test]
    fn json_roundtrip() {
        let h = EntityHandle::new(123).unwrap();
        let s = serde_json::to_string(&h).unwrap();
        let back: EntityHandle = serde_json::from_str(&s).unwrap();
        assert_eq!(back, h);
    }
}
