//! Entity identity and role flags.
//!
//! Ids are dense and bounded by `MAX_SYNCED_ENTITY_COUNT`, unlike the
//! freelist-recycled index+generation ids of a general-purpose ECS: the
//! version here distinguishes successive lives of the *same* id rather than
//! detecting stale handles into a growing array.

/// Dense entity identifier, bounded by `MAX_SYNCED_ENTITY_COUNT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u16);

impl EntityId {
    /// Sentinel for "no entity" / a poisoned read position.
    pub const INVALID: Self = Self(u16::MAX);

    /// Wraps a raw wire id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw wire id, usable as a dense array index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw wire id.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// False once an out-of-range id has poisoned a read.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u16::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Distinguishes successive lives of the same [`EntityId`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EntityVersion(u8);

impl EntityVersion {
    /// Wraps a raw version byte.
    #[inline]
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the raw version byte.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Orthogonal authority/locality flags for an entity.
///
/// `is_local` entities never leave the client; `is_local_controlled` ones
/// are predicted and rolled back; `is_server_controlled` ones are
/// interpolated. An entity may be both local-controlled and server-known
/// (a player's own avatar, predicted here and corrected by the server).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoleFlags(u8);

impl RoleFlags {
    const IS_LOCAL: u8 = 1 << 0;
    const IS_LOCAL_CONTROLLED: u8 = 1 << 1;
    const IS_SERVER_CONTROLLED: u8 = 1 << 2;

    /// No flags set.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Entity exists only on this client, never synchronized.
    #[inline]
    #[must_use]
    pub const fn is_local(self) -> bool {
        self.0 & Self::IS_LOCAL != 0
    }

    /// Authority lies with this client; state is predicted and rolled back.
    #[inline]
    #[must_use]
    pub const fn is_local_controlled(self) -> bool {
        self.0 & Self::IS_LOCAL_CONTROLLED != 0
    }

    /// Authority lies with the server; state is interpolated.
    #[inline]
    #[must_use]
    pub const fn is_server_controlled(self) -> bool {
        self.0 & Self::IS_SERVER_CONTROLLED != 0
    }

    /// Sets `is_local`.
    #[inline]
    #[must_use]
    pub const fn with_local(mut self, value: bool) -> Self {
        self.0 = if value { self.0 | Self::IS_LOCAL } else { self.0 & !Self::IS_LOCAL };
        self
    }

    /// Sets `is_local_controlled`.
    #[inline]
    #[must_use]
    pub const fn with_local_controlled(mut self, value: bool) -> Self {
        self.0 = if value { self.0 | Self::IS_LOCAL_CONTROLLED } else { self.0 & !Self::IS_LOCAL_CONTROLLED };
        self
    }

    /// Sets `is_server_controlled`.
    #[inline]
    #[must_use]
    pub const fn with_server_controlled(mut self, value: bool) -> Self {
        self.0 = if value { self.0 | Self::IS_SERVER_CONTROLLED } else { self.0 & !Self::IS_SERVER_CONTROLLED };
        self
    }

    /// Predicted entities are locally controlled but not purely local.
    #[inline]
    #[must_use]
    pub const fn is_predicted(self) -> bool {
        self.is_local_controlled() && !self.is_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_validity() {
        assert!(EntityId::new(0).is_valid());
        assert!(!EntityId::INVALID.is_valid());
        assert_eq!(EntityId::new(42).index(), 42);
    }

    #[test]
    fn role_flags_predicted() {
        let flags = RoleFlags::empty().with_local_controlled(true);
        assert!(flags.is_predicted());

        let local_only = flags.with_local(true);
        assert!(!local_only.is_predicted());
    }
}
