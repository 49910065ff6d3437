//! Class-metadata reflection.
//!
//! The reader and interpolation pipeline never know an entity's concrete
//! Rust type; they copy bytes at offsets described by this metadata. A real
//! deployment produces [`ClassMetadata`] via build-time codegen over entity
//! declarations; this crate only provides the table shape and a runtime
//! [`ClassRegistry`] for registering it, per the "runtime registration is
//! acceptable" allowance on the reflection design.

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::EntityId;

/// How a field's bytes are interpreted by the reader and rollback engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// A plain value field, copied byte-for-byte.
    Value,
    /// An [`EntityId`] reference to another entity; never owning.
    EntityRef,
    /// An aggregate field with its own nested layout, addressed through a
    /// [`SyncableFieldDescriptor`].
    SyncableSyncvar,
}

/// Per-field flags. Only `ONLY_FOR_REMOTE` is named by the wire contract
/// today; left as a bitmask so new flags don't require a layout change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldFlags(u8);

impl FieldFlags {
    /// Field is applied only to server-controlled entities; skipped during
    /// rollback's reset-to-authoritative step.
    pub const ONLY_FOR_REMOTE: Self = Self(1 << 0);

    /// No flags set.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Union of two flag sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if `flag` is present in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }
}

/// A pure, state-free blend function: writes `lerp(a, b, t)` into `dst`.
///
/// `a`/`b`/`dst` are all exactly [`FieldDescriptor::size`] bytes.
pub type InterpolatorFn = fn(a: &[u8], b: &[u8], dst: &mut [u8], t: f32);

/// A pure change-notification callback, invoked with the pre-change bytes.
///
/// `sync_call_count` is the number of diff syncs folded into this callback;
/// always `1` today (see the open question in the top-level design notes).
pub type OnSyncFn = fn(entity_id: EntityId, prev_bytes: &[u8], sync_call_count: u32);

/// Describes one field of an entity class.
#[derive(Clone, Copy, Debug)]
pub struct FieldDescriptor {
    /// Byte offset of the field within the entity's live field image.
    pub offset: usize,
    /// Byte offset of the field within the on-wire "flat" record layout.
    pub fixed_offset: usize,
    /// Size of the field in bytes.
    pub size: usize,
    /// How the field's bytes are interpreted.
    pub kind: FieldKind,
    /// Behavioral flags.
    pub flags: FieldFlags,
    /// Blend function for visual interpolation, or `None` if the field is
    /// not interpolated (applied verbatim instead).
    pub interpolator: Option<InterpolatorFn>,
    /// Change-notification callback, or `None`.
    pub on_sync: Option<OnSyncFn>,
}

impl FieldDescriptor {
    /// True if this field participates in visual interpolation.
    #[inline]
    #[must_use]
    pub const fn is_interpolated(&self) -> bool {
        self.interpolator.is_some()
    }
}

/// Reads a syncable aggregate field's full self-serialized blob.
///
/// Returns the number of bytes consumed from `wire`.
pub type SyncableReaderFn = fn(dst: &mut [u8], wire: &[u8]) -> usize;

/// Describes one "syncable" aggregate field: a structured sub-object with
/// its own serialization and RPC endpoints, addressed by field id within
/// its owning entity.
#[derive(Clone, Copy, Debug)]
pub struct SyncableFieldDescriptor {
    /// Field id, used by RPC records to target this syncable (as opposed to
    /// `0xFF`, which targets the owning entity directly).
    pub field_id: u8,
    /// Offset of the syncable's state within the entity's live field image.
    pub offset: usize,
    /// Reads the syncable's full-sync blob.
    pub reader: SyncableReaderFn,
}

/// Immutable per-class layout and behavior table.
///
/// Shared through [`Arc`] — snapshots and entities reference it read-only
/// and never own it.
#[derive(Debug)]
pub struct ClassMetadata {
    /// Wire class id.
    pub class_id: u16,
    /// Fields in declared order; diff bitfields index into this list.
    pub fields: Vec<FieldDescriptor>,
    /// Syncable aggregate fields, addressable by id from RPC records.
    pub syncable_fields: Vec<SyncableFieldDescriptor>,
    /// Number of fields with `kind.is_interpolated()`.
    pub interpolated_field_count: usize,
    /// Total byte size of all interpolated fields, packed.
    pub interpolated_fields_size: usize,
    /// Total byte size of all fields in the fixed (non-syncable) layout.
    pub fixed_fields_size: usize,
    /// `ceil(fields.len() / 8)`, the diff record's presence-bitfield size.
    pub fields_flags_size: usize,
    /// Whether instances of this class receive per-tick `Update` calls.
    pub is_updateable: bool,
    /// Whether `Update` runs locally even when server-controlled (used by
    /// predicted entities that still want local-only effects).
    pub update_on_client: bool,
}

impl ClassMetadata {
    /// Builds metadata from a field list, deriving the size/count fields.
    #[must_use]
    pub fn new(
        class_id: u16,
        fields: Vec<FieldDescriptor>,
        syncable_fields: Vec<SyncableFieldDescriptor>,
        is_updateable: bool,
        update_on_client: bool,
    ) -> Self {
        let interpolated_field_count = fields.iter().filter(|f| f.is_interpolated()).count();
        let interpolated_fields_size = fields
            .iter()
            .filter(|f| f.is_interpolated())
            .map(|f| f.size)
            .sum();
        let fixed_fields_size = fields.iter().map(|f| f.size).sum();
        let fields_flags_size = fields.len().div_ceil(8);

        Self {
            class_id,
            fields,
            syncable_fields,
            interpolated_field_count,
            interpolated_fields_size,
            fixed_fields_size,
            fields_flags_size,
            is_updateable,
            update_on_client,
        }
    }

    /// Looks up a syncable field descriptor by its wire field id.
    #[must_use]
    pub fn syncable_field(&self, field_id: u8) -> Option<&SyncableFieldDescriptor> {
        self.syncable_fields.iter().find(|f| f.field_id == field_id)
    }
}

/// Runtime table of class metadata, registered at startup.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<u16, Arc<ClassMetadata>>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { classes: HashMap::new() }
    }

    /// Registers a class, replacing any prior registration of the same id.
    pub fn register(&mut self, metadata: ClassMetadata) {
        self.classes.insert(metadata.class_id, Arc::new(metadata));
    }

    /// Looks up a class's metadata by id.
    #[must_use]
    pub fn get(&self, class_id: u16) -> Option<Arc<ClassMetadata>> {
        self.classes.get(&class_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lerp_f32(a: &[u8], b: &[u8], dst: &mut [u8], t: f32) {
        let a = f32::from_le_bytes(a.try_into().unwrap());
        let b = f32::from_le_bytes(b.try_into().unwrap());
        dst.copy_from_slice(&(a + (b - a) * t).to_le_bytes());
    }

    #[test]
    fn derives_sizes_from_fields() {
        let fields = vec![
            FieldDescriptor {
                offset: 0,
                fixed_offset: 0,
                size: 4,
                kind: FieldKind::Value,
                flags: FieldFlags::empty(),
                interpolator: Some(lerp_f32),
                on_sync: None,
            },
            FieldDescriptor {
                offset: 4,
                fixed_offset: 4,
                size: 1,
                kind: FieldKind::Value,
                flags: FieldFlags::ONLY_FOR_REMOTE,
                interpolator: None,
                on_sync: None,
            },
        ];
        let meta = ClassMetadata::new(2, fields, Vec::new(), true, false);
        assert_eq!(meta.interpolated_field_count, 1);
        assert_eq!(meta.interpolated_fields_size, 4);
        assert_eq!(meta.fixed_fields_size, 5);
        assert_eq!(meta.fields_flags_size, 1);
    }

    #[test]
    fn registry_roundtrip() {
        let mut registry = ClassRegistry::new();
        registry.register(ClassMetadata::new(2, Vec::new(), Vec::new(), false, false));
        assert!(registry.get(2).is_some());
        assert!(registry.get(3).is_none());
    }
}
