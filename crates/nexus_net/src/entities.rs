//! The entities table: dense per-id storage of live field bytes.
//!
//! Grounded in `oroboros_core::ecs::entity`'s `EntityId`/`Entity` pair, with
//! the index+generation scheme swapped for the spec's id+version scheme:
//! ids are dense and bounded by `MAX_SYNCED_ENTITY_COUNT` rather than
//! freelist-recycled indices into a growing array.
//!
//! Callers must validate `entity_id < MAX_SYNCED_ENTITY_COUNT` before
//! indexing here — that check, and the poison-the-parser-position behavior
//! on failure, belongs to [`crate::reader`].

use std::sync::Arc;

use nexus_core::{ClassMetadata, EntityId, EntityVersion, RoleFlags};

/// One live entity: its class, role, and untyped field bytes.
///
/// `fields` is sized to `class.fixed_fields_size` and indexed by each
/// field's declared `offset`, per the untyped-byte-image design.
pub struct EntityRecord {
    /// Distinguishes this life of the id from prior ones.
    pub version: EntityVersion,
    /// Shared, read-only class layout.
    pub class: Arc<ClassMetadata>,
    /// Authority/locality flags.
    pub role: RoleFlags,
    /// Live field bytes, addressed by each field's `offset`.
    pub fields: Vec<u8>,
}

impl EntityRecord {
    fn new(version: EntityVersion, class: Arc<ClassMetadata>, role: RoleFlags) -> Self {
        let size = class.fixed_fields_size;
        Self { version, class, role, fields: vec![0u8; size] }
    }
}

/// Dense, bounded storage of [`EntityRecord`]s keyed by [`EntityId`].
#[derive(Default)]
pub struct EntitiesTable {
    slots: Vec<Option<EntityRecord>>,
}

impl EntitiesTable {
    /// Creates a table with `capacity` empty slots (`MAX_SYNCED_ENTITY_COUNT`).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { slots: (0..capacity).map(|_| None).collect() }
    }

    /// Total number of slots (`MAX_SYNCED_ENTITY_COUNT`).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Looks up a live entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.slots.get(id.index())?.as_ref()
    }

    /// Looks up a live entity mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// True if `id` currently names a live entity.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.slots.get(id.index()).is_some_and(Option::is_some)
    }

    /// Creates `id` if unknown, or destroys and recreates it if its current
    /// version differs from `version`. Returns the (possibly fresh) record.
    ///
    /// Panics if `id.index()` is outside `capacity` — callers must validate
    /// the id against `MAX_SYNCED_ENTITY_COUNT` first.
    pub fn create_or_replace(
        &mut self,
        id: EntityId,
        version: EntityVersion,
        class: Arc<ClassMetadata>,
        role: RoleFlags,
    ) -> &mut EntityRecord {
        let slot = &mut self.slots[id.index()];
        let needs_replace = slot.as_ref().map_or(true, |existing| existing.version != version);
        if needs_replace {
            *slot = Some(EntityRecord::new(version, class, role));
        }
        slot.as_mut().expect("just ensured occupied")
    }

    /// Destroys `id`, returning its record if it was alive.
    pub fn destroy(&mut self, id: EntityId) -> Option<EntityRecord> {
        self.slots.get_mut(id.index())?.take()
    }

    /// Iterates every live, locally-predicted entity mutably.
    pub fn iter_predicted_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut EntityRecord)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let record = slot.as_mut()?;
            record.role.is_predicted().then(|| (EntityId::new(index as u16), record))
        })
    }

    /// Iterates every live entity driven by local interpolation — purely
    /// local ones and predicted ones — per §4.6's "local-or-predicted" set.
    pub fn iter_locally_interpolated_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut EntityRecord)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let record = slot.as_mut()?;
            (record.role.is_local() || record.role.is_predicted()).then(|| (EntityId::new(index as u16), record))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{EntityVersion, FieldDescriptor, FieldFlags, FieldKind, RoleFlags};

    fn dummy_class() -> Arc<ClassMetadata> {
        let fields = vec![FieldDescriptor {
            offset: 0,
            fixed_offset: 0,
            size: 4,
            kind: FieldKind::Value,
            flags: FieldFlags::empty(),
            interpolator: None,
            on_sync: None,
        }];
        Arc::new(ClassMetadata::new(1, fields, Vec::new(), false, false))
    }

    #[test]
    fn create_then_replace_on_version_mismatch() {
        let mut table = EntitiesTable::new(4);
        let id = EntityId::new(1);
        table.create_or_replace(id, EntityVersion::new(0), dummy_class(), RoleFlags::empty());
        assert!(table.is_alive(id));

        table.create_or_replace(id, EntityVersion::new(1), dummy_class(), RoleFlags::empty());
        assert_eq!(table.get(id).unwrap().version, EntityVersion::new(1));
    }

    #[test]
    fn same_version_is_idempotent() {
        let mut table = EntitiesTable::new(4);
        let id = EntityId::new(0);
        table.create_or_replace(id, EntityVersion::new(0), dummy_class(), RoleFlags::empty())
            .fields[0] = 42;
        table.create_or_replace(id, EntityVersion::new(0), dummy_class(), RoleFlags::empty());
        assert_eq!(table.get(id).unwrap().fields.first().copied(), Some(42));
    }
}
