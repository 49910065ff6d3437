//! Per-entity interpolation scratch buffers, per §3.
//!
//! Two packed byte buffers per entity, each sized to the class's
//! `interpolated_fields_size` and addressed by each interpolated field's
//! `fixed_offset`: `interpolated_initial` (the value at the start of the
//! current visual frame) and `interpolated_prev` (the value at the start of
//! the previous one). §4.6's remote/local interpolation passes blend
//! against these; [`crate::reader`] and [`crate::prediction`] are the only
//! writers.

use std::collections::HashMap;

use nexus_core::{ClassMetadata, EntityId};

/// Owns the `interpolated_initial`/`interpolated_prev` buffers for every
/// entity currently tracked for visual blending.
#[derive(Default)]
pub struct InterpolationScratch {
    initial: HashMap<EntityId, Vec<u8>>,
    prev: HashMap<EntityId, Vec<u8>>,
}

impl InterpolationScratch {
    /// Creates an empty scratch table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors `fields`' interpolated bytes into `interpolated_initial[id]`,
    /// packed by each field's `fixed_offset`.
    pub fn mirror_initial(&mut self, entity_id: EntityId, class: &ClassMetadata, fields: &[u8]) {
        if class.interpolated_fields_size == 0 {
            return;
        }
        let buf = self.initial.entry(entity_id).or_insert_with(|| vec![0u8; class.interpolated_fields_size]);
        if buf.len() != class.interpolated_fields_size {
            buf.resize(class.interpolated_fields_size, 0);
        }
        for field in &class.fields {
            if !field.is_interpolated() {
                continue;
            }
            if field.fixed_offset + field.size > buf.len() || field.offset + field.size > fields.len() {
                continue;
            }
            buf[field.fixed_offset..field.fixed_offset + field.size]
                .copy_from_slice(&fields[field.offset..field.offset + field.size]);
        }
    }

    /// Shifts this entity's current `initial` buffer into `prev`, marking
    /// the start of a new visual frame.
    pub fn rotate(&mut self, entity_id: EntityId) {
        if let Some(current) = self.initial.get(&entity_id) {
            let current = current.clone();
            self.prev.insert(entity_id, current);
        }
    }

    /// The value at the start of the current visual frame, if tracked.
    #[must_use]
    pub fn initial(&self, entity_id: EntityId) -> Option<&[u8]> {
        self.initial.get(&entity_id).map(Vec::as_slice)
    }

    /// The value at the start of the previous visual frame, if tracked.
    #[must_use]
    pub fn prev(&self, entity_id: EntityId) -> Option<&[u8]> {
        self.prev.get(&entity_id).map(Vec::as_slice)
    }

    /// Drops both buffers for a destroyed entity.
    pub fn remove(&mut self, entity_id: EntityId) {
        self.initial.remove(&entity_id);
        self.prev.remove(&entity_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{FieldDescriptor, FieldFlags, FieldKind};

    fn lerp_f32(a: &[u8], b: &[u8], dst: &mut [u8], t: f32) {
        let a = f32::from_le_bytes(a.try_into().unwrap());
        let b = f32::from_le_bytes(b.try_into().unwrap());
        dst.copy_from_slice(&(a + (b - a) * t).to_le_bytes());
    }

    fn interpolated_class() -> ClassMetadata {
        let field = FieldDescriptor {
            offset: 0,
            fixed_offset: 0,
            size: 4,
            kind: FieldKind::Value,
            flags: FieldFlags::empty(),
            interpolator: Some(lerp_f32),
            on_sync: None,
        };
        ClassMetadata::new(1, vec![field], Vec::new(), false, false)
    }

    #[test]
    fn mirror_then_rotate_preserves_prior_value() {
        let mut scratch = InterpolationScratch::new();
        let class = interpolated_class();
        let id = EntityId::new(0);

        scratch.mirror_initial(id, &class, &1.0f32.to_le_bytes());
        scratch.rotate(id);
        scratch.mirror_initial(id, &class, &2.0f32.to_le_bytes());

        assert_eq!(scratch.prev(id).unwrap(), &1.0f32.to_le_bytes());
        assert_eq!(scratch.initial(id).unwrap(), &2.0f32.to_le_bytes());
    }

    #[test]
    fn remove_drops_both_buffers() {
        let mut scratch = InterpolationScratch::new();
        let class = interpolated_class();
        let id = EntityId::new(0);
        scratch.mirror_initial(id, &class, &1.0f32.to_le_bytes());
        scratch.remove(id);
        assert!(scratch.initial(id).is_none());
        assert!(scratch.prev(id).is_none());
    }
}
