//! Client-side prediction and rollback.
//!
//! Locally-controlled entities run ahead of the server: every local tick
//! writes directly into the entity's live fields, while this engine keeps
//! a separate authoritative byte image per entity (`note_authoritative`,
//! called from [`crate::reader::apply_snapshot`]) to reset to and replay
//! from whenever a new snapshot lands.
//!
//! ```text
//! Input:      [1] [2] [3] [4] [5]
//! Prediction: [P1][P2][P3][P4][P5]
//! Server Ack: [S1]
//! Reconcile:  reset to S1, replay [2,3,4,5]
//! ```

use std::collections::HashMap;

use nexus_core::{EntityId, FieldFlags, Tick};

use crate::controller::{EntityUpdater, InputController};
use crate::entities::EntitiesTable;
use crate::input::InputCommand;
use crate::interp_scratch::InterpolationScratch;

/// An entity queued to spawn once the server acknowledges the local tick
/// that predicted it into existence.
struct PendingSpawn {
    spawn_tick: Tick,
}

/// Per-entity authoritative byte image plus the replay machinery.
pub struct PredictionEngine {
    authoritative: HashMap<EntityId, Vec<u8>>,
    pending_spawns: HashMap<EntityId, PendingSpawn>,
}

impl PredictionEngine {
    /// Creates an engine with no tracked entities.
    #[must_use]
    pub fn new() -> Self {
        Self { authoritative: HashMap::new(), pending_spawns: HashMap::new() }
    }

    /// Records `fields` as the latest authoritative image for `entity_id`,
    /// called once per snapshot apply for every predicted entity the
    /// snapshot touched.
    pub fn note_authoritative(&mut self, entity_id: EntityId, fields: &[u8]) {
        self.authoritative
            .entry(entity_id)
            .and_modify(|buf| {
                buf.clear();
                buf.extend_from_slice(fields);
            })
            .or_insert_with(|| fields.to_vec());
    }

    /// Queues a locally-predicted spawn, cleaned up once `processed_tick`
    /// reaches `spawn_tick` (the server has seen the input that created it).
    pub fn queue_predicted_spawn(&mut self, entity_id: EntityId, spawn_tick: Tick) {
        self.pending_spawns.insert(entity_id, PendingSpawn { spawn_tick });
    }

    /// Destroys every optimistically-spawned entity the server has caught
    /// up to, per §4.3's predicted-spawn cleanup, and drops its tracked-spawn
    /// bookkeeping and interpolation scratch along with it.
    ///
    /// `pending_spawns` is keyed by id rather than held as the literal FIFO
    /// queue §4.3 describes walking from the head; every acknowledged entry
    /// is collected and destroyed in one pass instead of stopping at the
    /// first not-yet-acknowledged one. See DESIGN.md.
    pub fn drain_acknowledged_spawns(
        &mut self,
        processed_tick: Tick,
        entities: &mut EntitiesTable,
        scratch: &mut InterpolationScratch,
    ) {
        let acknowledged: Vec<EntityId> = self
            .pending_spawns
            .iter()
            .filter(|(_, entry)| processed_tick.diff_from(entry.spawn_tick) >= 0)
            .map(|(id, _)| *id)
            .collect();

        for id in acknowledged {
            self.pending_spawns.remove(&id);
            self.authoritative.remove(&id);
            scratch.remove(id);
            entities.destroy(id);
        }
    }

    /// Resets every predicted entity to its authoritative image, replays
    /// buffered unacknowledged inputs through `controller`/`updater`, and
    /// drops inputs the server has now processed.
    ///
    /// Fields flagged `ONLY_FOR_REMOTE` are never touched by the reset, so
    /// the authoritative image only needs to cover fields the client also
    /// predicts.
    pub fn rollback(
        &mut self,
        entities: &mut EntitiesTable,
        processed_tick: Tick,
        input_queue: &mut Vec<InputCommand>,
        controller: &mut dyn InputController,
        updater: &mut dyn EntityUpdater,
        scratch: &mut InterpolationScratch,
    ) {
        for (entity_id, image) in &self.authoritative {
            let Some(record) = entities.get_mut(*entity_id) else { continue };
            if !record.role.is_predicted() {
                continue;
            }
            for field in &record.class.fields {
                if field.flags.contains(FieldFlags::ONLY_FOR_REMOTE) {
                    continue;
                }
                if field.offset + field.size > image.len() {
                    continue;
                }
                record.fields[field.offset..field.offset + field.size]
                    .copy_from_slice(&image[field.offset..field.offset + field.size]);
            }
        }

        input_queue.retain(|cmd| processed_tick.diff_from(cmd.tick) < 0);

        for cmd in input_queue.iter() {
            controller.read_input(&cmd.payload);
            for (entity_id, record) in entities.iter_predicted_mut() {
                if !record.class.is_updateable {
                    continue;
                }
                updater.update(entity_id, &record.class, &mut record.fields);
            }
        }

        for (entity_id, record) in entities.iter_predicted_mut() {
            if record.class.interpolated_field_count == 0 {
                continue;
            }
            scratch.mirror_initial(entity_id, &record.class, &record.fields);
        }

        self.drain_acknowledged_spawns(processed_tick, entities, scratch);
    }
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authoritative_image_overwrites_in_place() {
        let mut engine = PredictionEngine::new();
        let id = EntityId::new(3);
        engine.note_authoritative(id, &[1, 2, 3]);
        engine.note_authoritative(id, &[9, 9, 9]);
        assert_eq!(engine.authoritative.get(&id).unwrap(), &[9, 9, 9]);
    }

    #[test]
    fn acknowledged_spawns_are_destroyed() {
        let mut engine = PredictionEngine::new();
        let mut entities = EntitiesTable::new(4);
        let mut scratch = InterpolationScratch::new();
        let id = EntityId::new(1);
        entities.create_or_replace(
            id,
            nexus_core::EntityVersion::new(0),
            std::sync::Arc::new(nexus_core::ClassMetadata::new(1, Vec::new(), Vec::new(), false, false)),
            nexus_core::RoleFlags::empty(),
        );
        engine.queue_predicted_spawn(id, Tick::new(10));
        engine.drain_acknowledged_spawns(Tick::new(10), &mut entities, &mut scratch);
        assert!(engine.pending_spawns.is_empty());
        assert!(!entities.is_alive(id));
    }

    #[test]
    fn spawn_not_yet_acknowledged_is_kept() {
        let mut engine = PredictionEngine::new();
        let mut entities = EntitiesTable::new(4);
        let mut scratch = InterpolationScratch::new();
        let id = EntityId::new(1);
        engine.queue_predicted_spawn(id, Tick::new(10));
        engine.drain_acknowledged_spawns(Tick::new(5), &mut entities, &mut scratch);
        assert_eq!(engine.pending_spawns.len(), 1);
    }
}
