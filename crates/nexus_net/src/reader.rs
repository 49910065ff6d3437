//! State reader: turns a snapshot's raw `data` bytes into entity-field
//! writes, on-sync callbacks, and remote-call dispatch records.
//!
//! Two passes walk the same bytes: [`index_snapshot`] runs at preload time
//! and only records *where* each entity record and RPC lives (§4.2 — "built
//! ... before its fields are actually applied"); [`apply_snapshot`] runs at
//! advance time and actually writes field bytes into the entities table.
//!
//! §6 gives the two record shapes but not how a reader tells them apart
//! inline — a diff snapshot may still need to introduce a newly-spawned
//! entity as a full-sync record. Resolved here (documented in DESIGN.md) by
//! a two-byte discriminator immediately after `entity_id`: `0xFFFF` means
//! full-sync, anything else (conventionally `0x0000`) means diff. The
//! entity section itself ends with the `entity_id` sentinel `0xFFFF`,
//! followed by a trailing RPC list (also not specified by §6's framing):
//!
//! ```text
//! (entity_id: u16, marker: u16, body)*
//! 0xFFFF
//! rpc_count: u16
//! (RpcWireHeader, arg bytes)*
//! ```
//!
//! A full-sync body is `version: u8, class_id: u16`, then fields in class
//! order, then `(syncable_count: u8, (field_id: u8, blob_len: u16, blob)*)`.
//! A diff body is `bitfield[class.fields_flags_size]` then the fields whose
//! bit is set, in class order — the diff reuses the already-live entity's
//! class, so no `class_id` is carried.

use std::sync::Arc;

use nexus_core::{ClassMetadata, ClassRegistry, EntityId, EntityVersion, OnSyncFn, RoleFlags};

use crate::controller::EntityUpdater;
use crate::entities::EntitiesTable;
use crate::error::ReadError;
use crate::interp_scratch::InterpolationScratch;
use crate::prediction::PredictionEngine;
use crate::protocol::ByteReader;
use crate::snapshot::{InterpolatedFieldCache, PreloadEntry, RemoteCallRecord, ServerStateData};

const ENTITY_TERMINATOR: u16 = 0xFFFF;
const FULL_SYNC_MARKER: u16 = 0xFFFF;

fn read_class(registry: &ClassRegistry, class_id: u16) -> Result<Arc<ClassMetadata>, ReadError> {
    registry.get(class_id).ok_or_else(|| {
        tracing::error!(class_id, "unknown class id in entity record");
        ReadError::UnknownClass(class_id)
    })
}

fn entity_id_in_range(raw: u16, capacity: usize) -> Result<EntityId, ReadError> {
    if (raw as usize) >= capacity {
        tracing::error!(entity_id = raw, capacity, "entity id out of range, aborting record");
        return Err(ReadError::EntityIdOutOfRange(raw));
    }
    Ok(EntityId::new(raw))
}

fn read_u16(reader: &mut ByteReader<'_>) -> Result<u16, ReadError> {
    reader.read_u16().map_err(|_| ReadError::Truncated { needed: 2, have: 0 })
}

fn read_u8(reader: &mut ByteReader<'_>) -> Result<u8, ReadError> {
    reader.read_u8().map_err(|_| ReadError::Truncated { needed: 1, have: 0 })
}

fn read_n<'a>(reader: &mut ByteReader<'a>, count: usize) -> Result<&'a [u8], ReadError> {
    reader.read_bytes(count).map_err(|_| ReadError::Truncated { needed: count, have: 0 })
}

/// Scans `state.data`, populating `preload`, `remote_calls`, and
/// `interpolated_fields` without mutating any entity. Diff records are
/// resolved against `entities`' currently-live class for each id.
pub fn index_snapshot(
    state: &mut ServerStateData,
    registry: &ClassRegistry,
    entities: &EntitiesTable,
) -> Result<(), ReadError> {
    let capacity = entities.capacity();
    state.preload.clear();
    state.remote_calls.clear();
    state.interpolated_fields.clear();

    let mut reader = ByteReader::new(&state.data);
    loop {
        let entity_id_raw = read_u16(&mut reader)?;
        if entity_id_raw == ENTITY_TERMINATOR {
            break;
        }
        let entity_id = entity_id_in_range(entity_id_raw, capacity)?;
        let record_start = reader.position();
        let marker = read_u16(&mut reader)?;

        let (entity_fields_offset, interpolated_caches) = if marker == FULL_SYNC_MARKER {
            let _version = read_u8(&mut reader)?;
            let class_id = read_u16(&mut reader)?;
            let class = read_class(registry, class_id)?;
            let mut caches = Vec::new();
            for (i, field) in class.fields.iter().enumerate() {
                let data_offset = reader.position();
                let _ = read_n(&mut reader, field.size)?;
                if field.is_interpolated() {
                    caches.push(InterpolatedFieldCache { field_index: i, data_offset });
                }
            }
            skip_syncable_blobs(&mut reader)?;
            (None, caches)
        } else {
            let class = entities
                .get(entity_id)
                .map(|record| Arc::clone(&record.class))
                .ok_or_else(|| {
                    tracing::error!(entity_id = entity_id_raw, "diff record targets an entity with no live class");
                    ReadError::UnknownClass(entity_id_raw)
                })?;
            let bitfield_start = reader.position();
            let flags = read_n(&mut reader, class.fields_flags_size)?;
            let mut caches = Vec::new();
            for (i, field) in class.fields.iter().enumerate() {
                if flags[i / 8] & (1 << (i % 8)) != 0 {
                    let data_offset = reader.position();
                    let _ = read_n(&mut reader, field.size)?;
                    if field.is_interpolated() {
                        caches.push(InterpolatedFieldCache { field_index: i, data_offset });
                    }
                }
            }
            (Some(bitfield_start), caches)
        };

        let has_interpolated = !interpolated_caches.is_empty();
        let index = state.preload.len();
        state.preload.push(PreloadEntry {
            entity_id,
            data_offset: record_start,
            entity_fields_offset,
            has_interpolated_fields: has_interpolated,
            interpolated_caches,
        });
        if has_interpolated {
            state.interpolated_fields.push(index);
        }
    }

    let rpc_count = reader.read_u16().unwrap_or(0);
    for _ in 0..rpc_count {
        let tick = read_u16(&mut reader)?;
        let entity_id_raw = read_u16(&mut reader)?;
        let field_id = read_u8(&mut reader)?;
        let _padding = read_u8(&mut reader)?;
        let delegate = read_u16(&mut reader)?;
        let arg_len = read_u16(&mut reader)?;
        let offset = reader.position() as u32;
        let _ = read_n(&mut reader, arg_len as usize)?;

        let entity_id = entity_id_in_range(entity_id_raw, capacity)?;
        state.remote_calls.push(RemoteCallRecord {
            tick: nexus_core::Tick::new(tick),
            entity_id,
            field_id,
            delegate,
            offset,
            count: u32::from(arg_len),
        });
    }

    Ok(())
}

fn skip_syncable_blobs(reader: &mut ByteReader<'_>) -> Result<(), ReadError> {
    let count = read_u8(reader)?;
    for _ in 0..count {
        let _field_id = read_u8(reader)?;
        let blob_len = read_u16(reader)?;
        let _ = read_n(reader, blob_len as usize)?;
    }
    Ok(())
}

/// Applies every indexed record in `state` to `entities`, firing on-sync
/// callbacks and mirroring authoritative bytes into the prediction engine's
/// rollback baseline and the interpolation scratch's `interpolated_initial`.
///
/// On-sync callbacks are queued during the per-field loop and flushed only
/// once the whole record has been parsed, per §4.4/§4.2's ordering
/// contract, and fire only when the incoming bytes actually differ from the
/// previous ones.
pub fn apply_snapshot(
    state: &ServerStateData,
    registry: &ClassRegistry,
    entities: &mut EntitiesTable,
    prediction: &mut PredictionEngine,
    scratch: &mut InterpolationScratch,
) -> Result<(), ReadError> {
    let mut on_sync_queue: Vec<(OnSyncFn, EntityId, Vec<u8>)> = Vec::new();

    for entry in &state.preload {
        let mut reader = ByteReader::new(&state.data[entry.data_offset..]);
        let _marker = read_u16(&mut reader)?;

        if entry.entity_fields_offset.is_none() {
            let version = EntityVersion::new(read_u8(&mut reader)?);
            let class_id = read_u16(&mut reader)?;
            let class = read_class(registry, class_id)?;
            let role = entities
                .get(entry.entity_id)
                .map_or(RoleFlags::empty(), |existing| existing.role);
            let record = entities.create_or_replace(entry.entity_id, version, Arc::clone(&class), role);

            let fresh = read_n(&mut reader, class.fixed_fields_size)?;
            record.fields.copy_from_slice(fresh);

            let syncable_count = read_u8(&mut reader)?;
            for _ in 0..syncable_count {
                let field_id = read_u8(&mut reader)?;
                let blob_len = read_u16(&mut reader)?;
                let blob = read_n(&mut reader, blob_len as usize)?;
                if let Some(syncable) = class.syncable_field(field_id) {
                    let _ = (syncable.reader)(&mut record.fields[syncable.offset..], blob);
                }
            }

            if class.interpolated_field_count > 0 {
                scratch.mirror_initial(entry.entity_id, &class, &record.fields);
            }

            if record.role.is_local_controlled() && !record.role.is_local() {
                prediction.note_authoritative(entry.entity_id, &record.fields);
            }
        } else {
            let Some(record) = entities.get_mut(entry.entity_id) else { continue };
            let class = Arc::clone(&record.class);
            let flags = read_n(&mut reader, class.fields_flags_size)?.to_vec();
            let server_controlled = record.role.is_server_controlled();

            for (i, field) in class.fields.iter().enumerate() {
                if flags[i / 8] & (1 << (i % 8)) == 0 {
                    continue;
                }
                let incoming = read_n(&mut reader, field.size)?;
                let slot = &mut record.fields[field.offset..field.offset + field.size];
                let changed = slot != incoming;
                if let Some(on_sync) = field.on_sync {
                    if changed {
                        on_sync_queue.push((on_sync, entry.entity_id, slot.to_vec()));
                    }
                }
                if changed {
                    slot.copy_from_slice(incoming);
                }
            }

            if server_controlled && class.interpolated_field_count > 0 {
                scratch.mirror_initial(entry.entity_id, &class, &record.fields);
            }

            if record.role.is_local_controlled() && !record.role.is_local() {
                prediction.note_authoritative(entry.entity_id, &record.fields);
            }

            for (on_sync, entity_id, prev) in on_sync_queue.drain(..) {
                on_sync(entity_id, &prev, 1);
            }
        }
    }

    Ok(())
}

/// Blends every server-controlled entity's interpolated fields between
/// `interpolated_initial` and the fresh wire bytes cached by
/// [`index_snapshot`] in `state_b.interpolated_fields`, per §4.6's remote
/// interpolation pass. `f_timer` is `lerp_timer / lerp_duration`.
pub fn remote_interpolate(
    state_b: &ServerStateData,
    entities: &mut EntitiesTable,
    scratch: &InterpolationScratch,
    f_timer: f32,
) {
    for &index in &state_b.interpolated_fields {
        let entry = &state_b.preload[index];
        let Some(record) = entities.get_mut(entry.entity_id) else { continue };
        if !record.role.is_server_controlled() {
            continue;
        }
        let Some(initial) = scratch.initial(entry.entity_id) else { continue };

        let caches = entry.interpolated_caches.clone();
        for cache in &caches {
            let field = record.class.fields[cache.field_index];
            let Some(interpolator) = field.interpolator else { continue };
            if field.fixed_offset + field.size > initial.len() {
                continue;
            }
            let next = &state_b.data[cache.data_offset..cache.data_offset + field.size];
            let initial_bytes = &initial[field.fixed_offset..field.fixed_offset + field.size];
            let mut dst = vec![0u8; field.size];
            interpolator(initial_bytes, next, &mut dst, f_timer);
            record.fields[field.offset..field.offset + field.size].copy_from_slice(&dst);
        }
    }
}

/// Blends every local-or-predicted entity's interpolated fields between
/// `interpolated_prev` and `interpolated_initial`, per §4.6's local
/// interpolation pass. `local_t` is the fractional progress through the
/// current fixed tick.
pub fn local_interpolate(entities: &mut EntitiesTable, scratch: &InterpolationScratch, local_t: f32) {
    for (id, record) in entities.iter_locally_interpolated_mut() {
        let Some(prev) = scratch.prev(id) else { continue };
        let Some(current) = scratch.initial(id) else { continue };
        let fields = record.class.fields.clone();
        for field in &fields {
            if !field.is_interpolated() {
                continue;
            }
            let Some(interpolator) = field.interpolator else { continue };
            if field.fixed_offset + field.size > prev.len() || field.fixed_offset + field.size > current.len() {
                continue;
            }
            let prev_bytes = &prev[field.fixed_offset..field.fixed_offset + field.size];
            let current_bytes = &current[field.fixed_offset..field.fixed_offset + field.size];
            let mut dst = vec![0u8; field.size];
            interpolator(prev_bytes, current_bytes, &mut dst, local_t);
            record.fields[field.offset..field.offset + field.size].copy_from_slice(&dst);
        }
    }
}

/// Invokes every live entity's visual update unconditionally, per §4.6's
/// final frame-update step — distinct from [`run_updates`]'s
/// `is_updateable`/`update_on_client`-gated logic-tick call.
pub fn run_visual_updates(entities: &mut EntitiesTable, capacity: usize, updater: &mut dyn EntityUpdater) {
    for raw in 0..capacity {
        let id = EntityId::new(raw as u16);
        let Some(record) = entities.get_mut(id) else { continue };
        let class = Arc::clone(&record.class);
        updater.update(id, &class, &mut record.fields);
    }
}

/// Runs each server-controlled (or client-updateable) entity's `Update`
/// once, per the class's `is_updateable`/`update_on_client` flags.
pub fn run_updates(entities: &mut EntitiesTable, capacity: usize, updater: &mut dyn EntityUpdater) {
    for raw in 0..capacity {
        let id = EntityId::new(raw as u16);
        let Some(record) = entities.get_mut(id) else { continue };
        if !record.class.is_updateable {
            continue;
        }
        if record.role.is_local() && !record.class.update_on_client {
            continue;
        }
        updater.update(id, &record.class, &mut record.fields);
    }
}
