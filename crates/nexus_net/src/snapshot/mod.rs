//! The snapshot store: bounded reassembly of fragmented diffs, plus the
//! buffer pool every [`ServerStateData`] is recycled through.
//!
//! Baseline packets bypass reassembly entirely (they arrive whole, just
//! LZ4-compressed); only `DiffSync`/`DiffSyncLast` fragments accumulate
//! here before becoming a complete snapshot.

use std::collections::HashMap;

use nexus_core::{seq_diff, PoolAllocator, PoolHandle, Tick};

use crate::error::{PacketError, SnapshotError};
use crate::jitter::JitterTracker;
use crate::protocol::{self, InboundPacket};

/// One interpolated field present in a record, cached at index time so
/// §4.6's remote-interpolation pass never has to re-walk the wire bytes.
#[derive(Clone, Copy, Debug)]
pub struct InterpolatedFieldCache {
    /// Index into the owning class's `fields` list.
    pub field_index: usize,
    /// Byte offset of this field's fresh wire bytes within the snapshot's
    /// `data` buffer.
    pub data_offset: usize,
}

/// Index entry for one entity record inside a snapshot's `data` buffer.
///
/// Built by [`crate::reader`] when a snapshot is preloaded as `state_b`,
/// *before* its fields are actually applied (that happens at advance time).
#[derive(Clone, Debug)]
pub struct PreloadEntry {
    /// The entity this record targets.
    pub entity_id: nexus_core::EntityId,
    /// Byte offset of the record's start (after the `entity_id` prefix) in
    /// `data`.
    pub data_offset: usize,
    /// Byte offset of the diff bitfield + fields, or `None` for a full-sync
    /// record (the wire's `-1` sentinel).
    pub entity_fields_offset: Option<usize>,
    /// Whether this record carries at least one interpolated field.
    pub has_interpolated_fields: bool,
    /// Interpolated fields present in this record, per §3's
    /// `preload[].interpolated_caches[]`.
    pub interpolated_caches: Vec<InterpolatedFieldCache>,
}

/// A parsed RPC, ready to dispatch once the rendered `server_tick` reaches it.
#[derive(Clone, Copy, Debug)]
pub struct RemoteCallRecord {
    /// Tick the call is scheduled to fire at.
    pub tick: Tick,
    /// Target entity.
    pub entity_id: nexus_core::EntityId,
    /// `0xFF` for an entity-level call, otherwise a syncable field id.
    pub field_id: u8,
    /// Method identifier.
    pub delegate: u16,
    /// Byte offset of the argument payload within the snapshot's `data`.
    pub offset: u32,
    /// Byte length of the argument payload.
    pub count: u32,
}

/// One logical server tick's worth of state: a reassembled byte payload
/// plus the index built over it once it's preloaded.
pub struct ServerStateData {
    /// The server tick this snapshot represents.
    pub tick: Tick,
    /// True if this came from a `BaselineSync` packet.
    pub is_baseline: bool,
    /// Reassembled payload bytes (post entity-record header).
    pub data: Vec<u8>,
    /// Most recent local input tick the server had consumed as of `tick`.
    pub processed_tick: Tick,
    /// Most recent local input tick the server had received as of `tick`.
    pub last_received_tick: Tick,
    /// Per-entity record index, populated at preload time.
    pub preload: Vec<PreloadEntry>,
    /// Parsed RPCs, populated at preload time.
    pub remote_calls: Vec<RemoteCallRecord>,
    /// Indices into `preload` whose records carry interpolated fields.
    pub interpolated_fields: Vec<usize>,
}

impl ServerStateData {
    pub(crate) fn empty() -> Self {
        Self {
            tick: Tick::default(),
            is_baseline: false,
            data: Vec::new(),
            processed_tick: Tick::default(),
            last_received_tick: Tick::default(),
            preload: Vec::new(),
            remote_calls: Vec::new(),
            interpolated_fields: Vec::new(),
        }
    }

    /// Resets to a reusable empty state without freeing `data`'s allocation.
    fn clear(&mut self) {
        self.is_baseline = false;
        self.data.clear();
        self.preload.clear();
        self.remote_calls.clear();
        self.interpolated_fields.clear();
    }
}

struct ReassemblyRecord {
    tick: Tick,
    data: Vec<u8>,
}

/// Outcome of feeding one inbound diff fragment to [`SnapshotStore`].
pub enum FragmentOutcome {
    /// The fragment was older than `state_a` and silently dropped.
    Stale,
    /// The reassembly map was full and this fragment didn't displace the
    /// oldest pending record.
    DroppedMapFull,
    /// Accepted. `completed` is `Some` if this was the terminal fragment.
    Accepted { completed: Option<Box<ServerStateData>> },
}

/// Reassembles fragmented diffs and pools completed/consumed snapshots.
pub struct SnapshotStore {
    pool: PoolAllocator<ServerStateData>,
    reassembling: HashMap<u16, ReassemblyRecord>,
    max_saved_state_diff: usize,
}

impl SnapshotStore {
    /// Creates a store whose pool and reassembly map are both bounded by
    /// `max_saved_state_diff`.
    #[must_use]
    pub fn new(max_saved_state_diff: usize) -> Self {
        Self {
            pool: PoolAllocator::new(max_saved_state_diff),
            reassembling: HashMap::with_capacity(max_saved_state_diff),
            max_saved_state_diff,
        }
    }

    /// Takes a snapshot from the pool, or allocates fresh if it's empty.
    fn take_from_pool(&mut self) -> Box<ServerStateData> {
        for handle in self.pool_handles() {
            if let Some(state) = self.pool.free(handle) {
                return Box::new(state);
            }
        }
        Box::new(ServerStateData::empty())
    }

    fn pool_handles(&self) -> Vec<PoolHandle> {
        self.pool.iter().map(|(handle, _)| handle).collect()
    }

    /// Recycles a consumed or evicted snapshot back into the pool.
    pub fn recycle(&mut self, mut state: Box<ServerStateData>) {
        state.clear();
        if self.pool.allocated_count() < self.max_saved_state_diff {
            let _ = self.pool.allocate(*state);
        }
    }

    /// Decodes a baseline packet's LZ4 payload into `(tick, processed_tick,
    /// last_received_tick, data)`, without touching the reassembly map.
    pub fn decode_baseline_payload(payload: &[u8]) -> Result<(Tick, Tick, Tick, Vec<u8>), PacketError> {
        let mut reader = protocol::ByteReader::new(payload);
        let tick = Tick::new(reader.read_u16()?);
        let processed_tick = Tick::new(reader.read_u16()?);
        let last_received_tick = Tick::new(reader.read_u16()?);
        let data = reader.peek_rest().to_vec();
        Ok((tick, processed_tick, last_received_tick, data))
    }

    /// Feeds one diff fragment (`DiffSync` or `DiffSyncLast`) to the
    /// reassembler, per the receive contract of §4.1.
    pub fn receive_fragment(
        &mut self,
        state_a_tick: Tick,
        tick: u16,
        bytes: &[u8],
        is_last: bool,
        jitter: &mut JitterTracker,
    ) -> Result<FragmentOutcome, SnapshotError> {
        if seq_diff(tick, state_a_tick.value()) <= 0 {
            return Ok(FragmentOutcome::Stale);
        }

        jitter.record_accept();

        if !self.reassembling.contains_key(&tick) && self.reassembling.len() >= self.max_saved_state_diff {
            let oldest_tick = self
                .reassembling
                .keys()
                .copied()
                .min_by_key(|&t| seq_diff(t, state_a_tick.value()))
                .expect("map is non-empty when full");
            if seq_diff(tick, oldest_tick) > 0 {
                tracing::warn!(tick, oldest_tick, "reassembly map full, evicting oldest pending snapshot");
                self.reassembling.remove(&oldest_tick);
            } else {
                return Ok(FragmentOutcome::DroppedMapFull);
            }
        }

        let record = self
            .reassembling
            .entry(tick)
            .or_insert_with(|| ReassemblyRecord { tick: Tick::new(tick), data: Vec::new() });
        record.data.extend_from_slice(bytes);

        if !is_last {
            return Ok(FragmentOutcome::Accepted { completed: None });
        }

        let record = self.reassembling.remove(&tick).expect("just inserted above");
        let mut state = self.take_from_pool();
        let mut reader = protocol::ByteReader::new(&record.data);
        let processed_tick = Tick::new(reader.read_u16().unwrap_or(0));
        let last_received_tick = Tick::new(reader.read_u16().unwrap_or(0));

        state.tick = record.tick;
        state.is_baseline = false;
        state.processed_tick = processed_tick;
        state.last_received_tick = last_received_tick;
        state.data.clear();
        state.data.extend_from_slice(reader.peek_rest());

        Ok(FragmentOutcome::Accepted { completed: Some(state) })
    }

    /// Number of ticks currently reassembling.
    #[must_use]
    pub fn reassembly_len(&self) -> usize {
        self.reassembling.len()
    }
}

/// Parses an inbound packet's bytes into the event the store cares about.
pub fn parse(bytes: &[u8]) -> Result<InboundPacket, PacketError> {
    protocol::parse_inbound(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_fragment_is_dropped() {
        let mut store = SnapshotStore::new(4);
        let mut jitter = JitterTracker::new();
        let outcome = store
            .receive_fragment(Tick::new(100), 100, &[], false, &mut jitter)
            .unwrap();
        assert!(matches!(outcome, FragmentOutcome::Stale));
    }

    #[test]
    fn reassembles_across_fragments() {
        let mut store = SnapshotStore::new(4);
        let mut jitter = JitterTracker::new();

        let mut first = vec![5u16.to_le_bytes(), 6u16.to_le_bytes()].concat();
        first.extend_from_slice(b"AB");
        let outcome = store
            .receive_fragment(Tick::new(100), 101, &first, false, &mut jitter)
            .unwrap();
        assert!(matches!(outcome, FragmentOutcome::Accepted { completed: None }));

        let outcome = store
            .receive_fragment(Tick::new(100), 101, b"CD", true, &mut jitter)
            .unwrap();
        match outcome {
            FragmentOutcome::Accepted { completed: Some(state) } => {
                assert_eq!(state.tick.value(), 101);
                assert_eq!(state.processed_tick.value(), 5);
                assert_eq!(state.last_received_tick.value(), 6);
                assert_eq!(state.data, b"ABCD");
            }
            _ => panic!("expected completed snapshot"),
        }
    }

    #[test]
    fn oversize_evicts_oldest() {
        let mut store = SnapshotStore::new(2);
        let mut jitter = JitterTracker::new();

        for tick in [200u16, 202, 204] {
            let _ = store.receive_fragment(Tick::new(100), tick, b"x", false, &mut jitter);
        }
        assert_eq!(store.reassembly_len(), 2);
    }
}
