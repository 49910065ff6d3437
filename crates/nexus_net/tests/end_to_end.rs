//! End-to-end scenarios driven entirely through `ReconciliationClient`'s
//! public API and hand-built wire bytes, covering the reconciliation loop's
//! testable properties: baseline install, interpolation advance, rollback
//! correction, tick wraparound, bounded reassembly, and RPC dispatch.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use nexus_core::{ClassMetadata, ClassRegistry, EntityId, EntityVersion, FieldDescriptor, FieldFlags, FieldKind, Tick};
use nexus_net::jitter::JitterTracker;
use nexus_net::protocol::{PacketKind, HEADER_BYTE};
use nexus_net::snapshot::SnapshotStore;
use nexus_net::{EntityUpdater, InputController, ReconciliationClient, MAX_SAVED_STATE_DIFF};

struct NullController;
impl InputController for NullController {
    fn read_input(&mut self, _payload: &[u8]) {}
}

struct NullUpdater;
impl EntityUpdater for NullUpdater {
    fn update(&mut self, _entity_id: EntityId, _class: &ClassMetadata, _fields: &mut [u8]) {}
}

/// Writes `payload[0]` into field 0 on every predicted entity it sees,
/// sharing state with a paired [`SetController`] so a test can drive
/// "local input sets E.x" through the real `InputController`/`EntityUpdater`
/// seam rather than poking entity bytes directly.
struct SetController {
    value: Rc<Cell<u8>>,
}
impl InputController for SetController {
    fn read_input(&mut self, payload: &[u8]) {
        self.value.set(payload[0]);
    }
}

struct SetUpdater {
    value: Rc<Cell<u8>>,
}
impl EntityUpdater for SetUpdater {
    fn update(&mut self, _entity_id: EntityId, _class: &ClassMetadata, fields: &mut [u8]) {
        fields[0] = self.value.get();
    }
}

fn one_field_class(class_id: u16, is_updateable: bool) -> ClassMetadata {
    let field = FieldDescriptor {
        offset: 0,
        fixed_offset: 0,
        size: 1,
        kind: FieldKind::Value,
        flags: FieldFlags::empty(),
        interpolator: None,
        on_sync: None,
    };
    ClassMetadata::new(class_id, vec![field], Vec::new(), is_updateable, false)
}

fn terminator() -> [u8; 2] {
    0xFFFFu16.to_le_bytes()
}

fn full_sync_record(entity_id: u16, version: u8, class_id: u16, field_byte: u8) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&entity_id.to_le_bytes());
    bytes.extend_from_slice(&0xFFFFu16.to_le_bytes()); // full-sync marker
    bytes.push(version);
    bytes.extend_from_slice(&class_id.to_le_bytes());
    bytes.push(field_byte);
    bytes.push(0); // syncable_count
    bytes
}

fn diff_record(entity_id: u16, field_byte: u8) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&entity_id.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes()); // diff marker
    bytes.push(0b0000_0001); // bitfield: field 0 set
    bytes.push(field_byte);
    bytes
}

fn rpc_record(tick: u16, entity_id: u16, field_id: u8, delegate: u16, args: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&tick.to_le_bytes());
    bytes.extend_from_slice(&entity_id.to_le_bytes());
    bytes.push(field_id);
    bytes.push(0); // padding
    bytes.extend_from_slice(&delegate.to_le_bytes());
    bytes.extend_from_slice(&(args.len() as u16).to_le_bytes());
    bytes.extend_from_slice(args);
    bytes
}

/// Builds the shape shared by baseline and diff payloads after their
/// leading tick field(s): `records* | terminator | rpc_count | rpcs*`.
fn build_body(processed_tick: u16, last_received_tick: u16, records: &[Vec<u8>], rpcs: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&processed_tick.to_le_bytes());
    body.extend_from_slice(&last_received_tick.to_le_bytes());
    for record in records {
        body.extend_from_slice(record);
    }
    body.extend_from_slice(&terminator());
    body.extend_from_slice(&(rpcs.len() as u16).to_le_bytes());
    for rpc in rpcs {
        body.extend_from_slice(rpc);
    }
    body
}

fn build_baseline_packet(
    tick: u16,
    processed_tick: u16,
    last_received_tick: u16,
    player_id: u8,
    records: &[Vec<u8>],
    rpcs: &[Vec<u8>],
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&tick.to_le_bytes());
    payload.extend_from_slice(&build_body(processed_tick, last_received_tick, records, rpcs));

    let compressed = lz4_flex::block::compress(&payload);

    let mut packet = Vec::new();
    packet.push(HEADER_BYTE);
    packet.push(PacketKind::BaselineSync as u8);
    packet.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    packet.push(player_id);
    packet.extend_from_slice(&compressed);
    packet
}

fn build_diff_packet(tick: u16, is_last: bool, fragment: &[u8]) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.push(HEADER_BYTE);
    packet.push(if is_last { PacketKind::DiffSyncLast as u8 } else { PacketKind::DiffSync as u8 });
    packet.extend_from_slice(&tick.to_le_bytes());
    packet.extend_from_slice(fragment);
    packet
}

/// Scenario 1: a baseline with no following diff installs its entities
/// immediately, with no prediction activity.
#[test]
fn baseline_installs_entity_with_no_prediction_activity() {
    let mut client = ReconciliationClient::new(ClassRegistry::new());
    client.register_class(one_field_class(2, false));
    let mut controller = NullController;
    let mut updater = NullUpdater;

    let record = full_sync_record(1, 0, 2, 42);
    let packet = build_baseline_packet(100, 0, 0, 7, &[record], &[]);
    client.on_packet_received(&packet, &mut controller, &mut updater);

    let entity = client.entities().get(EntityId::new(1)).expect("baseline should install entity 1");
    assert_eq!(entity.fields[0], 42);
    assert_eq!(entity.version, EntityVersion::new(0));
}

/// Scenario 2: filling the lerp buffer to capacity forces an advance, and
/// the buffer never exceeds `INTERPOLATE_BUFFER_SIZE`.
#[test]
fn buffer_fills_then_advances_on_overflow() {
    let mut client = ReconciliationClient::new(ClassRegistry::new());
    client.register_class(one_field_class(2, false));
    let mut controller = NullController;
    let mut updater = NullUpdater;

    let baseline_record = full_sync_record(1, 0, 2, 0);
    let baseline = build_baseline_packet(100, 0, 0, 1, &[baseline_record], &[]);
    client.on_packet_received(&baseline, &mut controller, &mut updater);

    for tick in 101..=110u16 {
        let record = diff_record(1, 0);
        let fragment = build_body(tick, tick, &[record], &[]);
        let packet = build_diff_packet(tick, true, &fragment);
        client.on_packet_received(&packet, &mut controller, &mut updater);
    }
    assert_eq!(client.interpolation_buffer_len(), 10);

    let record = diff_record(1, 0);
    let fragment = build_body(111, 111, &[record], &[]);
    let packet = build_diff_packet(111, true, &fragment);
    client.on_packet_received(&packet, &mut controller, &mut updater);

    assert_eq!(client.rendered_tick(), Some(101));
    assert_eq!(client.interpolation_buffer_len(), 10);
}

/// Scenario 3: a local prediction is overwritten by the next authoritative
/// diff, and the now-acknowledged input is dropped from the replay queue.
#[test]
fn authoritative_diff_corrects_a_misprediction() {
    let mut client = ReconciliationClient::new(ClassRegistry::new());
    client.register_class(one_field_class(9, true));
    let mut controller = NullController;
    let mut updater = NullUpdater;

    let baseline = build_baseline_packet(100, 0, 0, 1, &[], &[]);
    client.on_packet_received(&baseline, &mut controller, &mut updater);

    let predicted_class = Arc::new(one_field_class(9, true));
    client.predict_spawn(EntityId::new(5), EntityVersion::new(0), predicted_class, Tick::new(101));
    assert_eq!(client.entities().get(EntityId::new(5)).unwrap().fields[0], 0);

    let shared = Rc::new(Cell::new(0u8));
    let mut set_controller = SetController { value: Rc::clone(&shared) };
    let mut set_updater = SetUpdater { value: Rc::clone(&shared) };
    client.record_local_input(Tick::new(101), vec![1], &mut set_controller, &mut set_updater);
    assert_eq!(client.entities().get(EntityId::new(5)).unwrap().fields[0], 1);

    let diff_entity = diff_record(5, 5);
    let fragment = build_body(101, 101, &[diff_entity], &[]);
    let diff_packet = build_diff_packet(101, true, &fragment);
    client.on_packet_received(&diff_packet, &mut controller, &mut updater);

    // Two frame advances: the first promotes the baseline (tick 100) and
    // preloads the diff as state_b; the second promotes the diff itself,
    // applying the authoritative x=5 and rolling back the now-acked input.
    client.frame_update(5.0, &mut controller, &mut updater);
    client.frame_update(5.0, &mut controller, &mut updater);

    assert_eq!(client.entities().get(EntityId::new(5)).unwrap().fields[0], 5);
}

/// Scenario 4: ticks straddling the 16-bit wraparound boundary are never
/// treated as stale, and draining the buffer ends on the newest tick.
#[test]
fn tick_counter_wraparound_is_handled_without_stalls() {
    let mut client = ReconciliationClient::new(ClassRegistry::new());
    let mut controller = NullController;
    let mut updater = NullUpdater;

    let baseline = build_baseline_packet(65534, 0, 0, 1, &[], &[]);
    client.on_packet_received(&baseline, &mut controller, &mut updater);

    for tick in [65535u16, 0, 1] {
        let fragment = build_body(tick, tick, &[], &[]);
        let packet = build_diff_packet(tick, true, &fragment);
        client.on_packet_received(&packet, &mut controller, &mut updater);
    }
    assert_eq!(client.interpolation_buffer_len(), 3);

    for _ in 0..4 {
        client.frame_update(5.0, &mut controller, &mut updater);
    }

    assert_eq!(client.rendered_tick(), Some(1));
    assert_eq!(client.interpolation_buffer_len(), 0);
}

/// Scenario 5: sustained incomplete fragments never grow the reassembly
/// map past `MAX_SAVED_STATE_DIFF`; the oldest entries are evicted as
/// newer ticks arrive.
#[test]
fn reassembly_map_stays_bounded_under_sustained_fragments() {
    let mut store = SnapshotStore::new(MAX_SAVED_STATE_DIFF);
    let mut jitter = JitterTracker::new();
    let state_a_tick = Tick::new(100);

    for step in 0..=(MAX_SAVED_STATE_DIFF as u16 + 1) {
        let tick = 200 + 2 * step;
        let _ = store.receive_fragment(state_a_tick, tick, b"x", false, &mut jitter);
    }

    assert_eq!(store.reassembly_len(), MAX_SAVED_STATE_DIFF);
}

/// Scenario 6: RPCs cached on the interpolation target fire exactly once
/// as soon as the rendered position reaches them, and never re-fire on
/// later dispatch calls.
#[test]
fn rpcs_fire_exactly_once_when_rendered() {
    let mut client = ReconciliationClient::new(ClassRegistry::new());
    let mut controller = NullController;
    let mut updater = NullUpdater;

    let baseline = build_baseline_packet(100, 0, 0, 1, &[], &[]);
    client.on_packet_received(&baseline, &mut controller, &mut updater);

    let rpc_a = rpc_record(101, 1, 0xFF, 10, &[0xAA]);
    let rpc_b = rpc_record(101, 1, 0xFF, 20, &[0xBB]);
    let fragment = build_body(101, 101, &[], &[rpc_a, rpc_b]);
    let diff_packet = build_diff_packet(101, true, &fragment);
    client.on_packet_received(&diff_packet, &mut controller, &mut updater);

    client.frame_update(5.0, &mut controller, &mut updater);

    let mut fired: Vec<(u16, Vec<u8>)> = Vec::new();
    client.dispatch_due_rpcs(&mut |_entity, _field, delegate, args| {
        fired.push((delegate, args.to_vec()));
    });
    fired.sort_by_key(|(delegate, _)| *delegate);
    assert_eq!(fired, vec![(10, vec![0xAA]), (20, vec![0xBB])]);

    fired.clear();
    client.dispatch_due_rpcs(&mut |_entity, _field, delegate, args| {
        fired.push((delegate, args.to_vec()));
    });
    assert!(fired.is_empty(), "rpcs must not re-fire on a second dispatch at the same render position");

    client.frame_update(5.0, &mut controller, &mut updater);
    fired.clear();
    client.dispatch_due_rpcs(&mut |_entity, _field, delegate, args| {
        fired.push((delegate, args.to_vec()));
    });
    assert!(fired.is_empty(), "rpcs must not re-fire after a further frame advance");
}
