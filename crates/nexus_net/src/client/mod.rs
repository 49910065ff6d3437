//! The top-level client facade: owns every module and mediates the calls
//! between them.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                   RECONCILIATION CLIENT                       │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐  ┌────────────────┐  ┌──────────────────┐ │
//! │  │ SnapshotStore │->│ Interpolation  │->│ EntitiesTable     │ │
//! │  │ (reassembly)  │  │ Pipeline       │  │ (live field bytes)│ │
//! │  └───────────────┘  └────────────────┘  └──────────────────┘ │
//! │          │                   │                    │          │
//! │          v                   v                    v          │
//! │     JitterTracker     PredictionEngine       InputAssembler  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use nexus_core::{seq_diff, ClassMetadata, ClassRegistry, EntityId, RoleFlags, Tick};

use crate::controller::{EntityUpdater, InputController};
use crate::entities::EntitiesTable;
use crate::input::InputAssembler;
use crate::interp_scratch::InterpolationScratch;
use crate::interpolation::InterpolationPipeline;
use crate::jitter::JitterTracker;
use crate::prediction::PredictionEngine;
use crate::protocol::{self, InboundPacket, InputPacketHeader};
use crate::snapshot::{FragmentOutcome, ServerStateData, SnapshotStore};
use crate::transport::Transport;
use crate::{INPUT_BUFFER_SIZE, INTERPOLATE_BUFFER_SIZE, MAX_SAVED_STATE_DIFF, MAX_SYNCED_ENTITY_COUNT, TICK_DT};

/// Ties every module together into the client-visible reconciliation loop.
pub struct ReconciliationClient {
    registry: ClassRegistry,
    entities: EntitiesTable,
    store: SnapshotStore,
    interpolation: InterpolationPipeline,
    prediction: PredictionEngine,
    jitter: JitterTracker,
    input: InputAssembler,
    interp_scratch: InterpolationScratch,
    /// Accumulated render-frame time not yet folded into a whole local
    /// tick, per §4.6's local-interpolation fractional-progress factor.
    logic_accumulator: f32,
    state_a_tick: Tick,
    last_received_tick: Tick,
    remote_calls_tick: Tick,
}

impl ReconciliationClient {
    /// Creates a client over a pre-populated class registry (built-time
    /// codegen from entity declarations lives outside this crate).
    #[must_use]
    pub fn new(registry: ClassRegistry) -> Self {
        Self {
            registry,
            entities: EntitiesTable::new(MAX_SYNCED_ENTITY_COUNT),
            store: SnapshotStore::new(MAX_SAVED_STATE_DIFF),
            interpolation: InterpolationPipeline::new(TICK_DT, INTERPOLATE_BUFFER_SIZE),
            prediction: PredictionEngine::new(),
            jitter: JitterTracker::new(),
            input: InputAssembler::new(INPUT_BUFFER_SIZE),
            interp_scratch: InterpolationScratch::new(),
            logic_accumulator: 0.0,
            state_a_tick: Tick::default(),
            last_received_tick: Tick::default(),
            remote_calls_tick: Tick::default(),
        }
    }

    /// Read-only access to live entity state, for rendering.
    #[must_use]
    pub fn entities(&self) -> &EntitiesTable {
        &self.entities
    }

    /// Current blend factor between `state_a` and `state_b`, for rendering.
    #[must_use]
    pub fn lerp_t(&self) -> f32 {
        self.interpolation.lerp_t()
    }

    /// Tick of the currently rendered (`state_a`) snapshot, if any.
    #[must_use]
    pub fn rendered_tick(&self) -> Option<u16> {
        self.interpolation.state_a().map(|s| s.tick.value())
    }

    /// Number of completed snapshots currently waiting in the interpolation
    /// buffer, for diagnostics.
    #[must_use]
    pub fn interpolation_buffer_len(&self) -> usize {
        self.interpolation.buffer_len()
    }

    /// Registers an entity class. Normally done once at startup from
    /// generated metadata.
    pub fn register_class(&mut self, metadata: ClassMetadata) {
        self.registry.register(metadata);
    }

    /// Marks an entity as locally-controlled and predicted, queuing its
    /// spawn-acknowledgement cleanup.
    pub fn predict_spawn(&mut self, entity_id: EntityId, version: nexus_core::EntityVersion, class: Arc<ClassMetadata>, spawn_tick: Tick) {
        self.entities.create_or_replace(entity_id, version, class, RoleFlags::empty().with_local_controlled(true));
        self.prediction.queue_predicted_spawn(entity_id, spawn_tick);
    }

    /// Feeds one inbound packet's bytes to the reconciliation pipeline.
    ///
    /// Dispatches to baseline or diff handling based on the parsed packet
    /// kind; diff fragments accumulate until their terminal fragment
    /// completes a snapshot, which is then handed to the interpolation
    /// pipeline exactly as §4.1/§4.2 describe.
    pub fn on_packet_received(
        &mut self,
        bytes: &[u8],
        controller: &mut dyn InputController,
        updater: &mut dyn EntityUpdater,
    ) {
        let Ok(packet) = protocol::parse_inbound(bytes) else { return };
        match packet {
            InboundPacket::Baseline { payload, .. } => self.install_baseline(&payload, controller, updater),
            InboundPacket::DiffFragment { tick, bytes, is_last } => {
                self.on_diff_fragment(tick, &bytes, is_last, controller, updater);
            }
        }
    }

    fn install_baseline(&mut self, payload: &[u8], controller: &mut dyn InputController, updater: &mut dyn EntityUpdater) {
        let Ok((tick, processed_tick, last_received_tick, data)) = SnapshotStore::decode_baseline_payload(payload) else {
            return;
        };

        self.jitter.reset_timer();
        self.last_received_tick = last_received_tick;
        self.state_a_tick = tick;
        self.remote_calls_tick = tick;

        let mut state = Box::new(ServerStateData::empty());
        state.tick = tick;
        state.is_baseline = true;
        state.processed_tick = processed_tick;
        state.last_received_tick = last_received_tick;
        state.data = data;

        if crate::reader::index_snapshot(&mut state, &self.registry, &self.entities).is_err() {
            return;
        }
        let _ = crate::reader::apply_snapshot(
            &state,
            &self.registry,
            &mut self.entities,
            &mut self.prediction,
            &mut self.interp_scratch,
        );

        self.interpolation.on_snapshot_complete(
            state,
            &mut self.store,
            &self.registry,
            &mut self.entities,
            &mut self.prediction,
            self.input.commands_mut(),
            &self.jitter,
            controller,
            updater,
            &mut self.interp_scratch,
        );
    }

    fn on_diff_fragment(
        &mut self,
        tick: u16,
        bytes: &[u8],
        is_last: bool,
        controller: &mut dyn InputController,
        updater: &mut dyn EntityUpdater,
    ) {
        let Ok(outcome) = self.store.receive_fragment(self.state_a_tick, tick, bytes, is_last, &mut self.jitter) else {
            return;
        };
        if let FragmentOutcome::Accepted { completed: Some(state) } = outcome {
            self.last_received_tick = state.last_received_tick;
            self.interpolation.on_snapshot_complete(
                state,
                &mut self.store,
                &self.registry,
                &mut self.entities,
                &mut self.prediction,
                self.input.commands_mut(),
                &self.jitter,
                controller,
                updater,
                &mut self.interp_scratch,
            );
        }
    }

    /// Advances the render clock by `dt` seconds, per §4.6's frame-update
    /// routine: advance the snapshot pair, blend server-controlled entities
    /// between `interpolated_initial` and the fresh `state_b` bytes, blend
    /// local/predicted entities between `interpolated_prev` and
    /// `interpolated_initial` by fractional tick progress, then run every
    /// live entity's visual update.
    pub fn frame_update(&mut self, dt: f32, controller: &mut dyn InputController, updater: &mut dyn EntityUpdater) {
        self.interpolation.tick(
            dt,
            &mut self.store,
            &self.registry,
            &mut self.entities,
            &mut self.prediction,
            self.input.commands_mut(),
            &self.jitter,
            controller,
            updater,
            &mut self.interp_scratch,
        );

        let f_timer = self.interpolation.lerp_t();
        if let Some(state_b) = self.interpolation.state_b() {
            crate::reader::remote_interpolate(state_b, &mut self.entities, &self.interp_scratch, f_timer);
        }

        self.logic_accumulator += dt;
        while self.logic_accumulator >= TICK_DT {
            self.logic_accumulator -= TICK_DT;
            for (id, record) in self.entities.iter_locally_interpolated_mut() {
                if record.class.interpolated_field_count == 0 {
                    continue;
                }
                self.interp_scratch.rotate(id);
                let class = Arc::clone(&record.class);
                self.interp_scratch.mirror_initial(id, &class, &record.fields);
            }
        }
        let local_t = (self.logic_accumulator / TICK_DT).clamp(0.0, 1.0);
        crate::reader::local_interpolate(&mut self.entities, &self.interp_scratch, local_t);

        let capacity = self.entities.capacity();
        crate::reader::run_visual_updates(&mut self.entities, capacity, updater);
    }

    /// Runs one logic tick: every updateable entity's `Update`, per the
    /// class's `is_updateable`/`update_on_client` flags.
    pub fn run_logic_tick(&mut self, updater: &mut dyn EntityUpdater) {
        let capacity = self.entities.capacity();
        crate::reader::run_updates(&mut self.entities, capacity, updater);
    }

    /// Generates and buffers this tick's local input, for the integration
    /// layer's per-tick logic step.
    ///
    /// Applies the input locally first (§4.5 step 3), so the predicted
    /// entities it drives advance on the same bytes that will later be
    /// replayed from the buffer during rollback.
    pub fn record_local_input(
        &mut self,
        tick: Tick,
        payload: Vec<u8>,
        controller: &mut dyn InputController,
        updater: &mut dyn EntityUpdater,
    ) {
        let header = InputPacketHeader {
            state_a_tick: self.state_a_tick.value(),
            state_b_tick: self.interpolation.state_b().map_or(self.state_a_tick.value(), |s| s.tick.value()),
            logic_lerp_msec: (self.lerp_t() * 1000.0) as u16,
        };

        controller.read_input(&payload);
        for (entity_id, record) in self.entities.iter_predicted_mut() {
            if !record.class.is_updateable {
                continue;
            }
            updater.update(entity_id, &record.class, &mut record.fields);
        }

        self.input.push(tick, header, payload);
    }

    /// Flushes buffered local inputs as outbound `ClientSync` packets.
    pub fn flush_input(&mut self, transport: &mut dyn Transport) -> usize {
        self.input.flush(self.last_received_tick, transport)
    }

    /// Dispatches every RPC whose scheduled tick has now been rendered,
    /// exactly once, in non-decreasing tick order, per §4.7.
    ///
    /// RPCs are cached on `state_b` (they target the snapshot interpolation
    /// is blending towards). `server_tick` is the fractional render position
    /// between `state_a` and `state_b`; a call fires the first time
    /// `server_tick` reaches or passes its `tick`, and never again, tracked
    /// by `remote_calls_tick`.
    pub fn dispatch_due_rpcs(&mut self, on_rpc: &mut dyn FnMut(EntityId, u8, u16, &[u8])) {
        let Some(state_a) = self.interpolation.state_a() else { return };
        let Some(state_b) = self.interpolation.state_b() else { return };

        let raw_diff = seq_diff(state_b.tick.value(), state_a.tick.value());
        let server_tick = state_a.tick.wrapping_add((raw_diff as f32 * self.lerp_t()).round() as u16);

        let mut due: Vec<&crate::snapshot::RemoteCallRecord> = state_b
            .remote_calls
            .iter()
            .filter(|call| call.tick.is_after(self.remote_calls_tick) && !call.tick.is_after(server_tick))
            .collect();
        due.sort_by_key(|call| call.tick.value());

        for call in due {
            let start = call.offset as usize;
            let end = start + call.count as usize;
            if end > state_b.data.len() {
                continue;
            }
            on_rpc(call.entity_id, call.field_id, call.delegate, &state_b.data[start..end]);
            if call.tick.is_after(self.remote_calls_tick) {
                self.remote_calls_tick = call.tick;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::RecordingTransport;

    struct NullController;
    impl InputController for NullController {
        fn read_input(&mut self, _payload: &[u8]) {}
    }

    struct NullUpdater;
    impl EntityUpdater for NullUpdater {
        fn update(&mut self, _entity_id: EntityId, _class: &ClassMetadata, _fields: &mut [u8]) {}
    }

    #[test]
    fn unparseable_packet_is_ignored() {
        let mut client = ReconciliationClient::new(ClassRegistry::new());
        let mut controller = NullController;
        let mut updater = NullUpdater;
        client.on_packet_received(&[0xFF, 0xFF], &mut controller, &mut updater);
        assert!(client.entities().get(EntityId::new(0)).is_none());
    }

    #[test]
    fn flush_with_nothing_buffered_sends_nothing() {
        let mut client = ReconciliationClient::new(ClassRegistry::new());
        let mut transport = RecordingTransport::new(1200);
        assert_eq!(client.flush_input(&mut transport), 0);
    }
}
