//! Snapshot interpolation: the lerp buffer between `state_a` and `state_b`,
//! advanced by jitter-adaptive timing.
//!
//! A completed [`ServerStateData`] never applies immediately. It waits in
//! [`InterpolationPipeline::lerp_buffer`] (bounded by
//! [`crate::INTERPOLATE_BUFFER_SIZE`]) until it's popped as the next
//! `state_b`, then becomes `state_a` once `lerp_timer` catches up to
//! `lerp_duration` — the render clock always trails the network by roughly
//! one buffered interval, which is what makes interpolation (rather than
//! extrapolation) possible.

use nexus_core::{seq_diff, ClassRegistry, Tick};

use crate::controller::{EntityUpdater, InputController};
use crate::entities::EntitiesTable;
use crate::input::InputCommand;
use crate::interp_scratch::InterpolationScratch;
use crate::jitter::JitterTracker;
use crate::prediction::PredictionEngine;
use crate::reader;
use crate::snapshot::{ServerStateData, SnapshotStore};

fn insert_sorted(buffer: &mut Vec<Box<ServerStateData>>, state: Box<ServerStateData>) {
    let pos = buffer
        .iter()
        .position(|existing| seq_diff(existing.tick.value(), state.tick.value()) > 0)
        .unwrap_or(buffer.len());
    buffer.insert(pos, state);
}

fn lerp_scalar(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// The snapshot interpolation pipeline: buffers, the active pair, and the
/// jitter-adaptive advance clock.
pub struct InterpolationPipeline {
    state_a: Option<Box<ServerStateData>>,
    state_b: Option<Box<ServerStateData>>,
    lerp_buffer: Vec<Box<ServerStateData>>,
    lerp_timer: f32,
    lerp_duration: f32,
    adaptive_midpoint: f32,
    tick_dt: f32,
    buffer_capacity: usize,
}

impl InterpolationPipeline {
    /// Creates a pipeline with an empty buffer and pair.
    ///
    /// `tick_dt` is the fixed server tick period in seconds;
    /// `buffer_capacity` is [`crate::INTERPOLATE_BUFFER_SIZE`].
    #[must_use]
    pub fn new(tick_dt: f32, buffer_capacity: usize) -> Self {
        Self {
            state_a: None,
            state_b: None,
            lerp_buffer: Vec::with_capacity(buffer_capacity),
            lerp_timer: 0.0,
            lerp_duration: tick_dt,
            adaptive_midpoint: 3.0,
            tick_dt,
            buffer_capacity,
        }
    }

    /// The currently rendered snapshot (the interpolation source), if any.
    #[must_use]
    pub fn state_a(&self) -> Option<&ServerStateData> {
        self.state_a.as_deref()
    }

    /// The interpolation target, if preloaded.
    #[must_use]
    pub fn state_b(&self) -> Option<&ServerStateData> {
        self.state_b.as_deref()
    }

    /// Number of completed snapshots currently waiting in the lerp buffer.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.lerp_buffer.len()
    }

    /// Current blend factor in `[0, 1]` between `state_a` and `state_b`.
    #[must_use]
    pub fn lerp_t(&self) -> f32 {
        if self.lerp_duration <= 0.0 {
            1.0
        } else {
            (self.lerp_timer / self.lerp_duration).clamp(0.0, 1.0)
        }
    }

    /// Accepts a newly completed snapshot, per §4.2's buffer-full behavior:
    /// inserted if there's room; if full and newer than the buffer's
    /// minimum, forces an immediate advance to make room; otherwise it's
    /// stale and recycled straight back into the pool.
    #[allow(clippy::too_many_arguments)]
    pub fn on_snapshot_complete(
        &mut self,
        state: Box<ServerStateData>,
        store: &mut SnapshotStore,
        registry: &ClassRegistry,
        entities: &mut EntitiesTable,
        prediction: &mut PredictionEngine,
        input_queue: &mut Vec<InputCommand>,
        jitter: &JitterTracker,
        controller: &mut dyn InputController,
        updater: &mut dyn EntityUpdater,
        scratch: &mut InterpolationScratch,
    ) {
        if self.lerp_buffer.len() < self.buffer_capacity {
            insert_sorted(&mut self.lerp_buffer, state);
            return;
        }

        let buffer_min_tick = self.lerp_buffer[0].tick;
        if state.tick.is_after(buffer_min_tick) {
            self.lerp_timer = self.lerp_duration;
            self.advance(store, registry, entities, prediction, input_queue, jitter, controller, updater, scratch);
            insert_sorted(&mut self.lerp_buffer, state);
        } else {
            store.recycle(state);
        }
    }

    /// Pops the buffer's oldest entry as the new `state_b`, indexes it, and
    /// recomputes `lerp_duration`/`adaptive_midpoint` from current jitter.
    ///
    /// Returns `false` if the buffer was empty (nothing to preload).
    fn preload_next(
        &mut self,
        registry: &ClassRegistry,
        entities: &EntitiesTable,
        input_queue: &mut Vec<InputCommand>,
        jitter: &JitterTracker,
    ) -> bool {
        if self.lerp_buffer.is_empty() {
            return false;
        }
        let mut next = self.lerp_buffer.remove(0);

        let anchor_tick = self.state_a.as_ref().map_or(next.tick, |a| a.tick);
        let raw_diff = seq_diff(next.tick.value(), anchor_tick.value()) as f32;

        let samples: Vec<f32> = jitter.samples().collect();
        let fps = 1.0 / self.tick_dt;
        let deltas: Vec<f32> = samples.windows(2).map(|w| (w[0] - w[1]).abs() * fps).collect();
        if let Some(&worst) = deltas.iter().filter(|&&j| j > self.adaptive_midpoint).reduce(f32::max) {
            self.adaptive_midpoint = worst;
        } else if !deltas.is_empty() {
            let mean = deltas.iter().sum::<f32>() / deltas.len() as f32;
            self.adaptive_midpoint = lerp_scalar(self.adaptive_midpoint, mean.max(1.0), 0.05);
        }

        let buffer_len = self.lerp_buffer.len() as f32;
        self.lerp_duration = (raw_diff * self.tick_dt * (1.0 - (buffer_len - self.adaptive_midpoint) * 0.02)).max(self.tick_dt);

        let _ = reader::index_snapshot(&mut next, registry, entities);
        let acked_tick = next.processed_tick;
        input_queue.retain(|cmd| seq_diff(cmd.tick.value(), acked_tick.value()) > 0);

        self.state_b = Some(next);
        true
    }

    /// Promotes `state_b` to `state_a`, applies its fields, runs rollback,
    /// and immediately tries to preload the next snapshot — per §4.2's
    /// advance procedure.
    #[allow(clippy::too_many_arguments)]
    pub fn advance(
        &mut self,
        store: &mut SnapshotStore,
        registry: &ClassRegistry,
        entities: &mut EntitiesTable,
        prediction: &mut PredictionEngine,
        input_queue: &mut Vec<InputCommand>,
        jitter: &JitterTracker,
        controller: &mut dyn InputController,
        updater: &mut dyn EntityUpdater,
        scratch: &mut InterpolationScratch,
    ) {
        let Some(new_a) = self.state_b.take() else { return };
        if let Some(old_a) = self.state_a.take() {
            store.recycle(old_a);
        }
        self.state_a = Some(new_a);

        if let Some(state_a) = &self.state_a {
            let _ = reader::apply_snapshot(state_a, registry, entities, prediction, scratch);
        }

        self.lerp_timer -= self.lerp_duration;

        let processed_tick = self.state_a.as_ref().map_or(Tick::default(), |s| s.processed_tick);
        prediction.rollback(entities, processed_tick, input_queue, controller, updater, scratch);

        let old_duration = self.lerp_duration;
        if self.preload_next(registry, entities, input_queue, jitter) && self.lerp_duration > 0.0 {
            self.lerp_timer *= old_duration / self.lerp_duration;
        }
    }

    /// Ticks the render clock forward by `dt` seconds, advancing to the next
    /// snapshot pair whenever the timer catches up.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        dt: f32,
        store: &mut SnapshotStore,
        registry: &ClassRegistry,
        entities: &mut EntitiesTable,
        prediction: &mut PredictionEngine,
        input_queue: &mut Vec<InputCommand>,
        jitter: &JitterTracker,
        controller: &mut dyn InputController,
        updater: &mut dyn EntityUpdater,
        scratch: &mut InterpolationScratch,
    ) {
        self.lerp_timer += dt;
        if self.state_b.is_none() {
            self.preload_next(registry, entities, input_queue, jitter);
        }
        if self.state_b.is_some() && self.lerp_timer >= self.lerp_duration {
            self.advance(store, registry, entities, prediction, input_queue, jitter, controller, updater, scratch);
        }
    }
}
