//! # nexus_net - Client-Side Reconciliation Engine
//!
//! Snapshot interpolation for server-controlled entities, and client-side
//! prediction with rollback-and-replay for locally-controlled ones, over a
//! tick-based authoritative-server protocol.
//!
//! ## Architecture
//!
//! - **protocol**: wire framing, baseline LZ4 decompression, byte (de)serialization
//! - **snapshot**: bounded reassembly of fragmented diffs, and the buffer pool
//! - **interpolation**: the lerp buffer between `state_a`/`state_b`, jitter-adaptive timing
//! - **interp_scratch**: per-entity `interpolated_initial`/`interpolated_prev` blend sources
//! - **prediction**: per-entity authoritative images, rollback and replay
//! - **reader**: turns a snapshot's bytes into entity field writes, RPC dispatch, and frame-update blending
//! - **input**: per-tick input assembly, buffering, and packet flush
//! - **client**: the `ReconciliationClient` facade tying every module together
//!
//! ## Concurrency Model
//!
//! Single-threaded and cooperative: no internal locks, no suspension points,
//! an atomic boundary between "receive a packet" and "advance simulation".
//! The [`transport::Transport`] trait is synchronous for the same reason.
//!
//! ## Example
//!
//! ```rust,ignore
//! use nexus_net::client::ReconciliationClient;
//!
//! let mut client = ReconciliationClient::new(registry);
//! client.on_packet_received(&bytes, &mut controller, &mut updater);
//! client.frame_update(delta_seconds, &mut controller, &mut updater);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod controller;
pub mod entities;
pub mod error;
pub mod input;
pub mod interp_scratch;
pub mod interpolation;
pub mod jitter;
pub mod prediction;
pub mod protocol;
pub mod reader;
pub mod snapshot;
pub mod transport;

pub use client::ReconciliationClient;
pub use controller::{EntityUpdater, InputController};
pub use entities::{EntitiesTable, EntityRecord};
pub use error::{PacketError, ReadError, SnapshotError};
pub use input::{InputAssembler, InputCommand};
pub use interp_scratch::InterpolationScratch;
pub use interpolation::InterpolationPipeline;
pub use jitter::JitterTracker;
pub use prediction::PredictionEngine;
pub use snapshot::{FragmentOutcome, InterpolatedFieldCache, PreloadEntry, RemoteCallRecord, ServerStateData, SnapshotStore};
pub use transport::Transport;

/// Server tick rate this engine assumes (ticks per second).
pub const TICK_RATE_HZ: u32 = 60;

/// Fixed tick period in seconds, derived from [`TICK_RATE_HZ`].
pub const TICK_DT: f32 = 1.0 / TICK_RATE_HZ as f32;

/// Upper bound on simultaneously tracked entities, bounding
/// [`entities::EntitiesTable`]'s dense slot array.
pub const MAX_SYNCED_ENTITY_COUNT: usize = 1024;

/// Bound on the snapshot pool and the diff reassembly map, per §4.1.
pub const MAX_SAVED_STATE_DIFF: usize = 32;

/// Capacity of the locally-buffered, not-yet-acknowledged input queue.
///
/// When generation outruns acknowledgement (a long stall), the buffer is
/// cleared rather than allowed to grow unbounded; see the open-question
/// resolution in `DESIGN.md`.
pub const INPUT_BUFFER_SIZE: usize = 128;

/// Capacity of the interpolation lerp buffer, per §4.2.
pub const INTERPOLATE_BUFFER_SIZE: usize = 10;

/// Conservative unreliable-datagram payload budget in bytes.
pub const MAX_UNRELIABLE_DATA_SIZE: usize = 1200;
