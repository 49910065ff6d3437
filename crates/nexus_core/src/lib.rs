//! # Nexus Core
//!
//! Primitive types shared by the client reconciliation engine, with no
//! networking knowledge of their own:
//!
//! - [`tick`] — wrap-around tick arithmetic (`seq_diff`).
//! - [`entity`] — dense entity ids, versions, and role flags.
//! - [`memory`] — the pre-allocated pool allocator steady-state code relies
//!   on to stay allocation-free.
//! - [`reflect`] — class-metadata reflection: field layouts, interpolator
//!   and on-sync callbacks, syncable aggregate fields.
//!
//! ## Architecture Rules
//!
//! 1. **No heap allocations in hot path** - pools are pre-allocated
//! 2. **Untyped byte images** - fields are copied by offset/size, not by type
//! 3. **No owning references** - entity-to-entity links resolve through the
//!    entities table, never stored as owning handles

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod entity;
pub mod memory;
pub mod reflect;
pub mod tick;

pub use entity::{EntityId, EntityVersion, RoleFlags};
pub use memory::{PoolAllocator, PoolHandle};
pub use reflect::{
    ClassMetadata, ClassRegistry, FieldDescriptor, FieldFlags, FieldKind, InterpolatorFn,
    OnSyncFn, SyncableFieldDescriptor, SyncableReaderFn,
};
pub use tick::{seq_diff, Tick};