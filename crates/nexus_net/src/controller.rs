//! Seams for the integration layer's gameplay code.
//!
//! The engine never contains gameplay logic; it calls back into these two
//! traits wherever the spec says "deliver to each controller's `read_input`"
//! or "call the entity's `Update`". Implementations must be deterministic
//! and side-effect-free outside the entity's own state — replay during
//! rollback runs them in a straight-line loop, not concurrently.

use nexus_core::{ClassMetadata, EntityId};

/// Applies a buffered input's opaque payload to local/predicted state.
///
/// Called once per buffered input during both the original local tick and
/// every rollback replay, so it must produce the same result given the
/// same payload and prior state both times.
pub trait InputController {
    /// Applies `payload` — the same bytes originally written by this
    /// controller's `generate_input` — to whatever local state it drives.
    fn read_input(&mut self, payload: &[u8]);
}

/// Advances one entity's simulation by one tick.
///
/// Invoked only for classes where `ClassMetadata::is_updateable` (and,
/// for server-controlled entities, `update_on_client`) is set.
pub trait EntityUpdater {
    /// Advances `fields` (the entity's live byte image) by one tick.
    fn update(&mut self, entity_id: EntityId, class: &ClassMetadata, fields: &mut [u8]);
}
