//! In-band error types.
//!
//! Nothing in the engine raises to its caller. Every malformed or stale
//! packet is logged and dropped here, then recovered from at the call site
//! per the policy table this module backs.

use thiserror::Error;

/// Failures while decoding a baseline or diff packet's outer framing.
#[derive(Debug, Error)]
pub enum PacketError {
    /// LZ4 decompression produced a different length than the header claimed.
    #[error("baseline decode length mismatch: expected {expected}, got {actual}")]
    DecompressLengthMismatch {
        /// Length declared in the packet header.
        expected: usize,
        /// Length actually produced by the decoder.
        actual: usize,
    },
    /// The LZ4 block itself failed to decode.
    #[error("baseline LZ4 decode failed: {0}")]
    DecompressFailed(#[from] lz4_flex::block::DecompressError),
    /// Packet shorter than its fixed framing requires.
    #[error("packet truncated: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes required to read the next field.
        needed: usize,
        /// Bytes actually remaining.
        have: usize,
    },
}

/// Failures while the [`SnapshotStore`](crate::snapshot::SnapshotStore) is
/// reassembling or admitting a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The fragment's tick is not after the current base snapshot.
    #[error("stale fragment for tick {tick}, state_a is at {state_a_tick}")]
    StaleFragment {
        /// The fragment's tick.
        tick: u16,
        /// The base snapshot's tick.
        state_a_tick: u16,
    },
    /// The reassembly map is full and the incoming fragment is not newer
    /// than every entry already held.
    #[error("reassembly map full, tick {tick} not newer than oldest {oldest_tick}")]
    ReassemblyMapFull {
        /// The fragment's tick.
        tick: u16,
        /// The oldest tick currently reassembling.
        oldest_tick: u16,
    },
    /// Outer framing was malformed.
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// Failures while the [`reader`](crate::reader) module parses entity
/// records against class metadata.
#[derive(Debug, Error)]
pub enum ReadError {
    /// `entity_id` is `>= MAX_SYNCED_ENTITY_COUNT`. The parser position is
    /// poisoned and the caller must abort the record loop.
    #[error("entity id {0} out of range")]
    EntityIdOutOfRange(u16),
    /// `class_id` has no registered [`ClassMetadata`](nexus_core::ClassMetadata).
    #[error("unknown class id {0}")]
    UnknownClass(u16),
    /// Record ended before its declared fields were fully read.
    #[error("record truncated: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes required to read the next field.
        needed: usize,
        /// Bytes actually remaining.
        have: usize,
    },
}
