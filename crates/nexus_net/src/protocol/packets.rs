//! Wire packet framing.
//!
//! Byte 0 of every packet is a fixed routing marker (this engine's transport
//! multiplexes several packet families over one socket); byte 1 selects the
//! [`PacketKind`]. Everything after that is kind-specific framing, read with
//! [`crate::protocol::wire::ByteReader`].

use bytemuck::{Pod, Zeroable};

use crate::error::PacketError;
use crate::protocol::compression;
use crate::protocol::wire::ByteReader;

/// Routing marker shared by every packet this engine emits or consumes.
pub const HEADER_BYTE: u8 = 0xA5;

/// Packet kind, byte 1 of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    /// Compressed full-world image.
    BaselineSync = 0,
    /// Non-terminal fragment of a delta snapshot.
    DiffSync = 1,
    /// Terminal fragment of a delta snapshot.
    DiffSyncLast = 2,
    /// Outbound batch of buffered inputs.
    ClientSync = 3,
}

impl PacketKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::BaselineSync),
            1 => Some(Self::DiffSync),
            2 => Some(Self::DiffSyncLast),
            3 => Some(Self::ClientSync),
            _ => None,
        }
    }
}

/// A parsed inbound packet, post-framing.
pub enum InboundPacket {
    /// A decoded baseline: assigned player id plus the decompressed
    /// `u16 tick | <entity records>*` payload.
    Baseline {
        /// Player id the server assigned this client.
        player_id: u8,
        /// Decompressed payload, `tick` followed by full-sync entity records.
        payload: Vec<u8>,
    },
    /// One fragment of a diff snapshot.
    DiffFragment {
        /// Tick shared by every fragment of this diff.
        tick: u16,
        /// This fragment's raw bytes.
        bytes: Vec<u8>,
        /// Whether this is the terminal (`DiffSyncLast`) fragment.
        is_last: bool,
    },
}

/// Parses a packet's outer framing, decompressing a baseline if present.
pub fn parse_inbound(bytes: &[u8]) -> Result<InboundPacket, PacketError> {
    let mut reader = ByteReader::new(bytes);
    let header = reader.read_u8()?;
    if header != HEADER_BYTE {
        return Err(PacketError::Truncated { needed: 0, have: 0 });
    }
    let kind_byte = reader.read_u8()?;
    let kind = PacketKind::from_u8(kind_byte).ok_or(PacketError::Truncated { needed: 1, have: 0 })?;

    match kind {
        PacketKind::BaselineSync => {
            let (player_id, payload) = compression::decode_baseline(&mut reader)?;
            Ok(InboundPacket::Baseline { player_id, payload })
        }
        PacketKind::DiffSync | PacketKind::DiffSyncLast => {
            let tick = reader.read_u16()?;
            let bytes = reader.peek_rest().to_vec();
            Ok(InboundPacket::DiffFragment { tick, bytes, is_last: kind == PacketKind::DiffSyncLast })
        }
        PacketKind::ClientSync => Err(PacketError::Truncated { needed: 0, have: 0 }),
    }
}

/// Fixed header prefixed to every buffered input, per §4.5.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct InputPacketHeader {
    /// `state_a.tick` at the moment this input was generated.
    pub state_a_tick: u16,
    /// `state_b.tick`, or `state_a.tick` if no target snapshot existed yet.
    pub state_b_tick: u16,
    /// `logic_lerp_msec` at generation time, in milliseconds.
    pub logic_lerp_msec: u16,
}

/// On-wire header preceding an RPC's argument payload.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
pub struct RpcWireHeader {
    /// Tick the RPC is scheduled to fire at.
    pub tick: u16,
    /// Target entity.
    pub entity_id: u16,
    /// `0xFF` for an entity-level call, otherwise a syncable field id.
    pub field_id: u8,
    _padding: u8,
    /// Method identifier, resolved by the integration layer.
    pub delegate: u16,
    /// Length in bytes of the argument payload that follows this header.
    pub arg_len: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_header_byte() {
        let bytes = [0x00, PacketKind::DiffSync as u8, 0, 0];
        assert!(parse_inbound(&bytes).is_err());
    }

    #[test]
    fn parses_diff_fragment() {
        let mut bytes = vec![HEADER_BYTE, PacketKind::DiffSyncLast as u8];
        bytes.extend_from_slice(&101u16.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);

        match parse_inbound(&bytes).unwrap() {
            InboundPacket::DiffFragment { tick, bytes, is_last } => {
                assert_eq!(tick, 101);
                assert_eq!(bytes, vec![1, 2, 3]);
                assert!(is_last);
            }
            InboundPacket::Baseline { .. } => panic!("expected diff fragment"),
        }
    }
}
