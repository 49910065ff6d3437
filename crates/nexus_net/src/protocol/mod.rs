//! Wire protocol: packet framing, baseline decompression, byte (de)serialization.

mod compression;
mod packets;
mod wire;

pub use compression::decode_baseline;
pub use packets::{parse_inbound, InboundPacket, InputPacketHeader, PacketKind, RpcWireHeader, HEADER_BYTE};
pub use wire::{ByteReader, ByteWriter};
