//! Baseline LZ4 decode.
//!
//! Diff fragments arrive uncompressed (they're already small deltas); only
//! the full-world baseline is worth compressing. Framing: `u32
//! decompressed_size | u8 player_id | lz4_payload`.

use crate::error::PacketError;
use crate::protocol::wire::ByteReader;

/// Reads the baseline framing and decompresses its LZ4 payload.
///
/// A length mismatch between the header's declared size and the decoder's
/// actual output is a fatal parse error: the caller drops the packet and
/// leaves the engine on its prior state, per the error policy table.
pub fn decode_baseline(reader: &mut ByteReader<'_>) -> Result<(u8, Vec<u8>), PacketError> {
    let decompressed_size = reader.read_u32()? as usize;
    let player_id = reader.read_u8()?;
    let compressed = reader.peek_rest();

    let decompressed = lz4_flex::block::decompress(compressed, decompressed_size)?;
    if decompressed.len() != decompressed_size {
        tracing::error!(
            expected = decompressed_size,
            actual = decompressed.len(),
            "baseline LZ4 decode length mismatch"
        );
        return Err(PacketError::DecompressLengthMismatch {
            expected: decompressed_size,
            actual: decompressed.len(),
        });
    }

    Ok((player_id, decompressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire::ByteWriter;

    #[test]
    fn roundtrip_baseline() {
        let payload = b"tick-100-entity-records".to_vec();
        let compressed = lz4_flex::block::compress(&payload);

        let mut w = ByteWriter::with_capacity(compressed.len() + 5);
        w.write_u32(payload.len() as u32);
        w.write_u8(7);
        w.write_bytes(&compressed);

        let mut r = ByteReader::new(w.as_slice());
        let (player_id, decompressed) = decode_baseline(&mut r).unwrap();
        assert_eq!(player_id, 7);
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let payload = b"short".to_vec();
        let compressed = lz4_flex::block::compress(&payload);

        let mut w = ByteWriter::with_capacity(compressed.len() + 5);
        w.write_u32(999);
        w.write_u8(0);
        w.write_bytes(&compressed);

        let mut r = ByteReader::new(w.as_slice());
        assert!(decode_baseline(&mut r).is_err());
    }
}
