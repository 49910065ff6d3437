//! Input assembly: per-tick input generation, buffering, and the outbound
//! `ClientSync` packet flush.
//!
//! Every local tick produces one opaque payload (via the integration
//! layer's `generate_input`), prefixed with an [`InputPacketHeader`]
//! recording the tick's interpolation state. Payloads are kept in
//! [`InputAssembler::buffer`] until the server acknowledges them (dropped
//! during [`crate::prediction::PredictionEngine::rollback`]) and are
//! replayed from there on every rollback.

use nexus_core::{seq_diff, Tick};

use crate::protocol::{ByteWriter, InputPacketHeader, HEADER_BYTE};
use crate::transport::Transport;

/// One tick's buffered, not-yet-acknowledged input.
#[derive(Clone, Debug)]
pub struct InputCommand {
    /// Local tick this input was generated for.
    pub tick: Tick,
    /// Fixed per-tick header (interpolation state at generation time).
    pub header: InputPacketHeader,
    /// Opaque payload produced by the integration layer's controller.
    pub payload: Vec<u8>,
}

const CLIENT_SYNC_KIND: u8 = 3;

/// Buffers generated inputs and flushes them as `ClientSync` packets.
pub struct InputAssembler {
    buffer: Vec<InputCommand>,
    capacity: usize,
}

impl InputAssembler {
    /// Creates an assembler bounded by `capacity` buffered inputs
    /// ([`crate::INPUT_BUFFER_SIZE`]).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { buffer: Vec::with_capacity(capacity), capacity }
    }

    /// Buffered, not-yet-acknowledged inputs, oldest first.
    #[must_use]
    pub fn commands(&self) -> &[InputCommand] {
        &self.buffer
    }

    /// Mutable access for [`crate::prediction::PredictionEngine::rollback`]
    /// to drop acknowledged entries and replay the rest.
    pub fn commands_mut(&mut self) -> &mut Vec<InputCommand> {
        &mut self.buffer
    }

    /// Records one tick's generated input.
    ///
    /// If the buffer is at capacity (the server has stopped acknowledging
    /// for `INPUT_BUFFER_SIZE` ticks), it's cleared first: replaying a
    /// buffer this stale would just waste CPU re-deriving state the
    /// upcoming snapshot is about to overwrite anyway.
    pub fn push(&mut self, tick: Tick, header: InputPacketHeader, payload: Vec<u8>) {
        if payload.len() > crate::MAX_UNRELIABLE_DATA_SIZE {
            tracing::error!(tick = tick.value(), len = payload.len(), "oversize input payload, dropping this tick");
            return;
        }
        if self.buffer.len() >= self.capacity {
            tracing::warn!(capacity = self.capacity, "input buffer overflow, clearing queue");
            self.buffer.clear();
        }
        self.buffer.push(InputCommand { tick, header, payload });
    }

    /// Flushes buffered inputs newer than `last_received_tick` as one or
    /// more `ClientSync` packets, splitting on `transport`'s unreliable MTU.
    ///
    /// Returns the number of packets sent.
    pub fn flush(&self, last_received_tick: Tick, transport: &mut dyn Transport) -> usize {
        let pending: Vec<&InputCommand> = self
            .buffer
            .iter()
            .filter(|cmd| seq_diff(cmd.tick.value(), last_received_tick.value()) > 0)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let mtu = transport.max_single_packet_size(true) as usize;
        let mut sent = 0;
        let mut index = 0;
        while index < pending.len() {
            let mut writer = ByteWriter::with_capacity(mtu);
            writer.write_u8(HEADER_BYTE);
            writer.write_u8(CLIENT_SYNC_KIND);
            writer.write_u16(pending[index].tick.value());

            while index < pending.len() {
                let cmd = pending[index];
                let entry_len = 2 + std::mem::size_of::<InputPacketHeader>() + cmd.payload.len();
                if writer.len() + entry_len > mtu && writer.len() > 3 {
                    break;
                }
                writer.write_u16((std::mem::size_of::<InputPacketHeader>() + cmd.payload.len()) as u16);
                writer.write_pod(&cmd.header);
                writer.write_bytes(&cmd.payload);
                index += 1;
            }

            transport.send(writer.as_slice(), true);
            sent += 1;
        }
        sent
    }
}
