//! Client session: one bus binding, one command pipe
//!
//! Owns the bus and the pipe handle instead of keeping them in process-wide
//! globals. Opened explicitly, closed explicitly.

use tracing::{debug, info};

use crate::bus::{PipeId, SoftwareBus, Timeout};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::{decode_primary, BusHeader, Encoder, MsgId, Packet};

#[cfg(unix)]
use crate::bus::NativeBus;

/// An open connection to the software bus.
pub struct Session<B: SoftwareBus> {
    bus: B,
    pipe: PipeId,
    encoder: Encoder,
    increment_sequence: bool,
    subscriptions: Vec<MsgId>,
}

#[cfg(unix)]
impl Session<NativeBus> {
    /// Load the native client library named in `config` and open a session on it.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let bus = NativeBus::load(&config.library_path)?;
        Self::with_bus(bus, config)
    }
}

impl<B: SoftwareBus> Session<B> {
    /// Initialize `bus` and create the command pipe.
    pub fn with_bus(mut bus: B, config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        bus.initialize()?;
        let pipe = bus.create_pipe(config.pipe_depth, &config.pipe_name)?;

        info!(
            %pipe,
            name = %config.pipe_name,
            depth = config.pipe_depth,
            "session opened"
        );

        Ok(Self {
            bus,
            pipe,
            encoder: Encoder::new(config.encoder_capacity).with_checksum(config.generate_checksum),
            increment_sequence: config.increment_sequence,
            subscriptions: Vec::new(),
        })
    }

    #[inline(always)]
    pub fn pipe(&self) -> PipeId {
        self.pipe
    }

    pub fn subscriptions(&self) -> &[MsgId] {
        &self.subscriptions
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Route `msg_id` to this session's pipe.
    pub fn subscribe(&mut self, msg_id: MsgId) -> Result<()> {
        self.bus.subscribe(msg_id, self.pipe)?;
        if !self.subscriptions.contains(&msg_id) {
            self.subscriptions.push(msg_id);
        }
        debug!(%msg_id, pipe = %self.pipe, "subscribed");
        Ok(())
    }

    /// Encode `header` + `payload` and transmit it.
    ///
    /// The length word (and command checksum, when enabled) is recomputed
    /// here, whatever the caller put in `header`.
    pub fn send(&mut self, header: &BusHeader, payload: &[u8]) -> Result<()> {
        self.encoder.reset();
        let packet = self.encoder.encode(header, payload)?;
        debug!(
            msg_id = %header.msg_id(),
            kind = %header.packet_type(),
            len = packet.len(),
            "transmit"
        );
        self.bus.transmit(packet, self.increment_sequence)
    }

    /// Transmit an already encoded packet as is.
    pub fn send_raw(&mut self, packet: &[u8]) -> Result<()> {
        let primary = decode_primary(packet)?;
        debug!(header = %primary, len = packet.len(), "transmit raw");
        self.bus.transmit(packet, self.increment_sequence)
    }

    /// Wait for the next packet on the command pipe and decode its header.
    pub fn receive(&mut self, timeout: Timeout) -> Result<Packet<'_>> {
        let raw = self.bus.receive(self.pipe, timeout)?;
        let packet = Packet::parse(raw)?;
        debug!(header = %packet.header, payload = packet.payload.len(), "received");
        Ok(packet)
    }

    /// Raw bytes of the next packet, header included, without decoding.
    pub fn receive_raw(&mut self, timeout: Timeout) -> Result<&[u8]> {
        self.bus.receive(self.pipe, timeout)
    }

    /// Tear the session down and release the bus.
    pub fn close(self) {
        info!(pipe = %self.pipe, subscriptions = self.subscriptions.len(), "session closed");
        drop(self.bus);
    }

    /// Close the session but keep the bus binding.
    pub fn into_bus(self) -> B {
        self.bus
    }
}
