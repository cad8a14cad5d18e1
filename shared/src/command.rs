use lockstep_serde::{ByteReader, ByteWrite, Serde, SerdeErr, MAX_BLOB_LEN};

use crate::types::{MapId, Tick};

/// What a command's payload holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// A handler invocation: `[i32 sync id][ambient][body]`.
    Sync,
    /// An application command (pause, speed change, ...) the engine passes
    /// through untouched. The code is the application's own.
    Custom(u8),
}

impl CommandKind {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        match self {
            CommandKind::Sync => 0u8.ser(writer),
            CommandKind::Custom(code) => {
                1u8.ser(writer)?;
                code.ser(writer)
            }
        }
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        match u8::de(reader)? {
            0 => Ok(CommandKind::Sync),
            1 => Ok(CommandKind::Custom(u8::de(reader)?)),
            tag => Err(SerdeErr::InvalidTag { tag }),
        }
    }
}

/// A command on its way from the peer that issued it to the sequencer.
///
/// Wire layout: `[u8 kind][u8 code, custom only][i32 map][u32 len][payload]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub kind: CommandKind,
    pub map: MapId,
    pub payload: Vec<u8>,
}

impl CommandEnvelope {
    pub fn new(kind: CommandKind, map: MapId, payload: Vec<u8>) -> Self {
        Self { kind, map, payload }
    }

    /// Decodes an envelope, refusing payloads longer than `max_payload_len`
    /// before allocating for them.
    pub fn de_limited(reader: &mut ByteReader, max_payload_len: usize) -> Result<Self, SerdeErr> {
        let kind = CommandKind::de(reader)?;
        let map = MapId::de(reader)?;
        let payload = read_payload(reader, max_payload_len)?;
        Ok(Self { kind, map, payload })
    }
}

impl Serde for CommandEnvelope {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        self.kind.ser(writer)?;
        self.map.ser(writer)?;
        write_payload(writer, &self.payload)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Self::de_limited(reader, MAX_BLOB_LEN)
    }
}

/// A command stamped with the tick every peer executes it at.
///
/// `seq` is the local arrival order, assigned by the scheduler. It breaks
/// ties within a tick and never travels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledCommand {
    pub kind: CommandKind,
    pub tick: Tick,
    pub map: MapId,
    pub payload: Vec<u8>,
    pub seq: u64,
}

impl ScheduledCommand {
    pub fn new(envelope: CommandEnvelope, tick: Tick) -> Self {
        Self {
            kind: envelope.kind,
            tick,
            map: envelope.map,
            payload: envelope.payload,
            seq: 0,
        }
    }

    /// Wire layout: `[u32 tick]` followed by the envelope.
    pub fn de_limited(reader: &mut ByteReader, max_payload_len: usize) -> Result<Self, SerdeErr> {
        let tick = Tick::de(reader)?;
        let envelope = CommandEnvelope::de_limited(reader, max_payload_len)?;
        Ok(Self::new(envelope, tick))
    }
}

impl Serde for ScheduledCommand {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        self.tick.ser(writer)?;
        self.kind.ser(writer)?;
        self.map.ser(writer)?;
        write_payload(writer, &self.payload)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Self::de_limited(reader, MAX_BLOB_LEN)
    }
}

fn write_payload(writer: &mut dyn ByteWrite, payload: &[u8]) -> Result<(), SerdeErr> {
    let len = u32::try_from(payload.len()).map_err(|_| SerdeErr::BlobTooLong {
        len: payload.len(),
        max: MAX_BLOB_LEN,
    })?;
    len.ser(writer)?;
    writer.write_bytes(payload);
    Ok(())
}

fn read_payload(reader: &mut ByteReader, max_len: usize) -> Result<Vec<u8>, SerdeErr> {
    let len = u32::de(reader)? as usize;
    if len > max_len {
        return Err(SerdeErr::BlobTooLong { len, max: max_len });
    }
    Ok(reader.read_bytes(len)?.to_vec())
}
