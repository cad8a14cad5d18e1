use lockstep_serde::{ByteReader, ByteWrite, ConstByteLength, Serde, SerdeErr};

/// Logical simulation step. Every peer executes the same commands at the same tick.
pub type Tick = u32;

/// Dense index of a handler in the locked handler list.
pub type SyncId = i32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    /// The peer that owns the tick sequencer.
    Host,
    Client,
}

impl HostType {
    pub fn invert(self) -> Self {
        match self {
            HostType::Host => HostType::Client,
            HostType::Client => HostType::Host,
        }
    }
}

/// A partition of the simulation. Commands are scheduled per map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub i32);

impl MapId {
    /// Partition for commands that do not belong to any map.
    pub const GLOBAL: MapId = MapId(-1);

    pub fn is_global(&self) -> bool {
        *self == Self::GLOBAL
    }
}

impl Serde for MapId {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        self.0.ser(writer)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self(i32::de(reader)?))
    }
}

impl ConstByteLength for MapId {
    fn const_byte_length() -> usize {
        4
    }
}

/// Stable identity of a live simulation object, identical on every peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub i32);

impl ObjectId {
    /// Wire value written for a null reference.
    pub const NULL_WIRE: i32 = -1;
}

/// A grid cell on a map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellPos {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl CellPos {
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Writes an optional cell. An absent cell is a single `-1`, cells on the
    /// map always have non-negative coordinates.
    pub fn ser_optional(cell: Option<&CellPos>, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        match cell {
            Some(cell) => cell.ser(writer),
            None => (-1i16).ser(writer),
        }
    }

    pub fn de_optional(reader: &mut ByteReader) -> Result<Option<CellPos>, SerdeErr> {
        let x = i16::de(reader)?;
        if x < 0 {
            return Ok(None);
        }
        let y = i16::de(reader)?;
        let z = i16::de(reader)?;
        Ok(Some(CellPos { x, y, z }))
    }
}

impl Serde for CellPos {
    fn ser(&self, writer: &mut dyn ByteWrite) -> Result<(), SerdeErr> {
        self.x.ser(writer)?;
        self.y.ser(writer)?;
        self.z.ser(writer)
    }

    fn de(reader: &mut ByteReader) -> Result<Self, SerdeErr> {
        Ok(Self {
            x: i16::de(reader)?,
            y: i16::de(reader)?,
            z: i16::de(reader)?,
        })
    }
}

impl ConstByteLength for CellPos {
    fn const_byte_length() -> usize {
        6
    }
}
