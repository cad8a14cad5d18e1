//! # Lockstep Shared
//! Deterministic command capture, sequencing and replay for lockstep
//! simulations. Local actions are encoded as commands instead of being
//! applied, every peer receives the same commands stamped with the same
//! tick, and each peer replays them in the same order.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use lockstep_serde::{
    Blob, ByteCounter, ByteReader, ByteWrite, ByteWriter, ConstByteLength, Serde, SerdeErr,
    MAX_BLOB_LEN, MAX_SEQUENCE_LEN, read_sequence_len, write_sequence_len,
};

mod buffering;
mod command;
mod config;
mod engine;
mod handlers;
mod protocol;
mod scheduler;
mod serialization;
mod types;
mod value;

pub use buffering::{
    change_buffer::{BufferData, ChangeBuffer, Slot},
    watch::WatchToken,
};
pub use command::{CommandEnvelope, CommandKind, ScheduledCommand};
pub use config::EngineConfig;
pub use engine::{Engine, ExecutionReport};
pub use handlers::{
    args::ArgSpec,
    choice::SyncChoice,
    delegate::{Capture, CaptureSet, SyncDelegate},
    error::HandlerError,
    field::{FieldOps, SyncField},
    handler::{
        Handled, HandlerKind, HandlerMeta, HandlerOptions, Invocation, SyncContext, SyncHandler,
        UiState,
    },
    handler_list::SyncHandlers,
    member::{
        validate_member_path, FieldAccessor, GlobalFieldAccessor, IndexedFieldAccessor,
        MemberAccess,
    },
    method::SyncMethod,
};
pub use protocol::{Protocol, ProtocolError, ProtocolPlugin};
pub use scheduler::{command_scheduler::CommandScheduler, tick_sequencer::TickSequencer};
pub use serialization::{
    context::{ReadContext, WriteContext},
    defs::{preferred_short_hash, CatalogEntry, DefCatalog},
    error::SerializationError,
    references::{ContainerKind, ContainerKinds, Holder, LiveObject, ObjectGraph},
    registry::{BaseKind, TypeNode, TypeRegistry},
    sync_type::{SyncEnum, SyncType},
    type_key::TypeKey,
    worker::{FnWorker, SerdeWorker, SyncWorker, WorkerResult},
};
pub use types::{CellPos, HostType, MapId, ObjectId, SyncId, Tick};
pub use value::{Args, Value, ValueOps, ValueRef};
