use lockstep_serde::SerdeErr;
use thiserror::Error;

use crate::{
    handlers::handler::HandlerKind, serialization::error::SerializationError, types::SyncId,
};

/// Errors raised while emitting or executing a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// A command referenced a handler id outside the locked handler list
    #[error("No handler with sync id {sync_id}")]
    UnknownSyncId { sync_id: SyncId },

    /// A call site named a handler that was never registered
    #[error("No handler named `{name}`")]
    UnknownHandler { name: String },

    /// The remote peer locked a different handler list
    #[error("Handler list hash mismatch: local {local:#010x}, remote {remote:#010x}")]
    HandlerListMismatch { local: u32, remote: u32 },

    /// A call site used a handler as the wrong kind of operation
    #[error("Handler `{name}` is a {found:?} handler, not a {expected:?} handler")]
    KindMismatch {
        name: String,
        expected: HandlerKind,
        found: HandlerKind,
    },

    /// A call site passed a different number of arguments than declared
    #[error("Handler `{name}` takes {expected} arguments but {found} were given")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    /// A delegate or choice was looked up with the wrong environment or option type
    #[error("Handler `{name}` is not declared over type {type_name}")]
    TypeMismatch {
        name: String,
        type_name: &'static str,
    },

    /// A typed value could not be encoded or decoded
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// The payload itself is malformed
    #[error(transparent)]
    Serde(#[from] SerdeErr),
}

impl HandlerError {
    /// Errors after which this peer can no longer stay in lockstep with the
    /// others. The engine stops executing and reports them to the caller.
    pub fn is_protocol_fatal(&self) -> bool {
        match self {
            HandlerError::UnknownSyncId { .. }
            | HandlerError::HandlerListMismatch { .. }
            | HandlerError::Serde(_) => true,
            HandlerError::Serialization(error) => error.is_protocol_fatal(),
            HandlerError::UnknownHandler { .. }
            | HandlerError::KindMismatch { .. }
            | HandlerError::ArgumentCount { .. }
            | HandlerError::TypeMismatch { .. } => false,
        }
    }
}
