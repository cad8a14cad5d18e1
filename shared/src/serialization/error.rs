use lockstep_serde::SerdeErr;
use thiserror::Error;

use crate::types::{MapId, ObjectId};

/// Errors raised while encoding or decoding typed values of a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// No registered worker accepted a value of this type
    #[error("No encoder registered for type {type_name}")]
    NoEncoderForType { type_name: String },

    /// A polymorphic value carried a subtype index outside the base's subtype array
    #[error("Unknown subtype index {index} for base type {base}")]
    UnknownSubtype { base: String, index: u16 },

    /// A def short hash did not match any entry of the catalog
    #[error("Unknown catalog entry with short hash {hash} in {catalog}")]
    UnknownCatalogEntry { catalog: String, hash: u16 },

    /// A def to encode is not registered in its catalog
    #[error("Def {name} is not registered in {catalog}")]
    UnregisteredDef { catalog: String, name: String },

    /// A reference carried a container kind byte that was never registered
    #[error("Unknown container kind {kind}")]
    UnknownContainerKind { kind: u8 },

    /// A live object is not held by any map or registered container
    #[error("Object {id:?} is not held by any map or registered container")]
    UnresolvableContainer { id: ObjectId },

    /// An object or argument lives on a different map than the command
    #[error("Object {id:?} lives on map {found:?} but the command targets map {expected:?}")]
    PartitionMismatch {
        id: ObjectId,
        expected: MapId,
        found: MapId,
    },

    /// A null value was given for a type that cannot encode null
    #[error("Null value given for non-nullable type {type_name}")]
    UnexpectedNull { type_name: String },

    /// The dynamic value does not have the declared type
    #[error("Value does not have the declared type {type_name}")]
    TypeMismatch { type_name: String },

    /// The exposable serializer failed on a value
    #[error("Exposable serializer failed for {type_name}: {reason}")]
    ExposeFailed { type_name: String, reason: String },

    /// Wire-level failure
    #[error(transparent)]
    Serde(#[from] SerdeErr),
}

impl SerializationError {
    /// Errors that mean the peers no longer agree on the protocol or the
    /// payload bytes, as opposed to a single value that could not be handled.
    pub fn is_protocol_fatal(&self) -> bool {
        matches!(
            self,
            SerializationError::UnknownSubtype { .. }
                | SerializationError::UnknownCatalogEntry { .. }
                | SerializationError::UnknownContainerKind { .. }
                | SerializationError::Serde(_)
        )
    }
}
