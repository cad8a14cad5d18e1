use thiserror::Error;

/// Errors that can occur while building or locking a protocol
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Protocol is locked and cannot be modified
    #[error("Protocol is already locked and cannot be modified. Protocol.lock() has been called and no further changes are allowed")]
    AlreadyLocked,

    /// An engine was created from a protocol that was never locked
    #[error("Protocol must be locked before an Engine can be created from it")]
    NotLocked,

    /// Two handlers were registered under the same name
    #[error("A handler named `{name}` is already registered")]
    DuplicateHandler { name: String },

    /// A type, base, container kind or def was registered twice
    #[error("`{name}` is already registered")]
    DuplicateType { name: String },

    /// A type node extends or implements a type that was never registered
    #[error("Type `{name}` refers to unregistered parent type `{parent}`")]
    UnknownParentType { name: String, parent: String },

    /// A member path is empty, malformed, or indexes more than one level deep
    #[error("Invalid member path `{path}`: {reason}")]
    InvalidMemberPath { path: String, reason: String },

    /// More container kinds than fit in the one-byte kind tag
    #[error("Too many container kinds registered, at most 255 are supported")]
    TooManyContainerKinds,

    /// More concrete subtypes below a base than fit in the two-byte subtype index
    #[error("Too many subtypes registered below base `{base}`")]
    TooManySubtypes { base: String },

    /// More defs in one catalog than there are non-zero short hashes
    #[error("Too many entries in def catalog `{catalog}`")]
    TooManyDefs { catalog: String },
}
