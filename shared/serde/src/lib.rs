//! # Lockstep Serde
//! Byte-level wire primitives shared by every peer of a lockstep session.
//!
//! Scalars are fixed-width little-endian. Strings and blobs carry a 4-byte
//! length prefix, homogeneous sequences a 2-byte count capped at
//! [`MAX_SEQUENCE_LEN`].

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod byte_reader;
mod byte_writer;
mod constants;
mod error;
mod impls;
mod serde;

pub use byte_reader::ByteReader;
pub use byte_writer::{ByteCounter, ByteWrite, ByteWriter};
pub use constants::{MAX_BLOB_LEN, MAX_SEQUENCE_LEN};
pub use error::SerdeErr;
pub use impls::{
    blob::Blob,
    sequence::{read_sequence_len, write_sequence_len},
};
pub use serde::{ConstByteLength, Serde};
