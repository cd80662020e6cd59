//! Protobuf wire primitives.
//!
//! The encoder writes OTLP messages directly into a growable byte buffer without building an
//! intermediate message tree. Nested messages are framed with a fixed-width length slot that is
//! reserved before the nested content is written and backpatched afterwards.
//!
//! # Core Types
//!
//! - [`ProtoBuffer`]: Growable byte buffer with a single write cursor.
//! - [`ReservedLength`]: Handle to a reserved 4-byte length slot.
//! - [`WireType`]: The 3-bit wire type stored in every field tag.
//!
//! # Examples
//!
//! ```rust
//! use veecle_telemetry_otlp::encode::{ProtoBuffer, WireType};
//!
//! let mut buffer = ProtoBuffer::with_capacity(64);
//! let reserved = buffer.reserve_length(1)?;
//! buffer.write_string(1, "service.name")?;
//! buffer.write_length(reserved)?;
//!
//! assert_eq!(buffer.as_bytes()[0], (1 << 3) | WireType::Len as u8);
//! # Ok::<(), veecle_telemetry_otlp::encode::EncodeError>(())
//! ```

mod buffer;

pub use buffer::{
    ARRAY_SCRATCH_INITIAL_CAPACITY, ARRAY_SCRATCH_MAX_CAPACITY, Growth, MAX_BUFFER_CAPACITY,
    ProtoBuffer, ReservedLength,
};

/// Width of a reserved length slot in bytes.
pub const RESERVED_LENGTH_SIZE: usize = 4;

/// Largest length that fits in a reserved length slot.
pub const MAX_RESERVED_LENGTH: usize = (1 << 28) - 1;

/// An error while encoding a protobuf message.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The buffer has no room left and is not allowed to grow in place.
    #[error("the writer buffer is too small")]
    BufferTooSmall,
    /// The buffer would have to grow past its configured maximum.
    #[error("the buffer cannot grow beyond {max} bytes")]
    CapacityExceeded {
        /// The maximum capacity of the buffer.
        max: usize,
    },
    /// A nested message is too long for a reserved length slot.
    #[error("a length of {length} bytes is too big for the length field")]
    LengthOverflow {
        /// The length that did not fit.
        length: usize,
    },
}

/// The wire type stored in the low three bits of a field tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Base-128 variable-length integer.
    Varint = 0,
    /// Eight little-endian bytes.
    I64 = 1,
    /// Length-delimited bytes (strings, bytes, nested messages, packed fields).
    Len = 2,
    /// Four little-endian bytes.
    I32 = 5,
}

/// Packs a field number and wire type into a tag value.
pub const fn tag(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << 3) | wire_type as u32
}

/// Returns the number of bytes `value` occupies as a varint.
pub const fn varint_size(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    let bits = u64::BITS - value.leading_zeros();
    bits.div_ceil(7) as usize
}

/// Returns the number of bytes a tag for `field_number` occupies.
pub const fn tag_size(field_number: u32) -> usize {
    varint_size((field_number as u64) << 3)
}

/// Encodes `length` as a varint padded to exactly [`RESERVED_LENGTH_SIZE`] bytes.
///
/// Unused groups are filled with continuation bytes and the last byte terminates the varint, so a
/// decoder always consumes the full slot as one value.
pub fn encode_reserved_length(length: usize) -> Result<[u8; RESERVED_LENGTH_SIZE], EncodeError> {
    if length > MAX_RESERVED_LENGTH {
        return Err(EncodeError::LengthOverflow { length });
    }

    let mut slot = [0x80, 0x80, 0x80, 0x00];
    let mut remaining = length;
    for byte in &mut slot[..RESERVED_LENGTH_SIZE - 1] {
        *byte |= (remaining & 0x7F) as u8;
        remaining >>= 7;
    }
    slot[RESERVED_LENGTH_SIZE - 1] = remaining as u8;

    Ok(slot)
}

/// Maps a signed integer to an unsigned one so small magnitudes stay short on the wire.
pub const fn zigzag32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}
