use super::{EncodeError, RESERVED_LENGTH_SIZE, WireType, encode_reserved_length, tag, varint_size};

/// Upper bound for a primary export buffer.
pub const MAX_BUFFER_CAPACITY: usize = 100 * 1024 * 1024;

/// Initial size of the per-thread array scratch buffer.
pub const ARRAY_SCRATCH_INITIAL_CAPACITY: usize = 2048;

/// Upper bound for the per-thread array scratch buffer.
pub const ARRAY_SCRATCH_MAX_CAPACITY: usize = 2 * 1024 * 1024;

/// Smallest capacity a buffer grows to from empty.
const MIN_GROWN_CAPACITY: usize = 64;

/// How a [`ProtoBuffer`] reacts when a write does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// The write fails with [`EncodeError::BufferTooSmall`].
    ///
    /// The caller is expected to rewind to a checkpoint, [`grow`](ProtoBuffer::grow) and re-run the
    /// whole sub-encode, see [`ProtoBuffer::write_with_retry`].
    Checkpoint,
    /// The buffer grows and the write continues at the same position.
    InPlace,
}

/// A growable byte buffer with a single write cursor.
///
/// The cursor never exceeds the capacity and the capacity never shrinks.
#[derive(Debug)]
pub struct ProtoBuffer {
    bytes: Vec<u8>,
    position: usize,
    max_capacity: usize,
    growth: Growth,
}

/// Handle to a reserved length slot, see [`ProtoBuffer::reserve_length`].
#[derive(Debug)]
#[must_use = "a reserved length slot must be filled with `write_length`"]
pub struct ReservedLength {
    position: usize,
}

impl ReservedLength {
    /// Position of the slot inside the buffer.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl ProtoBuffer {
    /// Creates a buffer with the given initial and maximum capacity.
    pub fn new(initial_capacity: usize, max_capacity: usize, growth: Growth) -> Self {
        Self {
            bytes: vec![0; initial_capacity.min(max_capacity)],
            position: 0,
            max_capacity,
            growth,
        }
    }

    /// Creates a primary export buffer that grows through checkpoint/retry up to
    /// [`MAX_BUFFER_CAPACITY`].
    pub fn with_capacity(initial_capacity: usize) -> Self {
        Self::new(initial_capacity, MAX_BUFFER_CAPACITY, Growth::Checkpoint)
    }

    /// Creates an array scratch buffer that grows in place up to [`ARRAY_SCRATCH_MAX_CAPACITY`].
    pub fn array_scratch() -> Self {
        Self::new(
            ARRAY_SCRATCH_INITIAL_CAPACITY,
            ARRAY_SCRATCH_MAX_CAPACITY,
            Growth::InPlace,
        )
    }

    /// Current write position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Maximum capacity this buffer may grow to.
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Returns the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.position]
    }

    /// Resets the cursor to the start, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.position = 0;
    }

    /// Moves the cursor back to an earlier checkpoint.
    pub fn rewind(&mut self, checkpoint: usize) {
        debug_assert!(checkpoint <= self.position, "rewind past the cursor");
        self.position = checkpoint.min(self.position);
    }

    /// Doubles the capacity, keeping the written bytes and the cursor.
    pub fn grow(&mut self) -> Result<(), EncodeError> {
        let capacity = self.capacity();
        if capacity >= self.max_capacity {
            log::error!(
                "protobuf buffer cannot grow beyond {} bytes",
                self.max_capacity
            );
            return Err(EncodeError::CapacityExceeded {
                max: self.max_capacity,
            });
        }

        let grown = capacity
            .saturating_mul(2)
            .max(MIN_GROWN_CAPACITY)
            .min(self.max_capacity);
        self.bytes.resize(grown, 0);
        log::debug!("protobuf buffer grew from {capacity} to {grown} bytes");

        Ok(())
    }

    /// Runs `encode` from the current position, growing and re-running it from the same checkpoint
    /// until it fits.
    ///
    /// `encode` must only mutate the buffer, so re-running it produces the same bytes.
    pub fn write_with_retry<T>(
        &mut self,
        mut encode: impl FnMut(&mut Self) -> Result<T, EncodeError>,
    ) -> Result<T, EncodeError> {
        let checkpoint = self.position;
        loop {
            match encode(self) {
                Err(EncodeError::BufferTooSmall) => {
                    self.rewind(checkpoint);
                    self.grow()?;
                }
                result => return result,
            }
        }
    }

    fn ensure(&mut self, additional: usize) -> Result<(), EncodeError> {
        while self.capacity() - self.position < additional {
            match self.growth {
                Growth::Checkpoint => return Err(EncodeError::BufferTooSmall),
                Growth::InPlace => self.grow()?,
            }
        }
        Ok(())
    }

    /// Writes a single byte.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), EncodeError> {
        self.ensure(1)?;
        self.bytes[self.position] = byte;
        self.position += 1;
        Ok(())
    }

    /// Writes a slice of bytes.
    pub fn write_slice(&mut self, slice: &[u8]) -> Result<(), EncodeError> {
        self.ensure(slice.len())?;
        self.bytes[self.position..][..slice.len()].copy_from_slice(slice);
        self.position += slice.len();
        Ok(())
    }

    /// Overwrites already written bytes at `position`.
    ///
    /// # Panics
    ///
    /// Panics if the range is not fully behind the cursor.
    pub fn overwrite(&mut self, position: usize, slice: &[u8]) {
        assert!(
            position + slice.len() <= self.position,
            "overwrite past the cursor"
        );
        self.bytes[position..][..slice.len()].copy_from_slice(slice);
    }

    /// Writes a base-128 varint.
    pub fn write_varint64(&mut self, mut value: u64) -> Result<(), EncodeError> {
        self.ensure(varint_size(value))?;
        while value >= 0x80 {
            self.bytes[self.position] = (value as u8 & 0x7F) | 0x80;
            self.position += 1;
            value >>= 7;
        }
        self.bytes[self.position] = value as u8;
        self.position += 1;
        Ok(())
    }

    /// Writes a base-128 varint.
    pub fn write_varint32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_varint64(u64::from(value))
    }

    /// Writes four little-endian bytes.
    pub fn write_fixed32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_slice(&value.to_le_bytes())
    }

    /// Writes eight little-endian bytes.
    pub fn write_fixed64(&mut self, value: u64) -> Result<(), EncodeError> {
        self.write_slice(&value.to_le_bytes())
    }

    /// Writes a field tag.
    pub fn write_tag(&mut self, field_number: u32, wire_type: WireType) -> Result<(), EncodeError> {
        self.write_varint32(tag(field_number, wire_type))
    }

    /// Writes a field tag followed by a length that is known up front.
    pub fn write_tag_and_length(
        &mut self,
        field_number: u32,
        wire_type: WireType,
        length: usize,
    ) -> Result<(), EncodeError> {
        self.write_tag(field_number, wire_type)?;
        self.write_varint64(length as u64)
    }

    /// Writes a length-delimited field tag and reserves a 4-byte length slot after it.
    pub fn reserve_length(&mut self, field_number: u32) -> Result<ReservedLength, EncodeError> {
        self.write_tag(field_number, WireType::Len)?;
        self.ensure(RESERVED_LENGTH_SIZE)?;
        let position = self.position;
        self.position += RESERVED_LENGTH_SIZE;
        Ok(ReservedLength { position })
    }

    /// Fills a reserved slot with the number of bytes written since it was reserved.
    pub fn write_length(&mut self, reserved: ReservedLength) -> Result<(), EncodeError> {
        let length = self.position - (reserved.position + RESERVED_LENGTH_SIZE);
        self.write_reserved_length(reserved.position, length)
    }

    /// Backpatches `length` into the 4-byte slot at `position`.
    pub fn write_reserved_length(
        &mut self,
        position: usize,
        length: usize,
    ) -> Result<(), EncodeError> {
        let slot = encode_reserved_length(length)?;
        self.overwrite(position, &slot);
        Ok(())
    }

    /// Writes a nested message under `field_number`, framing whatever `encode` writes.
    pub fn write_message<T>(
        &mut self,
        field_number: u32,
        encode: impl FnOnce(&mut Self) -> Result<T, EncodeError>,
    ) -> Result<T, EncodeError> {
        let reserved = self.reserve_length(field_number)?;
        let value = encode(self)?;
        self.write_length(reserved)?;
        Ok(value)
    }

    /// Writes a `string` field.
    pub fn write_string(&mut self, field_number: u32, value: &str) -> Result<(), EncodeError> {
        self.write_bytes(field_number, value.as_bytes())
    }

    /// Writes a `bytes` field.
    pub fn write_bytes(&mut self, field_number: u32, value: &[u8]) -> Result<(), EncodeError> {
        self.write_tag_and_length(field_number, WireType::Len, value.len())?;
        self.write_slice(value)
    }

    /// Writes a `bool` field.
    pub fn write_bool(&mut self, field_number: u32, value: bool) -> Result<(), EncodeError> {
        self.write_tag(field_number, WireType::Varint)?;
        self.write_byte(u8::from(value))
    }

    /// Writes a `uint32`/`uint64` field.
    pub fn write_uint64(&mut self, field_number: u32, value: u64) -> Result<(), EncodeError> {
        self.write_tag(field_number, WireType::Varint)?;
        self.write_varint64(value)
    }

    /// Writes an `int64` field; negative values take ten bytes.
    pub fn write_int64(&mut self, field_number: u32, value: i64) -> Result<(), EncodeError> {
        self.write_uint64(field_number, value as u64)
    }

    /// Writes an enum field.
    pub fn write_enum(&mut self, field_number: u32, value: i32) -> Result<(), EncodeError> {
        self.write_int64(field_number, i64::from(value))
    }

    /// Writes a zigzag-encoded `sint32` field.
    pub fn write_sint32(&mut self, field_number: u32, value: i32) -> Result<(), EncodeError> {
        self.write_tag(field_number, WireType::Varint)?;
        self.write_varint32(super::zigzag32(value))
    }

    /// Writes a `fixed32` field.
    pub fn write_fixed32_field(
        &mut self,
        field_number: u32,
        value: u32,
    ) -> Result<(), EncodeError> {
        self.write_tag(field_number, WireType::I32)?;
        self.write_fixed32(value)
    }

    /// Writes a `fixed64` field.
    pub fn write_fixed64_field(
        &mut self,
        field_number: u32,
        value: u64,
    ) -> Result<(), EncodeError> {
        self.write_tag(field_number, WireType::I64)?;
        self.write_fixed64(value)
    }

    /// Writes an `sfixed64` field.
    pub fn write_sfixed64(&mut self, field_number: u32, value: i64) -> Result<(), EncodeError> {
        self.write_fixed64_field(field_number, value as u64)
    }

    /// Writes a `double` field.
    pub fn write_double(&mut self, field_number: u32, value: f64) -> Result<(), EncodeError> {
        self.write_fixed64_field(field_number, value.to_bits())
    }

    /// Writes a packed `repeated fixed64` field.
    pub fn write_packed_fixed64(
        &mut self,
        field_number: u32,
        values: &[u64],
    ) -> Result<(), EncodeError> {
        self.write_tag_and_length(field_number, WireType::Len, values.len() * 8)?;
        for value in values {
            self.write_fixed64(*value)?;
        }
        Ok(())
    }
}
