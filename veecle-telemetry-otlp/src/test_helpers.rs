//! A minimal protobuf wire reader for byte-level assertions in tests.

/// The payload of a decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// A varint field.
    Varint(u64),
    /// A `fixed64`, `sfixed64` or `double` field.
    Fixed64(u64),
    /// A `fixed32`, `sfixed32` or `float` field.
    Fixed32(u32),
    /// A length-delimited field.
    Len(&'a [u8]),
}

/// A decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    /// The field number.
    pub number: u32,
    /// The field payload.
    pub value: FieldValue<'a>,
}

impl<'a> Field<'a> {
    /// Returns the payload of a length-delimited field.
    pub fn bytes(&self) -> Option<&'a [u8]> {
        match self.value {
            FieldValue::Len(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the payload of a length-delimited field as UTF-8.
    pub fn str(&self) -> Option<&'a str> {
        self.bytes().and_then(|bytes| str::from_utf8(bytes).ok())
    }

    /// Returns the payload of a varint field.
    pub fn varint(&self) -> Option<u64> {
        match self.value {
            FieldValue::Varint(value) => Some(value),
            _ => None,
        }
    }
}

/// An error while reading the wire format.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum ReadError {
    /// The input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// A varint was longer than ten bytes.
    #[error("varint is too long")]
    VarintTooLong,
    /// The tag carried a wire type that is not supported.
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),
}

/// Reads protobuf fields from a byte slice.
#[derive(Debug)]
pub struct WireReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a new reader.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Returns `true` when all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    fn read_slice(&mut self, length: usize) -> Result<&'a [u8], ReadError> {
        let slice = self
            .buffer
            .get(self.offset..self.offset + length)
            .ok_or(ReadError::UnexpectedEnd)?;
        self.offset += length;
        Ok(slice)
    }

    /// Reads a base-128 varint.
    pub fn read_varint(&mut self) -> Result<u64, ReadError> {
        let mut value = 0u64;
        for index in 0..10 {
            let byte = *self
                .buffer
                .get(self.offset)
                .ok_or(ReadError::UnexpectedEnd)?;
            self.offset += 1;
            value |= u64::from(byte & 0x7F) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ReadError::VarintTooLong)
    }

    /// Reads one tagged field.
    pub fn read_field(&mut self) -> Result<Field<'a>, ReadError> {
        let tag = self.read_varint()?;
        let number = (tag >> 3) as u32;
        let value = match (tag & 0x7) as u8 {
            0 => FieldValue::Varint(self.read_varint()?),
            1 => {
                let bytes = self.read_slice(8)?;
                FieldValue::Fixed64(u64::from_le_bytes(
                    bytes.try_into().map_err(|_| ReadError::UnexpectedEnd)?,
                ))
            }
            2 => {
                let length = self.read_varint()? as usize;
                FieldValue::Len(self.read_slice(length)?)
            }
            5 => {
                let bytes = self.read_slice(4)?;
                FieldValue::Fixed32(u32::from_le_bytes(
                    bytes.try_into().map_err(|_| ReadError::UnexpectedEnd)?,
                ))
            }
            other => return Err(ReadError::UnsupportedWireType(other)),
        };
        Ok(Field { number, value })
    }

    /// Reads every remaining field.
    pub fn read_all(mut self) -> Result<Vec<Field<'a>>, ReadError> {
        let mut fields = Vec::new();
        while !self.is_empty() {
            fields.push(self.read_field()?);
        }
        Ok(fields)
    }
}

/// Parses a message into its fields, panicking on malformed input.
pub fn fields(message: &[u8]) -> Vec<Field<'_>> {
    WireReader::new(message)
        .read_all()
        .expect("message should be well formed")
}

/// Returns every field with the given number.
pub fn fields_numbered(message: &[u8], number: u32) -> Vec<Field<'_>> {
    fields(message)
        .into_iter()
        .filter(|field| field.number == number)
        .collect()
}

/// Returns the only field with the given number, if any.
///
/// # Panics
///
/// Panics if the field occurs more than once.
pub fn field(message: &[u8], number: u32) -> Option<Field<'_>> {
    let mut matches = fields_numbered(message, number);
    assert!(matches.len() <= 1, "field {number} occurs {} times", matches.len());
    matches.pop()
}

/// Returns the field numbers of a message in wire order.
pub fn field_numbers(message: &[u8]) -> Vec<u32> {
    fields(message).iter().map(|field| field.number).collect()
}
