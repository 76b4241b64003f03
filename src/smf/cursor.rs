use crate::error::ParseError;

/// Bounds-checked sequential reader over a byte buffer.
///
/// Every read either advances the position by exactly the bytes consumed or
/// fails with [`ParseError::TruncatedStream`] and leaves the position alone.
/// Offsets in errors are absolute within the file, even for cursors created
/// with [`ByteCursor::sub_cursor`].
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Result<u8, ParseError> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.truncated(1))
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32, ParseError> {
        let b = self.read_bytes(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads `len` bytes as a string, one char per byte.
    pub fn read_ascii(&mut self, len: usize) -> Result<String, ParseError> {
        Ok(self.read_bytes(len)?.iter().map(|&b| b as char).collect())
    }

    /// Reads a MIDI variable-length quantity: seven bits per byte, most
    /// significant first, high bit set on every byte but the last.
    pub fn read_var_len(&mut self) -> Result<u32, ParseError> {
        let start = self.pos;
        let mut value: u32 = 0;
        loop {
            let Some(&byte) = self.data.get(self.pos) else {
                let consumed = self.pos - start;
                self.pos = start;
                return Err(self.truncated(consumed + 1));
            };
            self.pos += 1;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.read_bytes(len).map(|_| ())
    }

    /// Splits off the next `len` bytes as an independent cursor and advances
    /// past them.
    pub fn sub_cursor(&mut self, len: usize) -> Result<ByteCursor<'a>, ParseError> {
        let base = self.position();
        let data = self.read_bytes(len)?;
        Ok(ByteCursor { data, pos: 0, base })
    }

    fn truncated(&self, needed: usize) -> ParseError {
        ParseError::TruncatedStream {
            offset: self.position(),
            needed,
            available: self.remaining(),
        }
    }
}
