use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

/// Little-endian cursor over a borrowed payload.
pub struct BinaryReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            buffer: data,
            offset: 0,
        }
    }

    pub fn read_fixed_array(&mut self, length: usize) -> Result<&'a [u8], BinaryReaderError> {
        self.check_bounds(length)?;
        let slice = &self.buffer[self.offset..self.offset + length];
        self.offset += length;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, BinaryReaderError> {
        self.check_bounds(1)?;
        let value = self.buffer[self.offset];
        self.offset += 1;
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, BinaryReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BinaryReaderError::InvalidBool(other)),
        }
    }

    pub fn read_i32(&mut self) -> Result<i32, BinaryReaderError> {
        self.check_bounds(4)?;
        let mut cursor = Cursor::new(&self.buffer[self.offset..self.offset + 4]);
        let value = cursor
            .read_i32::<LittleEndian>()
            .map_err(BinaryReaderError::Io)?;
        self.offset += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64, BinaryReaderError> {
        self.check_bounds(8)?;
        let mut cursor = Cursor::new(&self.buffer[self.offset..self.offset + 8]);
        let value = cursor
            .read_u64::<LittleEndian>()
            .map_err(BinaryReaderError::Io)?;
        self.offset += 8;
        Ok(value)
    }

    pub fn read_u128(&mut self) -> Result<u128, BinaryReaderError> {
        self.check_bounds(16)?;
        let mut cursor = Cursor::new(&self.buffer[self.offset..self.offset + 16]);
        let value = cursor
            .read_u128::<LittleEndian>()
            .map_err(BinaryReaderError::Io)?;
        self.offset += 16;
        Ok(value)
    }

    pub fn read_pubkey(&mut self) -> Result<String, BinaryReaderError> {
        let bytes = self.read_fixed_array(32)?;
        Ok(bs58::encode(bytes).into_string())
    }

    pub fn skip(&mut self, length: usize) -> Result<(), BinaryReaderError> {
        self.check_bounds(length)?;
        self.offset += length;
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    fn check_bounds(&self, length: usize) -> Result<(), BinaryReaderError> {
        if self.offset + length > self.buffer.len() {
            return Err(BinaryReaderError::BufferOverflow {
                length,
                offset: self.offset,
                buffer_len: self.buffer.len(),
            });
        }
        Ok(())
    }
}

/// Reads a little-endian u64 at `offset` without a reader, as inner transfer payloads need.
pub fn read_u64_at(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[derive(Debug, Error)]
pub enum BinaryReaderError {
    #[error("buffer overflow: trying to read {length} bytes at offset {offset} from buffer of length {buffer_len}")]
    BufferOverflow {
        length: usize,
        offset: usize,
        buffer_len: usize,
    },
    #[error("invalid bool byte {0}")]
    InvalidBool(u8),
    #[error("failed to read value: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields_in_order() {
        let mut data = Vec::new();
        data.push(7u8);
        data.extend_from_slice(&(-5i32).to_le_bytes());
        data.extend_from_slice(&1_000_000u64.to_le_bytes());
        data.extend_from_slice(&(u128::MAX - 1).to_le_bytes());

        let mut reader = BinaryReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_i32().unwrap(), -5);
        assert_eq!(reader.read_u64().unwrap(), 1_000_000);
        assert_eq!(reader.read_u128().unwrap(), u128::MAX - 1);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn overflow_reports_position() {
        let data = [1u8, 2, 3];
        let mut reader = BinaryReader::new(&data);
        reader.read_u8().unwrap();
        match reader.read_u64() {
            Err(BinaryReaderError::BufferOverflow {
                length,
                offset,
                buffer_len,
            }) => {
                assert_eq!((length, offset, buffer_len), (8, 1, 3));
            }
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[test]
    fn pubkey_is_base58() {
        let data = [0u8; 32];
        let mut reader = BinaryReader::new(&data);
        assert_eq!(
            reader.read_pubkey().unwrap(),
            "11111111111111111111111111111111"
        );
    }

    #[test]
    fn read_u64_at_checks_bounds() {
        let mut data = vec![3u8];
        data.extend_from_slice(&42u64.to_le_bytes());
        assert_eq!(read_u64_at(&data, 1), Some(42));
        assert_eq!(read_u64_at(&data, 2), None);
    }
}
