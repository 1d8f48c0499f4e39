use bytes::{Buf, Bytes};
use objgraph_types::ObjectId;

use crate::error::{BinaryError, BinaryResult};

/// Sequential reader over the content of one binary record.
#[derive(Clone, Debug)]
pub struct RecordReader {
    object_id: ObjectId,
    buf: Bytes,
}

impl RecordReader {
    pub fn new(object_id: ObjectId, content: Bytes) -> Self {
        Self {
            object_id,
            buf: content,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Fail unless every content byte has been consumed.
    pub fn finish(&self) -> BinaryResult<()> {
        if self.buf.has_remaining() {
            return Err(BinaryError::TrailingBytes {
                object_id: self.object_id,
                remaining: self.buf.remaining() as u64,
            });
        }
        Ok(())
    }

    fn need(&self, n: u64) -> BinaryResult<()> {
        let available = self.buf.remaining() as u64;
        if available < n {
            return Err(BinaryError::Truncated {
                needed: n,
                available,
            });
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> BinaryResult<bool> {
        self.need(1)?;
        Ok(self.buf.get_u8() != 0)
    }

    pub fn read_i8(&mut self) -> BinaryResult<i8> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_i16(&mut self) -> BinaryResult<i16> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_i32(&mut self) -> BinaryResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_i64(&mut self) -> BinaryResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_f32(&mut self) -> BinaryResult<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_f64(&mut self) -> BinaryResult<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    pub fn read_char(&mut self) -> BinaryResult<char> {
        let raw = self.read_u32()?;
        char::from_u32(raw).ok_or(BinaryError::InvalidChar(raw))
    }

    pub fn read_u32(&mut self) -> BinaryResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_object_id(&mut self) -> BinaryResult<ObjectId> {
        self.need(8)?;
        Ok(ObjectId::from_raw(self.buf.get_u64_le()))
    }

    /// Length-prefixed byte payload, without copying.
    fn read_prefixed(&mut self) -> BinaryResult<Bytes> {
        self.need(8)?;
        let len = self.buf.get_u64_le();
        self.need(len)?;
        Ok(self.buf.split_to(len as usize))
    }

    pub fn read_bytes(&mut self) -> BinaryResult<Vec<u8>> {
        Ok(self.read_prefixed()?.to_vec())
    }

    pub fn read_text(&mut self) -> BinaryResult<String> {
        let raw = self.read_prefixed()?;
        String::from_utf8(raw.to_vec()).map_err(|_| BinaryError::InvalidText {
            object_id: self.object_id,
        })
    }

    pub fn read_id_list(&mut self) -> BinaryResult<Vec<ObjectId>> {
        let mut raw = self.read_prefixed()?;
        if raw.len() % 8 != 0 {
            return Err(BinaryError::MalformedList {
                length: raw.len() as u64,
                element_size: 8,
            });
        }
        let mut ids = Vec::with_capacity(raw.len() / 8);
        while raw.has_remaining() {
            ids.push(ObjectId::from_raw(raw.get_u64_le()));
        }
        Ok(ids)
    }

    pub fn read_entries(&mut self) -> BinaryResult<Vec<(ObjectId, ObjectId)>> {
        let mut raw = self.read_prefixed()?;
        if raw.len() % 16 != 0 {
            return Err(BinaryError::MalformedList {
                length: raw.len() as u64,
                element_size: 16,
            });
        }
        let mut entries = Vec::with_capacity(raw.len() / 16);
        while raw.has_remaining() {
            let key = ObjectId::from_raw(raw.get_u64_le());
            let value = ObjectId::from_raw(raw.get_u64_le());
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Skip `n` fixed bytes.
    pub fn skip(&mut self, n: u64) -> BinaryResult<()> {
        self.need(n)?;
        self.buf.advance(n as usize);
        Ok(())
    }

    /// Skip one length-prefixed field.
    pub fn skip_variable(&mut self) -> BinaryResult<()> {
        self.read_prefixed().map(|_| ())
    }
}
