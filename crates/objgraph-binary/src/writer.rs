use bytes::{BufMut, BytesMut};
use objgraph_types::{ObjectId, TypeId};

use crate::record::BinaryRecord;

/// Builds the content of one binary record.
///
/// Fixed-length fields are written in place. Variable-length fields are
/// prefixed with their byte length as a `u64`, so a reader that does not
/// understand a field can still skip it.
#[derive(Debug)]
pub struct RecordWriter {
    type_id: TypeId,
    object_id: ObjectId,
    buf: BytesMut,
}

impl RecordWriter {
    pub fn new(type_id: TypeId, object_id: ObjectId) -> Self {
        Self {
            type_id,
            object_id,
            buf: BytesMut::new(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Content bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16_le(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64_le(v);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }

    pub fn write_char(&mut self, v: char) {
        self.buf.put_u32_le(v as u32);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    /// A reference field. The null id encodes a null reference.
    pub fn write_object_id(&mut self, id: ObjectId) {
        self.buf.put_u64_le(id.as_u64());
    }

    pub fn write_text(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_u64_le(bytes.len() as u64);
        self.buf.put_slice(bytes);
    }

    /// A flat list of object ids.
    pub fn write_id_list(&mut self, ids: &[ObjectId]) {
        self.buf.put_u64_le(ids.len() as u64 * 8);
        for id in ids {
            self.buf.put_u64_le(id.as_u64());
        }
    }

    /// A flat list of key/value object id pairs.
    pub fn write_entries(&mut self, entries: &[(ObjectId, ObjectId)]) {
        self.buf.put_u64_le(entries.len() as u64 * 16);
        for (key, value) in entries {
            self.buf.put_u64_le(key.as_u64());
            self.buf.put_u64_le(value.as_u64());
        }
    }

    pub fn finish(self) -> BinaryRecord {
        BinaryRecord::new(self.type_id, self.object_id, self.buf.freeze())
    }
}
