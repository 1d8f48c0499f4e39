use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use objgraph_types::{ObjectId, TypeId};

use crate::error::{BinaryError, BinaryResult};
use crate::reader::RecordReader;

/// Header size: total length, type id and object id, 8 bytes each.
pub const HEADER_LEN: u64 = 24;

/// One stored instance.
///
/// On-disk format (all little-endian):
/// ```text
/// [8 bytes: total record length, header included]
/// [8 bytes: type id]
/// [8 bytes: object id]
/// [N bytes: content (fixed-length members, then variable-length members)]
/// ```
///
/// The length prefix frames the record independently of its content, so a
/// reader can skip records whose type it does not know.
#[derive(Clone, PartialEq, Eq)]
pub struct BinaryRecord {
    pub type_id: TypeId,
    pub object_id: ObjectId,
    pub content: Bytes,
}

impl BinaryRecord {
    pub fn new(type_id: TypeId, object_id: ObjectId, content: Bytes) -> Self {
        Self {
            type_id,
            object_id,
            content,
        }
    }

    /// Encoded size, header included.
    pub fn encoded_len(&self) -> u64 {
        HEADER_LEN + self.content.len() as u64
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.reserve(self.encoded_len() as usize);
        out.put_u64_le(self.encoded_len());
        out.put_u64_le(self.type_id.as_u64());
        out.put_u64_le(self.object_id.as_u64());
        out.put_slice(&self.content);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.encode(&mut out);
        out.freeze()
    }

    /// Decode one record from the front of `buf`, advancing past it.
    pub fn decode(buf: &mut Bytes) -> BinaryResult<BinaryRecord> {
        let available = buf.remaining() as u64;
        if available < HEADER_LEN {
            return Err(BinaryError::Truncated {
                needed: HEADER_LEN,
                available,
            });
        }
        let length = (&buf[..8]).get_u64_le();
        if length < HEADER_LEN {
            return Err(BinaryError::InvalidLength {
                length,
                minimum: HEADER_LEN,
            });
        }
        if length > available {
            return Err(BinaryError::Truncated {
                needed: length,
                available,
            });
        }
        let mut record = buf.split_to(length as usize);
        record.advance(8);
        let type_id = TypeId::from_raw(record.get_u64_le());
        let object_id = ObjectId::from_raw(record.get_u64_le());
        Ok(BinaryRecord {
            type_id,
            object_id,
            content: record,
        })
    }

    /// Decode a concatenation of records.
    pub fn decode_all(mut buf: Bytes) -> BinaryResult<Vec<BinaryRecord>> {
        let mut records = Vec::new();
        while buf.has_remaining() {
            records.push(Self::decode(&mut buf)?);
        }
        Ok(records)
    }

    /// Reader over the record content.
    pub fn reader(&self) -> RecordReader {
        RecordReader::new(self.object_id, self.content.clone())
    }

    /// Content as lowercase hex, for diagnostics.
    pub fn content_hex(&self) -> String {
        hex::encode(&self.content)
    }
}

impl fmt::Debug for BinaryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryRecord")
            .field("type_id", &self.type_id)
            .field("object_id", &self.object_id)
            .field("content_len", &self.content.len())
            .finish()
    }
}
