use bytes::{Bytes, BytesMut};
use objgraph_types::ObjectId;

use crate::error::BinaryResult;
use crate::record::BinaryRecord;

/// Everything one commit writes: the records plus the text form of every
/// type definition first used by this commit.
///
/// A target must make the whole batch visible or none of it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitBatch {
    pub records: Vec<BinaryRecord>,
    /// Dictionary text of newly created type definitions. May be empty.
    pub dictionary_text: String,
}

impl CommitBatch {
    pub fn new(records: Vec<BinaryRecord>, dictionary_text: String) -> Self {
        Self {
            records,
            dictionary_text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.dictionary_text.is_empty()
    }

    /// Total encoded size of the records.
    pub fn byte_len(&self) -> u64 {
        self.records.iter().map(BinaryRecord::encoded_len).sum()
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.records.iter().map(|r| r.object_id)
    }

    /// All records concatenated in their binary form.
    pub fn encode_records(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.byte_len() as usize);
        for record in &self.records {
            record.encode(&mut out);
        }
        out.freeze()
    }

    /// Inverse of [`encode_records`](Self::encode_records).
    pub fn decode_records(bytes: Bytes, dictionary_text: String) -> BinaryResult<Self> {
        Ok(Self {
            records: BinaryRecord::decode_all(bytes)?,
            dictionary_text,
        })
    }
}
