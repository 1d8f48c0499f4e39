//! Binary record framing for objgraph.
//!
//! Every stored instance becomes one [`BinaryRecord`]:
//!
//! ```text
//! [total length u64][type id u64][object id u64][fixed-length fields...][variable-length fields...]
//! ```
//!
//! References are 8-byte object ids with 0 meaning null. Variable-length
//! fields carry a `u64` byte-length prefix. Collections are flat id lists
//! (sequences) or flat key/value id pairs (associative types), never a
//! hash-table layout.

pub mod batch;
pub mod error;
pub mod reader;
pub mod record;
pub mod writer;

pub use batch::CommitBatch;
pub use error::{BinaryError, BinaryResult};
pub use reader::RecordReader;
pub use record::{BinaryRecord, HEADER_LEN};
pub use writer::RecordWriter;
