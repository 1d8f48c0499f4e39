use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use objgraph_binary::{BinaryRecord, CommitBatch};
use objgraph_types::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::{ChannelStats, PersistenceSource, PersistenceTarget};
use crate::error::{StoreError, StoreResult};

/// Name of the segment file inside the storage directory.
pub const SEGMENT_FILE: &str = "objgraph.seg";

/// Header size: 4 bytes length + 4 bytes CRC + 1 byte flags.
const HEADER_SIZE: u64 = 9;

/// Flag bit: payload is zstd compressed.
const FLAG_ZSTD: u8 = 0b0000_0001;

/// Flush/sync strategy for commits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every commit.
    EveryCommit,
    /// Rely on OS page-cache buffering.
    #[default]
    OsDefault,
}

/// Configuration for a [`FileChannel`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileChannelConfig {
    pub sync_mode: SyncMode,
    /// zstd level for new frames, `None` to store them uncompressed.
    pub compression_level: Option<i32>,
}

/// Payload of one commit frame, bincode encoded.
#[derive(Serialize, Deserialize)]
struct CommitFrame {
    dictionary_text: String,
    /// Records in their binary form, concatenated.
    records: Vec<u8>,
}

/// Where the latest record of an object lives.
#[derive(Clone, Copy, Debug)]
struct RecordSlot {
    frame_offset: u64,
    start: usize,
    len: usize,
}

struct FileState {
    file: File,
    /// End of the last valid frame.
    offset: u64,
    index: HashMap<ObjectId, RecordSlot>,
    dictionary: String,
    commits: u64,
}

/// Append-only, crash-recoverable channel backed by one segment file.
///
/// Each commit is one frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of flags and payload (little-endian u32)]
/// [1 byte:  flags]
/// [N bytes: payload (bincode CommitFrame, optionally zstd compressed)]
/// ```
///
/// Opening replays every frame to rebuild the object id index. The first
/// frame that is torn, fails its CRC or does not decode ends the log: it and
/// everything after it are truncated, so a crash mid-commit leaves no part of
/// that commit visible.
pub struct FileChannel {
    path: PathBuf,
    state: Mutex<FileState>,
    config: FileChannelConfig,
}

impl FileChannel {
    /// Open (or create) the segment file inside `directory`.
    pub fn open(directory: &Path, config: FileChannelConfig) -> StoreResult<Self> {
        fs::create_dir_all(directory)?;
        let path = directory.join(SEGMENT_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        let mut state = FileState {
            file,
            offset: 0,
            index: HashMap::new(),
            dictionary: String::new(),
            commits: 0,
        };
        let mut reader = BufReader::new(File::open(&path)?);
        while state.offset < file_len {
            match read_frame(&mut reader, state.offset, file_len) {
                Ok((frame, frame_len)) => {
                    let frame_offset = state.offset;
                    index_frame(&mut state, frame_offset, &frame)?;
                    state.offset += frame_len;
                }
                Err(reason) => {
                    warn!(
                        offset = state.offset,
                        file_len,
                        %reason,
                        "invalid commit frame; truncating segment"
                    );
                    state.file.set_len(state.offset)?;
                    break;
                }
            }
        }
        info!(
            path = %path.display(),
            commits = state.commits,
            objects = state.index.len(),
            "segment opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(state),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// End offset of the last committed frame.
    pub fn offset(&self) -> u64 {
        self.state.lock().expect("lock poisoned").offset
    }

    pub fn stats(&self) -> ChannelStats {
        let state = self.state.lock().expect("lock poisoned");
        ChannelStats {
            commits: state.commits,
            records: state.index.len() as u64,
            record_bytes: state.index.values().map(|s| s.len as u64).sum(),
        }
    }

    fn encode(&self, frame: &CommitFrame) -> StoreResult<(u8, Vec<u8>)> {
        let payload = bincode::serialize(frame)?;
        match self.config.compression_level {
            Some(level) => Ok((FLAG_ZSTD, zstd::encode_all(payload.as_slice(), level)?)),
            None => Ok((0, payload)),
        }
    }

    /// Records of the given slots, reading each frame once.
    fn load_slots(&self, slots: Vec<RecordSlot>) -> StoreResult<Vec<BinaryRecord>> {
        let mut by_frame: BTreeMap<u64, Vec<(usize, RecordSlot)>> = BTreeMap::new();
        for (position, slot) in slots.into_iter().enumerate() {
            by_frame.entry(slot.frame_offset).or_default().push((position, slot));
        }

        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut out: Vec<Option<BinaryRecord>> = vec![None; by_frame.values().map(Vec::len).sum()];
        for (frame_offset, wanted) in by_frame {
            let (frame, _) = read_frame(&mut file, frame_offset, file_len).map_err(|reason| {
                StoreError::CorruptFrame {
                    offset: frame_offset,
                    reason,
                }
            })?;
            let records = Bytes::from(frame.records);
            for (position, slot) in wanted {
                let mut bytes = records.slice(slot.start..slot.start + slot.len);
                out[position] = Some(BinaryRecord::decode(&mut bytes)?);
            }
        }
        Ok(out.into_iter().flatten().collect())
    }
}

/// Read and verify the frame at `offset`. Returns the frame and its total
/// length, or the reason it is invalid.
fn read_frame<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    file_len: u64,
) -> Result<(CommitFrame, u64), String> {
    if offset + HEADER_SIZE > file_len {
        return Err("truncated frame header".into());
    }
    reader
        .seek(SeekFrom::Start(offset))
        .map_err(|e| e.to_string())?;
    let mut header = [0u8; HEADER_SIZE as usize];
    reader.read_exact(&mut header).map_err(|e| e.to_string())?;
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
    let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let flags = header[8];

    if length == 0 || offset + HEADER_SIZE + length > file_len {
        return Err(format!("invalid payload length {length}"));
    }
    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).map_err(|e| e.to_string())?;

    let actual_crc = frame_crc(flags, &payload);
    if actual_crc != expected_crc {
        return Err(format!(
            "CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
        ));
    }
    let payload = if flags & FLAG_ZSTD != 0 {
        zstd::decode_all(payload.as_slice()).map_err(|e| e.to_string())?
    } else {
        payload
    };
    let frame: CommitFrame = bincode::deserialize(&payload).map_err(|e| e.to_string())?;
    Ok((frame, HEADER_SIZE + length))
}

fn frame_crc(flags: u8, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[flags]);
    hasher.update(payload);
    hasher.finalize()
}

fn index_frame(state: &mut FileState, frame_offset: u64, frame: &CommitFrame) -> StoreResult<()> {
    let total = frame.records.len();
    let mut remaining = Bytes::copy_from_slice(&frame.records);
    while !remaining.is_empty() {
        let start = total - remaining.len();
        let record = BinaryRecord::decode(&mut remaining)?;
        state.index.insert(
            record.object_id,
            RecordSlot {
                frame_offset,
                start,
                len: record.encoded_len() as usize,
            },
        );
    }
    state.dictionary.push_str(&frame.dictionary_text);
    state.commits += 1;
    Ok(())
}

impl PersistenceTarget for FileChannel {
    fn write(&self, batch: &CommitBatch) -> StoreResult<()> {
        let frame = CommitFrame {
            dictionary_text: batch.dictionary_text.clone(),
            records: batch.encode_records().to_vec(),
        };
        let (flags, payload) = self.encode(&frame)?;
        let length = u32::try_from(payload.len()).map_err(|_| StoreError::FrameTooLarge {
            length: payload.len() as u64,
            limit: u32::MAX as u64,
        })?;

        let mut buf = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&frame_crc(flags, &payload).to_le_bytes());
        buf.push(flags);
        buf.extend_from_slice(&payload);

        let mut state = self.state.lock().expect("lock poisoned");
        let frame_offset = state.offset;
        if let Err(e) = append(&mut state.file, &buf, self.config.sync_mode) {
            // Drop whatever part of the frame reached the file.
            if let Err(truncate) = state.file.set_len(frame_offset) {
                warn!(offset = frame_offset, error = %truncate, "could not roll back torn frame");
            }
            return Err(e.into());
        }
        index_frame(&mut state, frame_offset, &frame)?;
        state.offset += buf.len() as u64;
        debug!(
            offset = frame_offset,
            records = batch.records.len(),
            len = buf.len(),
            compressed = flags & FLAG_ZSTD != 0,
            "commit frame appended"
        );
        Ok(())
    }
}

fn append(file: &mut File, buf: &[u8], sync_mode: SyncMode) -> io::Result<()> {
    file.write_all(buf)?;
    file.flush()?;
    if sync_mode == SyncMode::EveryCommit {
        file.sync_data()?;
    }
    Ok(())
}

impl PersistenceSource for FileChannel {
    fn read_all(&self) -> StoreResult<Vec<BinaryRecord>> {
        let slots: Vec<RecordSlot> = {
            let state = self.state.lock().expect("lock poisoned");
            let ordered: BTreeMap<&ObjectId, &RecordSlot> = state.index.iter().collect();
            ordered.into_values().copied().collect()
        };
        self.load_slots(slots)
    }

    fn read_by_object_ids(&self, object_ids: &[ObjectId]) -> StoreResult<Vec<BinaryRecord>> {
        let slots: Vec<RecordSlot> = {
            let state = self.state.lock().expect("lock poisoned");
            object_ids
                .iter()
                .filter_map(|id| state.index.get(id).copied())
                .collect()
        };
        self.load_slots(slots)
    }

    fn read_type_dictionary(&self) -> StoreResult<String> {
        Ok(self.state.lock().expect("lock poisoned").dictionary.clone())
    }

    fn highest_object_id(&self) -> StoreResult<Option<ObjectId>> {
        Ok(self
            .state
            .lock()
            .expect("lock poisoned")
            .index
            .keys()
            .filter(|id| !id.is_constant())
            .max()
            .copied())
    }
}

impl std::fmt::Debug for FileChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChannel")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_types::TypeId;

    fn record(id: u64, content: &[u8]) -> BinaryRecord {
        BinaryRecord::new(
            TypeId::from_raw(1_000_000),
            ObjectId::from_raw(id),
            Bytes::copy_from_slice(content),
        )
    }

    fn batch(ids: &[u64], dictionary: &str) -> CommitBatch {
        CommitBatch::new(
            ids.iter().map(|id| record(*id, &id.to_le_bytes())).collect(),
            dictionary.to_string(),
        )
    }

    #[test]
    fn write_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
            channel.write(&batch(&[1, 2], "types-1\n")).unwrap();
            channel.write(&batch(&[2, 3], "types-2\n")).unwrap();
        }

        let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
        let all = channel.read_all().unwrap();
        assert_eq!(
            all.iter().map(|r| r.object_id.as_u64()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(channel.read_type_dictionary().unwrap(), "types-1\ntypes-2\n");
        assert_eq!(channel.highest_object_id().unwrap(), Some(ObjectId::from_raw(3)));
        assert_eq!(channel.stats().commits, 2);
    }

    #[test]
    fn latest_record_wins_across_frames() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
        channel
            .write(&CommitBatch::new(vec![record(1, b"old")], String::new()))
            .unwrap();
        channel
            .write(&CommitBatch::new(vec![record(1, b"new")], String::new()))
            .unwrap();
        let found = channel.read_by_object_ids(&[ObjectId::from_raw(1)]).unwrap();
        assert_eq!(found, vec![record(1, b"new")]);
    }

    #[test]
    fn compressed_frames_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileChannelConfig {
            compression_level: Some(3),
            sync_mode: SyncMode::EveryCommit,
        };
        {
            let channel = FileChannel::open(dir.path(), config.clone()).unwrap();
            channel
                .write(&CommitBatch::new(vec![record(9, &[7u8; 4096])], "t\n".into()))
                .unwrap();
            assert!(channel.offset() < 4096);
        }
        // Frames are self-describing, so an uncompressed config still reads them.
        let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
        assert_eq!(channel.read_all().unwrap(), vec![record(9, &[7u8; 4096])]);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let first_end;
        {
            let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
            channel.write(&batch(&[1], "a\n")).unwrap();
            first_end = channel.offset();
            channel.write(&batch(&[2], "b\n")).unwrap();
        }
        let path = dir.path().join(SEGMENT_FILE);
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 3)
            .unwrap();

        let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
        assert_eq!(channel.offset(), first_end);
        assert_eq!(fs::metadata(&path).unwrap().len(), first_end);
        assert_eq!(channel.read_type_dictionary().unwrap(), "a\n");
        assert_eq!(channel.read_all().unwrap().len(), 1);

        // Appending after recovery continues at the truncated end.
        channel.write(&batch(&[3], "c\n")).unwrap();
        drop(channel);
        let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
        assert_eq!(channel.read_all().unwrap().len(), 2);
    }

    #[test]
    fn corrupt_frame_ends_the_log() {
        let dir = tempfile::tempdir().unwrap();
        {
            let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
            channel.write(&batch(&[1], "")).unwrap();
            channel.write(&batch(&[2], "")).unwrap();
        }
        let path = dir.path().join(SEGMENT_FILE);
        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE)).unwrap();
            let mut byte = [0u8; 1];
            file.read_exact(&mut byte).unwrap();
            byte[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE)).unwrap();
            file.write_all(&byte).unwrap();
        }

        let channel = FileChannel::open(dir.path(), FileChannelConfig::default()).unwrap();
        assert!(channel.read_all().unwrap().is_empty());
        assert_eq!(channel.offset(), 0);
    }

    #[test]
    fn empty_segment() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::open(&dir.path().join("nested"), FileChannelConfig::default()).unwrap();
        assert!(channel.read_all().unwrap().is_empty());
        assert_eq!(channel.highest_object_id().unwrap(), None);
        assert_eq!(channel.read_type_dictionary().unwrap(), "");
    }
}
