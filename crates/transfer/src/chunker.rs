use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::hasher::checksum_bytes;
use crate::types::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// One entry of a chunk partition: a contiguous byte range and its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: u32,
    pub offset: u64,
    pub len: u64,
}

impl ChunkSpan {
    /// End offset (exclusive).
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Partitions a file of `file_size` bytes into spans of `chunk_size`.
///
/// Pure function of its inputs: the same `(file_size, chunk_size)` always
/// yields the same partition, so indices are reproducible across retries.
/// `span[i] = [i*C, min((i+1)*C, S))`; all spans but the last have length
/// `C`. A zero-length file yields exactly one empty span — an empty upload
/// still has an identity and a final file.
///
/// `chunk_size = 0` falls back to [`DEFAULT_CHUNK_SIZE`].
pub fn split(file_size: u64, chunk_size: u64) -> Vec<ChunkSpan> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    if file_size == 0 {
        return vec![ChunkSpan {
            index: 0,
            offset: 0,
            len: 0,
        }];
    }

    let count = file_size.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let offset = i * chunk_size;
            ChunkSpan {
                index: i as u32,
                offset,
                len: (file_size - offset).min(chunk_size),
            }
        })
        .collect()
}

/// Reads a file chunk by chunk with automatic SHA-256 checksums.
///
/// Chunks are addressed by index so a resuming client can fetch exactly the
/// spans the depot reported missing, in any order.
pub struct ChunkReader {
    file: File,
    spans: Vec<ChunkSpan>,
    next: usize,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(path: &Path, chunk_size: u64) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            spans: split(file_size, chunk_size),
            next: 0,
            file_size,
        })
    }

    /// Reads the chunk at `index`, regardless of sequential position.
    pub fn chunk_at(&mut self, index: u32) -> Result<Chunk, TransferError> {
        let span = *self
            .spans
            .get(index as usize)
            .ok_or(TransferError::IndexOutOfRange(index))?;
        self.read_span(span)
    }

    /// Reads the next chunk in index order. Returns `None` past the end.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.next >= self.spans.len() {
            return Ok(None);
        }
        let span = self.spans[self.next];
        self.next += 1;
        self.read_span(span).map(Some)
    }

    fn read_span(&mut self, span: ChunkSpan) -> Result<Chunk, TransferError> {
        self.file.seek(SeekFrom::Start(span.offset))?;
        let mut data = vec![0u8; span.len as usize];
        self.file.read_exact(&mut data)?;
        let checksum = checksum_bytes(&data);
        Ok(Chunk {
            index: span.index,
            data,
            checksum,
        })
    }

    /// The partition this reader follows.
    pub fn spans(&self) -> &[ChunkSpan] {
        &self.spans
    }

    /// Number of chunks in the partition.
    pub fn chunk_count(&self) -> u32 {
        self.spans.len() as u32
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn split_exact_multiple() {
        let spans = split(8, 4);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], ChunkSpan { index: 0, offset: 0, len: 4 });
        assert_eq!(spans[1], ChunkSpan { index: 1, offset: 4, len: 4 });
    }

    #[test]
    fn split_with_remainder() {
        let spans = split(10, 4);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2], ChunkSpan { index: 2, offset: 8, len: 2 });
    }

    #[test]
    fn split_single_short_chunk() {
        let spans = split(3, 4);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].len, 3);
    }

    #[test]
    fn split_empty_file_yields_one_empty_span() {
        let spans = split(0, 4);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0], ChunkSpan { index: 0, offset: 0, len: 0 });
    }

    #[test]
    fn split_zero_chunk_size_uses_default() {
        let spans = split(10, 0);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].len, 10);
    }

    #[test]
    fn split_covers_range_without_gaps_or_overlap() {
        for (size, chunk) in [(1u64, 1u64), (7, 3), (100, 7), (4096, 512), (4097, 512)] {
            let spans = split(size, chunk);
            assert_eq!(spans.len() as u64, size.div_ceil(chunk));
            let mut cursor = 0;
            for (i, span) in spans.iter().enumerate() {
                assert_eq!(span.index as usize, i);
                assert_eq!(span.offset, cursor, "gap or overlap at index {i}");
                cursor = span.end();
            }
            assert_eq!(cursor, size, "spans must cover exactly [0, size)");
        }
    }

    #[test]
    fn reader_reads_all_chunks_in_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.chunk_count(), 3);

        let c0 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c0.index, 0);
        assert_eq!(&c0.data, b"AABB");
        assert!(!c0.checksum.is_empty());

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(&c1.data, b"CCDD");

        let c2 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c2.index, 2);
        assert_eq!(&c2.data, b"EE");

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn reader_random_access() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        let c2 = reader.chunk_at(2).unwrap();
        assert_eq!(&c2.data, b"89");
        let c0 = reader.chunk_at(0).unwrap();
        assert_eq!(&c0.data, b"0123");
    }

    #[test]
    fn reader_rejects_out_of_range_index() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        let result = reader.chunk_at(5);
        assert!(matches!(result, Err(TransferError::IndexOutOfRange(5))));
    }

    #[test]
    fn reader_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.chunk_count(), 1);
        let c = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c.index, 0);
        assert!(c.is_empty());
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn reader_checksum_matches_data() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"payload");

        let mut reader = ChunkReader::new(&path, 1024).unwrap();
        let c = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c.checksum, checksum_bytes(b"payload"));
    }
}
