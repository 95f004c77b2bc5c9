/// A chunk of file data ready for transfer.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based position in the original byte stream.
    pub index: u32,
    /// Raw chunk bytes.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data` (empty means no verification).
    pub checksum: String,
}

impl Chunk {
    /// Size of this chunk in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` for the single empty chunk of a zero-length file.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
