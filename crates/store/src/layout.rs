use std::path::{Path, PathBuf};

use chunkferry_protocol::ContentHash;

/// Zero-padded index width in chunk file names; 10 digits covers all of `u32`.
const INDEX_WIDTH: usize = 10;

/// Maps content hashes to on-disk locations.
///
/// Layout under the root:
/// - `chunks_<hash>/chunk_<index>` — pending chunks, index zero-padded so
///   lexical order equals numeric order.
/// - `<hash><ext>` — the final assembled file; `<ext>` comes from the
///   client filename, so dedup is by content, never by name.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Creates a layout rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the pending chunks of one content hash.
    pub fn chunk_dir(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(format!("chunks_{hash}"))
    }

    /// Path of one stored chunk.
    pub fn chunk_path(&self, hash: &ContentHash, index: u32) -> PathBuf {
        self.chunk_dir(hash).join(chunk_file_name(index))
    }

    /// Path of the assembled final file.
    pub fn final_path(&self, hash: &ContentHash, filename: &str) -> PathBuf {
        self.root
            .join(format!("{hash}{}", file_extension(filename)))
    }
}

/// File name for a chunk index: `chunk_0000000042`.
pub fn chunk_file_name(index: u32) -> String {
    format!("chunk_{index:010}")
}

/// Parses a chunk file name back to its index.
///
/// This is the naming contract that separates chunks from noise: any
/// directory entry that does not match exactly (platform metadata files,
/// in-flight temp files, stray artifacts) is not a chunk and must be
/// ignored by listings and merges.
pub fn parse_chunk_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("chunk_")?;
    if digits.len() != INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Extension of a client filename, dot included.
///
/// `archive.tar.gz` → `.gz`, `noext` → ``, `.profile` → `.profile`.
/// Only the last path component is considered, so a hostile filename
/// cannot smuggle separators into the final path.
pub fn file_extension(filename: &str) -> &str {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    match name.rfind('.') {
        Some(pos) => &name[pos..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash() -> ContentHash {
        ContentHash::new("a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3")
            .unwrap()
    }

    #[test]
    fn chunk_file_name_is_zero_padded() {
        assert_eq!(chunk_file_name(0), "chunk_0000000000");
        assert_eq!(chunk_file_name(42), "chunk_0000000042");
        assert_eq!(chunk_file_name(u32::MAX), "chunk_4294967295");
    }

    #[test]
    fn chunk_names_sort_lexically_in_index_order() {
        let names: Vec<String> = [0, 1, 9, 10, 99, 100, 1000].iter().map(|&i| chunk_file_name(i)).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn parse_roundtrip() {
        for index in [0, 1, 7, 1234, u32::MAX] {
            assert_eq!(parse_chunk_index(&chunk_file_name(index)), Some(index));
        }
    }

    #[test]
    fn parse_rejects_noise() {
        // Platform metadata, temp files, and anything off-contract.
        assert_eq!(parse_chunk_index(".DS_Store"), None);
        assert_eq!(parse_chunk_index("Thumbs.db"), None);
        assert_eq!(parse_chunk_index(".tmp_0000000001_x"), None);
        assert_eq!(parse_chunk_index("chunk_12"), None); // not padded
        assert_eq!(parse_chunk_index("chunk_00000000ab"), None);
        assert_eq!(parse_chunk_index("chunk_"), None);
        assert_eq!(parse_chunk_index("chunk_9999999999"), None); // > u32::MAX
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(file_extension("video.mp4"), ".mp4");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension(".profile"), ".profile");
        assert_eq!(file_extension("dir/inner.txt"), ".txt");
        assert_eq!(file_extension("..\\evil/name"), "");
    }

    #[test]
    fn paths_are_rooted() {
        let layout = StorageLayout::new("/srv/depot");
        let hash = sample_hash();
        assert_eq!(
            layout.chunk_dir(&hash),
            PathBuf::from(format!("/srv/depot/chunks_{hash}"))
        );
        assert_eq!(
            layout.chunk_path(&hash, 3),
            PathBuf::from(format!("/srv/depot/chunks_{hash}/chunk_0000000003"))
        );
        assert_eq!(
            layout.final_path(&hash, "movie.mkv"),
            PathBuf::from(format!("/srv/depot/{hash}.mkv"))
        );
        assert_eq!(
            layout.final_path(&hash, "raw"),
            PathBuf::from(format!("/srv/depot/{hash}"))
        );
    }
}
