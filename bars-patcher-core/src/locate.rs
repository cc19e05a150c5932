use serde::Serialize;

use crate::bwav::HASH_OFFSET;

/// One occurrence of a content hash inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatchSite {
    /// Offset of the first hash byte.
    pub hash_offset: usize,
    /// Offset where the enclosing header starts, if the hash is far enough
    /// from the start of the container to have one.
    pub header_offset: Option<usize>,
    /// Whether a full header fits between `header_offset` and the end of the
    /// container.
    pub has_room: bool,
}

impl PatchSite {
    /// Header offset to write at, or `None` when this site must be skipped.
    pub fn applicable_offset(&self) -> Option<usize> {
        self.header_offset.filter(|_| self.has_room)
    }
}

/// Every offset at which `hash` occurs in `container`, overlapping matches
/// included.
pub fn find_hash<'a>(container: &'a [u8], hash: &'a [u8; 4]) -> impl Iterator<Item = usize> + 'a {
    container
        .windows(hash.len())
        .enumerate()
        .filter(move |(_, window)| *window == hash)
        .map(|(pos, _)| pos)
}

/// Scan the whole container for `hash` and classify each match by whether a
/// header of `header_len` bytes fits at it.
pub fn find_sites(container: &[u8], hash: &[u8; 4], header_len: usize) -> Vec<PatchSite> {
    find_hash(container, hash)
        .map(|hash_offset| {
            let header_offset = hash_offset.checked_sub(HASH_OFFSET);
            let has_room =
                header_offset.map_or(false, |start| container.len() - start >= header_len);
            PatchSite {
                hash_offset,
                header_offset,
                has_room,
            }
        })
        .collect()
}
