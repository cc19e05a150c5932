//! BWAV header reading and validation for one original/modded file pair.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::codec::{self, Endian};
use crate::report::SkipReason;
use crate::{Limits, PatchError, Result};

pub const BWAV_MAGIC: &str = "BWAV";

/// Fixed part of the header, before the per-channel info blocks.
pub const FIXED_HEADER_LEN: usize = 0x10;
/// Size of one channel info block.
pub const CHANNEL_INFO_LEN: usize = 0x4C;

const MAGIC_OFFSET: usize = 0x00;
const BOM_OFFSET: usize = 0x04;
/// Where the content hash sits inside the header. The same distance
/// separates a header's start from its hash inside a BARS file.
pub const HASH_OFFSET: usize = 0x08;
const CHANNEL_COUNT_OFFSET: usize = 0x0E;

/// Parsed fixed fields of a BWAV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BwavHeader {
    pub endian: Endian,
    pub channel_count: u16,
    pub content_hash: [u8; 4],
}

impl BwavHeader {
    /// Parse the fixed header fields. Returns `None` when the buffer does not
    /// start with the BWAV magic or is too short to hold the fixed header.
    pub fn parse(prefix: &[u8]) -> Option<Self> {
        if prefix.len() < FIXED_HEADER_LEN
            || codec::string(prefix, MAGIC_OFFSET, BWAV_MAGIC.len()) != BWAV_MAGIC
        {
            return None;
        }

        let endian = codec::detect_endian(prefix, BOM_OFFSET);
        let channel_count = codec::number(prefix, CHANNEL_COUNT_OFFSET, 2, endian) as u16;
        let mut content_hash = [0u8; 4];
        content_hash.copy_from_slice(codec::slice(prefix, HASH_OFFSET, 4));

        Some(Self {
            endian,
            channel_count,
            content_hash,
        })
    }

    pub fn header_len(&self) -> usize {
        header_len_for(self.channel_count)
    }

    /// Content hash as a number, for display only. Matching always uses the
    /// raw bytes.
    pub fn hash_value(&self) -> u32 {
        codec::number(&self.content_hash, 0, 4, self.endian)
    }
}

pub fn header_len_for(channel_count: u16) -> usize {
    FIXED_HEADER_LEN + CHANNEL_INFO_LEN * usize::from(channel_count)
}

/// A validated pair: the original header supplies the search key and the
/// modded bytes supply the patch.
#[derive(Debug, Clone)]
pub struct PatchSource {
    pub original: BwavHeader,
    pub modded: BwavHeader,
    modded_bytes: Vec<u8>,
}

impl PatchSource {
    pub fn content_hash(&self) -> &[u8; 4] {
        &self.original.content_hash
    }

    pub fn header_len(&self) -> usize {
        self.modded.header_len()
    }

    /// The bytes written into the container at each match.
    pub fn header_bytes(&self) -> &[u8] {
        &self.modded_bytes[..self.header_len()]
    }
}

#[derive(Debug)]
pub enum HeaderPair {
    Ready(PatchSource),
    Skip {
        reason: SkipReason,
        hash: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Original,
    Modded,
}

impl Side {
    fn open_error(self, path: PathBuf, source: io::Error) -> PatchError {
        match self {
            Side::Original => PatchError::OriginalOpen { path, source },
            Side::Modded => PatchError::ModdedOpen { path, source },
        }
    }

    fn read_error(self, path: PathBuf, source: io::Error) -> PatchError {
        match self {
            Side::Original => PatchError::OriginalRead { path, source },
            Side::Modded => PatchError::ModdedRead { path, source },
        }
    }
}

/// Read at most `window` bytes from the start of `file`.
fn read_prefix(file: File, window: usize, side: Side, path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(window)
        .map_err(|_| PatchError::OutOfMemory {
            what: "BWAV header data",
        })?;
    file.take(window as u64)
        .read_to_end(&mut buf)
        .map_err(|source| side.read_error(path.to_path_buf(), source))?;
    Ok(buf)
}

/// Open and validate the original/modded pair for `file_name`.
///
/// A missing original is a skip; every other open or read failure aborts
/// the run.
pub fn read_pair(
    original_dir: &Path,
    modded_dir: &Path,
    file_name: &OsStr,
    limits: &Limits,
) -> Result<HeaderPair> {
    let original_path = original_dir.join(file_name);
    let modded_path = modded_dir.join(file_name);

    let original_file = match File::open(&original_path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(HeaderPair::Skip {
                reason: SkipReason::MissingOriginal,
                hash: None,
            });
        }
        Err(e) => return Err(Side::Original.open_error(original_path, e)),
    };
    let modded_file =
        File::open(&modded_path).map_err(|e| Side::Modded.open_error(modded_path.clone(), e))?;

    let original_prefix = read_prefix(
        original_file,
        limits.original_window,
        Side::Original,
        &original_path,
    )?;
    let modded_prefix = read_prefix(
        modded_file,
        limits.modded_window,
        Side::Modded,
        &modded_path,
    )?;

    Ok(validate_pair(&original_prefix, modded_prefix, limits))
}

/// Validate two already-read header prefixes.
pub fn validate_pair(original_prefix: &[u8], modded_prefix: Vec<u8>, limits: &Limits) -> HeaderPair {
    let skip = |reason, hash| HeaderPair::Skip { reason, hash };

    let Some(modded) = BwavHeader::parse(&modded_prefix) else {
        return skip(SkipReason::ModdedNotBwav, None);
    };
    let Some(original) = BwavHeader::parse(original_prefix) else {
        return skip(SkipReason::OriginalNotBwav, None);
    };
    let hash = Some(original.hash_value());

    if original.channel_count != modded.channel_count {
        return skip(
            SkipReason::ChannelMismatch {
                original: original.channel_count,
                modded: modded.channel_count,
            },
            hash,
        );
    }

    let header_len = modded.header_len();
    let captured = modded_prefix.len().min(limits.modded_window);
    if header_len > captured {
        return skip(
            SkipReason::HeaderTooLarge {
                header_len,
                captured,
            },
            hash,
        );
    }

    HeaderPair::Ready(PatchSource {
        original,
        modded,
        modded_bytes: modded_prefix,
    })
}
