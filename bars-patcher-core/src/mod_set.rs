use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::{PatchError, Result};

/// A regular file in the modded stream directory. The original side is the
/// same file name under the original stream directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModEntry {
    file_name: OsString,
}

impl ModEntry {
    pub fn new(file_name: impl Into<OsString>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &OsStr {
        &self.file_name
    }

    pub fn display_name(&self) -> String {
        self.file_name.to_string_lossy().into_owned()
    }
}

/// List the regular files directly inside `dir`, in directory order.
///
/// Subdirectories and symlinks are ignored. Fails when the directory cannot
/// be read, holds more than `max_entries` files, or holds no files at all.
pub fn enumerate(dir: &Path, max_entries: usize) -> Result<Vec<ModEntry>> {
    let open_error = |source: io::Error| PatchError::ModDirOpen {
        path: dir.to_path_buf(),
        source,
    };

    let meta = fs::metadata(dir).map_err(open_error)?;
    if !meta.is_dir() {
        return Err(open_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }

    let mut entries: Vec<ModEntry> = Vec::new();
    for item in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let item = item.map_err(|e| open_error(e.into()))?;
        if !item.file_type().is_file() {
            continue;
        }

        if entries.len() >= max_entries {
            return Err(PatchError::TooManyModFiles {
                path: dir.to_path_buf(),
                limit: max_entries,
            });
        }

        entries
            .try_reserve(1)
            .map_err(|_| PatchError::OutOfMemory {
                what: "the mod stream directory listing",
            })?;
        entries.push(ModEntry::new(item.file_name()));
    }

    if entries.is_empty() {
        return Err(PatchError::EmptyModDir {
            path: dir.to_path_buf(),
        });
    }

    Ok(entries)
}
