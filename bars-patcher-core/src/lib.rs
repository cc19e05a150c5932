use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

pub mod apply;
pub mod bwav;
pub mod codec;
pub mod locate;
pub mod mod_set;
pub mod profile;
pub mod report;
pub mod resolve;

use bwav::HeaderPair;
use mod_set::ModEntry;
use report::{EntryOutcome, EntryReport, RunReport, SkipReason};

pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// BARS files at or above this size are refused.
pub const MAX_CONTAINER_SIZE: u64 = 64_000_000;
/// Most regular files accepted from the modded stream directory.
pub const MAX_MOD_ENTRIES: usize = 8190;
/// Longest accepted stream directory path, in bytes.
pub const MAX_DIR_PATH_LEN: usize = 16083;
/// Bytes read from the start of each original BWAV.
pub const ORIGINAL_WINDOW: usize = 0x100;
/// Bytes read from the start of each modded BWAV. Bounds the largest
/// header that can be patched in.
pub const MODDED_WINDOW: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_container_size: u64,
    pub max_mod_entries: usize,
    pub max_dir_path_len: usize,
    pub original_window: usize,
    pub modded_window: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_container_size: MAX_CONTAINER_SIZE,
            max_mod_entries: MAX_MOD_ENTRIES,
            max_dir_path_len: MAX_DIR_PATH_LEN,
            original_window: ORIGINAL_WINDOW,
            modded_window: MODDED_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSettings {
    pub verbose: bool,
    /// Directory with the original, unmodified BWAV files.
    pub original_dir: PathBuf,
    /// Directory with the modded BWAV files. Every regular file here is
    /// patched in.
    pub modded_dir: PathBuf,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub limits: Limits,
}

/// Run-level failures. Each maps to a fixed result code via [`PatchError::code`].
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("could not allocate memory for {what}")]
    OutOfMemory { what: &'static str },

    #[error("directory path is too long ({len} bytes, limit {limit}): {}", .path.display())]
    PathTooLong {
        path: PathBuf,
        len: usize,
        limit: usize,
    },

    #[error("all {skipped} track(s) were skipped, BARS file was not patched")]
    AllSkipped { skipped: usize },

    #[error("{}: more than {limit} files in the mod stream directory", .path.display())]
    TooManyModFiles { path: PathBuf, limit: usize },

    #[error("{}: the mod directory has no files", .path.display())]
    EmptyModDir { path: PathBuf },

    #[error("{}: {source}", .path.display())]
    ModDirOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    ModdedRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    OriginalRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    ModdedOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    OriginalOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    OutputOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "BARS input files of {limit} bytes or more are not supported, the input file is {size} bytes"
    )]
    InputTooLarge { size: u64, limit: u64 },

    #[error("{}: {source}", .path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    InputOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    pub fn code(&self) -> u8 {
        match self {
            PatchError::OutOfMemory { .. } => 100,
            PatchError::PathTooLong { .. } => 101,
            PatchError::AllSkipped { .. } => 200,
            PatchError::TooManyModFiles { .. } => 227,
            PatchError::EmptyModDir { .. } => 228,
            PatchError::ModDirOpen { .. } => 229,
            PatchError::ModdedRead { .. } => 236,
            PatchError::OriginalRead { .. } => 237,
            PatchError::ModdedOpen { .. } => 238,
            PatchError::OriginalOpen { .. } => 239,
            PatchError::OutputWrite { .. } => 248,
            PatchError::OutputOpen { .. } => 249,
            PatchError::InputTooLarge { .. } => 253,
            PatchError::InputRead { .. } => 254,
            PatchError::InputOpen { .. } => 255,
        }
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;

/// Fixed description for a result code from [`run_code`].
pub fn error_string(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1..=99 => "Some files were skipped",
        100 => "Memory allocation error",
        101 => "Directory path too long",
        200 => "All tracks were skipped; BARS file was not patched",
        227 => "The modded BWAV directory has too many files",
        228 => "The modded BWAV directory has no files",
        229 => "Could not open modded BWAV directory",
        236 => "Could not read modded BWAV files",
        237 => "Could not read original BWAV files",
        238 => "Could not open modded BWAV files",
        239 => "Could not open original BWAV files",
        248 => "Could not save output BARS file",
        249 => "Could not open output BARS file for writing",
        253 => "Input BARS file is too big",
        254 => "Could not read input BARS file",
        255 => "Could not open input BARS file",
        _ => "Unknown error",
    }
}

fn check_dir_path(path: &Path, limits: &Limits) -> Result<()> {
    let len = path.as_os_str().len();
    if len > limits.max_dir_path_len {
        return Err(PatchError::PathTooLong {
            path: path.to_path_buf(),
            len,
            limit: limits.max_dir_path_len,
        });
    }
    Ok(())
}

/// Make sure the output can be opened for writing before doing any real
/// work. A file created by the probe is removed again.
fn probe_output(path: &Path) -> Result<()> {
    let existed = path.exists();
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| PatchError::OutputOpen {
            path: path.to_path_buf(),
            source,
        })?;

    if !existed {
        if let Err(e) = fs::remove_file(path) {
            warn!("could not remove probe file {}: {}", path.display(), e);
        }
    }
    Ok(())
}

fn load_container(path: &Path, limits: &Limits) -> Result<Vec<u8>> {
    let read_error = |source| PatchError::InputRead {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(|source| PatchError::InputOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let size = file.metadata().map_err(read_error)?.len();

    if size >= limits.max_container_size {
        return Err(PatchError::InputTooLarge {
            size,
            limit: limits.max_container_size,
        });
    }
    let len = usize::try_from(size).map_err(|_| PatchError::InputTooLarge {
        size,
        limit: limits.max_container_size,
    })?;

    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| PatchError::OutOfMemory { what: "BARS data" })?;
    (&mut file)
        .take(size)
        .read_to_end(&mut data)
        .map_err(read_error)?;
    Ok(data)
}

fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|source| PatchError::OutputOpen {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(data)
        .and_then(|_| file.flush())
        .map_err(|source| PatchError::OutputWrite {
            path: path.to_path_buf(),
            source,
        })
}

/// Read, locate and apply one mod entry against the container.
fn patch_entry(
    container: &mut [u8],
    entry: &ModEntry,
    settings: &PatchSettings,
) -> Result<EntryReport> {
    let name = entry.display_name();

    let source = match bwav::read_pair(
        &settings.original_dir,
        &settings.modded_dir,
        entry.file_name(),
        &settings.limits,
    )? {
        HeaderPair::Ready(source) => source,
        HeaderPair::Skip { reason, hash } => {
            warn!("{}: {}, skipping", name, reason);
            return Ok(EntryReport::skipped(name, hash, reason));
        }
    };

    let hash = source.original.hash_value();
    if settings.verbose {
        info!("{}: original file hash: 0x{:08X}", name, hash);
    }

    let sites = locate::find_sites(container, source.content_hash(), source.header_len());
    for site in &sites {
        if settings.verbose {
            match site.header_offset {
                Some(offset) => info!("{}: found at 0x{:08X} in BARS", name, offset),
                None => info!(
                    "{}: found hash at 0x{:08X} in BARS, before any header could start",
                    name, site.hash_offset
                ),
            }
        }
        if !site.has_room {
            warn!(
                "{}: not enough space for header at hash offset 0x{:08X}, is the BARS file valid?",
                name, site.hash_offset
            );
        }
    }

    let written = apply::apply_sites(container, source.header_bytes(), &sites);
    let rejected = sites.len() - written;

    if written == 0 {
        let reason = if sites.is_empty() {
            SkipReason::HashNotFound
        } else {
            SkipReason::NoRoom {
                matches: sites.len(),
            }
        };
        warn!("{}: {}, skipped", name, reason);
        return Ok(EntryReport::skipped(name, Some(hash), reason));
    }

    if settings.verbose {
        info!("{}: wrote {} patch(es)", name, written);
    }
    Ok(EntryReport {
        name,
        hash: Some(hash),
        outcome: EntryOutcome::Patched {
            sites: written,
            rejected_sites: rejected,
        },
    })
}

/// Patch every modded BWAV header into the input BARS file and write the
/// result to the output path.
///
/// Nothing is written unless at least one entry was patched. The returned
/// report carries full counts; see [`RunReport::result_code`] for the
/// clamped code.
pub fn run(settings: &PatchSettings) -> Result<RunReport> {
    let limits = &settings.limits;

    check_dir_path(&settings.original_dir, limits)?;
    check_dir_path(&settings.modded_dir, limits)?;
    probe_output(&settings.output_path)?;

    let mut container = load_container(&settings.input_path, limits)?;
    let original_len = container.len();

    let entries = mod_set::enumerate(&settings.modded_dir, limits.max_mod_entries)?;
    info!(
        "patching {} with {} modded file(s)",
        settings.input_path.display(),
        entries.len()
    );

    let mut report = RunReport::default();
    for entry in &entries {
        report.push(patch_entry(&mut container, entry, settings)?);
    }
    debug_assert_eq!(container.len(), original_len);

    if report.patched == 0 {
        return Err(PatchError::AllSkipped {
            skipped: report.skipped,
        });
    }

    write_output(&settings.output_path, &container)?;
    info!("{}", report.summary());

    Ok(report)
}

/// Collapse the outcome of [`run`] to a single result code: 0 on success,
/// 1 to 99 for the number of skipped files, 100 and up for errors. Errors
/// are logged here.
pub fn result_code(result: &Result<RunReport>) -> u8 {
    match result {
        Ok(report) => report.result_code(),
        Err(err) => {
            error!("{}", err);
            err.code()
        }
    }
}

/// [`run`] for callers that only need the result code.
pub fn run_code(settings: &PatchSettings) -> u8 {
    result_code(&run(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bwav::tests::bwav;
    use crate::codec::Endian;
    use tempfile::TempDir;

    const HASH: [u8; 4] = [0x01, 0x02, 0x03, 0x04];

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir(dir.path().join("og")).unwrap();
            fs::create_dir(dir.path().join("mod")).unwrap();
            Self { dir }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn pair(&self, name: &str, original: &[u8], modded: &[u8]) {
            fs::write(self.path("og").join(name), original).unwrap();
            fs::write(self.path("mod").join(name), modded).unwrap();
        }

        fn bars(&self, data: &[u8]) {
            fs::write(self.path("in.bars"), data).unwrap();
        }

        fn settings(&self) -> PatchSettings {
            PatchSettings {
                verbose: true,
                original_dir: self.path("og"),
                modded_dir: self.path("mod"),
                input_path: self.path("in.bars"),
                output_path: self.path("out.bars"),
                limits: Limits::default(),
            }
        }

        fn output(&self) -> Vec<u8> {
            fs::read(self.path("out.bars")).unwrap()
        }
    }

    fn container_with_hash_at(len: usize, hash_offsets: &[usize], hash: [u8; 4]) -> Vec<u8> {
        let mut data: Vec<u8> = (0..len).map(|i| (i % 251) as u8 | 0x80).collect();
        for &at in hash_offsets {
            data[at..at + 4].copy_from_slice(&hash);
        }
        data
    }

    #[test]
    fn patches_single_mono_header() {
        let fx = Fixture::new();
        let input = container_with_hash_at(300, &[8], HASH);
        fx.bars(&input);
        let modded = bwav(Endian::Little, 1, [9, 9, 9, 9], 0x11);
        fx.pair("clip.bwav", &bwav(Endian::Little, 1, HASH, 0), &modded);

        let report = run(&fx.settings()).unwrap();
        assert_eq!(report.patched, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.result_code(), 0);

        let out = fx.output();
        assert_eq!(out.len(), input.len());
        assert_eq!(&out[..92], &modded[..92]);
        assert_eq!(&out[92..], &input[92..]);
    }

    #[test]
    fn patches_every_occurrence() {
        let fx = Fixture::new();
        let input = container_with_hash_at(1000, &[108, 508, 808], HASH);
        fx.bars(&input);
        let modded = bwav(Endian::Big, 1, [0, 0, 0, 0], 0x22);
        fx.pair("clip.bwav", &bwav(Endian::Big, 1, HASH, 0), &modded);

        let report = run(&fx.settings()).unwrap();
        assert_eq!(
            report.entries[0].outcome,
            EntryOutcome::Patched {
                sites: 3,
                rejected_sites: 0
            }
        );
        let out = fx.output();
        for start in [100, 500, 800] {
            assert_eq!(&out[start..start + 92], &modded[..92]);
        }
    }

    #[test]
    fn identical_modded_file_reproduces_input() {
        let fx = Fixture::new();
        let original = bwav(Endian::Little, 2, HASH, 0x5A);
        let mut input = vec![0xC3u8; 64];
        input.extend_from_slice(&original);
        input.extend_from_slice(&[0xC3u8; 64]);
        fx.bars(&input);
        fx.pair("clip.bwav", &original, &original);

        run(&fx.settings()).unwrap();
        assert_eq!(fx.output(), input);
    }

    #[test]
    fn skips_are_counted_and_run_still_succeeds() {
        let fx = Fixture::new();
        fx.bars(&container_with_hash_at(300, &[8], HASH));
        fx.pair(
            "good.bwav",
            &bwav(Endian::Little, 1, HASH, 0),
            &bwav(Endian::Little, 1, HASH, 0x33),
        );
        fx.pair(
            "stereo.bwav",
            &bwav(Endian::Little, 1, HASH, 0),
            &bwav(Endian::Little, 2, HASH, 0x33),
        );
        fs::write(fx.path("mod").join("orphan.bwav"), b"BWAV").unwrap();

        let report = run(&fx.settings()).unwrap();
        assert_eq!(report.patched, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.result_code(), 2);
        assert_eq!(run_code(&fx.settings()), 2);
        assert_eq!(fx.output().len(), 300);
    }

    #[test]
    fn all_skipped_is_fatal_and_writes_nothing() {
        let fx = Fixture::new();
        fx.bars(&container_with_hash_at(300, &[8], HASH));
        fx.pair(
            "missing.bwav",
            &bwav(Endian::Little, 1, [7, 7, 7, 7], 0),
            &bwav(Endian::Little, 1, [7, 7, 7, 7], 0x33),
        );
        fx.pair(
            "mismatch.bwav",
            &bwav(Endian::Little, 1, HASH, 0),
            &bwav(Endian::Little, 2, HASH, 0),
        );

        let err = run(&fx.settings()).unwrap_err();
        assert!(matches!(err, PatchError::AllSkipped { skipped: 2 }));
        assert_eq!(err.code(), 200);
        assert!(!fx.path("out.bars").exists());
    }

    #[test]
    fn hash_without_room_is_a_skip() {
        let fx = Fixture::new();
        let input = container_with_hash_at(100, &[50], HASH);
        fx.bars(&input);
        fx.pair(
            "clip.bwav",
            &bwav(Endian::Little, 1, HASH, 0),
            &bwav(Endian::Little, 1, HASH, 0x44),
        );

        let err = run(&fx.settings()).unwrap_err();
        assert_eq!(err.code(), 200);
    }

    #[test]
    fn existing_output_is_overwritten() {
        let fx = Fixture::new();
        fx.bars(&container_with_hash_at(200, &[8], HASH));
        fx.pair(
            "clip.bwav",
            &bwav(Endian::Little, 1, HASH, 0),
            &bwav(Endian::Little, 1, HASH, 0x55),
        );
        fs::write(fx.path("out.bars"), vec![0u8; 5000]).unwrap();

        run(&fx.settings()).unwrap();
        assert_eq!(fx.output().len(), 200);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let fx = Fixture::new();
        fx.bars(&[0u8; 64]);
        let mut settings = fx.settings();
        settings.limits.max_container_size = 64;

        let err = run(&settings).unwrap_err();
        assert!(matches!(err, PatchError::InputTooLarge { size: 64, limit: 64 }));
        assert_eq!(err.code(), 253);
    }

    #[test]
    fn missing_input_cannot_be_opened() {
        let fx = Fixture::new();
        assert_eq!(run_code(&fx.settings()), 255);
        assert!(!fx.path("out.bars").exists());
    }

    #[test]
    fn unwritable_output_fails_fast() {
        let fx = Fixture::new();
        let mut settings = fx.settings();
        settings.output_path = fx.path("no/such/dir/out.bars");
        assert_eq!(run_code(&settings), 249);
    }

    #[test]
    fn mod_directory_with_only_subdirectories() {
        let fx = Fixture::new();
        fx.bars(&container_with_hash_at(200, &[8], HASH));
        fs::create_dir(fx.path("mod").join("sub")).unwrap();
        assert_eq!(run_code(&fx.settings()), 228);
    }

    #[test]
    fn long_directory_path_is_rejected() {
        let fx = Fixture::new();
        let mut settings = fx.settings();
        settings.limits.max_dir_path_len = 4;
        assert_eq!(run_code(&settings), 101);
    }

    #[test]
    fn unreadable_original_aborts_the_run() {
        let fx = Fixture::new();
        fx.bars(&container_with_hash_at(200, &[8], HASH));
        fs::create_dir(fx.path("og").join("clip.bwav")).unwrap();
        fs::write(
            fx.path("mod").join("clip.bwav"),
            bwav(Endian::Little, 1, HASH, 0x11),
        )
        .unwrap();

        assert_eq!(run_code(&fx.settings()), 237);
        assert!(!fx.path("out.bars").exists());
    }

    #[test]
    fn unreadable_modded_file_is_fatal() {
        let fx = Fixture::new();
        fs::write(
            fx.path("og").join("clip.bwav"),
            bwav(Endian::Little, 1, HASH, 0),
        )
        .unwrap();
        fs::create_dir(fx.path("mod").join("clip.bwav")).unwrap();

        let err = bwav::read_pair(
            &fx.path("og"),
            &fx.path("mod"),
            "clip.bwav".as_ref(),
            &Limits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::ModdedRead { .. }));
        assert_eq!(err.code(), 236);
    }

    #[test]
    fn missing_modded_file_is_fatal() {
        let fx = Fixture::new();
        fs::write(
            fx.path("og").join("clip.bwav"),
            bwav(Endian::Little, 1, HASH, 0),
        )
        .unwrap();

        let err = bwav::read_pair(
            &fx.path("og"),
            &fx.path("mod"),
            "clip.bwav".as_ref(),
            &Limits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::ModdedOpen { .. }));
        assert_eq!(err.code(), 238);
    }

    #[test]
    fn original_dir_that_is_a_file_aborts_the_run() {
        let fx = Fixture::new();
        fx.bars(&container_with_hash_at(200, &[8], HASH));
        fs::write(fx.path("og.file"), b"not a directory").unwrap();
        fs::write(
            fx.path("mod").join("clip.bwav"),
            bwav(Endian::Little, 1, HASH, 0x11),
        )
        .unwrap();
        let mut settings = fx.settings();
        settings.original_dir = fx.path("og.file");

        assert_eq!(run_code(&settings), 239);
        assert!(!fx.path("out.bars").exists());
    }

    #[test]
    fn too_many_mod_files_aborts_the_run() {
        let fx = Fixture::new();
        fx.bars(&container_with_hash_at(200, &[8], HASH));
        let original = bwav(Endian::Little, 1, HASH, 0);
        fx.pair("a.bwav", &original, &original);
        fx.pair("b.bwav", &original, &original);
        let mut settings = fx.settings();
        settings.limits.max_mod_entries = 1;

        assert_eq!(run_code(&settings), 227);
        assert!(!fx.path("out.bars").exists());
    }

    #[test]
    fn container_is_read_up_to_the_checked_size() {
        let fx = Fixture::new();
        let input = container_with_hash_at(63, &[8], HASH);
        fx.bars(&input);
        let limits = Limits {
            max_container_size: 64,
            ..Limits::default()
        };

        let data = load_container(&fx.path("in.bars"), &limits).unwrap();
        assert_eq!(data, input);
    }

    #[test]
    fn result_code_maps_both_outcomes() {
        let mut report = RunReport::default();
        report.push(EntryReport::skipped(
            "a".into(),
            None,
            SkipReason::HashNotFound,
        ));
        assert_eq!(result_code(&Ok(report)), 1);
        assert_eq!(
            result_code(&Err(PatchError::AllSkipped { skipped: 3 })),
            200
        );
    }

    #[test]
    fn error_strings_cover_code_space() {
        assert_eq!(error_string(0), "Success");
        assert_eq!(error_string(42), "Some files were skipped");
        assert_eq!(error_string(99), "Some files were skipped");
        assert_eq!(error_string(150), "Unknown error");
        for code in [100, 101, 200, 227, 228, 229, 236, 237, 238, 239, 248, 249, 253, 254, 255] {
            assert_ne!(error_string(code), "Unknown error", "code {code}");
        }
    }
}
