use serde::Serialize;
use std::fmt;

/// Highest skip count that fits in a result code; larger counts clamp here.
pub const MAX_REPORTED_SKIPS: usize = 99;

/// Why a mod entry was left unpatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingOriginal,
    ModdedNotBwav,
    OriginalNotBwav,
    ChannelMismatch { original: u16, modded: u16 },
    HeaderTooLarge { header_len: usize, captured: usize },
    HashNotFound,
    NoRoom { matches: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingOriginal => f.write_str("no matching original file"),
            SkipReason::ModdedNotBwav => f.write_str("modded file is not a BWAV file"),
            SkipReason::OriginalNotBwav => f.write_str("original file is not a BWAV file"),
            SkipReason::ChannelMismatch { original, modded } => write!(
                f,
                "modded file has {modded} channels but the original has {original}"
            ),
            SkipReason::HeaderTooLarge {
                header_len,
                captured,
            } => write!(
                f,
                "patch of {header_len} bytes does not fit the {captured} bytes read"
            ),
            SkipReason::HashNotFound => f.write_str("not found in BARS file"),
            SkipReason::NoRoom { matches } => write!(
                f,
                "found {matches} time(s) but never with enough space for the header"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    Patched { sites: usize, rejected_sites: usize },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub name: String,
    /// Original content hash as decoded in the original file's byte order.
    pub hash: Option<u32>,
    pub outcome: EntryOutcome,
}

impl EntryReport {
    pub fn skipped(name: String, hash: Option<u32>, reason: SkipReason) -> Self {
        Self {
            name,
            hash,
            outcome: EntryOutcome::Skipped(reason),
        }
    }

    pub fn is_patched(&self) -> bool {
        matches!(self.outcome, EntryOutcome::Patched { .. })
    }
}

/// Per-run tally. Counts are kept in full; only [`RunReport::result_code`]
/// clamps them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub patched: usize,
    pub skipped: usize,
    pub entries: Vec<EntryReport>,
}

impl RunReport {
    pub fn push(&mut self, entry: EntryReport) {
        if entry.is_patched() {
            self.patched += 1;
        } else {
            self.skipped += 1;
        }
        self.entries.push(entry);
    }

    /// 0 when nothing was skipped, otherwise the skip count capped at 99.
    pub fn result_code(&self) -> u8 {
        self.skipped.min(MAX_REPORTED_SKIPS) as u8
    }

    pub fn summary(&self) -> String {
        format!(
            "{} track{} patched, {} track{} skipped.",
            self.patched,
            if self.patched == 1 { "" } else { "s" },
            self.skipped,
            if self.skipped == 1 { "" } else { "s" },
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
