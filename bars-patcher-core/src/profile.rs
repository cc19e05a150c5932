//! Per-game path profiles stored in a small line-oriented text file.
//!
//! ```text
//! # comment
//! [acnh]
//! name = Animal Crossing: New Horizons
//! bars = /path/to/Bgm_Base.bars
//! stream_dir = /path/to/Stream
//! mod_stream_dir = /path/to/mods/Stream
//! output = /path/to/out/Bgm_Base.bars
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::resolve::resolve_wildcard;
use crate::{Limits, PatchSettings};

/// Upper bound on profiles in one store.
pub const MAX_PROFILES: usize = 128;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: expected `[id]` or `key = value`, got '{text}'")]
    Malformed { line: usize, text: String },

    #[error("line {line}: '{key}' appears before any `[id]` section")]
    OutsideSection { line: usize, key: String },

    #[error("line {line}: invalid game id '{id}' (use only a-z and 0-9)")]
    InvalidId { line: usize, id: String },

    #[error("line {line}: duplicate game id '{id}'")]
    DuplicateId { line: usize, id: String },

    #[error("line {line}: unknown key '{key}'")]
    UnknownKey { line: usize, key: String },

    #[error("line {line}: '{key}' is set twice in the same game")]
    DuplicateKey { line: usize, key: String },

    #[error("game '{id}' has an invalid '{key}' value (no line breaks or surrounding spaces)")]
    InvalidValue { id: String, key: &'static str },

    #[error("game '{id}' is missing '{key}'")]
    MissingField { id: String, key: &'static str },

    #[error("too many games in config (limit {limit})")]
    TooMany { limit: usize },

    #[error("no game with id '{0}' in config")]
    UnknownGame(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProfile {
    pub id: String,
    pub name: String,
    pub bars_path: String,
    pub stream_dir: String,
    pub mod_stream_dir: String,
    pub output_bars_path: String,
}

impl GameProfile {
    fn fields(&self) -> [(&'static str, &str); 5] {
        [
            ("name", self.name.as_str()),
            ("bars", self.bars_path.as_str()),
            ("stream_dir", self.stream_dir.as_str()),
            ("mod_stream_dir", self.mod_stream_dir.as_str()),
            ("output", self.output_bars_path.as_str()),
        ]
    }

    /// Build run settings from this profile, expanding one `*` wildcard in
    /// each path.
    pub fn to_settings(&self, verbose: bool) -> PatchSettings {
        PatchSettings {
            verbose,
            original_dir: resolve_wildcard(&self.stream_dir),
            modded_dir: resolve_wildcard(&self.mod_stream_dir),
            input_path: resolve_wildcard(&self.bars_path),
            output_path: resolve_wildcard(&self.output_bars_path),
            limits: Limits::default(),
        }
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

#[derive(Default)]
struct PartialProfile {
    id: String,
    name: Option<String>,
    bars_path: Option<String>,
    stream_dir: Option<String>,
    mod_stream_dir: Option<String>,
    output_bars_path: Option<String>,
}

impl PartialProfile {
    fn finish(self) -> Result<GameProfile, ProfileError> {
        let id = self.id;
        let need = |value: Option<String>, key: &'static str| {
            value.ok_or_else(|| ProfileError::MissingField { id: id.clone(), key })
        };
        Ok(GameProfile {
            name: need(self.name, "name")?,
            bars_path: need(self.bars_path, "bars")?,
            stream_dir: need(self.stream_dir, "stream_dir")?,
            mod_stream_dir: need(self.mod_stream_dir, "mod_stream_dir")?,
            output_bars_path: need(self.output_bars_path, "output")?,
            id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStore {
    profiles: Vec<GameProfile>,
}

impl ProfileStore {
    /// The built-in profiles, used when no config file exists yet.
    pub fn defaults() -> Self {
        Self {
            profiles: vec![GameProfile {
                id: "acnh".to_string(),
                name: "Animal Crossing: New Horizons".to_string(),
                bars_path: "/switch/nxdumptool/RomFS/Animal Crossing_ New Horizons*/Sound/Resource/Bgm_Base.bars".to_string(),
                stream_dir: "/switch/nxdumptool/RomFS/Animal Crossing_ New Horizons*/Sound/Resource/Stream/".to_string(),
                mod_stream_dir: "/atmosphere/contents/01006F8002326000/romfs/Sound/Resource/Stream/".to_string(),
                output_bars_path: "/atmosphere/contents/01006F8002326000/romfs/Sound/Resource/Bgm_Base.bars".to_string(),
            }],
        }
    }

    pub fn profiles(&self) -> &[GameProfile] {
        &self.profiles
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<&GameProfile, ProfileError> {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ProfileError::UnknownGame(id.to_string()))
    }

    pub fn parse(src: &str) -> Result<Self, ProfileError> {
        let mut profiles: Vec<GameProfile> = Vec::new();
        let mut current: Option<PartialProfile> = None;

        for (idx, raw_line) in src.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(id) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let id = id.trim();
                if !is_valid_id(id) {
                    return Err(ProfileError::InvalidId {
                        line: line_no,
                        id: id.to_string(),
                    });
                }
                if profiles.iter().any(|p| p.id == id)
                    || current.as_ref().map_or(false, |c| c.id == id)
                {
                    return Err(ProfileError::DuplicateId {
                        line: line_no,
                        id: id.to_string(),
                    });
                }
                if let Some(done) = current.take() {
                    profiles.push(done.finish()?);
                }
                if profiles.len() >= MAX_PROFILES {
                    return Err(ProfileError::TooMany {
                        limit: MAX_PROFILES,
                    });
                }
                current = Some(PartialProfile {
                    id: id.to_string(),
                    ..PartialProfile::default()
                });
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ProfileError::Malformed {
                    line: line_no,
                    text: line.to_string(),
                });
            };
            let key = key.trim();
            let value = value.trim().to_string();

            let Some(entry) = current.as_mut() else {
                return Err(ProfileError::OutsideSection {
                    line: line_no,
                    key: key.to_string(),
                });
            };

            let slot = match key {
                "name" => &mut entry.name,
                "bars" => &mut entry.bars_path,
                "stream_dir" => &mut entry.stream_dir,
                "mod_stream_dir" => &mut entry.mod_stream_dir,
                "output" => &mut entry.output_bars_path,
                other => {
                    return Err(ProfileError::UnknownKey {
                        line: line_no,
                        key: other.to_string(),
                    })
                }
            };
            if slot.is_some() {
                return Err(ProfileError::DuplicateKey {
                    line: line_no,
                    key: key.to_string(),
                });
            }
            *slot = Some(value);
        }

        if let Some(done) = current.take() {
            profiles.push(done.finish()?);
        }

        Ok(Self { profiles })
    }

    /// Check that [`ProfileStore::render`] output parses back to this store.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.profiles.len() > MAX_PROFILES {
            return Err(ProfileError::TooMany {
                limit: MAX_PROFILES,
            });
        }
        for (idx, p) in self.profiles.iter().enumerate() {
            if !is_valid_id(&p.id) || self.profiles[..idx].iter().any(|q| q.id == p.id) {
                return Err(ProfileError::InvalidValue {
                    id: p.id.clone(),
                    key: "id",
                });
            }
            for (key, value) in p.fields() {
                if value.contains(['\n', '\r']) || value.trim() != value {
                    return Err(ProfileError::InvalidValue {
                        id: p.id.clone(),
                        key,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = String::from("# Automatic BARS patcher game configuration\n");
        out.push_str("# One `*` at the end of a directory name is resolved to the first match.\n");
        for p in &self.profiles {
            out.push('\n');
            out.push_str(&format!("[{}]\n", p.id));
            for (key, value) in p.fields() {
                out.push_str(&format!("{key} = {value}\n"));
            }
        }
        out
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let src = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&src)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        self.validate()?;
        let io_err = |source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.render()).map_err(io_err)
    }

    /// Load `path`, writing the built-in defaults there first if it does not
    /// exist.
    pub fn load_or_init(path: &Path) -> Result<Self, ProfileError> {
        if !path.exists() {
            let store = Self::defaults();
            store.save(path)?;
            return Ok(store);
        }
        Self::load(path)
    }
}
