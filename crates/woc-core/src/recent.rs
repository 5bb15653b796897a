use crate::commands::CommandKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const RECENT_CAPACITY: usize = 5;
const RECENT_FILE: &str = "recent_commands.json";
const SLUG_PREFIX_LEN: usize = 48;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentCommand {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
}

/// Deduplicated by `(name, type)`, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentCommands {
    items: Vec<RecentCommand>,
}

impl RecentCommands {
    pub fn from_items(items: Vec<RecentCommand>) -> Self {
        let mut recent = Self::default();
        for item in items.into_iter().rev() {
            recent.push(&item.name, item.kind);
        }
        recent
    }

    pub fn push(&mut self, name: &str, kind: CommandKind) {
        self.items
            .retain(|item| !(item.name == name && item.kind == kind));
        self.items.insert(
            0,
            RecentCommand {
                name: name.to_string(),
                kind,
            },
        );
        self.items.truncate(RECENT_CAPACITY);
    }

    pub fn items(&self) -> &[RecentCommand] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&RecentCommand> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum RecentStoreError {
    #[error("recent commands io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("recent commands file {path} is not valid json: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Session-scoped file holding the recent-command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentStore {
    path: PathBuf,
}

impl RecentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_session(state_dir: &Path, session_id: &str) -> Self {
        Self::new(
            state_dir
                .join("sessions")
                .join(session_slug(session_id))
                .join(RECENT_FILE),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty list.
    pub fn load(&self) -> Result<RecentCommands, RecentStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(RecentCommands::default())
            }
            Err(source) => {
                return Err(RecentStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let items: Vec<RecentCommand> =
            serde_json::from_str(&contents).map_err(|source| RecentStoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(RecentCommands::from_items(items))
    }

    pub fn save(&self, recent: &RecentCommands) -> Result<(), RecentStoreError> {
        let io_err = |source| RecentStoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(recent.items()).map_err(|source| {
            RecentStoreError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, contents).map_err(io_err)
    }
}

pub fn session_slug(session_id: &str) -> String {
    let mut slug = String::with_capacity(session_id.len());
    for ch in session_id.chars() {
        let ch = if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.') {
            ch
        } else {
            '-'
        };
        if ch == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(ch);
        if slug.len() == SLUG_PREFIX_LEN {
            break;
        }
    }
    let prefix = match slug.trim_end_matches('-') {
        "" => "session",
        trimmed => trimmed,
    };
    format!("{prefix}-{:08x}", fnv1a(session_id.as_bytes()))
}

/// 32-bit FNV-1a; the file name must not change between runs.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5, |hash: u32, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193)
    })
}
