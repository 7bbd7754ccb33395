//! Remote item model, ownership filter and mapping into sync targets
//!
//! Pages arrive as untyped JSON. Entries are filtered on their owner first,
//! decoded as the kind they were fetched as, then projected into a [`SyncTarget`].
//! Projection checks every required field and fails loudly instead of
//! guessing.

use path_clean::PathClean;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{SyncError, SyncOutcome};

/// The kinds of remote items that can be mirrored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Repo,
    Gist,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Repo, ItemKind::Gist];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Repo => "repo",
            ItemKind::Gist => "gist",
        }
    }

    /// API path listing the authenticated user's items of this kind
    pub fn endpoint(&self) -> &'static str {
        match self {
            ItemKind::Repo => "/user/repos",
            ItemKind::Gist => "/gists",
        }
    }

    /// Human-readable plural used in progress messages
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Repo => "repositories",
            ItemKind::Gist => "gist",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SyncError::UnsupportedType {
                kind: s.to_string(),
                allowed: ItemKind::ALL.iter().map(|k| k.as_str().to_string()).collect(),
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub login: Option<String>,
}

/// Fields of a repository payload that mirroring cares about
#[derive(Debug, Clone, Deserialize)]
pub struct RawRepo {
    pub name: Option<String>,
    pub owner: Option<Owner>,
    pub ssh_url: Option<String>,
    pub clone_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGistFile {
    pub filename: Option<String>,
    pub raw_url: Option<String>,
}

/// Fields of a gist payload that mirroring cares about
#[derive(Debug, Clone, Deserialize)]
pub struct RawGist {
    pub id: Option<String>,
    pub owner: Option<Owner>,
    pub files: Option<BTreeMap<String, RawGistFile>>,
}

/// One decoded page entry, tagged with the kind it was fetched as
#[derive(Debug, Clone)]
pub enum RemoteItem {
    Repo(RawRepo),
    Gist(RawGist),
}

impl RemoteItem {
    /// Decode a raw JSON value. Non-objects and mistyped fields are decode errors.
    pub fn decode(kind: ItemKind, value: Value) -> SyncOutcome<Self> {
        if !value.is_object() {
            return Err(SyncError::ItemDecode {
                kind: kind.as_str().to_string(),
                reason: "not a JSON object".to_string(),
            });
        }

        let item = match kind {
            ItemKind::Repo => serde_json::from_value(value).map(RemoteItem::Repo),
            ItemKind::Gist => serde_json::from_value(value).map(RemoteItem::Gist),
        };
        item.map_err(|e| SyncError::ItemDecode {
            kind: kind.as_str().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            RemoteItem::Repo(_) => ItemKind::Repo,
            RemoteItem::Gist(_) => ItemKind::Gist,
        }
    }

    pub fn owner_login(&self) -> Option<&str> {
        let owner = match self {
            RemoteItem::Repo(repo) => repo.owner.as_ref(),
            RemoteItem::Gist(gist) => gist.owner.as_ref(),
        };
        owner.and_then(|o| o.login.as_deref())
    }
}

/// Owner login of a raw page entry, if it has one
pub fn raw_owner_login(value: &Value) -> Option<&str> {
    value.get("owner")?.get("login")?.as_str()
}

/// Keep raw entries whose owner login equals `user` exactly, preserving order.
///
/// Runs before decoding, so entries owned by someone else are dropped no
/// matter how malformed they are. Entries without an owner are dropped too.
pub fn filter_by_owner(values: Vec<Value>, user: &str) -> Vec<Value> {
    values
        .into_iter()
        .filter(|value| raw_owner_login(value) == Some(user))
        .collect()
}

/// A file belonging to a gist, relative to the gist's directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GistFile {
    pub relative_path: String,
    pub source_url: String,
}

/// The minimal record the reconciler needs for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    Repo { name: String, clone_url: String },
    Gist { name: String, files: Vec<GistFile> },
}

impl SyncTarget {
    pub fn name(&self) -> &str {
        match self {
            SyncTarget::Repo { name, .. } | SyncTarget::Gist { name, .. } => name,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            SyncTarget::Repo { .. } => ItemKind::Repo,
            SyncTarget::Gist { .. } => ItemKind::Gist,
        }
    }
}

impl TryFrom<RemoteItem> for SyncTarget {
    type Error = SyncError;

    fn try_from(item: RemoteItem) -> SyncOutcome<Self> {
        match item {
            RemoteItem::Repo(repo) => map_repo(repo),
            RemoteItem::Gist(gist) => map_gist(gist),
        }
    }
}

fn map_repo(repo: RawRepo) -> SyncOutcome<SyncTarget> {
    let name = repo
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SyncError::mapping("repo", "name"))?;

    if !is_path_segment(&name) {
        return Err(SyncError::mapping("repo", "name"));
    }

    // SSH first, then HTTPS, then the conventional SSH address
    let clone_url = match (repo.ssh_url, repo.clone_url) {
        (Some(ssh), _) => ssh,
        (None, Some(https)) => https,
        (None, None) => {
            let owner = repo
                .owner
                .and_then(|o| o.login)
                .ok_or_else(|| SyncError::mapping("repo", "owner.login"))?;
            format!("git@github.com:{}/{}.git", owner, name)
        }
    };

    Ok(SyncTarget::Repo { name, clone_url })
}

fn map_gist(gist: RawGist) -> SyncOutcome<SyncTarget> {
    let name = gist
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SyncError::mapping("gist", "id"))?;

    if !is_path_segment(&name) {
        return Err(SyncError::mapping("gist", "id"));
    }

    let manifest = gist.files.ok_or_else(|| SyncError::mapping("gist", "files"))?;

    let mut files = Vec::with_capacity(manifest.len());
    for (key, file) in manifest {
        let source_url = file
            .raw_url
            .ok_or_else(|| SyncError::mapping("gist", format!("files.{}.raw_url", key)))?;
        files.push(GistFile {
            relative_path: file.filename.unwrap_or(key),
            source_url,
        });
    }

    Ok(SyncTarget::Gist { name, files })
}

fn is_path_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Resolve a gist file path under `dir`, rejecting anything that would land
/// outside it (absolute paths, `..` escapes, the directory itself).
pub fn resolve_within(dir: &Path, relative: &str) -> SyncOutcome<PathBuf> {
    let base = dir.to_path_buf().clean();
    let normalized = relative.replace('\\', "/");
    let candidate = base.join(&normalized).clean();

    if candidate == base || !candidate.starts_with(&base) || Path::new(&normalized).is_absolute() {
        return Err(SyncError::UnsafePath {
            path: relative.to_string(),
        });
    }

    Ok(candidate)
}
