//! Local reconciliation - decides and performs clone, update or file writes
//!
//! Every side effect goes through [`Reconciler::execute`]. That is the only
//! place that honours dry-run, so a new [`Action`] cannot bypass it.
//!
//! Repositories follow a small state machine:
//!
//! ```text
//! Absent  -> Clone -> (ok: Cloned | err: Failed)
//! Present -> Pull  -> (ok: Pulled | err: Fetch -> (ok: Fetched | err: Failed))
//! ```
//!
//! Gists are written file by file. A file that cannot be placed or written is
//! logged and skipped; the rest of the gist is still written.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::SyncContext;
use crate::error::{SyncError, SyncOutcome};
use crate::git::{command_line, CommandRunner};
use crate::github::RemoteSource;
use crate::item::{resolve_within, GistFile, SyncTarget};

const GIT: &str = "git";

/// Whether an item's directory is already on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Absent,
    Present,
}

impl LocalState {
    pub fn probe(dir: &Path) -> Self {
        if dir.exists() {
            LocalState::Present
        } else {
            LocalState::Absent
        }
    }
}

/// A mutating step the reconciler may take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `git clone <url> <name>` run from the sync root
    Clone { url: String, name: String, root: PathBuf },
    /// `git pull` run inside an existing working copy
    Pull { dir: PathBuf },
    /// `git fetch` run inside an existing working copy
    Fetch { dir: PathBuf },
    CreateDir { dir: PathBuf },
    /// Download `source_url` and write it to `path`
    WriteFile { path: PathBuf, source_url: String },
}

impl Action {
    /// Progress line logged before the action runs
    pub fn describe(&self) -> String {
        match self {
            Action::Clone { url, .. } => format!("Cloning {}...", url),
            Action::Pull { dir } => format!("Pulling {}...", dir.display()),
            Action::Fetch { dir } => format!("Fetching {}...", dir.display()),
            Action::CreateDir { dir } => format!("Creating {}...", dir.display()),
            Action::WriteFile { path, .. } => format!("Writing {}...", path.display()),
        }
    }

    fn git_args(&self) -> Option<(Vec<String>, &Path)> {
        match self {
            Action::Clone { url, name, root } => {
                Some((vec!["clone".to_string(), url.clone(), name.clone()], root.as_path()))
            }
            Action::Pull { dir } => Some((vec!["pull".to_string()], dir.as_path())),
            Action::Fetch { dir } => Some((vec!["fetch".to_string()], dir.as_path())),
            Action::CreateDir { .. } | Action::WriteFile { .. } => None,
        }
    }
}

/// How an action ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Performed {
    Done,
    /// Dry run: only the log line was emitted
    Simulated,
}

/// Result of reconciling one item
#[derive(Debug, Clone)]
pub enum SyncResult {
    /// Repository was cloned
    Cloned { path: PathBuf },
    /// Repository was pulled
    Pulled { path: PathBuf },
    /// Pull failed but fetch succeeded
    Fetched { path: PathBuf, reason: String },
    /// Gist files were written; some may have been skipped
    Written {
        path: PathBuf,
        files_written: usize,
        files_failed: usize,
    },
    /// Item could not be mapped and was never reconciled
    Skipped { name: String, reason: String },
    /// Every applicable action failed
    Failed { path: PathBuf, error: String },
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SyncResult::Cloned { .. }
                | SyncResult::Pulled { .. }
                | SyncResult::Fetched { .. }
                | SyncResult::Written { .. }
        )
    }
}

/// Brings local directories in line with remote targets
pub struct Reconciler<'a> {
    ctx: &'a SyncContext,
    runner: &'a dyn CommandRunner,
    source: &'a dyn RemoteSource,
}

impl<'a> Reconciler<'a> {
    pub fn new(ctx: &'a SyncContext, runner: &'a dyn CommandRunner, source: &'a dyn RemoteSource) -> Self {
        Self { ctx, runner, source }
    }

    /// Reconcile a single target. Failures are logged and folded into the result.
    pub async fn reconcile(&self, target: &SyncTarget) -> SyncResult {
        let dir = self.ctx.root().join(target.name());

        match target {
            SyncTarget::Repo { name, clone_url } => match LocalState::probe(&dir) {
                LocalState::Absent => self.clone_repo(name, clone_url, dir).await,
                LocalState::Present => self.update_repo(name, dir).await,
            },
            SyncTarget::Gist { name, files } => self.write_gist(name, files, dir).await,
        }
    }

    async fn clone_repo(&self, name: &str, url: &str, dir: PathBuf) -> SyncResult {
        let action = Action::Clone {
            url: url.to_string(),
            name: name.to_string(),
            root: self.ctx.root().to_path_buf(),
        };

        match self.execute(&action).await {
            Ok(performed) => {
                self.succeeded(performed, &format!("{} has been successfully cloned", url));
                SyncResult::Cloned { path: dir }
            }
            Err(e) => {
                debug!("Clone of {} failed: {}", name, e);
                self.ctx.logger().error(&format!("Failed to clone {} repository", name));
                SyncResult::Failed {
                    path: dir,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn update_repo(&self, name: &str, dir: PathBuf) -> SyncResult {
        let pull_error = match self.execute(&Action::Pull { dir: dir.clone() }).await {
            Ok(performed) => {
                self.succeeded(performed, &format!("{} has been successfully pulled", dir.display()));
                return SyncResult::Pulled { path: dir };
            }
            Err(e) => e,
        };

        debug!("Pull of {} failed: {}", name, pull_error);
        self.ctx
            .logger()
            .error(&format!("Failed to pull {} repository. Trying to fetch it...", name));

        match self.execute(&Action::Fetch { dir: dir.clone() }).await {
            Ok(performed) => {
                self.succeeded(performed, &format!("{} has been successfully fetched", dir.display()));
                SyncResult::Fetched {
                    path: dir,
                    reason: pull_error.to_string(),
                }
            }
            Err(e) => {
                debug!("Fetch of {} failed: {}", name, e);
                self.ctx.logger().error(&format!("Failed to fetch {} repository", name));
                SyncResult::Failed {
                    path: dir,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn write_gist(&self, name: &str, files: &[GistFile], dir: PathBuf) -> SyncResult {
        if let Err(e) = self.execute(&Action::CreateDir { dir: dir.clone() }).await {
            self.ctx
                .logger()
                .error(&format!("Failed to create directory for {} gist: {}", name, e));
            return SyncResult::Failed {
                path: dir,
                error: e.to_string(),
            };
        }

        let mut files_written = 0;
        let mut files_failed = 0;
        let mut last_error = None;

        for file in files {
            let written = match resolve_within(&dir, &file.relative_path) {
                Ok(path) => {
                    self.execute(&Action::WriteFile {
                        path,
                        source_url: file.source_url.clone(),
                    })
                    .await
                }
                Err(e) => Err(e),
            };

            match written {
                Ok(_) => files_written += 1,
                Err(e) => {
                    files_failed += 1;
                    self.ctx.logger().error(&format!(
                        "Failed to write {} of {} gist: {}",
                        file.relative_path, name, e
                    ));
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if files_written == 0 => SyncResult::Failed {
                path: dir,
                error: e.to_string(),
            },
            _ => {
                if !self.ctx.dry_run() {
                    self.ctx.logger().success(&format!(
                        "{} gist has been successfully synced ({} files)",
                        name, files_written
                    ));
                }
                SyncResult::Written {
                    path: dir,
                    files_written,
                    files_failed,
                }
            }
        }
    }

    /// Run one action, or only log it in dry-run mode
    pub async fn execute(&self, action: &Action) -> SyncOutcome<Performed> {
        self.ctx.logger().info(&action.describe());

        if self.ctx.dry_run() {
            self.ctx.logger().info(&format!("Dry run, skipped: {}", self.render(action)));
            return Ok(Performed::Simulated);
        }

        if let Some((args, working_dir)) = action.git_args() {
            if let Action::Clone { root, .. } = action {
                create_dir(root).await?;
            }
            self.runner.run(GIT, &args, working_dir).await?;
            return Ok(Performed::Done);
        }

        match action {
            Action::CreateDir { dir } => create_dir(dir).await?,
            Action::WriteFile { path, source_url } => {
                if let Some(parent) = path.parent() {
                    create_dir(parent).await?;
                }
                let bytes = self.source.download(source_url, self.ctx.auth_token()).await?;
                tokio::fs::write(path, bytes)
                    .await
                    .map_err(|source| SyncError::FileWrite {
                        path: path.clone(),
                        source,
                    })?;
            }
            Action::Clone { .. } | Action::Pull { .. } | Action::Fetch { .. } => {}
        }

        Ok(Performed::Done)
    }

    fn render(&self, action: &Action) -> String {
        match action.git_args() {
            Some((args, dir)) => format!("{} (in {})", command_line(GIT, &args), dir.display()),
            None => action.describe(),
        }
    }

    fn succeeded(&self, performed: Performed, msg: &str) {
        if performed == Performed::Done {
            self.ctx.logger().success(msg);
        }
    }
}

async fn create_dir(dir: &Path) -> SyncOutcome<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SyncError::FileWrite {
            path: dir.to_path_buf(),
            source,
        })
}
