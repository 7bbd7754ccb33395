//! repomirror - mirror a GitHub account into a local directory
//!
//! Every repository owned by the user is cloned when missing and updated when
//! present (pull, falling back to fetch). Every gist is downloaded file by file
//! into a directory named after its id.
//!
//! ## Modules
//!
//! - [`config`]: Configuration file, run options and the validated [`SyncContext`]
//! - [`github`]: Paginated GitHub API client
//! - [`item`]: Remote item model, ownership filter and mapping to sync targets
//! - [`git`]: External command runner
//! - [`reconcile`]: Per-item clone/update/write decisions
//! - [`sync`]: Orchestration of a full sync pass

pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod item;
pub mod logger;
pub mod reconcile;
pub mod sync;

pub use config::{Config, Options, SyncContext};
pub use error::SyncError;
pub use git::{CommandRunner, GitRunner};
pub use github::{GitHubClient, RemoteSource};
pub use item::{ItemKind, SyncTarget};
pub use logger::{Logger, TracingLogger};
pub use reconcile::{Action, Reconciler, SyncResult};
pub use sync::{SyncEngine, SyncSummary};
