use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repomirror::item::ItemKind;
use repomirror::{
    Config, GitHubClient, GitRunner, SyncContext, SyncEngine, SyncResult, SyncSummary, SyncTarget,
    TracingLogger,
};

#[derive(Parser)]
#[command(name = "repomirror")]
#[command(about = "Mirror a GitHub account's repositories and gists into a local directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct Account {
    /// GitHub user whose items are mirrored (falls back to GITHUB_USER)
    #[arg(short, long)]
    user: Option<String>,

    /// Personal access token (falls back to GITHUB_TOKEN)
    #[arg(short, long)]
    auth: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Directory items are mirrored into
        #[arg(short, long)]
        root: Option<String>,
    },

    /// Clone, update and download every owned item
    Sync {
        /// Item kinds to sync: repo, gist (default: all)
        kinds: Vec<String>,

        #[command(flatten)]
        account: Account,

        /// Directory items are mirrored into
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Log what would be done without running git or writing files
        #[arg(long)]
        dry_run: bool,
    },

    /// List the items that would be synced
    List {
        /// Item kind to list: repo or gist
        kind: String,

        #[command(flatten)]
        account: Account,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        // init may create the file it is pointed at
        Some(path) if !path.exists() && matches!(cli.command, Commands::Init { .. }) => {
            Config::expanded_default()?
        }
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting repomirror v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Init { root } => cmd_init(root, &config, cli.config),
        Commands::Sync {
            kinds,
            account,
            root,
            dry_run,
        } => cmd_sync(kinds, account, root, dry_run, &config).await,
        Commands::List { kind, account } => cmd_list(kind, account, &config).await,
    }
}

/// Initialize logging; RUST_LOG wins over --verbose, which wins over the config
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let default_level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}

fn engine(account: Account, root: Option<PathBuf>, dry_run: bool, config: &Config) -> Result<SyncEngine> {
    let opts = config.options(account.user, account.auth, dry_run);
    let root = root.unwrap_or_else(|| PathBuf::from(&config.root));
    let ctx = SyncContext::new(root, opts, Arc::new(TracingLogger))?;

    let source = Arc::new(GitHubClient::with_host(&config.github.api_host));
    let runner = Arc::new(GitRunner::with_timeout(config.command_timeout()));

    Ok(SyncEngine::new(ctx, source, runner))
}

/// Write a default configuration file
fn cmd_init(root: Option<String>, config: &Config, path: Option<PathBuf>) -> Result<()> {
    let mut new_config = config.clone();
    if let Some(root) = root {
        new_config.root = root;
    }

    let config_path = match path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    new_config.save(&config_path)?;

    println!("✅ Configuration saved to: {}", config_path.display());
    println!("   Root directory: {}", new_config.root);
    println!("   Next: export GITHUB_TOKEN and run 'repomirror sync'");

    Ok(())
}

/// Sync the requested kinds; exits non-zero if any kind could not be synced
async fn cmd_sync(
    kinds: Vec<String>,
    account: Account,
    root: Option<PathBuf>,
    dry_run: bool,
    config: &Config,
) -> Result<()> {
    let kinds = if kinds.is_empty() {
        ItemKind::ALL.iter().map(|k| k.to_string()).collect()
    } else {
        kinds
    };

    let engine = engine(account, root, dry_run, config)?;
    if engine.context().dry_run() {
        println!("🔍 Dry run mode - nothing will be cloned, pulled or written");
    }

    let reports = engine.run_all(&kinds).await?;

    let mut failed_kinds = 0;
    for (kind, outcome) in &reports {
        match outcome {
            Ok(summary) => print_summary(summary),
            Err(e) => {
                failed_kinds += 1;
                println!("\n❌ Could not sync {}: {}", kind.label(), e);
            }
        }
    }

    if failed_kinds > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// List mapped targets without touching disk
async fn cmd_list(kind: String, account: Account, config: &Config) -> Result<()> {
    let kind: ItemKind = kind.parse()?;
    let engine = engine(account, None, true, config)?;

    let discovered = engine
        .discover(kind)
        .await
        .with_context(|| format!("Failed to list {}", kind.label()))?;

    println!("{} ({}):", kind.label(), discovered.targets().count());
    for target in discovered.targets() {
        match target {
            SyncTarget::Repo { name, clone_url } => println!("  📁 {} ({})", name, clone_url),
            SyncTarget::Gist { name, files } => println!("  📝 {} ({} files)", name, files.len()),
        }
    }

    let skipped = discovered.skipped();
    if skipped > 0 {
        println!("  ⏭️  {} items could not be read", skipped);
    }

    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    println!("\n🎉 Synchronization of {} complete!", summary.kind.label());
    println!("   📊 Total items: {}", summary.total_items);
    println!("   ✅ Successful operations: {}", summary.successful_operations);
    println!("   ❌ Failed operations: {}", summary.failed_operations);
    println!("   ⏭️  Skipped operations: {}", summary.skipped_operations);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.failed_operations > 0 {
        println!("\n🔍 Failed Operations:");
        for result in &summary.results {
            if let SyncResult::Failed { path, error } = result {
                println!("   ❌ {}: {}", path.display(), error);
            }
        }
    }
}
