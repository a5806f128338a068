//! `homestead`: accounts, saved properties and roles from the terminal.
//!
//! # Usage
//!
//! ```
//! homestead signup buyer@example.com
//! homestead favorites add p100 --title "Lakeview Flat" --image img.jpg \
//!   --price "₹80L" --location Bangalore
//! homestead favorites list
//! homestead roles grant buyer@example.com admin
//! ```
//!
//! Settings come from `homestead.toml` (or `--config`) and `HOMESTEAD_*`
//! environment variables. The session token persists in `session_file`.

mod commands;
mod settings;
mod token;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use homestead_core::{AppContext, role::AppRole};
use homestead_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{settings::Settings, token::FileTokenStorage};

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "homestead", version, about = "Homestead accounts and favorites")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "homestead.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create an account and sign in to it.
  Signup(Credentials),
  /// Sign in to an existing account.
  Signin(Credentials),
  /// End the current session.
  Signout,
  /// Show the signed-in account.
  Whoami,
  /// Change the signed-in account's password.
  Passwd {
    /// New password; prompted for when absent.
    #[arg(long, env = "HOMESTEAD_NEW_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Manage saved properties.
  #[command(subcommand)]
  Favorites(FavoritesCommand),
  /// Inspect and assign roles.
  #[command(subcommand)]
  Roles(RolesCommand),
}

#[derive(Args, Debug)]
pub struct Credentials {
  pub email: String,

  /// Password; prompted for when absent.
  #[arg(long, env = "HOMESTEAD_PASSWORD", hide_env_values = true)]
  pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum FavoritesCommand {
  /// List saved properties, newest first.
  List {
    /// Print rows as JSON.
    #[arg(long)]
    json: bool,
  },
  /// Save a property.
  Add(Property),
  /// Forget a saved property.
  Remove { property_id: String },
  /// Save the property if it is not saved, forget it otherwise.
  Toggle(Property),
}

#[derive(Args, Debug)]
pub struct Property {
  pub property_id: String,
  #[arg(long)]
  pub title:       String,
  #[arg(long)]
  pub image:       String,
  #[arg(long)]
  pub price:       String,
  #[arg(long)]
  pub location:    String,
}

#[derive(Subcommand, Debug)]
pub enum RolesCommand {
  /// Show the roles of an account (default: the signed-in one).
  Show { email: Option<String> },
  /// Give an account a role.
  Grant { email: String, role: AppRole },
  /// Take a role away from an account.
  Revoke { email: String, role: AppRole },
}

pub type Context = AppContext<SqliteStore, FileTokenStorage, SqliteStore>;

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  if let Some(parent) = settings.database_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&settings.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.database_path))?
    .with_auth_settings(settings.auth()?);

  let mut ctx = AppContext::new(
    store.clone(),
    FileTokenStorage::new(&settings.session_file),
    Arc::new(store.clone()),
  );
  ctx.start().await.context("failed to restore session")?;

  let outcome = commands::run(&ctx, &store, cli.command).await;
  ctx.shutdown().await;
  outcome
}
