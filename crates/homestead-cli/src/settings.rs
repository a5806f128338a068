//! Runtime settings: an optional TOML file under `HOMESTEAD_*` environment
//! variables, over built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Duration;
use homestead_core::auth::PasswordPolicy;
use homestead_store_sqlite::AuthSettings;
use serde::Deserialize;

/// Ten years.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366 * 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// SQLite database holding accounts, favorites and roles.
  pub database_path:       PathBuf,
  /// Where the current session token is kept between invocations.
  pub session_file:        PathBuf,
  pub session_ttl_hours:   i64,
  pub min_password_length: usize,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      database_path:       PathBuf::from("~/.local/share/homestead/homestead.db"),
      session_file:        PathBuf::from("~/.local/state/homestead/session"),
      session_ttl_hours:   168,
      min_password_length: PasswordPolicy::default().min_length,
    }
  }
}

impl Settings {
  /// Read `path` if it exists, then apply the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings: Self = config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(config::Environment::with_prefix("HOMESTEAD"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?
      .try_deserialize()
      .context("failed to deserialise settings")?;

    anyhow::ensure!(
      (1..=MAX_SESSION_TTL_HOURS).contains(&settings.session_ttl_hours),
      "session_ttl_hours must be between 1 and {MAX_SESSION_TTL_HOURS}, got {}",
      settings.session_ttl_hours,
    );
    Ok(Self {
      database_path: expand_tilde(&settings.database_path),
      session_file: expand_tilde(&settings.session_file),
      ..settings
    })
  }

  pub fn auth(&self) -> anyhow::Result<AuthSettings> {
    let session_ttl = Duration::try_hours(self.session_ttl_hours)
      .with_context(|| format!("session_ttl_hours {} is out of range", self.session_ttl_hours))?;
    Ok(AuthSettings {
      policy: PasswordPolicy { min_length: self.min_password_length },
      session_ttl,
      ..AuthSettings::default()
    })
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
