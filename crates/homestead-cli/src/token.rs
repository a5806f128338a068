//! [`FileTokenStorage`] keeps the session token in a single file between
//! invocations.

use std::{
  fs, io,
  path::{Path, PathBuf},
};

use homestead_core::auth::TokenStorage;

pub struct FileTokenStorage {
  path: PathBuf,
}

impl FileTokenStorage {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }
}

impl TokenStorage for FileTokenStorage {
  fn load(&self) -> io::Result<Option<String>> {
    match fs::read_to_string(&self.path) {
      Ok(raw) => {
        let token = raw.trim();
        Ok((!token.is_empty()).then(|| token.to_owned()))
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }

  fn save(&self, token: &str) -> io::Result<()> {
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent)?;
    }
    write_private(&self.path, token)
  }

  fn clear(&self) -> io::Result<()> {
    match fs::remove_file(&self.path) {
      Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
      _ => Ok(()),
    }
  }
}

/// The token is a bearer credential: owner read/write only.
#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> io::Result<()> {
  use std::{io::Write as _, os::unix::fs::OpenOptionsExt as _};
  let mut file = fs::OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .mode(0o600)
    .open(path)?;
  file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> io::Result<()> { fs::write(path, contents) }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("state/homestead/session"));

    assert_eq!(storage.load().unwrap(), None);
    storage.save("tok-1").unwrap();
    assert_eq!(storage.load().unwrap().as_deref(), Some("tok-1"));
    storage.save("tok-2").unwrap();
    assert_eq!(storage.load().unwrap().as_deref(), Some("tok-2"));

    storage.clear().unwrap();
    assert_eq!(storage.load().unwrap(), None);
    assert!(!storage.path().exists());
  }

  #[test]
  fn clearing_nothing_is_fine() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("session"));
    storage.clear().unwrap();
  }

  #[test]
  fn blank_file_means_no_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session");
    fs::write(&path, "\n").unwrap();
    assert_eq!(FileTokenStorage::new(path).load().unwrap(), None);
  }

  #[cfg(unix)]
  #[test]
  fn token_file_is_private() {
    use std::os::unix::fs::PermissionsExt as _;
    let dir = tempfile::tempdir().unwrap();
    let storage = FileTokenStorage::new(dir.path().join("session"));
    storage.save("tok").unwrap();
    let mode = fs::metadata(storage.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
  }
}
