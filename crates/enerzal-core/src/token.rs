use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// File name of the stored auth token inside the config directory
pub const TOKEN_FILE: &str = "token";

/// Persisted auth token, read by every authenticated request
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> anyhow::Result<Self> {
        Ok(Self::at(Config::config_dir()?.join(TOKEN_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<String> {
        let token = fs::read_to_string(&self.path).ok()?;
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    pub fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::at(dir.path().join("sub").join(TOKEN_FILE));

        assert_eq!(store.load(), None);
        store.save("jwt-abc").unwrap();
        assert_eq!(store.load().as_deref(), Some("jwt-abc"));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_blank_file_is_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::at(dir.path().join(TOKEN_FILE));
        fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.load(), None);
    }
}
