//! Session persistence between invocations.

use crate::error::Result;
use jobgen_client::{Credential, JobgenClient};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct SessionFile {
    path: Option<PathBuf>,
}

impl SessionFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read a stored credential. A corrupt file is ignored.
    pub fn load(&self) -> Result<Option<Credential>> {
        let Some(path) = self.path.as_deref().filter(|p| p.exists()) else {
            return Ok(None);
        };

        let content = fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Restore the stored session into `client`, if any.
    pub fn restore_into(&self, client: &JobgenClient) -> Result<bool> {
        match self.load()? {
            Some(credential) => {
                client.restore(credential);
                debug!("Session restored");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write the client's current credential, or remove the file when signed out.
    pub fn persist(&self, client: &JobgenClient) -> Result<()> {
        match client.credentials().current() {
            Some(credential) => self.save(&credential),
            None => self.clear(),
        }
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(credential)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match self.path.as_deref() {
            Some(path) if path.exists() => Ok(fs::remove_file(path)?),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobgen_client::TokenGrant;

    fn credential() -> Credential {
        Credential::issue(TokenGrant::new("not-a-jwt", Some("refresh-1".to_string())))
    }

    #[test]
    fn save_then_load_keeps_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(Some(dir.path().join("jobgen").join("session.json")));

        file.save(&credential()).unwrap();
        let loaded = file.load().unwrap().unwrap();

        assert_eq!(loaded.access_token, "not-a-jwt");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[cfg(unix)]
    #[test]
    fn saved_session_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(Some(dir.path().join("session.json")));
        file.save(&credential()).unwrap();

        let mode = fs::metadata(file.path().unwrap()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        assert!(SessionFile::new(Some(path)).load().unwrap().is_none());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = SessionFile::new(Some(dir.path().join("session.json")));
        file.save(&credential()).unwrap();

        file.clear().unwrap();
        file.clear().unwrap();
        assert!(file.load().unwrap().is_none());
    }
}
