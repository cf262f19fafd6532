use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::UserProfile;

const SESSION_TMP_EXTENSION: &str = "json.tmp";

/// Signed-in state kept between invocations: the bearer token and the
/// profile returned with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: Option<UserProfile>,
}

impl StoredSession {
    pub fn new(token: impl Into<String>, user: UserProfile) -> Self {
        Self {
            token: token.into(),
            user: Some(user),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredSession>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading session {}", self.path.display()))
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                tracing::warn!(?err, "ignoring unreadable session {}", self.path.display());
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        let json = serde_json::to_vec_pretty(session).context("serialising session")?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("ensuring session dir {}", dir.display()))?;
        }
        let tmp_path = self.path.with_extension(SESSION_TMP_EXTENSION);
        fs::write(&tmp_path, &json)
            .with_context(|| format!("writing temporary session {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("persisting session {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("removing session {}", self.path.display()))
            }
        }
    }

    /// Replaces the cached profile, keeping the token. Returns `None` when
    /// nobody is signed in.
    pub fn update_user(&self, user: UserProfile) -> Result<Option<StoredSession>> {
        let Some(mut session) = self.load()? else {
            return Ok(None);
        };
        session.user = Some(user);
        self.save(&session)?;
        Ok(Some(session))
    }

    pub fn token(&self) -> Result<Option<String>> {
        Ok(self.load()?.map(|session| session.token))
    }
}
