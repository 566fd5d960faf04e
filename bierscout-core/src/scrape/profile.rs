use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::ProfileSection;

use super::error::{ScrapeError, ScrapeResult};

/// A throwaway chromium user-data directory for one session. Discarding the
/// profile between runs sheds cookies and tracking state.
#[derive(Debug, Clone)]
pub struct SessionProfile {
    id: String,
    path: PathBuf,
    created_at: DateTime<Utc>,
}

impl SessionProfile {
    fn new(base: &Path) -> ScrapeResult<Self> {
        let id = Uuid::new_v4().to_string();
        let path = base.join(&id);
        std::fs::create_dir_all(&path)
            .map_err(|err| ScrapeError::Profile(format!("failed to create profile dir: {err}")))?;
        Ok(Self {
            id,
            path,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
    ttl: Duration,
}

impl ProfileManager {
    pub fn new<P: AsRef<Path>>(base_dir: P, ttl: Duration) -> ScrapeResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            ScrapeError::Profile(format!("failed to create profile base dir: {err}"))
        })?;
        Ok(Self { base_dir, ttl })
    }

    pub fn from_config(section: &ProfileSection) -> ScrapeResult<Self> {
        let ttl = Duration::from_secs(section.ttl_hours.max(1) * 60 * 60);
        Self::new(&section.base_dir, ttl)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn allocate(&self) -> ScrapeResult<SessionProfile> {
        SessionProfile::new(&self.base_dir)
    }

    /// Removes profile directories older than the configured TTL. Failures
    /// on individual entries are logged, not propagated.
    pub fn cleanup_expired(&self) -> ScrapeResult<()> {
        let now = SystemTime::now();
        let entries = std::fs::read_dir(&self.base_dir).map_err(|err| {
            ScrapeError::Profile(format!("failed to list profile directory: {err}"))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to read profile metadata");
                    continue;
                }
            };
            if let Ok(modified) = metadata.modified() {
                if now.duration_since(modified).unwrap_or(Duration::ZERO) > self.ttl {
                    if let Err(err) = std::fs::remove_dir_all(&path) {
                        tracing::warn!(path = %path.display(), error = %err, "failed to remove expired profile");
                    }
                }
            }
        }
        Ok(())
    }
}
