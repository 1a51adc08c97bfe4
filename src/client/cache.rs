//! Device-local copy of the guardian session.
//!
//! One reserved slot per device. The store on the server stays
//! authoritative; this cache only decides whether the app can skip the
//! login screen on start. I/O failures are logged and read as a miss.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{create_dir_all, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use crate::err::Error;
use crate::models::{Guardian, Student};

const FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredentials {
    pub auth_code: String,
    pub guardian: Guardian,
    pub student: Student,
}

#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// Overwrites the slot. `false` means the session was not persisted and
    /// the next launch will ask for a login again.
    async fn store(&self, guardian: &Guardian, auth_code: &str, student: &Student) -> bool;

    async fn load(&self) -> Option<CachedCredentials>;

    /// Clearing an empty slot is fine.
    async fn clear(&self);
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    credentials: CachedCredentials,
}

/// Postcard-encoded file. Writes go to a sibling temp file that is renamed
/// over the slot, so a reader sees the old triple or the new one.
pub struct FileCredentialCache {
    path: PathBuf,
}

impl FileCredentialCache {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn write(&self, credentials: CachedCredentials) -> Result<(), Error> {
        let bytes = postcard::to_allocvec(&Envelope {
            version: FORMAT_VERSION,
            credentials,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).await?;
        }
        let staging = self.staging_path();
        let mut file = File::create(&staging).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    async fn read(&self) -> Result<Option<CachedCredentials>, Error> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut bytes = Vec::new();
        BufReader::new(file).read_to_end(&mut bytes).await?;
        let envelope: Envelope = postcard::from_bytes(&bytes)?;
        if envelope.version != FORMAT_VERSION {
            log::warn!(
                "Ignoring cached session written in format {}",
                envelope.version
            );
            return Ok(None);
        }
        Ok(Some(envelope.credentials))
    }
}

#[async_trait]
impl CredentialCache for FileCredentialCache {
    async fn store(&self, guardian: &Guardian, auth_code: &str, student: &Student) -> bool {
        let credentials = CachedCredentials {
            auth_code: auth_code.to_string(),
            guardian: guardian.clone(),
            student: student.clone(),
        };
        match self.write(credentials).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!(
                    "Could not persist guardian session to {}: {}",
                    self.path.display(),
                    err
                );
                false
            }
        }
    }

    async fn load(&self) -> Option<CachedCredentials> {
        match self.read().await {
            Ok(found) => found,
            Err(err) => {
                log::warn!(
                    "Could not read cached guardian session from {}: {}",
                    self.path.display(),
                    err
                );
                None
            }
        }
    }

    async fn clear(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => log::debug!("Cleared cached guardian session"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!(
                "Could not clear cached guardian session at {}: {}",
                self.path.display(),
                err
            ),
        }
    }
}

/// Process-local slot, for embedding and tests.
#[derive(Default)]
pub struct MemoryCredentialCache {
    slot: RwLock<Option<CachedCredentials>>,
}

impl MemoryCredentialCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialCache for MemoryCredentialCache {
    async fn store(&self, guardian: &Guardian, auth_code: &str, student: &Student) -> bool {
        match self.slot.write() {
            Ok(mut slot) => {
                *slot = Some(CachedCredentials {
                    auth_code: auth_code.to_string(),
                    guardian: guardian.clone(),
                    student: student.clone(),
                });
                true
            }
            Err(_) => {
                log::warn!("Credential cache lock poisoned, session not cached");
                false
            }
        }
    }

    async fn load(&self) -> Option<CachedCredentials> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }

    async fn clear(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }
}
