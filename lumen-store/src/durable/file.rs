//! File-backed durable store: one file per key under a directory

use super::DurableStore;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

const HEADER_PREFIX: &str = "lumen-durable/1 ";

/// Durable store persisting each key to `<dir>/<sha256(key)>.entry`.
///
/// File layout: a single header line `lumen-durable/1 <expires_unix_ms>`
/// followed by the raw value bytes. Writes go to a temp file and are renamed
/// into place so a reader never sees a half-written entry.
pub struct FileDurableStore {
    dir: PathBuf,
}

impl FileDurableStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        info!("Opened file durable store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{name}.entry"))
    }

    fn parse(raw: &[u8]) -> Result<(i64, &[u8])> {
        let newline = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| StoreError::Serialization("missing entry header".to_string()))?;

        let header = std::str::from_utf8(&raw[..newline])
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let expires_ms = header
            .strip_prefix(HEADER_PREFIX)
            .and_then(|rest| rest.trim().parse::<i64>().ok())
            .ok_or_else(|| StoreError::Serialization(format!("bad entry header: {header}")))?;

        Ok((expires_ms, &raw[newline + 1..]))
    }
}

#[async_trait]
impl DurableStore for FileDurableStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (expires_ms, body) = Self::parse(&raw)?;
        if Utc::now().timestamp_millis() > expires_ms {
            debug!("Durable entry expired, removing: {}", key);
            self.delete(key).await?;
            return Ok(None);
        }

        Ok(Some(body.to_vec()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_ms = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        let mut contents = format!("{HEADER_PREFIX}{expires_ms}\n").into_bytes();
        contents.extend_from_slice(&bytes);

        let path = self.path_for(key);
        let tmp = path.with_extension(format!("tmp-{}", rand::random::<u32>()));
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
