use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::error::StorageError;
use super::hash::ContentHash;
use super::traits::{BlobStore, BoxReader, StoredBlob};

const READ_CHUNK: usize = 64 * 1024;

/// Local-disk blob store.
///
/// Layout is `{root}/{shard}/{leaf}`; writes land in `{root}/.partial` first
/// and are renamed into place so readers never see a half-written file.
pub struct FilesystemBlobStore {
    root: PathBuf,
    disk: String,
    max_size: u64,
}

impl FilesystemBlobStore {
    pub async fn open(
        root: impl Into<PathBuf>,
        disk: impl Into<String>,
        max_size: u64,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(root.join(".partial")).await?;
        Ok(Self {
            root,
            disk: disk.into(),
            max_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.shard()).join(hash.leaf())
    }

    fn partial_path(&self) -> PathBuf {
        self.root.join(".partial").join(uuid::Uuid::now_v7().to_string())
    }

    async fn commit_partial(
        &self,
        partial: &Path,
        hash: &ContentHash,
    ) -> Result<bool, StorageError> {
        let target = self.path_for(hash);
        if fs::try_exists(&target).await? {
            let _ = fs::remove_file(partial).await;
            return Ok(false);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(e) = fs::rename(partial, &target).await {
            let _ = fs::remove_file(partial).await;
            return Err(e.into());
        }
        Ok(true)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn disk(&self) -> &str {
        &self.disk
    }

    async fn put_stream(&self, mut reader: BoxReader) -> Result<StoredBlob, StorageError> {
        let partial = self.partial_path();
        let mut file = fs::File::create(&partial).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&partial).await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            size += n as u64;
            if size > self.max_size {
                drop(file);
                let _ = fs::remove_file(&partial).await;
                return Err(StorageError::SizeLimitExceeded {
                    actual: size,
                    limit: self.max_size,
                });
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
        }
        file.flush().await?;
        drop(file);

        let hash = ContentHash::from_digest(hasher);
        let created = self.commit_partial(&partial, &hash).await?;
        tracing::debug!(hash = %hash, size, created, "Stored blob");
        Ok(StoredBlob {
            hash,
            size,
            created,
        })
    }

    async fn get_stream(&self, hash: &ContentHash) -> Result<BoxReader, StorageError> {
        match fs::File::open(self.path_for(hash)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(hash.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_for(hash)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
