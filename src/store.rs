//! Document store backed by sled.
//!
//! Each collection is a sled tree holding JSON documents keyed by id. The
//! database handle is opened on first use and shared by every in-flight
//! request; concurrent first callers wait on the same initialisation.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot open document store at {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    #[error("document store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Sled(#[from] sled::Error),

    #[error("document codec: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Named collections. `Usernames` is an index tree mapping a username to the
/// owning account id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Accounts,
    Usernames,
    Sessions,
    Notes,
    Categories,
    Tasks,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Accounts => "accounts",
            Collection::Usernames => "account_usernames",
            Collection::Sessions => "sessions",
            Collection::Notes => "notes",
            Collection::Categories => "categories",
            Collection::Tasks => "tasks",
        }
    }
}

pub struct Store {
    path: PathBuf,
    db: OnceCell<sled::Db>,
}

impl Store {
    /// Create an unconnected store. Nothing touches the disk until the first
    /// operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.db.initialized()
    }

    /// Connect if not connected. Safe to race: exactly one open happens.
    pub async fn connect(&self) -> StoreResult<&sled::Db> {
        self.db
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let db = tokio::task::spawn_blocking(move || {
                    sled::open(&path).map_err(|source| StoreError::Connect { path, source })
                })
                .await??;
                info!(path = %self.path.display(), "document store connected");
                Ok::<_, StoreError>(db)
            })
            .await
    }

    async fn tree(&self, collection: Collection) -> StoreResult<sled::Tree> {
        Ok(self.connect().await?.open_tree(collection.name())?)
    }

    pub async fn insert<T: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        doc: &T,
    ) -> StoreResult<()> {
        let tree = self.tree(collection).await?;
        tree.insert(id.as_bytes(), serde_json::to_vec(doc)?)?;
        debug!(collection = collection.name(), id, "document inserted");
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> StoreResult<Option<T>> {
        let tree = self.tree(collection).await?;
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All documents of a collection matching `pred`, in key order.
    pub async fn find<T, F>(&self, collection: Collection, pred: F) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let tree = self.tree(collection).await?;
        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, bytes) = entry?;
            let doc: T = serde_json::from_slice(&bytes)?;
            if pred(&doc) {
                out.push(doc);
            }
        }
        Ok(out)
    }

    /// Overwrite an existing document. Returns `false` when there was nothing
    /// to replace. Concurrent writers race; the last one wins.
    pub async fn replace<T: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        doc: &T,
    ) -> StoreResult<bool> {
        let tree = self.tree(collection).await?;
        if !tree.contains_key(id.as_bytes())? {
            return Ok(false);
        }
        tree.insert(id.as_bytes(), serde_json::to_vec(doc)?)?;
        Ok(true)
    }

    pub async fn remove(&self, collection: Collection, id: &str) -> StoreResult<bool> {
        let tree = self.tree(collection).await?;
        Ok(tree.remove(id.as_bytes())?.is_some())
    }

    /// Atomically bind `key` to `value` unless it is already bound.
    /// Returns `false` when another writer holds the key.
    pub async fn claim_unique(
        &self,
        collection: Collection,
        key: &str,
        value: &str,
    ) -> StoreResult<bool> {
        let tree = self.tree(collection).await?;
        let swapped = tree.compare_and_swap(
            key.as_bytes(),
            None as Option<&[u8]>,
            Some(value.as_bytes()),
        )?;
        Ok(swapped.is_ok())
    }

    /// Raw lookup in an index tree.
    pub async fn lookup(&self, collection: Collection, key: &str) -> StoreResult<Option<String>> {
        let tree = self.tree(collection).await?;
        Ok(tree
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Flush pending writes. A store that never connected has nothing to do.
    pub async fn close(&self) -> StoreResult<()> {
        if let Some(db) = self.db.get() {
            db.flush_async().await?;
            info!("document store flushed");
        }
        Ok(())
    }
}
