use log::info;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::RepoError;

/// Ordered string keyed storage the measurement cache sits on.
pub trait KvStore: Send + Sync {
    /// Either the entry is stored or nothing changed.
    fn put(&self, key: &str, value: String) -> Result<(), RepoError>;
    fn get(&self, key: &str) -> Result<Option<String>, RepoError>;
    /// All entries in ascending key order.
    fn scan(&self) -> Result<Vec<(String, String)>, RepoError>;
    /// Removing a key that is not there is not an error.
    fn delete(&self, key: &str) -> Result<(), RepoError>;
    fn len(&self) -> Result<usize, RepoError>;
    /// Entry with the greatest key.
    fn last(&self) -> Result<Option<(String, String)>, RepoError>;

    /// `take` entries in key order after skipping `skip`.
    fn scan_page(&self, skip: usize, take: usize) -> Result<Vec<(String, String)>, RepoError> {
        Ok(self.scan()?.into_iter().skip(skip).take(take).collect())
    }
}

/// Volatile store, used when the cache is not persistent.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, String>>, RepoError> {
        self.entries.read().map_err(|_| RepoError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>>, RepoError> {
        self.entries.write().map_err(|_| RepoError::Poisoned)
    }
}

impl KvStore for MemoryStore {
    fn put(&self, key: &str, value: String) -> Result<(), RepoError> {
        self.write()?.insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn scan(&self) -> Result<Vec<(String, String)>, RepoError> {
        Ok(self.read()?.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn delete(&self, key: &str) -> Result<(), RepoError> {
        self.write()?.remove(key);
        Ok(())
    }

    fn len(&self) -> Result<usize, RepoError> {
        Ok(self.read()?.len())
    }

    fn last(&self) -> Result<Option<(String, String)>, RepoError> {
        Ok(self.read()?.iter().next_back().map(|(k, v)| (k.clone(), v.clone())))
    }

    fn scan_page(&self, skip: usize, take: usize) -> Result<Vec<(String, String)>, RepoError> {
        Ok(self
            .read()?
            .iter()
            .skip(skip)
            .take(take)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Persistent store on an embedded sled database.
///
/// sled keeps keys in byte order, which for the cache keys is the textual
/// order. Writes go to its log and are flushed in the background and on drop.
pub struct SledStore {
    db: sled::Db,
    path: PathBuf,
}

fn to_string(bytes: &[u8]) -> Result<String, RepoError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| RepoError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn to_entry(item: sled::Result<(sled::IVec, sled::IVec)>) -> Result<(String, String), RepoError> {
    let (k, v) = item?;
    Ok((to_string(&k)?, to_string(&v)?))
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)?;
        info!("Opened cache {} with {} entries", path.display(), db.len());
        Ok(SledStore { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&self) -> Result<(), RepoError> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvStore for SledStore {
    fn put(&self, key: &str, value: String) -> Result<(), RepoError> {
        self.db.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, RepoError> {
        match self.db.get(key.as_bytes())? {
            Some(v) => Ok(Some(to_string(&v)?)),
            None => Ok(None),
        }
    }

    fn scan(&self) -> Result<Vec<(String, String)>, RepoError> {
        self.db.iter().map(to_entry).collect()
    }

    fn delete(&self, key: &str) -> Result<(), RepoError> {
        self.db.remove(key.as_bytes())?;
        Ok(())
    }

    fn len(&self) -> Result<usize, RepoError> {
        Ok(self.db.len())
    }

    fn last(&self) -> Result<Option<(String, String)>, RepoError> {
        self.db.last().map_err(RepoError::from)?.map(|kv| to_entry(Ok(kv))).transpose()
    }

    fn scan_page(&self, skip: usize, take: usize) -> Result<Vec<(String, String)>, RepoError> {
        self.db.iter().skip(skip).take(take).map(to_entry).collect()
    }
}
