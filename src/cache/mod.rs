pub mod store;

use log::{debug, warn};
use thiserror::Error;

use crate::models::Measurement;
pub use store::{KvStore, MemoryStore, SledStore};

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Bad arguments")]
    BadArguments,
    #[error("No elements in the requested range")]
    NoElements,
    #[error("Measurement {0} not found")]
    NotFound(String),
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Storage contract for measurements. Every collection is returned in key
/// order, which is chronological.
pub trait MeasurementRepo: Send + Sync {
    fn put(&self, m: &Measurement) -> Result<(), RepoError>;
    fn get(&self, key: &str) -> Result<Measurement, RepoError>;
    /// Zero based `page` of `page_size` measurements.
    fn get_page(&self, page: usize, page_size: usize) -> Result<Vec<Measurement>, RepoError>;
    fn get_all(&self) -> Result<Vec<Measurement>, RepoError>;
    fn delete(&self, m: &Measurement) -> Result<(), RepoError>;

    /// Most recent measurement, `NoElements` when there is none.
    fn get_last(&self) -> Result<Measurement, RepoError> {
        self.get_all()?.pop().ok_or(RepoError::NoElements)
    }
}

/// Measurements stored as JSON records in a [`KvStore`].
pub struct MeasurementCache<S> {
    store: S,
}

impl<S: KvStore> MeasurementCache<S> {
    pub fn new(store: S) -> Self {
        MeasurementCache { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn decode_entries<I>(entries: I) -> Vec<Measurement>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        entries
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_str::<Measurement>(&value) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("Skipping cache record {key}: {e}");
                    None
                }
            })
            .collect()
    }
}

impl<S: KvStore> MeasurementRepo for MeasurementCache<S> {
    fn put(&self, m: &Measurement) -> Result<(), RepoError> {
        let key = m.key();
        let value = serde_json::to_string(m)?;
        self.store.put(&key, value)?;
        debug!("Stored measurement {key}");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Measurement, RepoError> {
        match self.store.get(key)? {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Err(RepoError::NotFound(key.to_string())),
        }
    }

    fn get_page(&self, page: usize, page_size: usize) -> Result<Vec<Measurement>, RepoError> {
        if page_size == 0 {
            return Err(RepoError::BadArguments);
        }
        let count = self.store.len()?;
        let start = match page.checked_mul(page_size) {
            Some(s) if s < count => s,
            _ => return Err(RepoError::NoElements),
        };

        Ok(Self::decode_entries(self.store.scan_page(start, page_size)?))
    }

    fn get_all(&self) -> Result<Vec<Measurement>, RepoError> {
        Ok(Self::decode_entries(self.store.scan()?))
    }

    fn delete(&self, m: &Measurement) -> Result<(), RepoError> {
        self.store.delete(&m.key())
    }

    fn get_last(&self) -> Result<Measurement, RepoError> {
        match self.store.last()? {
            Some((_, value)) => Ok(serde_json::from_str(&value)?),
            None => Err(RepoError::NoElements),
        }
    }
}
