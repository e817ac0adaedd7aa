use log::{debug, info};
use std::io::Write;

use crate::cache::{MeasurementRepo, RepoError};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Writes cached measurements as JSON lines, oldest first.
pub struct CacheDumper<'a> {
    repo: &'a dyn MeasurementRepo,
    page_size: usize,
}

impl<'a> CacheDumper<'a> {
    pub fn new(repo: &'a dyn MeasurementRepo) -> Self {
        CacheDumper { repo, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns the number of measurements written.
    pub fn dump<W: Write>(&self, out: &mut W) -> Result<usize, RepoError> {
        let mut written = 0;
        let mut page = 0;
        loop {
            let measurements = match self.repo.get_page(page, self.page_size) {
                Ok(m) => m,
                Err(RepoError::NoElements) => break,
                Err(e) => return Err(e),
            };
            debug!("Dumping page {page} with {} measurements", measurements.len());
            for m in &measurements {
                serde_json::to_writer(&mut *out, m)?;
                out.write_all(b"\n")?;
                written += 1;
            }
            page += 1;
        }
        out.flush()?;
        info!("Dumped {written} measurements");
        Ok(written)
    }
}
