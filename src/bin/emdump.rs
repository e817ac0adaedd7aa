use emlog::cache::{MeasurementCache, SledStore};
use emlog::config::ConfigBases;
use emlog::dump::CacheDumper;
use emlog::get_config_or_panic;
use log::error;
use std::path::Path;
use std::process::ExitCode;

/// Dumps a cache as JSON lines to stdout. The cache directory is taken from
/// the first argument or from the cache section of the configuration.
fn main() -> ExitCode {
    let default_filter = std::env::var("EMLOG_LOG_LEVEL").unwrap_or("warn".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let path = match std::env::args().nth(1) {
        Some(p) => p,
        None => get_config_or_panic!("cache", ConfigBases::Cache).path,
    };

    if !Path::new(&path).exists() {
        error!("No cache at {path}");
        return ExitCode::FAILURE;
    }

    // sled holds a lock on the directory, so this fails while emlog runs
    let store = match SledStore::open(&path) {
        Ok(s) => s,
        Err(e) => {
            error!("Unable to open cache {path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let cache = MeasurementCache::new(store);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match CacheDumper::new(&cache).dump(&mut out) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Dumping {path} failed: {e}");
            ExitCode::FAILURE
        }
    }
}
