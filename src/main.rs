use emlog::config::ConfigBases;
use emlog::status::APP_STATUS;
use emlog::{
    get_config_or_panic, ApiManager, MeasurementCache, MeasurementRepo, MemoryStore, MeterSession,
    PollScheduler, SerialLink, SessionSettings, SledStore,
};
use log::{debug, error, info, warn};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let default_filter = std::env::var("EMLOG_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let meter_config = get_config_or_panic!("meter", ConfigBases::Meter);
    let cache_config = get_config_or_panic!("cache", ConfigBases::Cache);

    let repo: Arc<dyn MeasurementRepo> = if cache_config.persistent {
        match SledStore::open(&cache_config.path) {
            Ok(store) => Arc::new(MeasurementCache::new(store)),
            Err(e) => {
                error!("Unable to open cache {}: {e}", cache_config.path);
                return Err(std::io::Error::other(e.to_string()));
            }
        }
    } else {
        info!("Cache is not persistent, measurements are lost on exit");
        Arc::new(MeasurementCache::new(MemoryStore::new()))
    };

    let session = Arc::new(MeterSession::new(
        SerialLink::new(&meter_config.port_name, meter_config.baud_rate),
        SessionSettings::from(&meter_config),
    ));
    info!(
        "Reading meter on {} every {}s",
        meter_config.port_name, meter_config.interval
    );

    /* Poll the meter, the outcome feeds the health endpoint */
    let scheduler = PollScheduler::new(meter_config.interval());
    let poll_repo = repo.clone();
    let started = scheduler.start(move |tick| {
        let session = session.clone();
        let repo = poll_repo.clone();
        async move {
            debug!("Polling meter at {tick}");
            match session.read_measurement(repo.as_ref()).await {
                Ok(m) => APP_STATUS.write().await.record_success(m.timestamp),
                Err(e) => {
                    error!("Polling the meter failed: {e}");
                    APP_STATUS.write().await.record_failure(e.to_string());
                }
            }
        }
    });
    if let Err(e) = started {
        error!("Unable to start the poll scheduler: {e}");
        return Err(std::io::Error::other(e.to_string()));
    }

    /* Run our api gateway now */
    let api = ApiManager::new(repo);
    let api_task = tokio::spawn(async move {
        if let Err(e) = api.start_thread().await {
            error!("Webserver stopped: {e}");
        }
    });

    info!("All modules started, now waiting for a signal to exit");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for the shutdown signal: {e}");
    }
    info!("Shutting down");

    if let Err(e) = scheduler.stop(meter_config.stop_timeout()).await {
        warn!("Stopping the poll scheduler: {e}");
    }
    api_task.abort();
    Ok(())
}
