use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::cache::{MeasurementRepo, RepoError};
use crate::config::ConfigBases;
use crate::get_config_or_panic;
use crate::models::{Measurement, Reading};
use crate::status::{get_app_status, AppStatus, PollOutcome};

pub struct ApiManager {
    repo: Arc<dyn MeasurementRepo>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MeasurementsResponse {
    pub count: usize,
    pub first_time: Option<DateTime<Utc>>,
    pub last_time: Option<DateTime<Utc>>,
    pub measurements: Vec<Measurement>,
}

impl MeasurementsResponse {
    fn new(measurements: Vec<Measurement>) -> Self {
        MeasurementsResponse {
            count: measurements.len(),
            first_time: measurements.first().map(|m| m.timestamp),
            last_time: measurements.last().map(|m| m.timestamp),
            measurements,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub last_outcome: PollOutcome,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub polls: u64,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Zero based page number, needs `size`
    pub page: Option<String>,
    /// Page size, 0 or missing returns everything
    pub size: Option<String>,
}

/// Validated `page`/`size` query parameters.
#[derive(Debug, PartialEq)]
pub struct Pagination {
    pub page: usize,
    pub size: usize,
}

fn parse_param(name: &str, raw: Option<&str>, problems: &mut Vec<String>) -> usize {
    let raw = match raw.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return 0,
    };
    match raw.parse::<i64>() {
        Err(e) => {
            problems.push(format!("{name} parameter error: {e}"));
            0
        }
        Ok(v) if v < 0 => {
            problems.push(format!("{name} parameter cannot be negative"));
            0
        }
        Ok(v) => match usize::try_from(v) {
            Ok(v) => v,
            Err(e) => {
                problems.push(format!("{name} parameter error: {e}"));
                0
            }
        },
    }
}

impl Pagination {
    /// Every problem found is listed in the error, not only the first one.
    pub fn parse(page: Option<&str>, size: Option<&str>) -> Result<Self, String> {
        let mut problems = Vec::new();
        let page = parse_param("page", page, &mut problems);
        let size = parse_param("size", size, &mut problems);
        if page > 0 && size == 0 {
            problems.push("non zero page parameter requires non zero size".to_string());
        }

        if problems.is_empty() {
            Ok(Pagination { page, size })
        } else {
            Err(format!("bad pagination parameters: {}", problems.join("; ")))
        }
    }

    pub fn paginate(&self) -> bool {
        self.size > 0
    }
}

/// First and last lookups on top of a repository.
struct Pager<'a> {
    repo: &'a dyn MeasurementRepo,
}

impl<'a> Pager<'a> {
    fn first(&self) -> Result<Measurement, RepoError> {
        self.repo
            .get_page(0, 1)?
            .into_iter()
            .next()
            .ok_or(RepoError::NoElements)
    }

    fn last(&self) -> Result<Measurement, RepoError> {
        self.repo.get_last()
    }
}

fn error_response(e: &RepoError) -> HttpResponse {
    let body = ErrorResponse { error: e.to_string() };
    match e {
        RepoError::BadArguments => HttpResponse::BadRequest().json(body),
        RepoError::NoElements | RepoError::NotFound(_) => HttpResponse::NotFound().json(body),
        _ => {
            error!("Cache backend error: {e}");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn bad_request(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse { error: message })
}

#[utoipa::path(get,
    path = "/measurements",
    summary = "All cached measurements, oldest first, optionally paginated",
    params(PageQuery),
    responses(
        (status = 200, description = "The requested measurements", body = MeasurementsResponse),
        (status = 400, description = "Invalid pagination parameters", body = ErrorResponse),
        (status = 404, description = "The page is beyond the cached data", body = ErrorResponse),
        (status = 500, description = "Cache backend failure", body = ErrorResponse)
    ),
)]
async fn get_measurements(
    repo: web::Data<dyn MeasurementRepo>,
    query: web::Query<PageQuery>,
) -> HttpResponse {
    let pagination = match Pagination::parse(query.page.as_deref(), query.size.as_deref()) {
        Ok(p) => p,
        Err(msg) => return bad_request(msg),
    };

    let result = if pagination.paginate() {
        repo.get_page(pagination.page, pagination.size)
    } else {
        repo.get_all()
    };

    match result {
        Ok(measurements) => HttpResponse::Ok().json(MeasurementsResponse::new(measurements)),
        Err(e) => error_response(&e),
    }
}

#[utoipa::path(get,
    path = "/measurements/first",
    summary = "The oldest cached measurement",
    responses(
        (status = 200, description = "Oldest measurement", body = Measurement),
        (status = 404, description = "The cache is empty", body = ErrorResponse),
        (status = 500, description = "Cache backend failure", body = ErrorResponse)
    ),
)]
async fn get_first_measurement(repo: web::Data<dyn MeasurementRepo>) -> HttpResponse {
    match (Pager { repo: repo.get_ref() }).first() {
        Ok(m) => HttpResponse::Ok().json(m),
        Err(e) => error_response(&e),
    }
}

#[utoipa::path(get,
    path = "/measurements/last",
    summary = "The newest cached measurement",
    responses(
        (status = 200, description = "Newest measurement", body = Measurement),
        (status = 404, description = "The cache is empty", body = ErrorResponse),
        (status = 500, description = "Cache backend failure", body = ErrorResponse)
    ),
)]
async fn get_last_measurement(repo: web::Data<dyn MeasurementRepo>) -> HttpResponse {
    match (Pager { repo: repo.get_ref() }).last() {
        Ok(m) => HttpResponse::Ok().json(m),
        Err(e) => error_response(&e),
    }
}

/* Anything else below /measurements/, first and last match as case insensitive prefix */
async fn measurements_subpath(
    repo: web::Data<dyn MeasurementRepo>,
    query: web::Query<PageQuery>,
    tail: web::Path<String>,
) -> HttpResponse {
    let tail = tail.into_inner().to_lowercase();
    if tail.is_empty() {
        get_measurements(repo, query).await
    } else if tail.starts_with("first") {
        get_first_measurement(repo).await
    } else if tail.starts_with("last") {
        get_last_measurement(repo).await
    } else {
        warn!("Unknown measurements path /measurements/{tail}");
        bad_request(format!("unknown path /measurements/{tail}"))
    }
}

fn health_response(app_status: &AppStatus) -> HttpResponse {
    let system_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let healthy = app_status.is_healthy();

    let response = HealthResponse {
        status: if healthy { "healthy".to_string() } else { "unhealthy".to_string() },
        last_outcome: app_status.last_outcome.clone(),
        last_success: app_status.last_success,
        last_error: app_status.last_error.clone(),
        consecutive_failures: app_status.consecutive_failures,
        polls: app_status.polls,
        uptime_seconds: app_status.uptime_seconds(),
        timestamp: system_time,
    };

    if healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

#[utoipa::path(get,
    path = "/health",
    summary = "Health check endpoint for container monitoring",
    responses(
        (status = 200, description = "The last poll succeeded", body = HealthResponse),
        (status = 503, description = "No successful poll yet or the last one failed", body = HealthResponse)
    ),
)]
async fn health_check() -> impl Responder {
    health_response(&get_app_status().await)
}

#[derive(OpenApi)]
#[openapi(
    info(description = "emlog API description"),
    paths(
        health_check,
        get_measurements,
        get_first_measurement,
        get_last_measurement,
    ),
    components(schemas(MeasurementsResponse, Measurement, Reading, ErrorResponse, HealthResponse, PollOutcome))
)]
struct ApiDoc;

/// Measurement and health routes, shared by the server and the tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/measurements", web::get().to(get_measurements))
        .route("/measurements/first", web::get().to(get_first_measurement))
        .route("/measurements/last", web::get().to(get_last_measurement))
        .route("/measurements/{tail:.*}", web::get().to(measurements_subpath));
}

impl ApiManager {
    pub fn new(repo: Arc<dyn MeasurementRepo>) -> Self {
        return ApiManager { repo };
    }

    pub async fn start_thread(&self) -> std::io::Result<()> {
        let config = get_config_or_panic!("httpd", ConfigBases::Httpd);

        if !config.enabled {
            info!("Webserver disabled in config, measurements are only cached");
            return Ok(());
        }

        let repo = web::Data::from(self.repo.clone());
        info!("Starting webserver on port {}", config.port);

        let server = HttpServer::new(move || {
            App::new()
                .app_data(repo.clone())
                .configure(routes)
                .service(
                    SwaggerUi::new("/swagger-ui/{_:.*}")
                        .url("/api/v1/openapi.json", ApiDoc::openapi()),
                )
        })
        .bind(format!("0.0.0.0:{}", config.port))?
        .run();
        server.await
    }
}
