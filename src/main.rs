// JSON server over the reconciliation core.
// TransLink South East Queensland: static GTFS + GTFS-RT vehicle positions and trip updates.

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::time;

use seq_transit_core::scheduler::{Feed, PollReport, RefreshScheduler};
use seq_transit_core::{Config, Region};

#[derive(Clone)]
struct AppState {
    scheduler: Arc<Mutex<RefreshScheduler>>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

fn lock_failed(e: impl std::fmt::Display) -> HttpResponse {
    error!("Failed to lock scheduler: {}", e);
    HttpResponse::InternalServerError().json(ApiResponse::<String>::error(
        "Failed to read transit data".to_string(),
    ))
}

// ============================================================================
// API Endpoints
// ============================================================================

#[derive(Deserialize)]
struct StopsQuery {
    route: Option<String>,
    region: Option<String>,
}

async fn get_enriched_stops(
    state: web::Data<AppState>,
    query: web::Query<StopsQuery>,
) -> HttpResponse {
    let stops = match state.scheduler.lock() {
        Ok(scheduler) => scheduler.get_enriched_stops(),
        Err(e) => return lock_failed(e),
    };

    let filtered: Vec<_> = stops
        .iter()
        .filter(|s| {
            query
                .route
                .as_deref()
                .is_none_or(|r| s.route_short_name.as_deref() == Some(r))
        })
        .filter(|s| {
            query
                .region
                .as_deref()
                .is_none_or(|r| s.region.map(|region| region.label()) == Some(r))
        })
        .collect();

    info!("Stops requested: {} of {}", filtered.len(), stops.len());
    HttpResponse::Ok().json(ApiResponse::success(filtered))
}

async fn get_route_shape(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (route_id, direction) = path.into_inner();

    match state.scheduler.lock() {
        Ok(scheduler) => {
            let segments = scheduler.get_route_shape(&route_id, &direction);
            info!(
                "Shape requested for route {} direction {}: {} segments",
                route_id,
                direction,
                segments.len()
            );
            HttpResponse::Ok().json(ApiResponse::success(segments))
        }
        Err(e) => lock_failed(e),
    }
}

async fn get_merged_vehicles(state: web::Data<AppState>) -> HttpResponse {
    match state.scheduler.lock() {
        Ok(scheduler) => {
            let merged = scheduler.get_merged_vehicles();
            info!("Vehicles requested: {} records", merged.len());
            HttpResponse::Ok().json(ApiResponse::success(&*merged))
        }
        Err(e) => lock_failed(e),
    }
}

async fn get_schedule_delays(state: web::Data<AppState>) -> HttpResponse {
    let delays = match state.scheduler.lock() {
        Ok(scheduler) => scheduler.get_schedule_delays(),
        Err(e) => return lock_failed(e),
    };

    // Only rows with a realtime report; the full left join is mostly empty.
    let observed: Vec<_> = delays
        .iter()
        .filter(|d| d.realtime_timestamp.is_some())
        .collect();
    info!("Schedule delays requested: {} observed", observed.len());
    HttpResponse::Ok().json(ApiResponse::success(observed))
}

async fn get_regions() -> HttpResponse {
    let regions: Vec<_> = [
        Region::Brisbane,
        Region::GoldCoast,
        Region::SunshineCoast,
        Region::Other,
    ]
    .iter()
    .map(|r| r.label())
    .collect();
    HttpResponse::Ok().json(ApiResponse::success(regions))
}

async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    match state.scheduler.lock() {
        Ok(scheduler) => {
            HttpResponse::Ok().json(ApiResponse::success(scheduler.stats(chrono::Utc::now())))
        }
        Err(e) => lock_failed(e),
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "SEQ transit reconciliation",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

async fn run_poll(scheduler: Arc<Mutex<RefreshScheduler>>) -> Result<PollReport, String> {
    tokio::task::spawn_blocking(move || match scheduler.lock() {
        Ok(mut scheduler) => Ok(scheduler.poll()),
        Err(e) => Err(format!("Failed to lock scheduler: {}", e)),
    })
    .await
    .map_err(|e| format!("Refresh task panicked: {}", e))?
}

async fn force_refresh(state: web::Data<AppState>) -> HttpResponse {
    info!("Manual refresh requested");

    match state.scheduler.lock() {
        Ok(mut scheduler) => {
            scheduler.force_refresh(Feed::Static);
            scheduler.force_refresh(Feed::Realtime);
        }
        Err(e) => return lock_failed(e),
    }

    match run_poll(state.scheduler.clone()).await {
        Ok(report) => HttpResponse::Ok().json(ApiResponse::success(report)),
        Err(e) => {
            error!("Manual refresh failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<String>::error(e))
        }
    }
}

// ============================================================================
// Background Task
// ============================================================================

async fn data_refresh_task(scheduler: Arc<Mutex<RefreshScheduler>>, every: std::time::Duration) {
    let mut interval = time::interval(every);

    loop {
        interval.tick().await;

        match run_poll(scheduler.clone()).await {
            Ok(report) => info!(
                "Poll: static {:?}, realtime {:?}",
                report.static_data, report.realtime
            ),
            Err(e) => warn!("Poll failed: {}", e),
        }
    }
}

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(scheduler: RefreshScheduler) -> std::io::Result<()> {
    let every = scheduler.config().realtime_interval;
    let app_state = AppState {
        scheduler: Arc::new(Mutex::new(scheduler)),
    };

    let refresh_scheduler = app_state.scheduler.clone();
    tokio::spawn(async move {
        data_refresh_task(refresh_scheduler, every).await;
    });

    info!("Server running on http://0.0.0.0:8080 (poll every {}s)", every.as_secs());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api")
                    .route("/stops", web::get().to(get_enriched_stops))
                    .route("/shape/{route_id}/{direction}", web::get().to(get_route_shape))
                    .route("/vehicles", web::get().to(get_merged_vehicles))
                    .route("/delays", web::get().to(get_schedule_delays))
                    .route("/regions", web::get().to(get_regions))
                    .route("/stats", web::get().to(get_stats))
                    .route("/refresh", web::post().to(force_refresh)),
            )
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Built outside the async runtime: the blocking HTTP client must not be
    // created or dropped on a runtime thread.
    let scheduler = match RefreshScheduler::with_http(Config::default()) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Cannot start: {}", e);
            std::process::exit(1);
        }
    };

    actix_web::rt::System::new().block_on(run_server(scheduler))
}
