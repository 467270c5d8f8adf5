//! Main entry point for the matchmaker service.
//! Sets up logging and configuration, wires the in-memory collaborators,
//! starts the background scheduler and serves the queue API.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use matchmaker::external::{MemoryProfiles, MemorySlots, ProfileCompatibility, SystemClock};
use matchmaker::matches::MemoryMatchStore;
use matchmaker::models::UserProfile;
use matchmaker::queue::MemoryQueue;
use matchmaker::{api, BackgroundScheduler, Collaborators, MatchingConfig, MatchmakingService, ScheduleIntervals};

/// Main entry point for the matchmaker service.
///
/// # Server Configuration
/// - Binds to 0.0.0.0 on PORT (default 8080)
/// - All endpoints are under /queue
///
/// # Environment Variables
/// See `matchmaker::config` for the MATCHMAKER_* settings.
/// - MATCHMAKER_PROFILES_FILE: JSON array of user profiles to seed the
///   in-memory profile directory and slot accounts with
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Log level can be set via RUST_LOG environment variable
    env_logger::init();

    let config = MatchingConfig::from_env_or_default();
    log::info!("Starting matchmaker with configuration: {:?}", config);

    let profiles = Arc::new(MemoryProfiles::new());
    let slots = Arc::new(MemorySlots::new(config.default_daily_slots));
    let seeded = load_seed_profiles()?;
    for profile in seeded.iter().cloned() {
        slots.register(profile.user_id);
        profiles.upsert(profile);
    }
    log::info!("Seeded {} user profiles", seeded.len());

    let deps = Collaborators {
        queue: Arc::new(MemoryQueue::new()),
        matches: Arc::new(MemoryMatchStore::new()),
        slots,
        compatibility: Arc::new(ProfileCompatibility::new(profiles)),
        clock: Arc::new(SystemClock),
        signals: None,
    };
    let service = Arc::new(MatchmakingService::new(Some(config.clone()), deps));

    let scheduler = BackgroundScheduler::new(service.clone(), ScheduleIntervals::from(&config));
    scheduler
        .start()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .expect("PORT environment variable must be a valid port number");

    log::info!("Starting server on port {}", port);

    let data = web::Data::new(service);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(data.clone())
            .configure(api::configure)
    })
    .bind(("0.0.0.0", port))?
    .run();

    let result = server.await;

    // Let an in-flight pass finish before exiting
    if let Err(e) = scheduler.stop().await {
        log::error!("Scheduler did not stop cleanly: {}", e);
    }
    result
}

fn load_seed_profiles() -> std::io::Result<Vec<UserProfile>> {
    let Ok(path) = std::env::var("MATCHMAKER_PROFILES_FILE") else {
        return Ok(Vec::new());
    };
    let raw = std::fs::read_to_string(&path)?;
    serde_json::from_str(&raw).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Invalid profiles file {}: {}", path, e),
        )
    })
}
