//! API endpoints for the matchmaker.
//! Thin JSON wrappers over `MatchmakingService`; the user id comes from the
//! path because authentication happens upstream.

use actix_web::{get, post, put, web, HttpResponse, Responder, ResponseError};
use serde_json::json;
use std::sync::Arc;

use crate::models::{Preferences, UserId};
use crate::service::MatchmakingService;

/// Join the matching queue, or update preferences if already waiting.
///
/// # Returns
/// - 200 OK with the queue status
/// - 400 Bad Request for malformed preferences
/// - 403 Forbidden if the user has no match slots left
/// - 404 Not Found for unknown users
/// - 409 Conflict if the entry is currently being matched
#[post("/queue/{user_id}/join")]
pub async fn join(
    path: web::Path<UserId>,
    preferences: web::Json<Preferences>,
    service: web::Data<Arc<MatchmakingService>>,
) -> impl Responder {
    match service.join_queue(path.into_inner(), preferences.into_inner()).await {
        Ok(queue_status) => HttpResponse::Ok().json(queue_status),
        Err(e) => e.error_response(),
    }
}

/// Leave the queue. Always 200; `left` is false if there was nothing to leave.
#[post("/queue/{user_id}/leave")]
pub async fn leave(
    path: web::Path<UserId>,
    service: web::Data<Arc<MatchmakingService>>,
) -> impl Responder {
    match service.leave_queue(path.into_inner()).await {
        Ok(left) => HttpResponse::Ok().json(json!({ "left": left })),
        Err(e) => e.error_response(),
    }
}

#[put("/queue/{user_id}/preferences")]
pub async fn update_preferences(
    path: web::Path<UserId>,
    preferences: web::Json<Preferences>,
    service: web::Data<Arc<MatchmakingService>>,
) -> impl Responder {
    match service.update_preferences(path.into_inner(), preferences.into_inner()).await {
        Ok(queue_status) => HttpResponse::Ok().json(queue_status),
        Err(e) => e.error_response(),
    }
}

/// Queue length, per-status counts and average wait.
/// Register before `status` so `stats` is not read as a user id.
#[get("/queue/stats")]
pub async fn stats(service: web::Data<Arc<MatchmakingService>>) -> impl Responder {
    match service.get_queue_statistics().await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => e.error_response(),
    }
}

#[get("/queue/{user_id}")]
pub async fn status(
    path: web::Path<UserId>,
    service: web::Data<Arc<MatchmakingService>>,
) -> impl Responder {
    match service.get_queue_status(path.into_inner()).await {
        Ok(queue_status) => HttpResponse::Ok().json(queue_status),
        Err(e) => e.error_response(),
    }
}

/// Run a batch pass immediately (admin).
#[post("/queue/batch")]
pub async fn trigger_batch(service: web::Data<Arc<MatchmakingService>>) -> impl Responder {
    match service.trigger_batch().await {
        Ok(matches) => HttpResponse::Ok().json(json!({
            "matches_created": matches.len(),
            "matches": matches,
        })),
        Err(e) => e.error_response(),
    }
}

/// Registers every queue endpoint in the right order.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(stats)
        .service(trigger_batch)
        .service(join)
        .service(leave)
        .service(update_preferences)
        .service(status);
}
