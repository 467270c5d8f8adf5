use thiserror::Error;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::models::UserId;

#[derive(Error, Debug)]
pub enum MatchmakerError {
    #[error("User {0} is already in the matching queue")]
    AlreadyQueued(UserId),

    #[error("User {0} has no available match slots")]
    NoAvailableSlots(UserId),

    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request data: {0}")]
    ValidationError(String),

    /// A pairing pass failed and its claims were rolled back.
    #[error("Batch pass failed: {0}")]
    BatchPassFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ResponseError for MatchmakerError {
    fn error_response(&self) -> HttpResponse {
        match self {
            MatchmakerError::AlreadyQueued(_) => {
                HttpResponse::Conflict().json(json!({
                    "error": "already_queued",
                    "message": self.to_string()
                }))
            }
            MatchmakerError::NoAvailableSlots(_) => {
                HttpResponse::Forbidden().json(json!({
                    "error": "no_available_slots",
                    "message": self.to_string()
                }))
            }
            MatchmakerError::UserNotFound(_) | MatchmakerError::NotFound(_) => {
                HttpResponse::NotFound().json(json!({
                    "error": "not_found",
                    "message": self.to_string()
                }))
            }
            MatchmakerError::ValidationError(msg) => {
                HttpResponse::BadRequest().json(json!({
                    "error": "validation_error",
                    "message": msg
                }))
            }
            MatchmakerError::BatchPassFailure(msg)
            | MatchmakerError::Storage(msg)
            | MatchmakerError::Scheduler(msg)
            | MatchmakerError::Internal(msg) => {
                log::error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(json!({
                    "error": "internal_error",
                    "message": "An internal server error occurred"
                }))
            }
        }
    }
}
