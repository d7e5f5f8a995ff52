use actix_web::HttpResponse;
use chrono::Utc;
use serde_json::json;

pub mod appointments;
pub mod auth;
pub mod chats;
pub mod health;
pub mod medicines;
pub mod monitoring;
pub mod notifications;
pub mod reports;
pub mod users;

// Handler for the API root
pub async fn api_info() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "HEALTHA API",
        "data": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

// Liveness probe
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "success": false,
        "message": "Endpoint tidak ditemukan",
    }))
}
