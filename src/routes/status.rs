//! Operational HTTP endpoints next to the upgrade path.

use crate::error::AppError;
use crate::models::UserId;
use crate::state::AppState;
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde_json::json;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Endpoint: GET /api/v1/ws/status/{user_id}
pub async fn ws_status(
    path: web::Path<UserId>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let connection_count = state.registry.connection_count(user_id);

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "connected": connection_count > 0,
        "connection_count": connection_count
    })))
}

/// Endpoint: GET /api/v1/ws/metrics
pub async fn ws_metrics(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let total_connections = state.registry.total_connections();
    let connected_users = state.registry.connected_users_count();

    Ok(HttpResponse::Ok().json(json!({
        "total_connections": total_connections,
        "connected_users": connected_users,
        "average_connections_per_user": if connected_users > 0 {
            total_connections as f64 / connected_users as f64
        } else {
            0.0
        },
        "meeting_rooms": state.meeting.rooms().room_count()
    })))
}

/// Live-notification hand-off from the HTTP services.
///
/// Endpoint: POST /api/v1/ws/notify/{user_id}
pub async fn send_user_notification(
    path: web::Path<UserId>,
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let recipient_id = path.into_inner();
    let fields = body
        .as_object()
        .ok_or_else(|| AppError::BadRequest("notification body must be a JSON object".into()))?;
    let text = |key: &str, default: &str| {
        fields
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    };

    let report = state
        .chat
        .notify(
            recipient_id,
            text("notification_type", "notification"),
            text("title", "Notification"),
            text("body", ""),
            fields.get("data").cloned(),
        )
        .await;
    let active_connections = state.registry.connection_count(recipient_id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "recipient_id": recipient_id,
        "active_connections": active_connections,
        "delivered": report.delivered
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/ws")
            .route("/status/{user_id}", web::get().to(ws_status))
            .route("/metrics", web::get().to(ws_metrics))
            .route("/notify/{user_id}", web::post().to(send_user_notification)),
    );
}
