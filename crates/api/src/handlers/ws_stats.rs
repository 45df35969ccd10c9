//! Connection counters for the notification hub.

use axum::extract::State;
use axum::Json;
use hailango_events::ConnectionInfo;
use serde::Serialize;

use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WsStats {
    pub connected_users: usize,
    pub total_connections: usize,
}

/// GET /api/v1/ws/stats
pub async fn ws_stats(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Json<DataResponse<WsStats>> {
    Json(DataResponse {
        data: WsStats {
            connected_users: state.hub.connected_user_count().await,
            total_connections: state.hub.total_connection_count().await,
        },
    })
}

/// GET /api/v1/ws/connections
///
/// The caller's own live connections, oldest first.
pub async fn my_connections(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Json<DataResponse<Vec<ConnectionInfo>>> {
    Json(DataResponse {
        data: state.hub.connections_for_user(auth.user_id).await,
    })
}
