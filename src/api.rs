//! HTTP routes
//!
//! `/ws` runs its own admission through the connection gate. Everything
//! under `/api` sits behind [`auth::require_user`].

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::{cookie::Cookie, CookieJar};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{self, AuthenticatedUser};
use crate::revocation::RevocationStore;
use crate::state::AppState;
use crate::types::Participant;
use crate::ws;

/// Identity behind the presented token
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub user: Participant,
    /// Token expiry, unix seconds
    pub expires_at: u64,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/api/session", get(session))
        .route("/api/logout", post(logout))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ));

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(api_routes)
        .with_state(state)
}

/// Describe the caller's session.
///
/// GET /api/session
pub async fn session(Extension(auth): Extension<AuthenticatedUser>) -> Json<SessionInfo> {
    Json(SessionInfo {
        user: auth.user,
        expires_at: auth.claims.exp,
    })
}

/// Revoke the presented token and clear the auth cookie.
///
/// POST /api/logout
///
/// Sockets already bound with the token stay open; new handshakes and API
/// calls with it are rejected until it expires.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> Response {
    state
        .revocations()
        .revoke(&auth.token, Some(auth.claims.exp))
        .await;
    tracing::info!(user = %auth.user.id, "Token revoked on logout");

    let jar = jar.remove(Cookie::from(state.gate.cookie_name().to_string()));
    (jar, StatusCode::NO_CONTENT).into_response()
}
