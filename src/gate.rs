//! Connection admission
//!
//! Every socket handshake walks the same fixed sequence and stops at the
//! first failing check:
//!
//! 1. project id is present and well formed
//! 2. project exists in the room directory
//! 3. a token is present (cookie, bearer header, handshake field)
//! 4. the token is not revoked
//! 5. signature and expiry verify
//! 6. bind identity and room, then join the broadcaster
//!
//! Room checks always run before credential checks, on every code path.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::auth::{pick_token, AuthConfig, AuthError, Claims, TokenValidator};
use crate::broadcast::{MemberSender, RoomBroadcaster};
use crate::revocation::RevocationStore;
use crate::rooms::{RoomDirectory, RoomError, RoomRecord};
use crate::types::{Participant, RoomId, SessionId};

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Start,
    RoomResolved,
    TokenExtracted,
    RevocationChecked,
    SignatureVerified,
    Bound,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl GateError {
    pub fn code(&self) -> &'static str {
        match self {
            GateError::Room(e) => e.code(),
            GateError::Auth(e) => e.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Room(RoomError::InvalidId) => StatusCode::BAD_REQUEST,
            GateError::Room(RoomError::NotFound) => StatusCode::NOT_FOUND,
            GateError::Room(RoomError::Lookup(_)) => StatusCode::SERVICE_UNAVAILABLE,
            GateError::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "code": self.code(), "msg": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Raw handshake inputs, exactly as the transport delivered them
#[derive(Debug, Clone, Default)]
pub struct HandshakeInputs {
    /// `projectId` query parameter
    pub project_id: Option<String>,
    /// Value of the token cookie
    pub cookie_token: Option<String>,
    /// Full `Authorization` header value
    pub authorization: Option<String>,
    /// Token supplied in the handshake itself (`token` query parameter)
    pub handshake_token: Option<String>,
}

/// A handshake that passed every check but has not joined its room yet
#[derive(Debug, Clone)]
pub struct Admission {
    pub session_id: SessionId,
    pub user: Participant,
    pub claims: Claims,
    pub room: RoomRecord,
}

/// A connection bound to exactly one room
#[derive(Debug, Clone)]
pub struct Connection {
    pub session_id: SessionId,
    pub room_id: RoomId,
    pub user: Participant,
    pub claims: Claims,
}

impl Admission {
    /// Final transition: register with the broadcaster under the resolved
    /// room. Only admitted handshakes ever reach this point.
    pub fn bind(self, broadcaster: &RoomBroadcaster, tx: MemberSender) -> Connection {
        let room_id = self.room.id;
        broadcaster.join(&room_id, &self.session_id, tx);
        tracing::debug!(
            session = %self.session_id,
            room = %room_id,
            state = ?GateState::Bound,
            "Gate transition"
        );
        Connection {
            session_id: self.session_id,
            room_id,
            user: self.user,
            claims: self.claims,
        }
    }
}

/// Per-process admission gate; each handshake runs through it independently
pub struct ConnectionGate {
    validator: TokenValidator,
    revocations: Arc<dyn RevocationStore>,
    rooms: Arc<dyn RoomDirectory>,
    cookie_name: String,
}

impl ConnectionGate {
    pub fn new(
        config: &AuthConfig,
        revocations: Arc<dyn RevocationStore>,
        rooms: Arc<dyn RoomDirectory>,
    ) -> Self {
        Self {
            validator: TokenValidator::new(config.jwt_secret.as_deref()),
            revocations,
            rooms,
            cookie_name: config.cookie_name.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn revocations(&self) -> &Arc<dyn RevocationStore> {
        &self.revocations
    }

    /// Revocation check followed by signature verification
    pub async fn authenticate(&self, token: &str) -> Result<Claims, AuthError> {
        if self.revocations.is_revoked(token).await {
            return Err(AuthError::Revoked);
        }
        self.validator.validate(token)
    }

    /// Run every check short of joining a room
    pub async fn authorize(&self, inputs: &HandshakeInputs) -> Result<Admission, GateError> {
        let session_id = ulid::Ulid::new().to_string();
        let mut state = GateState::Start;

        let result = self.run_checks(&session_id, inputs, &mut state).await;
        match &result {
            Ok(admission) => tracing::info!(
                session = %session_id,
                room = %admission.room.id,
                user = %admission.user.id,
                "Handshake accepted"
            ),
            Err(e) => tracing::warn!(
                session = %session_id,
                reason = e.code(),
                last_state = ?state,
                "Handshake rejected"
            ),
        }
        result
    }

    /// Authorize and bind in one step
    pub async fn admit(
        &self,
        inputs: &HandshakeInputs,
        broadcaster: &RoomBroadcaster,
        tx: MemberSender,
    ) -> Result<Connection, GateError> {
        Ok(self.authorize(inputs).await?.bind(broadcaster, tx))
    }

    async fn run_checks(
        &self,
        session_id: &str,
        inputs: &HandshakeInputs,
        state: &mut GateState,
    ) -> Result<Admission, GateError> {
        let advance = |state: &mut GateState, next: GateState| {
            tracing::debug!(session = %session_id, state = ?next, "Gate transition");
            *state = next;
        };

        let room_id = inputs
            .project_id
            .as_deref()
            .and_then(RoomId::parse)
            .ok_or(RoomError::InvalidId)?;
        let room = self
            .rooms
            .find_room_by_id(&room_id)
            .await?
            .ok_or(RoomError::NotFound)?;
        advance(state, GateState::RoomResolved);

        let token = pick_token(
            inputs.cookie_token.as_deref(),
            inputs.authorization.as_deref(),
            inputs.handshake_token.as_deref(),
        )?;
        advance(state, GateState::TokenExtracted);

        if self.revocations.is_revoked(&token).await {
            return Err(AuthError::Revoked.into());
        }
        advance(state, GateState::RevocationChecked);

        let claims = self.validator.validate(&token)?;
        let user = claims.participant().ok_or(AuthError::Invalid)?;
        advance(state, GateState::SignatureVerified);

        Ok(Admission {
            session_id: session_id.to_string(),
            user,
            claims,
            room,
        })
    }
}
