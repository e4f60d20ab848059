use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    config::{AppConfig, Env},
    error::ApiError,
    models::{Actor, Role},
    repository::RepositoryState,
};

/// Header accepted in `Env::Local` in place of a bearer token.
pub const LOCAL_ACTOR_HEADER: &str = "x-actor-id";

/// Claims
///
/// Payload expected inside the HS256 bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the actor id, looked up in the `actors` table for its current role.
    pub sub: String,
    /// Expiration Time (exp).
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// Actor Extractor Implementation
///
/// Makes `Actor` usable as a handler argument. Resolution order:
/// 1. An actor already placed in the request extensions by the role guard.
/// 2. Local bypass: the `x-actor-id` header, only in `Env::Local`, and only for known actors.
/// 3. Bearer token validation, then a repository lookup so deleted actors are rejected.
///
/// Rejection: 401 on any credential failure, 500 if the repository fails.
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(actor.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get(LOCAL_ACTOR_HEADER)
                .and_then(|value| value.to_str().ok());
            if let Some(actor_id) = bypass_id {
                if let Some(actor) = repo.get_actor(actor_id).await? {
                    return Ok(actor);
                }
            }
        }
        // Production, or a failed bypass: fall through to token validation.

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let claims = decode_claims(token, &config.jwt_secret)?;

        repo.get_actor(&claims.sub)
            .await?
            .ok_or(ApiError::Unauthorized)
    }
}

/// Validates signature and expiry of a bearer token.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            ApiError::Unauthorized
        })
}

/// RoleGuard
///
/// State for the authorization step of one route: the shared application state
/// plus the set of roles admitted on that route.
#[derive(Clone)]
pub struct RoleGuard {
    pub app: AppState,
    pub allowed: &'static [Role],
}

impl RoleGuard {
    pub fn new(app: AppState, allowed: &'static [Role]) -> Self {
        Self { app, allowed }
    }
}

/// require_roles
///
/// The single authorization step in front of every action route. Resolves the
/// caller once and admits it if its role is any of the allowed roles. The
/// resolved actor is attached to the request for the handler.
pub async fn require_roles(
    State(guard): State<RoleGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&guard.app, guard.allowed, request, next).await
}

/// Single-role guard for patients.
pub async fn authenticate_patient(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, &[Role::Patient], request, next).await
}

/// Single-role guard for doctors.
pub async fn authenticate_doctor(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, &[Role::Doctor], request, next).await
}

/// Single-role guard for receptionists.
pub async fn authenticate_receptionist(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, &[Role::Receptionist], request, next).await
}

async fn authorize(
    state: &AppState,
    allowed: &[Role],
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let actor = Actor::from_request_parts(&mut parts, state).await?;

    if !allowed.contains(&actor.role) {
        tracing::warn!(
            actor_id = %actor.id,
            role = %actor.role,
            allowed = ?allowed,
            "role not allowed on route"
        );
        return Err(ApiError::Forbidden);
    }

    tracing::debug!(actor_id = %actor.id, role = %actor.role, "actor authorized");

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}
