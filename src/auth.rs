use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    models::User,
    repository::RepositoryState,
};

/// Header accepted in `Env::Local` in place of a bearer token.
pub const LOCAL_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload expected inside the bearer JWT. Tokens are issued by the external auth
/// service and signed with the shared `JWT_SECRET`; this service only verifies them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the profile id. Used to load the current role from `profiles`.
    pub sub: Uuid,
    /// Expiration Time (exp): seconds since the epoch after which the token is refused.
    pub exp: usize,
    /// Issued At (iat): seconds since the epoch when the token was signed.
    pub iat: usize,
}

/// AuthUser
///
/// The principal behind an authenticated request, handed to every menu entry point
/// so the access gate can decide what it may see and change.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Profile id, equal to the token subject.
    pub id: Uuid,
    /// Role read from `profiles` at request time, not from the token, so a role change
    /// applies on the next request. Compared against the configured editor roles.
    pub role: String,
}

/// AuthUser extractor
///
/// Resolves the principal for any handler that takes `AuthUser` as an argument, and
/// backs the `auth_middleware` layer on the authenticated and admin routers.
///
/// The steps:
/// 1. Dependency resolution: the repository and `AppConfig` from application state.
/// 2. Local bypass: in `Env::Local` a known profile id in `x-user-id` is enough.
/// 3. Token extraction: `Authorization: Bearer <jwt>`.
/// 4. Token validation: signature and expiry against `JWT_SECRET`.
/// 5. Profile lookup: the subject must still exist; its role is loaded fresh.
///
/// Rejection: `401 Unauthorized` when the caller cannot be identified, `500` when the
/// profile store fails to answer.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    // The repository resolves profiles.
    RepositoryState: FromRef<S>,
    // The config carries the JWT secret and the environment.
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Dependency Resolution
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 2. Local Development Bypass
        // Unknown or malformed ids fall through to the bearer flow below.
        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get(LOCAL_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok());
            if let Some(user_id) = bypass_id {
                if let Some(user) = lookup_profile(&repo, user_id).await? {
                    return Ok(AuthUser {
                        id: user.id,
                        role: user.role,
                    });
                }
            }
        }

        // 3. Token Extraction
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // 4. Token Validation
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            StatusCode::UNAUTHORIZED
        })?;

        // 5. Profile Lookup
        // The profile may have been removed after the token was issued.
        let user = lookup_profile(&repo, token_data.claims.sub)
            .await?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(AuthUser {
            id: user.id,
            role: user.role,
        })
    }
}

/// Loads a profile, turning a store failure into `500` so an outage is not reported
/// as bad credentials.
async fn lookup_profile(repo: &RepositoryState, id: Uuid) -> Result<Option<User>, StatusCode> {
    repo.get_user(id).await.map_err(|e| {
        tracing::error!(error = %e, user_id = %id, "profile lookup failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
