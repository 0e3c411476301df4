//! JWT identity layer.
//!
//! Every economy-affecting route requires a resolved `(uid, display name,
//! role)` identity; admin routes additionally require [`Role::Admin`].
//! Tokens are issued by the login endpoint and validated by the middleware,
//! which also rejects banned users before any ledger mutation can happen.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::economy::admin::AdminOps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

/// Resolved identity, inserted into request extensions by the middleware.
#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: String,
    pub name: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub struct JwtHandler {
    secret: String,
    expiration_hours: i64,
}

impl JwtHandler {
    pub fn new(secret: String) -> Self {
        Self { secret, expiration_hours: 24 }
    }

    pub fn issue(&self, uid: &str, name: &str, role: Role) -> anyhow::Result<(String, usize)> {
        let exp = Utc::now()
            .checked_add_signed(chrono::Duration::hours(self.expiration_hours))
            .ok_or_else(|| anyhow::anyhow!("invalid expiry timestamp"))?
            .timestamp() as usize;
        let claims = Claims {
            sub: uid.to_string(),
            name: name.to_string(),
            role,
            exp,
        };
        debug!(uid, ?role, "issuing token");
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok((token, (self.expiration_hours * 3600) as usize))
    }

    pub fn validate(&self, token: &str) -> anyhow::Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(decoded.claims)
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<JwtHandler>,
    pub admin_ops: AdminOps,
    pub admin_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    #[serde(default)]
    pub admin_password: Option<String>,
}

/// POST /api/auth/login. A valid `admin_password` upgrades the token to the
/// admin role; everyone else gets a member token keyed on their username.
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AuthError> {
    let name = payload.username.trim().to_string();
    if name.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }
    let uid = name.to_lowercase();

    if state
        .admin_ops
        .is_banned(&uid)
        .map_err(|_| AuthError::Internal)?
    {
        warn!(uid, "banned user attempted login");
        return Err(AuthError::Banned);
    }

    let role = match payload.admin_password.as_deref() {
        Some(given) if !state.admin_password.is_empty() && given == state.admin_password => {
            Role::Admin
        }
        Some(_) => return Err(AuthError::InvalidCredentials),
        None => Role::Member,
    };

    let (token, expires_in) = state
        .jwt
        .issue(&uid, &name, role)
        .map_err(|_| AuthError::Internal)?;
    Ok(Json(json!({
        "success": true,
        "token": token,
        "expires_in": expires_in,
        "uid": uid,
        "role": role,
    })))
}

/// Validates the bearer token, rejects banned users, and inserts an
/// [`Identity`] into request extensions.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?;

    let claims = state
        .jwt
        .validate(token)
        .map_err(|_| AuthError::InvalidToken)?;

    if state
        .admin_ops
        .is_banned(&claims.sub)
        .map_err(|_| AuthError::Internal)?
    {
        return Err(AuthError::Banned);
    }

    req.extensions_mut().insert(Identity {
        uid: claims.sub,
        name: claims.name,
        role: claims.role,
    });
    Ok(next.run(req).await)
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    InvalidCredentials,
    Banned,
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing authorization token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid or expired token"),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid credentials"),
            AuthError::Banned => (StatusCode::FORBIDDEN, "this account is banned"),
            AuthError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
        };
        let body = Json(json!({"success": false, "message": message}));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_validate_roundtrip() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string());
        let (token, expires_in) = handler.issue("u1", "User One", Role::Member).unwrap();
        assert_eq!(expires_in, 24 * 3600);

        let claims = handler.validate(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.name, "User One");
        assert_eq!(claims.role, Role::Member);
    }

    #[test]
    fn tampered_and_cross_secret_tokens_fail() {
        let h1 = JwtHandler::new("secret-one".to_string());
        let h2 = JwtHandler::new("secret-two".to_string());
        let (token, _) = h1.issue("u1", "User", Role::Admin).unwrap();

        assert!(h2.validate(&token).is_err());
        assert!(h1.validate("not.a.token").is_err());
    }

    #[test]
    fn admin_role_survives_the_token() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string());
        let (token, _) = handler.issue("boss", "Boss", Role::Admin).unwrap();
        assert_eq!(handler.validate(&token).unwrap().role, Role::Admin);
    }
}
