use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::Id;
use crate::routes::AppState;

/// Lifetime in hours of tokens handed out by `POST /users/login`.
pub const LOGIN_TOKEN_TTL_HOURS: i64 = 24;
/// Lifetime in hours of tokens handed out by `POST /users` (registration).
pub const REGISTRATION_TOKEN_TTL_HOURS: i64 = 100;

/// Legacy header some clients still send instead of `Authorization: Bearer`.
pub const LEGACY_TOKEN_HEADER: &str = "x-auth-token";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUser {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user: TokenUser,
    pub iat: usize,
    pub exp: usize,
}

/// Signs and verifies HS256 session tokens with a shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret)),
            decoding: Arc::new(DecodingKey::from_secret(secret)),
        }
    }

    pub fn issue(
        &self,
        user_id: Id,
        role: Option<String>,
        ttl: chrono::Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let exp = now + ttl;
        let claims = Claims {
            user: TokenUser { id: user_id, role },
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Validate a token (signature and expiry) and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

/// Extractor yielding the caller's verified identity.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Id,
    pub role: Option<String>,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(ApiError::internal("AppState missing from app data")));
        };

        let token = match BearerAuth::from_request(req, pl).into_inner() {
            Ok(bearer) => Some(bearer.token().to_string()),
            Err(_) => req
                .headers()
                .get(LEGACY_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        };
        let Some(token) = token else {
            return ready(Err(ApiError::Unauthorized("No token, authorization denied")));
        };

        match state.tokens.verify(&token) {
            Ok(claims) => ready(Ok(AuthUser { id: claims.user.id, role: claims.user.role })),
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                ready(Err(ApiError::Unauthorized("Token is not valid")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_verify_roundtrip() {
        let svc = TokenService::new(b"unit-test-secret-that-is-32-bytes!!");
        let id = Id::new_v4();
        let token = svc.issue(id, Some("user".into()), chrono::Duration::hours(LOGIN_TOKEN_TTL_HOURS)).unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.user.id, id);
        assert_eq!(claims.user.role.as_deref(), Some("user"));
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn registration_claims_omit_role() {
        let svc = TokenService::new(b"unit-test-secret-that-is-32-bytes!!");
        let token = svc.issue(Id::new_v4(), None, chrono::Duration::hours(REGISTRATION_TOKEN_TTL_HOURS)).unwrap();
        let claims = svc.verify(&token).unwrap();
        assert!(claims.user.role.is_none());
        assert_eq!(claims.exp - claims.iat, 100 * 3600);
    }

    #[test]
    fn other_secret_is_rejected() {
        let a = TokenService::new(b"unit-test-secret-that-is-32-bytes!!");
        let b = TokenService::new(b"a-completely-different-32-byte-key!");
        let token = a.issue(Id::new_v4(), None, chrono::Duration::hours(LOGIN_TOKEN_TTL_HOURS)).unwrap();
        assert!(b.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = TokenService::new(b"unit-test-secret-that-is-32-bytes!!");
        let token = svc.issue(Id::new_v4(), None, chrono::Duration::hours(-2)).unwrap();
        assert!(svc.verify(&token).is_err());
    }
}
