//! Bearer-token authentication for end users and shared-secret
//! verification for the OCR worker callback.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the worker's shared secret.
pub const CALLBACK_SECRET_HEADER: &str = "x-callback-secret";

const TOKEN_DURATION_SECS: i64 = 7 * 24 * 3600;

/// JWT claims issued to end users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// The authenticated principal, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
}

/// HS256 token signing and verification.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
        }
    }

    pub fn create_token(&self, user_id: &str, email: &str) -> jsonwebtoken::errors::Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            exp: now + TOKEN_DURATION_SECS,
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Checks signature and expiry.
    pub fn verify_token(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default()).map(|data| data.claims)
    }
}

/// Rejects requests without a valid `Authorization: Bearer` token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Authorization header missing or invalid".into()))?;

    let token = header.trim();
    if token.is_empty() || token.contains(' ') {
        return Err(ApiError::Unauthorized(
            "Token not provided or malformed".into(),
        ));
    }

    let claims = state.jwt.verify_token(token).map_err(|e| {
        log::debug!("Rejected bearer token: {}", e);
        ApiError::Unauthorized("Invalid or expired token".into())
    })?;

    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        email: claims.email,
    });

    Ok(next.run(req).await)
}

/// Shared secret expected from the OCR worker. Only its digest is kept.
#[derive(Clone)]
pub struct CallbackSecret {
    digest: [u8; 32],
}

impl CallbackSecret {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            digest: Sha256::digest(secret.expose_secret().as_bytes()).into(),
        }
    }

    /// Compares digests, so timing does not depend on a common prefix.
    pub fn verify(&self, provided: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(provided.as_bytes()).into();
        candidate
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Checks the secret header of a callback request.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let provided = headers
            .get(CALLBACK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Callback secret missing".into()))?;
        if self.verify(provided) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized("Invalid callback secret".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_token_round_trip() {
        let jwt = JwtService::new(&secret("test-secret"));
        let token = jwt.create_token("user-1", "a@example.com").unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.email, "a@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = JwtService::new(&secret("one"))
            .create_token("user-1", "a@example.com")
            .unwrap();
        assert!(JwtService::new(&secret("two")).verify_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let jwt = JwtService::new(&secret("s"));
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: "u".into(),
            email: "e".into(),
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"s")).unwrap();
        assert!(jwt.verify_token(&token).is_err());
    }

    #[test]
    fn test_callback_secret_verify() {
        let cb = CallbackSecret::new(&secret("worker-secret"));
        assert!(cb.verify("worker-secret"));
        assert!(!cb.verify("worker-secre"));
        assert!(!cb.verify(""));
    }

    #[test]
    fn test_callback_secret_check_headers() {
        let cb = CallbackSecret::new(&secret("k"));
        let mut headers = HeaderMap::new();
        assert!(cb.check(&headers).is_err());
        headers.insert(CALLBACK_SECRET_HEADER, "wrong".parse().unwrap());
        assert!(cb.check(&headers).is_err());
        headers.insert(CALLBACK_SECRET_HEADER, "k".parse().unwrap());
        assert!(cb.check(&headers).is_ok());
    }
}
