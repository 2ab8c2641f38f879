//! Session token codec: HS256 JWTs signed with a secret that belongs to a
//! single token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::models::session::{IssuedSession, SessionPayload};

const SECRET_BYTES: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token signature mismatch")]
    SignatureMismatch,
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(flatten)]
    pub payload: SessionPayload,
    pub exp: i64, // expiration time
    pub iat: i64, // issued at
}

/// Fresh random signing key (256 bits from the OS RNG).
pub fn generate_session_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn sign_session_token(
    payload: &SessionPayload,
    secret: &str,
    ttl_seconds: u64,
    now: DateTime<Utc>,
) -> Result<IssuedSession, TokenError> {
    let issued_at = now.timestamp();
    let out_of_range = || TokenError::Encoding(format!("ttl out of range: {ttl_seconds}s"));
    let ttl = i64::try_from(ttl_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(out_of_range)?;
    let exp = now.checked_add_signed(ttl).ok_or_else(out_of_range)?.timestamp();
    let expires_at = DateTime::<Utc>::from_timestamp(exp, 0).ok_or_else(out_of_range)?;

    let claims = SessionClaims {
        payload: payload.clone(),
        exp,
        iat: issued_at,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| TokenError::Encoding(e.to_string()))?;

    Ok(IssuedSession { token, expires_at })
}

/// Checks the signature against `secret`, then the expiry against `now`.
/// The HMAC comparison inside `jsonwebtoken` is constant time.
pub fn verify_session_token(
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<SessionPayload, TokenError> {
    let claims = decode_claims(token, secret)?;
    if now.timestamp() > claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(claims.payload)
}

/// Signature check only; expiry is left to the caller.
pub fn decode_claims(token: &str, secret: &str) -> Result<SessionClaims, TokenError> {
    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    })?;

    Ok(token_data.claims)
}

fn validation() -> Validation {
    // Expiry is checked against the injected clock, not the system time.
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.required_spec_claims = ["exp".to_string()].into_iter().collect();
    validation
}
