//!
//! Compact HS256 JSON web tokens.
//!
//! Access and refresh tokens are signed with separate secrets. Verification
//! reports an expired token separately from any other failure.
//!
use crate::config::AuthConfig;
use crate::error::Error;
use crate::model::Role;
use aws_lc_rs::hmac;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::time::Duration;
use uuid::Uuid;

const ALGORITHM: &str = "HS256";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub id: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub id: Uuid,
    pub iat: i64,
    pub exp: i64,
}

trait Expiring {
    fn exp(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    access_key: hmac::Key,
    refresh_key: hmac::Key,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> TokenIssuer {
        TokenIssuer {
            access_key: hmac::Key::new(hmac::HMAC_SHA256, config.access_token_secret.as_bytes()),
            refresh_key: hmac::Key::new(hmac::HMAC_SHA256, config.refresh_token_secret.as_bytes()),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        }
    }

    pub fn access_token(&self, id: Uuid, role: Role) -> Result<String, Error> {
        self.access_token_at(id, role, Utc::now().timestamp())
    }

    pub fn refresh_token(&self, id: Uuid) -> Result<String, Error> {
        self.refresh_token_at(id, Utc::now().timestamp())
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(&self.access_key, token, Utc::now().timestamp())
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        verify(&self.refresh_key, token, Utc::now().timestamp())
    }

    fn access_token_at(&self, id: Uuid, role: Role, now: i64) -> Result<String, Error> {
        let claims = AccessClaims {
            id,
            role,
            iat: now,
            exp: now + self.access_ttl.as_secs() as i64,
        };
        sign(&self.access_key, &claims)
    }

    fn refresh_token_at(&self, id: Uuid, now: i64) -> Result<String, Error> {
        let claims = RefreshClaims {
            id,
            iat: now,
            exp: now + self.refresh_ttl.as_secs() as i64,
        };
        sign(&self.refresh_key, &claims)
    }
}

impl Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

fn sign<C: Serialize>(key: &hmac::Key, claims: &C) -> Result<String, Error> {
    let header = Header {
        alg: ALGORITHM.to_string(),
        typ: "JWT".to_string(),
    };

    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

    let message = format!("{header}.{claims}");
    let signature = hmac::sign(key, message.as_bytes());

    Ok(format!(
        "{message}.{}",
        URL_SAFE_NO_PAD.encode(signature.as_ref())
    ))
}

fn verify<C>(key: &hmac::Key, token: &str, now: i64) -> Result<C, TokenError>
where
    C: DeserializeOwned + Expiring,
{
    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Invalid);
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Invalid)?;

    let message = &token[..header.len() + 1 + claims.len()];
    hmac::verify(key, message.as_bytes(), &signature).map_err(|_| TokenError::Invalid)?;

    let header: Header = decode_part(header)?;
    if header.alg != ALGORITHM {
        return Err(TokenError::Invalid);
    }

    let claims: C = decode_part(claims)?;
    if claims.exp() <= now {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

fn decode_part<T: DeserializeOwned>(part: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD.decode(part).map_err(|_| TokenError::Invalid)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Invalid)
}
