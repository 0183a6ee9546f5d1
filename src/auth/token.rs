//! Self-issued HS256 tokens bound to a client IP and region.
//!
//! The codec is built once at startup from [`TokenConfig`] and shared
//! read-only. Tokens are bearer capabilities: nothing is tracked server
//! side, so a token stays usable until it expires.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

use super::claims::{TokenClaims, WireClaims};
use crate::config::TokenConfig;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("token has expired")]
    Expired,
    #[error("token claim '{claim}' does not match this request")]
    ClaimMismatch { claim: &'static str },
    #[error("failed to encode token")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error("token lifetime does not fit around {now}")]
    TimeOutOfRange { now: i64 },
}

impl TokenError {
    /// Expired tokens are re-issued instead of rejected.
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired)
    }

    fn from_decode(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::SignatureInvalid
            }
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl_secs: i64,
    clock_skew_secs: i64,
    pin_region: bool,
}

impl TokenCodec {
    pub fn new(config: &TokenConfig) -> Result<Self> {
        config.check_lifetimes()?;

        let secret = config.secret.as_bytes();
        let issuer = derive_issuer(&config.server_address, secret)?;

        // Time-based claims are checked by hand so expiry is inclusive
        // and distinguishable from every other failure.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer,
            ttl_secs: i64::try_from(config.ttl_secs)?,
            clock_skew_secs: i64::try_from(config.clock_skew_secs)?,
            pin_region: config.pin_region,
        })
    }

    /// Issuer identity of this process, stable for its whole lifetime
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn pins_region(&self) -> bool {
        self.pin_region
    }

    pub fn issue(&self, client_ip: &str, region_code: &str) -> Result<String, TokenError> {
        self.issue_at(client_ip, region_code, now_epoch_secs())
    }

    pub fn issue_at(
        &self,
        client_ip: &str,
        region_code: &str,
        now: i64,
    ) -> Result<String, TokenError> {
        let not_before = now
            .checked_sub(self.clock_skew_secs)
            .ok_or(TokenError::TimeOutOfRange { now })?;
        let expires_at = now
            .checked_add(self.ttl_secs)
            .ok_or(TokenError::TimeOutOfRange { now })?;

        let claims = TokenClaims {
            id: format!("{:032x}", rand::random::<u128>()),
            issuer: self.issuer.clone(),
            client_ip: client_ip.to_string(),
            region_code: region_code.to_string(),
            issued_at: now,
            not_before,
            expires_at,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &WireClaims::from(&claims),
            &self.encoding_key,
        )
        .map_err(TokenError::Encode)?;

        debug!(token_id = %claims.id, client_ip, region_code, "issued token");
        Ok(token)
    }

    pub fn validate(&self, token: &str, client_ip: &str) -> Result<TokenClaims, TokenError> {
        self.validate_at(token, client_ip, now_epoch_secs())
    }

    /// Verify `token` for a request coming from `client_ip`.
    ///
    /// Order matters: signature, then expiry, then the remaining claims.
    /// An expired token is reported as [`TokenError::Expired`] even when
    /// its other claims would not match.
    pub fn validate_at(
        &self,
        token: &str,
        client_ip: &str,
        now: i64,
    ) -> Result<TokenClaims, TokenError> {
        let data = decode::<WireClaims>(token, &self.decoding_key, &self.validation)
            .map_err(TokenError::from_decode)?;
        let claims = TokenClaims::from(data.claims);

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        // Not expired, so inactive means used before nbf.
        if !claims.is_active_at(now) {
            return Err(TokenError::ClaimMismatch { claim: "nbf" });
        }

        let issuer_matches: bool = claims
            .issuer
            .as_bytes()
            .ct_eq(self.issuer.as_bytes())
            .into();
        if !issuer_matches {
            return Err(TokenError::ClaimMismatch { claim: "iss" });
        }

        if claims.client_ip != client_ip {
            return Err(TokenError::ClaimMismatch { claim: "aud" });
        }

        Ok(claims)
    }

    pub fn validate_pinned(
        &self,
        token: &str,
        client_ip: &str,
        current_region: &str,
    ) -> Result<TokenClaims, TokenError> {
        self.validate_pinned_at(token, client_ip, current_region, now_epoch_secs())
    }

    /// Like [`validate_at`](Self::validate_at), and additionally rejects a
    /// region drift when region pinning is enabled.
    pub fn validate_pinned_at(
        &self,
        token: &str,
        client_ip: &str,
        current_region: &str,
        now: i64,
    ) -> Result<TokenClaims, TokenError> {
        let claims = self.validate_at(token, client_ip, now)?;
        if self.pin_region && claims.region_code != current_region {
            return Err(TokenError::ClaimMismatch { claim: "sub" });
        }
        Ok(claims)
    }
}

/// Wall clock in Unix epoch seconds, shared by token and storage timestamps
pub(crate) fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Issuer = hex of the first 16 bytes of HMAC-SHA256(secret, server_address)
fn derive_issuer(server_address: &str, secret: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?;
    mac.update(server_address.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(digest[..16].iter().map(|b| format!("{b:02x}")).collect())
}
