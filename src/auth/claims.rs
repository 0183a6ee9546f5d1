use serde::{Deserialize, Serialize};

/// Identity claims carried by a popcat token.
///
/// Built fresh on every issuance and never persisted. All instants are
/// Unix epoch seconds and satisfy `not_before <= issued_at < expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub id: String,
    pub issuer: String,
    pub client_ip: String,
    pub region_code: String,
    pub issued_at: i64,
    pub not_before: i64,
    pub expires_at: i64,
}

impl TokenClaims {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn is_active_at(&self, now: i64) -> bool {
        now >= self.not_before && !self.is_expired_at(now)
    }
}

/// Registered JWT claim layout used on the wire.
///
/// `aud` holds the client IP and `sub` the region code.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireClaims {
    pub jti: String,
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl From<&TokenClaims> for WireClaims {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            jti: claims.id.clone(),
            iss: claims.issuer.clone(),
            aud: claims.client_ip.clone(),
            sub: claims.region_code.clone(),
            iat: claims.issued_at,
            nbf: claims.not_before,
            exp: claims.expires_at,
        }
    }
}

impl From<WireClaims> for TokenClaims {
    fn from(wire: WireClaims) -> Self {
        Self {
            id: wire.jti,
            issuer: wire.iss,
            client_ip: wire.aud,
            region_code: wire.sub,
            issued_at: wire.iat,
            not_before: wire.nbf,
            expires_at: wire.exp,
        }
    }
}
