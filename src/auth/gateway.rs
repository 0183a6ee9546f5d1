//! Request authentication for the pop endpoints
//!
//! Every protected request lands in exactly one [`AuthState`]:
//!
//! ```text
//!   Authorization header ──┬─ absent / not "Bearer " ──> NoToken ──────┐
//!                          │                                           ├─> issue token, answer
//!                          └─ validate ──┬─ expired ──> TokenExpired ──┘   isProcessed=false
//!                                        ├─ other failure ──> TokenInvalid ──> 401 INVALID_TOKEN
//!                                        └─ ok ──> TokenValid ──> run handler with Identity
//! ```
//!
//! Issuance round-trips never reach the handler, so they never count pops.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{TokenClaims, TokenCodec, TokenError};
use crate::api::{ApiError, ApiResponse};
use crate::geo::{resolve_client_ip, resolve_region_within, GeoError, RegionResolver};
use crate::models::PopResponse;

const BEARER_PREFIX: &str = "Bearer ";

/// Verified identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub client_ip: String,
    pub region_code: String,
    pub claims: TokenClaims,
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            client_ip: claims.client_ip.clone(),
            region_code: claims.region_code.clone(),
            claims,
        }
    }
}

#[derive(Debug)]
pub enum AuthState {
    NoToken,
    TokenValid(TokenClaims),
    TokenExpired,
    TokenInvalid(TokenError),
}

#[derive(Debug)]
pub enum GatewayOutcome {
    /// Let the request through with this identity
    Authenticated(Identity),
    /// Absorb the request and hand the client this fresh token
    Issued(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("token rejected: {0}")]
    Rejected(#[source] TokenError),
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error("failed to issue token")]
    Issue(#[source] TokenError),
}

/// Credential from an `Authorization: Bearer <token>` header
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
}

pub struct TokenGateway {
    codec: Arc<TokenCodec>,
    regions: Arc<dyn RegionResolver>,
    lookup_timeout: Duration,
}

impl TokenGateway {
    pub fn new(
        codec: Arc<TokenCodec>,
        regions: Arc<dyn RegionResolver>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            codec,
            regions,
            lookup_timeout,
        }
    }

    async fn resolve_region(&self, client_ip: &str) -> Result<String, GeoError> {
        resolve_region_within(self.regions.as_ref(), client_ip, self.lookup_timeout).await
    }

    /// Work out which state a request is in
    ///
    /// With region pinning on, the region is looked up before validation
    /// so a drifted region counts as a claim mismatch.
    pub async fn classify(
        &self,
        bearer: Option<&str>,
        client_ip: &str,
    ) -> Result<AuthState, GatewayError> {
        let Some(token) = bearer else {
            return Ok(AuthState::NoToken);
        };

        let validated = if self.codec.pins_region() {
            let region = self.resolve_region(client_ip).await?;
            self.codec.validate_pinned(token, client_ip, &region)
        } else {
            self.codec.validate(token, client_ip)
        };

        Ok(match validated {
            Ok(claims) => AuthState::TokenValid(claims),
            Err(TokenError::Expired) => AuthState::TokenExpired,
            Err(err) => AuthState::TokenInvalid(err),
        })
    }

    pub async fn authenticate(
        &self,
        bearer: Option<&str>,
        client_ip: &str,
    ) -> Result<GatewayOutcome, GatewayError> {
        match self.classify(bearer, client_ip).await? {
            AuthState::NoToken => {
                debug!(client_ip, "no token presented, issuing one");
                self.issue_fresh(client_ip).await.map(GatewayOutcome::Issued)
            }
            AuthState::TokenExpired => {
                info!(client_ip, "token expired, re-issuing");
                self.issue_fresh(client_ip).await.map(GatewayOutcome::Issued)
            }
            AuthState::TokenInvalid(err) => {
                warn!(client_ip, error = %err, "rejecting token");
                Err(GatewayError::Rejected(err))
            }
            AuthState::TokenValid(claims) => {
                Ok(GatewayOutcome::Authenticated(Identity::from(claims)))
            }
        }
    }

    /// Region is looked up fresh so a client that moved gets its new region
    async fn issue_fresh(&self, client_ip: &str) -> Result<String, GatewayError> {
        let region = self.resolve_region(client_ip).await?;
        self.codec
            .issue(client_ip, &region)
            .map_err(GatewayError::Issue)
    }
}

/// Peer address from `ConnectInfo`
///
/// Missing only when the server was not started with connect info; header-less
/// clients then all share `0.0.0.0`.
fn socket_ip(request: &Request) -> IpAddr {
    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip(),
        None => {
            warn!("no ConnectInfo on request, falling back to 0.0.0.0 as remote address");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }
}

/// Middleware guarding the pop routes
///
/// The handler behind it receives an [`Identity`] extension.
pub async fn require_token(
    State(gateway): State<Arc<TokenGateway>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let remote_ip = socket_ip(&request);

    let client_ip = resolve_client_ip(request.headers(), remote_ip);
    let bearer = extract_bearer(request.headers()).map(str::to_owned);

    match gateway.authenticate(bearer.as_deref(), &client_ip).await? {
        GatewayOutcome::Issued(token) => {
            Ok(ApiResponse::success(PopResponse::issued(token)).into_response())
        }
        GatewayOutcome::Authenticated(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
    }
}
