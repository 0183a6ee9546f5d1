pub mod claims;
pub mod gateway;
pub mod token;

pub use claims::TokenClaims;
pub use gateway::{
    extract_bearer, require_token, AuthState, GatewayError, GatewayOutcome, Identity,
    TokenGateway,
};
pub use token::{TokenCodec, TokenError};
