mod auth;
mod health_check;

pub use auth::{
    login, refresh, register, revoke, validate, AccessTokenRequest, CredentialsRequest,
    RefreshTokenRequest, TokenResponse, ValidationResponse,
};
pub use health_check::health_check;
