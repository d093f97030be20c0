/// Authentication module
///
/// Handles access token signing/verification, password policy and hashing,
/// refresh token management, and the lifecycle service composing them.

mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::AccessClaims;
pub use jwt::{AccessTokenCodec, SignedAccessToken, VerifiedIdentity, ALGORITHM, LEEWAY_SECONDS};
pub use password::{
    check_password_policy, check_password_shape, hash_password, verify_password,
};
pub use refresh_token::{
    generate_refresh_token, hash_refresh_token, IssuedRefreshToken, RefreshTokenManager,
    MAX_ISSUE_ATTEMPTS,
};
pub use service::{IssuedCredentials, TokenPair, TokenService};
