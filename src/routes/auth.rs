/// Authentication Routes
///
/// Thin HTTP surface over `TokenService`: registration, login, refresh-token
/// rotation, logout and access-token validation.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{IssuedCredentials, TokenService};
use crate::error::AuthError;

/// Registration and login request
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Refresh and revoke request
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Access-token validation request
#[derive(Deserialize)]
pub struct AccessTokenRequest {
    pub access_token: String,
}

/// Response for every credential-issuing endpoint
#[derive(Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Unix seconds
    pub access_expires_at: i64,
}

impl From<IssuedCredentials> for TokenResponse {
    fn from(issued: IssuedCredentials) -> Self {
        Self {
            user_id: issued.user_id.to_string(),
            access_token: issued.tokens.access_token,
            refresh_token: issued.tokens.refresh_token,
            token_type: "Bearer".to_string(),
            access_expires_at: issued.tokens.access_expires_at.timestamp(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ValidationResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid email, empty or weak password
/// - 409: email already registered
/// - 500: internal error
pub async fn register(
    form: web::Json<CredentialsRequest>,
    service: web::Data<TokenService>,
) -> Result<HttpResponse, AuthError> {
    let issued = service.register(&form.email, &form.password).await?;
    Ok(HttpResponse::Created().json(TokenResponse::from(issued)))
}

/// POST /auth/login
///
/// Unknown email and wrong password both answer 401 with the same body.
pub async fn login(
    form: web::Json<CredentialsRequest>,
    service: web::Data<TokenService>,
) -> Result<HttpResponse, AuthError> {
    let issued = service.login(&form.email, &form.password).await?;
    Ok(HttpResponse::Ok().json(TokenResponse::from(issued)))
}

/// POST /auth/refresh
///
/// The presented refresh token is spent; the response carries its
/// replacement.
pub async fn refresh(
    form: web::Json<RefreshTokenRequest>,
    service: web::Data<TokenService>,
) -> Result<HttpResponse, AuthError> {
    let issued = service.refresh(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(TokenResponse::from(issued)))
}

/// POST /auth/revoke
pub async fn revoke(
    form: web::Json<RefreshTokenRequest>,
    service: web::Data<TokenService>,
) -> Result<HttpResponse, AuthError> {
    service.revoke_token(&form.refresh_token).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /auth/validate
///
/// Always answers 200; `valid` tells whether the token was accepted.
pub async fn validate(
    form: web::Json<AccessTokenRequest>,
    service: web::Data<TokenService>,
) -> HttpResponse {
    let body = match service.validate_access_token(&form.access_token) {
        Ok(identity) => ValidationResponse {
            valid: true,
            user_id: Some(identity.user_id.to_string()),
            email: Some(identity.email),
            code: None,
        },
        Err(e) => ValidationResponse {
            valid: false,
            user_id: None,
            email: None,
            code: Some(e.code().to_string()),
        },
    };

    HttpResponse::Ok().json(body)
}
