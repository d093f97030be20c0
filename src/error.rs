/// Error Handling Module
///
/// Every failure of the token lifecycle maps onto one closed set of kinds,
/// `AuthError`. It covers:
/// 1. Domain error kinds (what the caller may react to)
/// 2. Diagnostic cause chains for internal failures (logged, never exposed)
/// 3. HTTP response mapping for the transport surface
/// 4. Structured error logging with operation context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// Boxed diagnostic cause carried by internal failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// ============================================================================
/// 1. DOMAIN ERROR KINDS
/// ============================================================================

/// Error kinds produced by the token lifecycle.
///
/// `InvalidCredentials` deliberately covers both "no such user" and "wrong
/// password", and `InvalidToken` covers both "unknown hash" and "malformed
/// token", so neither leaks whether an account or token exists.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("password is empty")]
    EmptyPassword,

    #[error("password does not meet the strength policy")]
    WeakPassword,

    #[error("email is already registered")]
    EmailTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("could not allocate a unique refresh token")]
    RefreshTokenCollision,

    /// Anything not enumerated above. The message is fixed; the cause is
    /// only reachable through `source()` for logging.
    #[error("internal error")]
    Internal {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl AuthError {
    /// Wrap an unexpected failure, tagging it with the operation that hit it.
    pub fn internal(operation: &'static str, source: impl Into<BoxError>) -> Self {
        AuthError::Internal {
            operation,
            source: source.into(),
        }
    }

    /// Stable machine-readable code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail => "INVALID_EMAIL",
            AuthError::EmptyPassword => "EMPTY_PASSWORD",
            AuthError::WeakPassword => "WEAK_PASSWORD",
            AuthError::EmailTaken => "EMAIL_TAKEN",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidToken => "TOKEN_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenRevoked => "TOKEN_REVOKED",
            AuthError::RefreshTokenCollision => "REFRESH_TOKEN_COLLISION",
            AuthError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Internal { .. })
    }
}

// ============================================================================
// 2. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidEmail | AuthError::EmptyPassword | AuthError::WeakPassword => {
            StatusCode::BAD_REQUEST
        }
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::InvalidCredentials
        | AuthError::InvalidToken
        | AuthError::TokenExpired
        | AuthError::TokenRevoked => StatusCode::UNAUTHORIZED,
        AuthError::RefreshTokenCollision | AuthError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl ErrorHandler for AuthError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let status = status_for(self);
        // Internal details never leave the process.
        let message = if self.is_internal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            self.code().to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AuthError::Internal { operation, source } => {
                tracing::error!(
                    request_id = request_id,
                    operation = operation,
                    error = %source,
                    "Internal error"
                );
            }
            AuthError::RefreshTokenCollision => {
                tracing::error!(request_id = request_id, error = %self, "Refresh token collision");
            }
            _ => {
                tracing::warn!(
                    request_id = request_id,
                    code = self.code(),
                    "Request rejected"
                );
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        status_for(self)
    }
}

// ============================================================================
// 3. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub operation: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn log_error(&self, error: &AuthError) {
        match error {
            AuthError::Internal { operation, source } => {
                tracing::error!(
                    request_id = %self.request_id,
                    operation = self.operation,
                    failed_step = operation,
                    error = %source,
                    "Token operation failed"
                );
            }
            AuthError::RefreshTokenCollision => {
                tracing::error!(
                    request_id = %self.request_id,
                    operation = self.operation,
                    "Refresh token collision retries exhausted"
                );
            }
            _ => {
                tracing::warn!(
                    request_id = %self.request_id,
                    operation = self.operation,
                    code = error.code(),
                    "Token operation rejected"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_internal_error_hides_cause_in_display() {
        let err = AuthError::internal("save_user", "connection reset by peer");
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("connection reset by peer".to_string())
        );
    }

    #[test]
    fn test_internal_error_response_is_generic() {
        let err = AuthError::internal("save_user", "password=hunter2 leaked in driver message");
        let (status, body) = <AuthError as ErrorHandler>::error_response(&err, "req-1");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Internal server error");
        assert_eq!(body.code, "INTERNAL_ERROR");
    }

    #[test]
    fn test_collision_keeps_its_message() {
        let (status, body) =
            <AuthError as ErrorHandler>::error_response(&AuthError::RefreshTokenCollision, "req-2");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "could not allocate a unique refresh token");
        assert_eq!(body.code, "REFRESH_TOKEN_COLLISION");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AuthError::WeakPassword), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AuthError::EmailTaken), StatusCode::CONFLICT);
        assert_eq!(status_for(&AuthError::TokenRevoked), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&AuthError::RefreshTokenCollision),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("refresh");
        assert_eq!(ctx.operation, "refresh");
        assert!(uuid::Uuid::parse_str(&ctx.request_id).is_ok());
    }
}
