//! Error types for API requests

use hyper::StatusCode;
use mfs::MfsError;
use serde::Serialize;
use thiserror::Error;

/// API request result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that end a request with an error response
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request
    #[error("{0}")]
    BadRequest(String),

    /// No authenticator recognised the caller
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Policies refuse the operation
    #[error("{0}")]
    AccessDenied(String),

    /// Object does not exist
    #[error("{0}")]
    NotFound(String),

    /// Method not supported for the path
    #[error("{0}")]
    MethodNotAllowed(String),

    /// Internal server error
    #[error("{0}")]
    Internal(String),

    /// Storage, authentication or configuration failure
    #[error(transparent)]
    Core(#[from] MfsError),
}

/// JSON body of error responses
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: bool,
    pub message: String,
    pub code: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Core(MfsError::NoSuchKey(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> u16 {
        self.status().as_u16()
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// Body sent to the client; server-side details stay in the logs
    pub fn body(&self) -> ErrorBody {
        let message = if self.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        ErrorBody {
            error: true,
            message,
            code: self.code(),
        }
    }
}
