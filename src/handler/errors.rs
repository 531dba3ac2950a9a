use axum::{
    http,
    response::{IntoResponse, Response},
};

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadRequest(message) => write!(f, "{}", message),
            AppError::Internal(error) => write!(f, "{:#}", error),
        }
    }
}

pub(crate) enum AppError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) => http::StatusCode::BAD_REQUEST,
            AppError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("ERROR: {}", self)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
