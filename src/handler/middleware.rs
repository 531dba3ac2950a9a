use crate::metrics::consts::*;
use std::time::Instant;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};

// Search responses carry full article text, but stay well below this.
const RESPONSE_SIZE_BYTES_UPPERBOUND: usize = 256 * 1024 * 1024;

pub(crate) async fn metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let response = next.run(request).await;

    let (response_parts, response_body) = response.into_parts();
    let response_body_bytes =
        match axum::body::to_bytes(response_body, RESPONSE_SIZE_BYTES_UPPERBOUND).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::error!(?error, "Couldn't buffer response body.");
                counter!(HTTP_SERVER_ERROR).increment(1);
                counter!(HTTP_RESPONSE_FAILURE).increment(1);
                return (StatusCode::INTERNAL_SERVER_ERROR, "ERROR: response too large").into_response();
            }
        };

    histogram!(HTTP_RESPONSE_SIZE_BYTES).record(response_body_bytes.len() as f64);

    if response_parts.status.is_server_error() {
        counter!(HTTP_SERVER_ERROR).increment(1)
    }

    if response_parts.status.is_success() {
        counter!(HTTP_RESPONSE_SUCCESS).increment(1)
    } else {
        counter!(HTTP_RESPONSE_FAILURE).increment(1)
    }

    histogram!(HTTP_REQUEST_DURATION_SECS).record(start.elapsed().as_secs_f64());

    Response::from_parts(response_parts, response_body_bytes.into())
}
