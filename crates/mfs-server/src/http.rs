//! hyper adapter
//!
//! Buffers the request body, converts the request into an [`ApiRequest`] and
//! runs [`Server::handle`] on the blocking pool.

use crate::server::{ApiRequest, ApiResponse, Server};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::http::request::Parts;
use hyper::{Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

/// Serve one HTTP request
pub async fn handle(
    server: Arc<Server>,
    request: Request<Incoming>,
    remote: Option<SocketAddr>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = request.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return Ok(plain(StatusCode::BAD_REQUEST, "Failed to read request body"));
        }
    };

    let request = to_api_request(&parts, body, remote);
    match tokio::task::spawn_blocking(move || server.handle(&request)).await {
        Ok(response) => Ok(to_response(response)),
        Err(e) => {
            error!("Request handler panicked: {}", e);
            Ok(plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"))
        }
    }
}

/// Decode method, path, query, headers and peer address
pub fn to_api_request(parts: &Parts, body: Bytes, remote: Option<SocketAddr>) -> ApiRequest {
    let path = percent_decode_str(parts.uri.path())
        .decode_utf8_lossy()
        .into_owned();
    let mut request = ApiRequest::new(parts.method.as_str(), path).with_body(body);

    if let Some(query) = parts.uri.query() {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            request.head.params.insert(name.into_owned(), value.into_owned());
        }
    }

    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => request.head.headers.insert(name.as_str(), value),
            Err(_) => warn!("Ignoring non-ASCII value of header {}", name),
        }
    }

    request.head.host = request
        .head
        .headers
        .get("host")
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();
    request.head.client_ip = remote.map(|addr| addr.ip().to_string());

    request
}

pub fn to_response(response: ApiResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Full::new(response.body)) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to build response: {}", e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn plain(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}
