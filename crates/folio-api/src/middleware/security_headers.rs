//! Response hardening headers
//!
//! `security_headers_middleware` applies to every response.
//! `no_store_middleware` is layered on the auth routes, whose bodies carry
//! bearer credentials that must not be cached by browsers or proxies.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
];

/// Add baseline security headers to every response
///
/// The API only serves JSON, so the content policy forbids everything
/// except on the Swagger UI pages, which load their own assets.
pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let is_docs = request.uri().path().starts_with("/swagger-ui");
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    if !is_docs {
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        );
    }

    response
}

/// Forbid caching of credential-bearing responses
pub async fn no_store_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    async fn ok_handler() -> impl IntoResponse {
        (StatusCode::OK, "ok")
    }

    async fn error_handler() -> impl IntoResponse {
        (StatusCode::UNAUTHORIZED, "nope")
    }

    fn app() -> Router {
        Router::new()
            .route("/api/auth/login", get(ok_handler))
            .route("/api/auth/me", get(error_handler))
            .route("/swagger-ui/index.html", get(ok_handler))
            .layer(middleware::from_fn(no_store_middleware))
            .layer(middleware::from_fn(security_headers_middleware))
    }

    async fn get_path(path: &str) -> Response {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        app().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_security_headers_added() {
        let response = get_path("/api/auth/login").await;
        let headers = response.headers();

        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert!(headers.get(header::CONTENT_SECURITY_POLICY).is_some());
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[tokio::test]
    async fn test_headers_on_error_response() {
        let response = get_path("/api/auth/me").await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::X_FRAME_OPTIONS).is_some());
        assert_eq!(response.headers().get(header::PRAGMA).unwrap(), "no-cache");
    }

    #[tokio::test]
    async fn test_docs_skip_content_policy() {
        let response = get_path("/swagger-ui/index.html").await;
        assert!(response.headers().get(header::CONTENT_SECURITY_POLICY).is_none());
        assert!(response.headers().get(header::X_CONTENT_TYPE_OPTIONS).is_some());
    }
}
