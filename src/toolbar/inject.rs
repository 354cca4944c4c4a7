//! Toolbar marker injection into HTML responses

use axum::{
    body::{Body, HttpBody},
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};
use bytes::{Bytes, BytesMut};
use regex::bytes::Regex;
use std::sync::OnceLock;

fn body_close() -> Option<&'static Regex> {
    static BODY_CLOSE: OnceLock<Option<Regex>> = OnceLock::new();
    BODY_CLOSE
        .get_or_init(|| Regex::new(r"(?i)</body>").ok())
        .as_ref()
}

/// Insert `marker` immediately before the last `</body>` (any case)
///
/// Returns `None` when the body has no closing tag.
pub fn inject_marker(body: &[u8], marker: &[u8]) -> Option<Bytes> {
    let at = body_close()?.find_iter(body).last()?.start();
    let mut out = BytesMut::with_capacity(body.len() + marker.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(marker);
    out.extend_from_slice(&body[at..]);
    Some(out.freeze())
}

/// Uncompressed `text/html`
pub fn is_injectable(headers: &HeaderMap) -> bool {
    let html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"));
    html && !headers.contains_key(header::CONTENT_ENCODING)
}

/// Buffer an HTML response and inject `marker`, updating `Content-Length`
///
/// Responses that are not injectable, or whose size is unknown or above
/// `max_body`, are returned untouched.
pub async fn inject_response(response: Response, marker: &str, max_body: usize) -> Response {
    if !is_injectable(response.headers()) {
        return response;
    }
    let within_limit = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= max_body as u64);
    if !within_limit {
        tracing::debug!("Skipping toolbar injection: body size unknown or too large");
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, max_body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer response for toolbar injection");
            return Response::from_parts(parts, Body::empty());
        }
    };

    match inject_marker(&bytes, marker.as_bytes()) {
        Some(injected) => {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(injected.len()));
            Response::from_parts(parts, Body::from(injected))
        }
        None => Response::from_parts(parts, Body::from(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_injects_before_last_close_tag() {
        let body = b"<html><body>a</BODY> <p></body></html>";
        let out = inject_marker(body, b"[M]").unwrap();
        assert_eq!(&out[..], b"<html><body>a</BODY> <p>[M]</body></html>");
    }

    #[test]
    fn test_no_close_tag() {
        assert!(inject_marker(b"<p>fragment</p>", b"[M]").is_none());
    }

    #[test]
    fn test_injectable_headers() {
        let mut headers = HeaderMap::new();
        assert!(!is_injectable(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("Text/HTML; charset=utf-8"));
        assert!(is_injectable(&headers));
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(!is_injectable(&headers));
    }

    #[tokio::test]
    async fn test_response_length_updated() {
        let response = (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            "<body>hi</body>",
        )
            .into_response();
        let response = inject_response(response, "<i>m</i>", 1024).await;

        let length = response.headers()[header::CONTENT_LENGTH].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<body>hi<i>m</i></body>");
        assert_eq!(length, body.len().to_string());
    }

    #[tokio::test]
    async fn test_non_html_untouched() {
        let response = (StatusCode::OK, "</body>").into_response();
        let response = inject_response(response, "<i>m</i>", 1024).await;
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"</body>");
    }

    #[tokio::test]
    async fn test_oversized_body_untouched() {
        let response = (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            "<body>0123456789</body>",
        )
            .into_response();
        let response = inject_response(response, "<i>m</i>", 8).await;
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<body>0123456789</body>");
    }
}
