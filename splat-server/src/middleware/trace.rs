use std::time::Instant;

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// JSON bodies up to this size are logged verbatim.
const MAX_LOGGED_BODY: usize = 1024;
/// JSON bodies above this size, or of unknown length, pass through unbuffered.
const MAX_BUFFERED_BODY: usize = 64 * 1024;

pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let header_value = HeaderValue::from_str(&trace_id.to_string()).ok();

        let (parts, body) = req.into_parts();
        let body = log_json_body("request", &parts.headers, body).await;
        let mut req = Request::from_parts(parts, body);
        if let Some(v) = &header_value {
            req.headers_mut().insert(X_TRACE_ID, v.clone());
        }

        let response = next.run(req).await;

        let (parts, body) = response.into_parts();
        let body = log_json_body("response", &parts.headers, body).await;
        let mut response = Response::from_parts(parts, body);
        if let Some(v) = header_value {
            response.headers_mut().insert(X_TRACE_ID, v);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis() as u64,
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Buffer and log small JSON bodies; everything else (artifact downloads,
/// oversized or streamed uploads) passes through untouched.
async fn log_json_body(direction: &str, headers: &HeaderMap, body: Body) -> Body {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    if !is_json {
        return body;
    }

    let upper = body.size_hint().upper();
    if upper.is_none_or(|n| n > MAX_BUFFERED_BODY as u64) {
        debug!(size = ?upper, "{direction} body: [not buffered]");
        return body;
    }

    let bytes = match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to buffer {direction} body");
            Bytes::new()
        }
    };

    if bytes.len() <= MAX_LOGGED_BODY {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            debug!("{direction} body: {text}");
        }
    } else {
        debug!("{direction} body: [skipped: size={}]", bytes.len());
    }
    Body::from(bytes)
}

#[cfg(test)]
mod test {
    use futures::stream;
    use tracing_test::traced_test;

    use super::*;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers
    }

    #[tokio::test]
    #[traced_test]
    async fn small_json_body_is_logged_and_preserved() {
        let body = log_json_body("request", &json_headers(), Body::from(r#"{"a":1}"#)).await;
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);
        assert!(logs_contain(r#"request body: {"a":1}"#));
    }

    #[tokio::test]
    #[traced_test]
    async fn oversized_json_body_is_not_buffered() {
        let payload = vec![b' '; MAX_BUFFERED_BODY + 1];
        let body = log_json_body("request", &json_headers(), Body::from(payload)).await;
        assert_eq!(body.size_hint().exact(), Some(MAX_BUFFERED_BODY as u64 + 1));
        assert!(logs_contain("request body: [not buffered]"));

        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), MAX_BUFFERED_BODY + 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn streamed_json_body_of_unknown_length_is_not_buffered() {
        let chunks = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"{\"a\":")),
            Ok(Bytes::from_static(b"1}")),
        ]);
        let body = log_json_body("request", &json_headers(), Body::from_stream(chunks)).await;
        assert!(logs_contain("request body: [not buffered]"));

        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);
    }
}
