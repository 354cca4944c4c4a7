//! Control endpoints over HTTP

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing,
    Router,
};
use common::{app, body_string, get, init_tracing, send, toolbar};
use debug_toolbar::config::InterceptMode;
use debug_toolbar::HandlerError;

#[tracing::instrument]
async fn report() -> Result<String, HandlerError> {
    let rows = 12_i64;
    let per_page = paginate(rows, 0)?;
    Ok(per_page.to_string())
}

#[tracing::instrument]
fn paginate(rows: i64, pages: i64) -> Result<i64, HandlerError> {
    rows.checked_div(pages)
        .ok_or_else(|| HandlerError::msg("no pages to spread rows over"))
}

fn routes() -> Router {
    Router::new()
        .route("/a", routing::get(|| async { "a" }))
        .route("/b", routing::get(|| async { "b" }))
        .route("/c", routing::get(|| async { "c" }))
        .route("/report", routing::get(report))
}

#[tokio::test]
async fn test_token_rejected_before_lookup() {
    let toolbar = toolbar(InterceptMode::Debug);
    let app = app(&toolbar, routes());

    let response = send(&app, get("/_debug/exception?tb=1")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("missing security token"));

    let response = send(&app, get("/_debug/exception?tb=1&token=wrong")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("invalid security token"));

    let uri = format!("/_debug/exception?tb=1&token={}", toolbar.token());
    let response = send(&app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("not available"));
}

#[tokio::test]
async fn test_event_stream_cursor() {
    let toolbar = toolbar(InterceptMode::Debug);
    let app = app(&toolbar, routes());

    for path in ["/a", "/b", "/c"] {
        send(&app, get(path)).await;
    }
    let ids: Vec<String> = toolbar
        .requests()
        .iter_newest_first()
        .map(|(id, _)| id.to_string())
        .collect();
    let (newest, middle) = (&ids[0], &ids[1]);

    let request = Request::builder()
        .uri("/_debug/sse")
        .header("last-event-id", middle.as_str())
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    let body = body_string(response).await;
    assert!(body.starts_with(&format!("id: {newest}\n")));
    assert!(body.contains("\"path\":\"/c\""));
    assert!(!body.contains("\"path\":\"/b\""));

    let body = body_string(send(&app, get("/_debug/sse")).await).await;
    for path in ["/a", "/b", "/c"] {
        assert!(body.contains(&format!("\"path\":\"{path}\"")));
    }

    let request = Request::builder()
        .uri("/_debug/sse")
        .header("last-event-id", newest.as_str())
        .body(Body::empty())
        .unwrap();
    assert_eq!(body_string(send(&app, request).await).await, "");
}

#[tokio::test]
async fn test_source_and_execute_in_captured_frame() {
    let _tracing = init_tracing();
    let toolbar = toolbar(InterceptMode::Debug);
    let app = app(&toolbar, routes());

    let response = send(&app, get("/report")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let (tb, traceback) = toolbar.exceptions().iter_newest_first().next().unwrap();
    let frame = traceback
        .frames
        .iter()
        .find(|f| f.function == "paginate")
        .unwrap();
    let token = toolbar.token().to_string();

    let uri = format!("/_debug/exception?tb={tb}&token={token}");
    let page = body_string(send(&app, get(&uri)).await).await;
    assert!(page.contains("no pages to spread rows over"));

    let uri = format!("/_debug/source?frm={}&token={token}", frame.id);
    let response = send(&app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("fn paginate"));

    let uri = format!(
        "/_debug/execute?frm={}&cmd=pages%20%2B%201&token={token}",
        frame.id
    );
    let response = send(&app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "&gt;&gt;&gt; pages + 1\n1");
}

#[tokio::test]
async fn test_execute_refused_in_display_mode() {
    let _tracing = init_tracing();
    let toolbar = toolbar(InterceptMode::Display);
    let app = app(&toolbar, routes());

    send(&app, get("/report")).await;
    let (_, traceback) = toolbar.exceptions().iter_newest_first().next().unwrap();
    let uri = format!(
        "/_debug/execute?frm={}&cmd=rows&token={}",
        traceback.frames[0].id,
        toolbar.token()
    );
    let response = send(&app, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("evaluation is disabled"));
}

#[tokio::test]
async fn test_toolbar_views() {
    let toolbar = toolbar(InterceptMode::Debug);
    let app = app(&toolbar, routes());

    let page = body_string(send(&app, get("/_debug")).await).await;
    assert!(page.contains("No request recorded yet"));

    send(&app, get("/a")).await;
    let id = toolbar.requests().last_key().unwrap();
    let response = send(&app, get(&format!("/_debug/{id}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;
    assert!(page.contains("/a"));

    let response = send(&app, get("/_debug/4242")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("not available"));
}
