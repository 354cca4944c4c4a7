//! Shared helpers for router-level tests
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, Response},
    Router,
};
use debug_toolbar::config::{Config, InterceptMode};
use debug_toolbar::{FrameLayer, RequestLogLayer, Toolbar};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOCAL_CLIENT: ([u8; 4], u16) = ([127, 0, 0, 1], 40000);
pub const REMOTE_CLIENT: ([u8; 4], u16) = ([203, 0, 113, 7], 40000);

/// Route spans and events through the toolbar's layers for this thread
pub fn init_tracing() -> DefaultGuard {
    tracing_subscriber::registry()
        .with(FrameLayer::default())
        .with(RequestLogLayer::new())
        .set_default()
}

pub fn toolbar(mode: InterceptMode) -> Arc<Toolbar> {
    let mut config = Config::default();
    config.toolbar.intercept_exc = mode;
    Toolbar::new(config)
}

/// `routes` with the toolbar attached, as seen from `client`
pub fn app_from(toolbar: &Arc<Toolbar>, routes: Router, client: ([u8; 4], u16)) -> Router {
    toolbar
        .attach(routes)
        .layer(MockConnectInfo(SocketAddr::from(client)))
}

pub fn app(toolbar: &Arc<Toolbar>, routes: Router) -> Router {
    app_from(toolbar, routes, LOCAL_CLIENT)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
