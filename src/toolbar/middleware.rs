//! axum integration

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::{control, Toolbar};

/// Instrument every request passing through the router
///
/// The peer address comes from `ConnectInfo`, so serve the app with
/// `into_make_service_with_connect_info::<SocketAddr>()`; without it every
/// request bypasses the toolbar.
pub async fn middleware(
    State(toolbar): State<Arc<Toolbar>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = connect.map(|ConnectInfo(addr)| addr.ip());
    let result = toolbar
        .dispatch(request, peer, |request| async move { Ok(next.run(request).await) })
        .await;

    match result {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

impl Toolbar {
    /// Mount the control endpoints on `app` and instrument it
    pub fn attach(self: &Arc<Self>, app: Router) -> Router {
        app.merge(control::router(self.clone()))
            .layer(from_fn_with_state(self.clone(), middleware))
    }
}
