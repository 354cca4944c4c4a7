//! Control endpoints under the toolbar prefix
//!
//! ```text
//! GET {prefix}                          toolbar for the newest request
//! GET {prefix}/{request_id}             toolbar for one request
//! GET {prefix}/sse?request_id=          new requests since Last-Event-Id
//! GET {prefix}/exception?tb=&token=     full traceback page
//! GET {prefix}/source?frm=&token=       source of one frame
//! GET {prefix}/execute?frm=&cmd=&token= evaluate in a frame's console
//! ```
//!
//! Every endpoint requires an allowed client address. The traceback
//! endpoints also require the engine's token, checked before any lookup.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use super::Toolbar;
use crate::capture::MAX_COMMAND_LEN;
use crate::error::{ToolbarError, Unauthorized};
use crate::events::{self, EventBatch};
use crate::ids::{FrameId, RequestId, TracebackId};
use crate::panels::describe;

type Peer = Option<ConnectInfo<SocketAddr>>;

fn peer_ip(peer: Peer) -> Option<IpAddr> {
    peer.map(|ConnectInfo(addr)| addr.ip())
}

/// Build the router serving the control endpoints
pub fn router(toolbar: Arc<Toolbar>) -> Router {
    let prefix = toolbar.prefix().to_string();
    Router::new()
        .route(&prefix, get(toolbar_latest))
        .route(&format!("{prefix}/"), get(toolbar_latest))
        .route(&format!("{prefix}/sse"), get(sse))
        .route(&format!("{prefix}/exception"), get(exception))
        .route(&format!("{prefix}/source"), get(source))
        .route(&format!("{prefix}/execute"), get(execute))
        .route(&format!("{prefix}/:request_id"), get(toolbar_view))
        .with_state(toolbar)
}

// ─────────────────────────────────────────────────────────────────────────────
// Query parameters
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SseQuery {
    pub request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TracebackQuery {
    pub tb: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FrameQuery {
    pub frm: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteQuery {
    pub frm: Option<String>,
    pub cmd: Option<String>,
    pub token: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn toolbar_latest(
    State(toolbar): State<Arc<Toolbar>>,
    peer: Peer,
) -> Result<Html<String>, ToolbarError> {
    toolbar.check_host(peer_ip(peer))?;
    toolbar.render_toolbar(None).map(Html)
}

async fn toolbar_view(
    State(toolbar): State<Arc<Toolbar>>,
    peer: Peer,
    Path(request_id): Path<String>,
) -> Result<Html<String>, ToolbarError> {
    toolbar.check_host(peer_ip(peer))?;
    toolbar.render_toolbar(Some(&request_id)).map(Html)
}

async fn sse(
    State(toolbar): State<Arc<Toolbar>>,
    peer: Peer,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> Result<Response, ToolbarError> {
    toolbar.check_host(peer_ip(peer))?;
    let last_seen = headers.get("last-event-id").and_then(|v| v.to_str().ok());
    let batch = toolbar.poll_events(last_seen, query.request_id.as_deref());

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        batch.to_sse(),
    )
        .into_response())
}

async fn exception(
    State(toolbar): State<Arc<Toolbar>>,
    peer: Peer,
    Query(query): Query<TracebackQuery>,
) -> Result<Html<String>, ToolbarError> {
    toolbar.check_host(peer_ip(peer))?;
    toolbar
        .render_exception(query.tb.as_deref(), query.token.as_deref())
        .map(Html)
}

async fn source(
    State(toolbar): State<Arc<Toolbar>>,
    peer: Peer,
    Query(query): Query<FrameQuery>,
) -> Result<Html<String>, ToolbarError> {
    toolbar.check_host(peer_ip(peer))?;
    toolbar
        .render_frame_source(query.frm.as_deref(), query.token.as_deref())
        .map(Html)
}

async fn execute(
    State(toolbar): State<Arc<Toolbar>>,
    peer: Peer,
    Query(query): Query<ExecuteQuery>,
) -> Result<Html<String>, ToolbarError> {
    toolbar.check_host(peer_ip(peer))?;
    toolbar
        .execute(
            query.frm.as_deref(),
            query.cmd.as_deref(),
            query.token.as_deref(),
        )
        .map(Html)
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint logic
// ─────────────────────────────────────────────────────────────────────────────

impl Toolbar {
    pub fn check_host(&self, peer: Option<IpAddr>) -> Result<(), ToolbarError> {
        if self.host_allowed(peer) {
            return Ok(());
        }
        let host = peer.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
        Err(Unauthorized::Host(host).into())
    }

    pub fn check_token(&self, token: Option<&str>) -> Result<(), ToolbarError> {
        match token.filter(|t| !t.is_empty()) {
            None => Err(Unauthorized::MissingToken.into()),
            Some(t) if t == self.token() => Ok(()),
            Some(_) => Err(Unauthorized::BadToken.into()),
        }
    }

    /// Toolbar page for `request_id`, or for the newest request
    pub fn render_toolbar(&self, request_id: Option<&str>) -> Result<String, ToolbarError> {
        let state = match request_id {
            Some(raw) => {
                let id: RequestId = parse_param("request_id", Some(raw))?;
                Some(self.requests().get(&id).ok_or_else(|| evicted("request", raw))?)
            }
            None => self
                .requests()
                .last_key()
                .and_then(|id| self.requests().get(&id)),
        };

        let renderer = self.renderer();
        let current = state.as_ref().map(|s| s.id);
        let (request, panels) = match &state {
            Some(state) => (
                json!({
                    "id": state.id,
                    "method": state.method,
                    "path": state.path,
                    "status_code": state.status_code(),
                }),
                state
                    .panels()
                    .iter()
                    .map(|p| describe(p.as_ref(), renderer))
                    .collect::<Vec<Value>>(),
            ),
            None => (Value::Null, Vec::new()),
        };

        let history: Vec<_> = self
            .requests()
            .iter_newest_first()
            .map(|(id, s)| s.to_record(Some(id) == current))
            .collect();
        let sse_url = match current {
            Some(id) => format!("{}/sse?request_id={}", self.prefix(), id),
            None => format!("{}/sse", self.prefix()),
        };

        let ctx = json!({
            "prefix": self.prefix(),
            "request": request,
            "panels": panels,
            "global_panels": self
                .global_panels()
                .iter()
                .map(|p| describe(p.as_ref(), renderer))
                .collect::<Vec<Value>>(),
            "history": history,
            "sse_url": sse_url,
        });
        Ok(renderer.render("toolbar", &ctx)?)
    }

    pub fn poll_events(&self, last_seen: Option<&str>, active: Option<&str>) -> EventBatch {
        events::poll(self.requests(), last_seen, active)
    }

    pub fn render_exception(
        &self,
        tb: Option<&str>,
        token: Option<&str>,
    ) -> Result<String, ToolbarError> {
        self.check_token(token)?;
        let id: TracebackId = parse_param("tb", tb)?;
        let traceback = self
            .exceptions()
            .get(&id)
            .ok_or_else(|| evicted("traceback", &id.to_string()))?;

        let evalex = self.config().toolbar.intercept_exc.evalex();
        Ok(traceback.render_full(self.renderer(), evalex, self.token(), self.prefix())?)
    }

    pub fn render_frame_source(
        &self,
        frm: Option<&str>,
        token: Option<&str>,
    ) -> Result<String, ToolbarError> {
        self.check_token(token)?;
        let id: FrameId = parse_param("frm", frm)?;
        let frame = self
            .frames()
            .resolve(id)
            .map_err(|e| evicted("frame", &e.0.to_string()))?;
        Ok(frame.render_source(self.renderer())?)
    }

    /// Run `cmd` in the frame's console; the output is HTML-escaped
    pub fn execute(
        &self,
        frm: Option<&str>,
        cmd: Option<&str>,
        token: Option<&str>,
    ) -> Result<String, ToolbarError> {
        self.check_token(token)?;
        if !self.config().toolbar.intercept_exc.evalex() {
            return Err(ToolbarError::BadRequest("evaluation is disabled".to_string()));
        }
        let cmd = cmd.ok_or_else(|| ToolbarError::BadRequest("missing cmd".to_string()))?;
        if cmd.len() > MAX_COMMAND_LEN {
            return Err(ToolbarError::BadRequest(format!(
                "cmd longer than {MAX_COMMAND_LEN} bytes"
            )));
        }
        let id: FrameId = parse_param("frm", frm)?;
        let frame = self
            .frames()
            .resolve(id)
            .map_err(|e| evicted("frame", &e.0.to_string()))?;

        let output = frame.eval(cmd);
        let ctx = serde_json::to_value(&output)
            .map_err(|e| ToolbarError::BadRequest(e.to_string()))?;
        Ok(self.renderer().render("console", &ctx)?)
    }
}

fn parse_param<T: FromStr>(name: &str, value: Option<&str>) -> Result<T, ToolbarError> {
    let value = value.ok_or_else(|| ToolbarError::BadRequest(format!("missing {name}")))?;
    value
        .parse()
        .map_err(|_| ToolbarError::BadRequest(format!("malformed {name}: {value:?}")))
}

fn evicted(kind: &'static str, id: &str) -> ToolbarError {
    ToolbarError::EvictedReference {
        kind,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, InterceptMode};
    use crate::error::HandlerError;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn localhost() -> Option<IpAddr> {
        Some("127.0.0.1".parse().unwrap())
    }

    async fn failed_request(toolbar: &Toolbar) -> TracebackId {
        let request = Request::builder().uri("/fail").body(Body::empty()).unwrap();
        toolbar
            .dispatch(request, localhost(), |_| async {
                Err(HandlerError::msg("no such widget"))
            })
            .await
            .unwrap();
        toolbar.exceptions().last_key().unwrap()
    }

    #[test]
    fn test_token_checked_before_lookup() {
        let toolbar = Toolbar::new(Config::default());

        let err = toolbar.render_exception(Some("999"), None).unwrap_err();
        assert!(matches!(err, ToolbarError::Unauthorized(Unauthorized::MissingToken)));

        let err = toolbar.render_exception(Some("999"), Some("nope")).unwrap_err();
        assert!(matches!(err, ToolbarError::Unauthorized(Unauthorized::BadToken)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = toolbar.render_frame_source(Some("not-a-number"), Some("nope")).unwrap_err();
        assert!(matches!(err, ToolbarError::Unauthorized(Unauthorized::BadToken)));
    }

    #[test]
    fn test_unknown_ids_are_evicted_references() {
        let toolbar = Toolbar::new(Config::default());
        let token = toolbar.token().to_string();

        let err = toolbar.render_exception(Some("999"), Some(&token)).unwrap_err();
        assert!(matches!(err, ToolbarError::EvictedReference { kind: "traceback", .. }));

        let err = toolbar.render_frame_source(Some("5"), Some(&token)).unwrap_err();
        assert!(matches!(err, ToolbarError::EvictedReference { kind: "frame", .. }));

        let err = toolbar.render_toolbar(Some("77")).unwrap_err();
        assert!(matches!(err, ToolbarError::EvictedReference { kind: "request", .. }));

        let err = toolbar.render_exception(Some("x"), Some(&token)).unwrap_err();
        assert!(matches!(err, ToolbarError::BadRequest(_)));
    }

    #[test]
    fn test_host_check() {
        let toolbar = Toolbar::new(Config::default());
        assert!(toolbar.check_host(localhost()).is_ok());
        let err = toolbar.check_host(Some("203.0.113.5".parse().unwrap())).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_exception_and_source_render() {
        let toolbar = Toolbar::new(Config::default());
        let tb = failed_request(&toolbar).await;
        let token = toolbar.token().to_string();

        let page = toolbar
            .render_exception(Some(&tb.to_string()), Some(&token))
            .unwrap();
        assert!(page.contains("no such widget"));

        let traceback = toolbar.exceptions().get(&tb).unwrap();
        let frame = traceback.frames[0].id.to_string();
        let source = toolbar.render_frame_source(Some(&frame), Some(&token)).unwrap();
        assert!(source.contains("data-frame"));
    }

    #[tokio::test]
    async fn test_execute_in_frame() {
        let toolbar = Toolbar::new(Config::default());
        let tb = failed_request(&toolbar).await;
        let token = toolbar.token().to_string();
        let frame = toolbar.exceptions().get(&tb).unwrap().frames[0].id.to_string();

        let out = toolbar.execute(Some(&frame), Some("x = 6 * 7"), Some(&token)).unwrap();
        assert!(out.contains("&gt;&gt;&gt; x = 6 * 7"));
        let out = toolbar.execute(Some(&frame), Some("x"), Some(&token)).unwrap();
        assert!(out.contains("42"));

        let err = toolbar.execute(Some(&frame), None, Some(&token)).unwrap_err();
        assert!(matches!(err, ToolbarError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_execute_rejects_oversized_and_hostile_commands() {
        let toolbar = Toolbar::new(Config::default());
        let tb = failed_request(&toolbar).await;
        let token = toolbar.token().to_string();
        let frame = toolbar.exceptions().get(&tb).unwrap().frames[0].id.to_string();

        let long = format!("{}1", "-".repeat(MAX_COMMAND_LEN));
        let err = toolbar.execute(Some(&frame), Some(&long), Some(&token)).unwrap_err();
        assert!(matches!(err, ToolbarError::BadRequest(_)));

        let deep = format!("{}1", "(".repeat(MAX_COMMAND_LEN - 1));
        let out = toolbar.execute(Some(&frame), Some(&deep), Some(&token)).unwrap();
        assert!(out.contains("expression too deeply nested"));

        let out = toolbar
            .execute(Some(&frame), Some("'ab' * 9223372036854775807"), Some(&token))
            .unwrap();
        assert!(out.contains("MemoryError"));
    }

    #[tokio::test]
    async fn test_execute_refused_in_display_mode() {
        let mut config = Config::default();
        config.toolbar.intercept_exc = InterceptMode::Display;
        let toolbar = Toolbar::new(config);
        let tb = failed_request(&toolbar).await;
        let frame = toolbar.exceptions().get(&tb).unwrap().frames[0].id.to_string();
        let token = toolbar.token().to_string();

        let err = toolbar.execute(Some(&frame), Some("1"), Some(&token)).unwrap_err();
        assert!(matches!(err, ToolbarError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_toolbar_page_lists_request_panels() {
        let toolbar = Toolbar::new(Config::default());
        assert!(toolbar.render_toolbar(None).unwrap().contains("No request recorded yet"));

        failed_request(&toolbar).await;
        let page = toolbar.render_toolbar(None).unwrap();
        assert!(page.contains("pDebugHeadersPanel"));
        assert!(page.contains("pDebugTracebackPanel"));
        assert!(page.contains("pDebugVersionsPanel"));
        assert!(page.contains("/fail"));
    }
}
