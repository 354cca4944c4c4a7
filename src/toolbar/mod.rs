//! Toolbar engine - instruments requests and owns every history
//!
//! One [`Toolbar`] is built at startup and shared as `Arc<Toolbar>`. For each
//! instrumented request [`Toolbar::dispatch`]:
//!
//! 1. builds the request state and its panels
//! 2. drives the handler inside the dispatch span, bracketed by the panic
//!    capture hooks and every panel's hooks
//! 3. turns a failure into a traceback page (or passes it through)
//! 4. replaces configured redirects with an interstitial page
//! 5. lets the panels see the final response and records the state
//! 6. injects the toolbar marker into HTML bodies
//!
//! Requests to the toolbar's own prefix, excluded paths, and clients outside
//! the allowed hosts bypass all of this.

mod access;
mod control;
mod inject;
mod middleware;

use axum::{
    body::{Body, HttpBody},
    http::{header, request::Parts, HeaderMap, Request, StatusCode},
    response::{Html, IntoResponse, Response},
};
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::future::Future;
use std::net::IpAddr;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::Instrument;

use crate::capture::{panic, CapturedTraceback, Failure, FrameRegistry, TracebackCapture};
use crate::config::Config;
use crate::error::HandlerError;
use crate::history::BoundedHistory;
use crate::ids::{IdGenerator, RequestId, TracebackId};
use crate::intercept::HandlerHooks;
use crate::panels::{AppInfo, GlobalContext, Panel, PanelContext, PanelRegistry, ResponseView};
use crate::render::{HtmlRenderer, Renderer};
use crate::state::RequestState;

pub use access::{HostFilter, HostNetwork, InvalidHost};
pub use inject::{inject_marker, inject_response, is_injectable};
pub use control::router as control_router;
pub use middleware::middleware;

/// The debug toolbar engine
pub struct Toolbar {
    config: Config,
    /// Per-engine secret required by the traceback endpoints
    token: String,
    hosts: HostFilter,
    renderer: Arc<dyn Renderer>,
    registry: PanelRegistry,
    /// Resolved request panel names, in display order
    request_panels: Vec<String>,
    global_panels: Vec<Box<dyn Panel>>,
    ids: IdGenerator,
    requests: BoundedHistory<RequestId, RequestState>,
    exceptions: BoundedHistory<TracebackId, CapturedTraceback>,
    frames: FrameRegistry,
    capture: TracebackCapture,
}

/// Builder for [`Toolbar`]
pub struct ToolbarBuilder {
    config: Config,
    app: AppInfo,
    renderer: Option<Arc<dyn Renderer>>,
    registry: PanelRegistry,
}

impl ToolbarBuilder {
    /// Routes, middlewares and packages shown by the global panels
    pub fn app(mut self, app: AppInfo) -> Self {
        self.app = app;
        self
    }

    /// Replace the built-in HTML templates
    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Replace the panel factories
    pub fn panels(mut self, registry: PanelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Arc<Toolbar> {
        panic::install_panic_hook();

        let config = self.config;
        let request_panels = self.registry.resolve_request(&config.toolbar.panels);
        let global_names = self.registry.resolve_global(&config.toolbar.global_panels);
        let global_panels = self.registry.build_global(
            &global_names,
            &GlobalContext {
                app: &self.app,
                config: &config,
                prefix: &config.toolbar.prefix,
            },
        );

        let hosts = HostFilter::from_config(&config.toolbar.hosts);
        if hosts.is_empty() && config.toolbar.enabled {
            tracing::warn!("No valid toolbar hosts configured; every request bypasses the toolbar");
        }

        let toolbar = Toolbar {
            token: uuid::Uuid::new_v4().simple().to_string(),
            hosts,
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(HtmlRenderer::new())),
            registry: self.registry,
            request_panels,
            global_panels,
            ids: IdGenerator::new(),
            requests: BoundedHistory::new(config.history.requests.max(1)),
            exceptions: BoundedHistory::new(config.history.exceptions.max(1)),
            frames: FrameRegistry::new(config.history.frames.max(1)),
            capture: TracebackCapture::new(config.capture.settings()),
            config,
        };

        tracing::debug!(
            prefix = %toolbar.config.toolbar.prefix,
            intercept = toolbar.config.toolbar.intercept_exc.as_str(),
            panels = ?toolbar.request_panels,
            "Debug toolbar initialized"
        );
        Arc::new(toolbar)
    }
}

/// How the handler finished
enum Outcome {
    Response(Response),
    Error(HandlerError),
    Panic(Box<dyn Any + Send>),
}

impl Toolbar {
    pub fn builder(config: Config) -> ToolbarBuilder {
        ToolbarBuilder {
            config,
            app: AppInfo::default(),
            renderer: None,
            registry: PanelRegistry::builtin(),
        }
    }

    /// Engine with the built-in panels and templates
    pub fn new(config: Config) -> Arc<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn prefix(&self) -> &str {
        &self.config.toolbar.prefix
    }

    /// The security token traceback, source and console calls must carry
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn panel_registry(&self) -> &PanelRegistry {
        &self.registry
    }

    pub fn global_panels(&self) -> &[Box<dyn Panel>] {
        &self.global_panels
    }

    pub fn requests(&self) -> &BoundedHistory<RequestId, RequestState> {
        &self.requests
    }

    pub fn exceptions(&self) -> &BoundedHistory<TracebackId, CapturedTraceback> {
        &self.exceptions
    }

    pub fn frames(&self) -> &FrameRegistry {
        &self.frames
    }

    /// Whether a request to `path` from `peer` gets instrumented
    pub fn should_instrument(&self, path: &str, peer: Option<IpAddr>) -> bool {
        let toolbar = &self.config.toolbar;
        if !toolbar.enabled || under_prefix(path, &toolbar.prefix) {
            return false;
        }
        if toolbar.exclude.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }
        self.hosts.allows(peer)
    }

    pub(crate) fn host_allowed(&self, peer: Option<IpAddr>) -> bool {
        self.hosts.allows(peer)
    }

    /// Run `handler` for `request`, instrumenting it when applicable
    ///
    /// With interception off, a failing handler's error is returned as is
    /// and a panic keeps unwinding, after the request has been recorded.
    pub async fn dispatch<H, Fut>(
        &self,
        request: Request<Body>,
        peer: Option<IpAddr>,
        handler: H,
    ) -> Result<Response, HandlerError>
    where
        H: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Result<Response, HandlerError>>,
    {
        if !self.should_instrument(request.uri().path(), peer) {
            return handler(request).await;
        }

        let (parts, body) = request.into_parts();
        let (form, body) = self.buffer_form(&parts, body).await;

        let id = self.ids.request();
        let intercept = self.config.toolbar.intercept_exc;
        let panels = self.registry.build_request(
            &self.request_panels,
            &PanelContext {
                request_id: id,
                parts: &parts,
                form: &form,
                prefix: self.prefix(),
                token: &self.token,
                evalex: intercept.evalex(),
            },
        );
        let mut state = RequestState::new(id, &parts, panels);

        // Panic capture must be registered first so it disarms last
        let mut hooks = HandlerHooks::new();
        panic::register_hooks(&mut hooks);
        for panel in state.panels() {
            panel.wrap_handler(&mut hooks);
        }

        tracing::debug!(request = %id, method = %parts.method, path = %parts.uri.path(), "Dispatching");

        // The span name is the capture boundary (`capture::DISPATCH_SPAN`)
        let span = tracing::info_span!("debug_toolbar.dispatch", request = %id);
        let handler_fut = hooks.wrap(handler(Request::from_parts(parts, body)));

        state.begin_dispatch();
        panic::clear_pending();
        let outcome = match AssertUnwindSafe(handler_fut)
            .catch_unwind()
            .instrument(span)
            .await
        {
            Ok(Ok(mut response)) => match response.extensions_mut().remove::<HandlerError>() {
                Some(error) => Outcome::Error(error),
                None => Outcome::Response(response),
            },
            Ok(Err(error)) => Outcome::Error(error),
            Err(payload) => Outcome::Panic(payload),
        };

        let (response, traceback) = match outcome {
            Outcome::Response(response) => {
                state.complete(response.status().as_u16());
                (self.intercept_redirect(response), None)
            }
            Outcome::Error(error) if !intercept.intercepts() => {
                self.record_passthrough(state);
                return Err(error);
            }
            Outcome::Panic(payload) if !intercept.intercepts() => {
                panic::clear_pending();
                self.record_passthrough(state);
                resume_unwind(payload);
            }
            Outcome::Error(error) => {
                let traceback = self.capture_failure(id, error.failure());
                state.fail(Some(traceback.clone()));
                (self.traceback_response(&traceback), Some(traceback))
            }
            Outcome::Panic(payload) => {
                let failure = panic::take_pending()
                    .unwrap_or_else(|| Failure::from_panic_payload(payload.as_ref()));
                drop(payload);
                let traceback = self.capture_failure(id, &failure);
                state.fail(Some(traceback.clone()));
                (self.traceback_response(&traceback), Some(traceback))
            }
        };

        state.process_response(&ResponseView {
            status: response.status(),
            headers: response.headers(),
            traceback: traceback.as_ref(),
        });
        self.record(state);

        Ok(self.inject(id, response).await)
    }

    /// Buffer a small url-encoded body so the request vars panel can show it
    async fn buffer_form(&self, parts: &Parts, body: Body) -> (Vec<(String, String)>, Body) {
        let is_form = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        let limit = self.config.toolbar.max_form_body;
        let fits = body
            .size_hint()
            .upper()
            .is_some_and(|upper| upper <= limit as u64);
        if !is_form || !fits {
            return (Vec::new(), body);
        }

        match axum::body::to_bytes(body, limit).await {
            Ok(bytes) => {
                let form = url::form_urlencoded::parse(&bytes).into_owned().collect();
                (form, Body::from(bytes))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to buffer form body");
                (Vec::new(), Body::empty())
            }
        }
    }

    fn capture_failure(&self, id: RequestId, failure: &Failure) -> Arc<CapturedTraceback> {
        let traceback = self.capture.capture(failure, &self.ids, &self.frames);
        self.exceptions.insert_arc(traceback.id, traceback.clone());
        tracing::info!(
            request = %id,
            traceback = %traceback.id,
            frames = traceback.frames.len(),
            "Captured {}",
            traceback.exception_line()
        );
        traceback
    }

    fn traceback_response(&self, traceback: &CapturedTraceback) -> Response {
        let evalex = self.config.toolbar.intercept_exc.evalex();
        match traceback.render_full(self.renderer(), evalex, &self.token, self.prefix()) {
            Ok(html) => (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response(),
            Err(e) => {
                tracing::warn!(error = %e, "Traceback page failed to render; sending plaintext");
                (StatusCode::INTERNAL_SERVER_ERROR, traceback.plaintext()).into_response()
            }
        }
    }

    /// Swap a configured redirect for a page linking to its target
    fn intercept_redirect(&self, response: Response) -> Response {
        let toolbar = &self.config.toolbar;
        let status = response.status();
        if !toolbar.intercept_redirects || !toolbar.redirect_codes.contains(&status.as_u16()) {
            return response;
        }
        let Some(location) = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            return response;
        };

        let ctx = json!({ "location": location, "status_code": status.as_u16() });
        match self.renderer.render("redirect", &ctx) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                tracing::warn!(error = %e, "Redirect page failed to render; passing redirect through");
                response
            }
        }
    }

    /// Record a failed request whose failure goes back to the caller untouched
    fn record_passthrough(&self, mut state: RequestState) {
        state.fail(None);
        state.process_response(&ResponseView {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: &HeaderMap::new(),
            traceback: None,
        });
        self.record(state);
    }

    fn record(&self, state: RequestState) {
        let id = state.id;
        let status = state.status_code();
        self.requests.insert_arc(id, state.into_recorded());
        tracing::debug!(request = %id, status, "Recorded request");
    }

    async fn inject(&self, id: RequestId, response: Response) -> Response {
        if !is_injectable(response.headers()) {
            return response;
        }
        let ctx = json!({
            "request_id": id,
            "toolbar_url": format!("{}/{}", self.prefix(), id),
        });
        match self.renderer.render("inject", &ctx) {
            Ok(marker) => {
                inject_response(response, &marker, self.config.toolbar.max_body_inject).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Toolbar marker failed to render");
                response
            }
        }
    }
}

impl std::fmt::Debug for Toolbar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbar")
            .field("prefix", &self.prefix())
            .field("panels", &self.request_panels)
            .field("requests", &self.requests)
            .field("exceptions", &self.exceptions)
            .field("frames", &self.frames.len())
            .finish()
    }
}

/// `path` is the prefix itself or below it
fn under_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterceptMode;
    use std::io;

    fn localhost() -> Option<IpAddr> {
        Some("127.0.0.1".parse().unwrap())
    }

    fn config(mode: InterceptMode) -> Config {
        let mut config = Config::default();
        config.toolbar.intercept_exc = mode;
        config
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn explode() -> Result<Response, HandlerError> {
        panic!("kaboom")
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_bypass_rules() {
        let mut config = Config::default();
        config.toolbar.exclude = vec!["/static".to_string()];
        let toolbar = Toolbar::new(config);

        assert!(toolbar.should_instrument("/", localhost()));
        assert!(toolbar.should_instrument("/_debugger", localhost()));
        assert!(!toolbar.should_instrument("/_debug", localhost()));
        assert!(!toolbar.should_instrument("/_debug/sse", localhost()));
        assert!(!toolbar.should_instrument("/static/app.css", localhost()));
        assert!(!toolbar.should_instrument("/", Some("192.168.1.9".parse().unwrap())));
        assert!(!toolbar.should_instrument("/", None));
    }

    #[test]
    fn test_token_is_hex_uuid() {
        let toolbar = Toolbar::new(Config::default());
        assert_eq!(toolbar.token().len(), 32);
        assert!(toolbar.token().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(toolbar.token(), Toolbar::new(Config::default()).token());
    }

    #[tokio::test]
    async fn test_success_is_recorded_with_status() {
        let toolbar = Toolbar::new(Config::default());
        let response = toolbar
            .dispatch(get("/items"), localhost(), |_| async {
                Ok((StatusCode::CREATED, "made").into_response())
            })
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_text(response).await, "made");
        let (_, state) = toolbar.requests().iter_newest_first().next().unwrap();
        assert_eq!(state.status_code(), 201);
        assert_eq!(state.path, "/items");
        assert!(toolbar.exceptions().is_empty());
    }

    #[tokio::test]
    async fn test_error_passes_through_when_interception_off() {
        let toolbar = Toolbar::new(config(InterceptMode::Off));
        let original = HandlerError::new(io::Error::other("disk on fire"));
        let returned = original.clone();

        let err = toolbar
            .dispatch(get("/"), localhost(), move |_| async move { Err(returned) })
            .await
            .unwrap_err();

        assert!(err.ptr_eq(&original));
        assert!(toolbar.exceptions().is_empty());
        let (_, state) = toolbar.requests().iter_newest_first().next().unwrap();
        assert_eq!(state.status_code(), 500);
        assert!(state.traceback().is_none());
    }

    #[tokio::test]
    async fn test_error_becomes_traceback_page() {
        let toolbar = Toolbar::new(config(InterceptMode::Debug));
        let response = toolbar
            .dispatch(get("/"), localhost(), |_| async {
                Err(HandlerError::new(io::Error::other("disk on fire")))
            })
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(toolbar.exceptions().len(), 1);
        let (_, traceback) = toolbar.exceptions().iter_newest_first().next().unwrap();
        assert!(!traceback.frames.is_empty());
        assert!(traceback.plaintext().contains("Error: disk on fire"));

        let html = body_text(response).await;
        assert!(html.contains("disk on fire"));
        assert!(html.contains("pDebugToolbarHandle"));

        let (_, state) = toolbar.requests().iter_newest_first().next().unwrap();
        assert_eq!(state.traceback().map(|tb| tb.id), Some(traceback.id));
    }

    #[tokio::test]
    async fn test_error_in_response_extensions_is_a_failure() {
        let toolbar = Toolbar::new(config(InterceptMode::Display));
        let response = toolbar
            .dispatch(get("/"), localhost(), |_| async {
                Ok(HandlerError::msg("hidden in a response").into_response())
            })
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(toolbar.exceptions().len(), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_traceback_page() {
        let toolbar = Toolbar::new(config(InterceptMode::Debug));
        let response = toolbar
            .dispatch(get("/"), localhost(), |_| async {
                tokio::task::yield_now().await;
                explode().await
            })
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let (_, traceback) = toolbar.exceptions().iter_newest_first().next().unwrap();
        assert_eq!(traceback.message, "kaboom");
        assert!(traceback.frames.iter().any(|f| f.file.ends_with("mod.rs")));
    }

    #[tokio::test]
    async fn test_panic_resumes_when_interception_off() {
        let toolbar = Toolbar::new(config(InterceptMode::Off));
        let result = AssertUnwindSafe(toolbar.dispatch(get("/"), localhost(), |_| explode()))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert_eq!(toolbar.requests().len(), 1);
        assert!(toolbar.exceptions().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_interstitial_keeps_recorded_status() {
        let toolbar = Toolbar::new(Config::default());
        let response = toolbar
            .dispatch(get("/old"), localhost(), |_| async {
                Ok((StatusCode::FOUND, [(header::LOCATION, "/new")]).into_response())
            })
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("href=\"/new\""));
        let (_, state) = toolbar.requests().iter_newest_first().next().unwrap();
        assert_eq!(state.status_code(), 302);
    }

    #[tokio::test]
    async fn test_redirect_without_location_untouched() {
        let toolbar = Toolbar::new(Config::default());
        let response = toolbar
            .dispatch(get("/"), localhost(), |_| async {
                Ok(StatusCode::MOVED_PERMANENTLY.into_response())
            })
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[tokio::test]
    async fn test_bypassed_request_not_recorded() {
        let toolbar = Toolbar::new(Config::default());
        let response = toolbar
            .dispatch(get("/"), Some("10.9.9.9".parse().unwrap()), |_| async {
                Ok(Html("<body></body>").into_response())
            })
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "<body></body>");
        assert!(toolbar.requests().is_empty());
    }

    #[tokio::test]
    async fn test_form_body_reaches_handler_and_panel() {
        let toolbar = Toolbar::new(Config::default());
        let request = Request::builder()
            .method("POST")
            .uri("/submit")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=ada&tag=a&tag=b"))
            .unwrap();

        let response = toolbar
            .dispatch(request, localhost(), |req| async move {
                let body = axum::body::to_bytes(req.into_body(), 1024).await?;
                Ok(String::from_utf8_lossy(&body).into_owned().into_response())
            })
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "name=ada&tag=a&tag=b");
        let (_, state) = toolbar.requests().iter_newest_first().next().unwrap();
        let panel = state
            .panels()
            .iter()
            .find(|p| p.name() == "Request Vars")
            .unwrap();
        let vars = panel.render_vars();
        assert_eq!(vars["post"][0][0], "name");
    }
}
