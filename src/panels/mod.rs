//! Panels - pluggable observers of a request (or of the whole app)
//!
//! Request panels are built fresh for every instrumented request from the
//! registry's named factories, selected by configuration. They may hook the
//! handler's polls (`wrap_handler`), observe the final response
//! (`process_response`), and finally produce view data for the toolbar.
//! Global panels are built once, when the engine is constructed.

mod global;
mod headers;
mod logging;
mod request_vars;
mod traceback;

use axum::http::{request::Parts, HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::capture::CapturedTraceback;
use crate::config::Config;
use crate::ids::RequestId;
use crate::intercept::HandlerHooks;
use crate::render::{RenderError, Renderer};
use crate::util::escape_html;

pub use global::{ConfigurationPanel, MiddlewaresPanel, RoutesPanel, VersionsPanel};
pub use headers::HeadersPanel;
pub use logging::LoggingPanel;
pub use request_vars::RequestVarsPanel;
pub use traceback::TracebackPanel;

/// The final response as panels see it
#[derive(Debug, Clone, Copy)]
pub struct ResponseView<'a> {
    pub status: StatusCode,
    pub headers: &'a HeaderMap,
    /// Set when the handler failed and a traceback was captured
    pub traceback: Option<&'a Arc<CapturedTraceback>>,
}

/// A toolbar panel
pub trait Panel: Send + Sync {
    /// Display name; also the base of the DOM id
    fn name(&self) -> &'static str;

    /// Name of the template rendering this panel's view data
    fn template(&self) -> &'static str;

    /// View data for the template
    fn render_vars(&self) -> Value;

    fn dom_id(&self) -> String {
        format!("pDebug{}Panel", self.name().replace(' ', ""))
    }

    fn title(&self) -> String {
        self.name().to_string()
    }

    fn nav_title(&self) -> String {
        self.title()
    }

    fn nav_subtitle(&self) -> String {
        String::new()
    }

    fn has_content(&self) -> bool {
        true
    }

    /// Register enter/exit hooks around the handler's polls
    fn wrap_handler(&self, _hooks: &mut HandlerHooks) {}

    /// Observe the final response
    fn process_response(&mut self, _response: &ResponseView<'_>) {}

    fn render_content(&self, renderer: &dyn Renderer) -> Result<String, RenderError> {
        renderer.render(self.template(), &self.render_vars())
    }
}

/// Navigation and content entry for the toolbar template
///
/// A panel whose template fails still gets an entry, with the error as content.
pub fn describe(panel: &dyn Panel, renderer: &dyn Renderer) -> Value {
    let content = if panel.has_content() {
        panel.render_content(renderer).unwrap_or_else(|e| {
            tracing::warn!(panel = panel.name(), error = %e, "Panel failed to render");
            format!("<p class=\"error\">{}</p>", escape_html(&e.to_string()))
        })
    } else {
        String::new()
    };

    json!({
        "name": panel.name(),
        "dom_id": panel.dom_id(),
        "title": panel.title(),
        "nav_title": panel.nav_title(),
        "nav_subtitle": panel.nav_subtitle(),
        "has_content": panel.has_content(),
        "content": content,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Host application description (for the global panels)
// ─────────────────────────────────────────────────────────────────────────────

/// One route of the host application
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteInfo {
    pub name: String,
    pub method: String,
    pub pattern: String,
    pub handler: String,
}

impl RouteInfo {
    pub fn new(
        name: impl Into<String>,
        method: impl Into<String>,
        pattern: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            pattern: pattern.into(),
            handler: handler.into(),
        }
    }
}

/// A dependency reported by the host application
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// What the host tells the toolbar about itself
#[derive(Debug, Clone, Default)]
pub struct AppInfo {
    pub routes: Vec<RouteInfo>,
    /// Middleware names, outermost first
    pub middlewares: Vec<String>,
    pub packages: Vec<PackageInfo>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Inputs available when a request panel is built
#[derive(Debug, Clone, Copy)]
pub struct PanelContext<'a> {
    pub request_id: RequestId,
    pub parts: &'a Parts,
    /// Decoded url-encoded body pairs, empty when not buffered
    pub form: &'a [(String, String)],
    pub prefix: &'a str,
    pub token: &'a str,
    /// Whether the console is reachable
    pub evalex: bool,
}

/// Inputs available when a global panel is built
#[derive(Debug, Clone, Copy)]
pub struct GlobalContext<'a> {
    pub app: &'a AppInfo,
    pub config: &'a Config,
    /// Toolbar prefix; its routes are hidden from the route table
    pub prefix: &'a str,
}

pub type PanelFactory = fn(&PanelContext<'_>) -> Box<dyn Panel>;
pub type GlobalPanelFactory = fn(&GlobalContext<'_>) -> Box<dyn Panel>;

/// Named panel factories
#[derive(Clone)]
pub struct PanelRegistry {
    request: Vec<(String, PanelFactory)>,
    global: Vec<(String, GlobalPanelFactory)>,
}

impl PanelRegistry {
    /// Registry without any panels
    pub fn empty() -> Self {
        Self {
            request: Vec::new(),
            global: Vec::new(),
        }
    }

    /// Registry with the built-in panels
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("headers", |ctx| Box::new(HeadersPanel::new(ctx)));
        registry.register("request_vars", |ctx| Box::new(RequestVarsPanel::new(ctx)));
        registry.register("logging", |_| Box::new(LoggingPanel::new()));
        registry.register("traceback", |ctx| Box::new(TracebackPanel::new(ctx)));
        registry.register_global("routes", |ctx| Box::new(RoutesPanel::new(ctx)));
        registry.register_global("configuration", |ctx| Box::new(ConfigurationPanel::new(ctx)));
        registry.register_global("middlewares", |ctx| Box::new(MiddlewaresPanel::new(ctx)));
        registry.register_global("versions", |ctx| Box::new(VersionsPanel::new(ctx)));
        registry
    }

    /// Add or replace a request panel factory
    pub fn register(&mut self, name: impl Into<String>, factory: PanelFactory) {
        let name = name.into();
        match self.request.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = factory,
            None => self.request.push((name, factory)),
        }
    }

    /// Add or replace a global panel factory
    pub fn register_global(&mut self, name: impl Into<String>, factory: GlobalPanelFactory) {
        let name = name.into();
        match self.global.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = factory,
            None => self.global.push((name, factory)),
        }
    }

    pub fn request_names(&self) -> Vec<&str> {
        self.request.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn global_names(&self) -> Vec<&str> {
        self.global.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Keep the names that have a request factory, warning about the rest
    pub fn resolve_request(&self, names: &[String]) -> Vec<String> {
        resolve(names, |n| self.request.iter().any(|(r, _)| r == n), "request")
    }

    /// Keep the names that have a global factory, warning about the rest
    pub fn resolve_global(&self, names: &[String]) -> Vec<String> {
        resolve(names, |n| self.global.iter().any(|(r, _)| r == n), "global")
    }

    /// Build request panels in the order of `names`; unknown names are skipped
    pub fn build_request(&self, names: &[String], ctx: &PanelContext<'_>) -> Vec<Box<dyn Panel>> {
        names
            .iter()
            .filter_map(|name| self.request.iter().find(|(n, _)| n == name))
            .map(|(_, factory)| factory(ctx))
            .collect()
    }

    /// Build global panels in the order of `names`; unknown names are skipped
    pub fn build_global(&self, names: &[String], ctx: &GlobalContext<'_>) -> Vec<Box<dyn Panel>> {
        names
            .iter()
            .filter_map(|name| self.global.iter().find(|(n, _)| n == name))
            .map(|(_, factory)| factory(ctx))
            .collect()
    }
}

impl Default for PanelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for PanelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelRegistry")
            .field("request", &self.request_names())
            .field("global", &self.global_names())
            .finish()
    }
}

fn resolve(names: &[String], known: impl Fn(&str) -> bool, kind: &str) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            let ok = known(name);
            if !ok {
                tracing::warn!(panel = %name, kind, "Unknown panel in configuration; skipping");
            }
            ok
        })
        .cloned()
        .collect()
}
