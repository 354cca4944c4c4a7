// Built-in HTML templates
//
// Each template reads its context with the small accessors below; every
// string taken from the context is escaped before it reaches the output,
// except fields documented as pre-rendered HTML (`content`, `summary`).

use serde_json::Value;
use std::fmt::Write as _;

use super::{RenderError, Renderer};
use crate::util::escape_html;

const STYLE: &str = "body{font-family:sans-serif;margin:0}\
#pDebugToolbar{display:flex}\
#pDebugNav{width:220px;background:#222;color:#fff;padding:8px}\
#pDebugNav a{color:#fff;display:block;padding:4px 0}\
.pDebugPanel{padding:8px 16px;border-bottom:1px solid #ddd}\
table{border-collapse:collapse}td,th{border:1px solid #ddd;padding:2px 6px;text-align:left;vertical-align:top}\
pre{background:#f6f6f6;padding:4px}.current{background:#fd8}\
.level-ERROR{color:#b00}.level-WARN{color:#a60}";

/// Renderer for the toolbar's own templates
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, template: &str, ctx: &Value) -> Result<String, RenderError> {
        let html = match template {
            "toolbar" => toolbar(ctx),
            "inject" => inject(ctx),
            "redirect" => redirect(ctx),
            "traceback" => traceback_page(ctx),
            "source" => source(ctx),
            "console" => console(ctx),
            "panels/headers" => headers_panel(ctx),
            "panels/request_vars" => request_vars_panel(ctx),
            "panels/logging" => logging_panel(ctx),
            "panels/traceback" => traceback_panel(ctx),
            "panels/routes" => routes_panel(ctx),
            "panels/configuration" => configuration_panel(ctx),
            "panels/middlewares" => middlewares_panel(ctx),
            "panels/versions" => versions_panel(ctx),
            other => return Err(RenderError::UnknownTemplate(other.to_string())),
        };
        Ok(html)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Context accessors
// ─────────────────────────────────────────────────────────────────────────────

/// Escaped string form of `ctx[key]` (empty when missing)
fn text(ctx: &Value, key: &str) -> String {
    escape_html(&raw(ctx, key))
}

/// Unescaped string form of `ctx[key]`
fn raw(ctx: &Value, key: &str) -> String {
    match ctx.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn items<'a>(ctx: &'a Value, key: &str) -> &'a [Value] {
    ctx.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn flag(ctx: &Value, key: &str) -> bool {
    ctx.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Two-column table from `[[key, value], ...]` pairs
fn pair_table(out: &mut String, heading: &str, pairs: &[Value]) {
    let _ = write!(out, "<h4>{}</h4>", escape_html(heading));
    if pairs.is_empty() {
        out.push_str("<p>None</p>");
        return;
    }
    out.push_str("<table><thead><tr><th>Key</th><th>Value</th></tr></thead><tbody>");
    for pair in pairs {
        let key = pair.get(0).map(value_text).unwrap_or_default();
        let value = pair.get(1).map(value_text).unwrap_or_default();
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(&key),
            escape_html(&value)
        );
    }
    out.push_str("</tbody></table>");
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        STYLE,
        body
    )
}

fn numbered_source(out: &mut String, lines: &[Value]) {
    out.push_str("<table class=\"source\"><tbody>");
    for line in lines {
        let class = if flag(line, "current") { " class=\"current\"" } else { "" };
        let _ = write!(
            out,
            "<tr{}><td class=\"lineno\">{}</td><td><pre>{}</pre></td></tr>",
            class,
            raw(line, "number"),
            text(line, "text")
        );
    }
    out.push_str("</tbody></table>");
}

// ─────────────────────────────────────────────────────────────────────────────
// Page templates
// ─────────────────────────────────────────────────────────────────────────────

fn inject(ctx: &Value) -> String {
    format!(
        "<div id=\"pDebug\" data-request-id=\"{}\"><a id=\"pDebugToolbarHandle\" href=\"{}\" target=\"pDebugToolbar\">Debug toolbar</a></div>",
        text(ctx, "request_id"),
        text(ctx, "toolbar_url")
    )
}

fn redirect(ctx: &Value) -> String {
    let location = text(ctx, "location");
    let body = format!(
        "<h1>Redirect ({})</h1>\n<p>The debug toolbar intercepted a redirect to:</p>\n<p><a href=\"{}\">{}</a></p>\n<p>Follow the link to continue. Disable <code>intercept_redirects</code> to skip this page.</p>",
        text(ctx, "status_code"),
        location,
        location
    );
    page("Redirect intercepted", &body)
}

fn panel_section(out: &mut String, panel: &Value) {
    if !flag(panel, "has_content") {
        return;
    }
    let _ = write!(
        out,
        "<div class=\"pDebugPanel\" id=\"{}\"><h3>{}</h3>{}</div>\n",
        text(panel, "dom_id"),
        text(panel, "title"),
        raw(panel, "content")
    );
}

fn panel_nav(out: &mut String, panel: &Value) {
    let subtitle = raw(panel, "nav_subtitle");
    if flag(panel, "has_content") {
        let _ = write!(out, "<a href=\"#{}\">{}", text(panel, "dom_id"), text(panel, "nav_title"));
    } else {
        let _ = write!(out, "<span>{}", text(panel, "nav_title"));
    }
    if !subtitle.is_empty() {
        let _ = write!(out, "<br><small>{}</small>", escape_html(&subtitle));
    }
    out.push_str(if flag(panel, "has_content") { "</a>\n" } else { "</span>\n" });
}

fn toolbar(ctx: &Value) -> String {
    let prefix = text(ctx, "prefix");
    let mut body = String::from("<div id=\"pDebugToolbar\">\n<nav id=\"pDebugNav\">\n");

    match ctx.get("request").filter(|r| !r.is_null()) {
        Some(request) => {
            let _ = write!(
                body,
                "<p><strong>{} {}</strong><br>{}</p>\n",
                text(request, "method"),
                text(request, "path"),
                text(request, "status_code")
            );
        }
        None => body.push_str("<p>No request recorded yet</p>\n"),
    }

    let panels = items(ctx, "panels");
    let global_panels = items(ctx, "global_panels");
    for panel in panels.iter().chain(global_panels) {
        panel_nav(&mut body, panel);
    }

    body.push_str("<h4>History</h4>\n<ul id=\"pDebugHistory\">\n");
    for record in items(ctx, "history") {
        let _ = write!(
            body,
            "<li><a href=\"{}/{}\">{} {} {}</a></li>\n",
            prefix,
            text(record, "id"),
            text(record, "method"),
            text(record, "path"),
            text(record, "status_code")
        );
    }
    let _ = write!(
        body,
        "</ul>\n</nav>\n<main id=\"pDebugPanels\" data-sse=\"{}\">\n",
        text(ctx, "sse_url")
    );

    for panel in panels.iter().chain(global_panels) {
        panel_section(&mut body, panel);
    }
    body.push_str("</main>\n</div>");

    page("Debug toolbar", &body)
}

fn traceback_page(ctx: &Value) -> String {
    let mut body = format!(
        "<h1>{}</h1>\n<div id=\"traceback\" data-traceback=\"{}\" data-token=\"{}\" data-evalex=\"{}\">\n",
        text(ctx, "title"),
        text(ctx, "id"),
        text(ctx, "token"),
        flag(ctx, "evalex")
    );
    if flag(ctx, "degraded") {
        body.push_str("<p class=\"warning\">Frame details could not be collected for this failure.</p>\n");
    }

    let prefix = text(ctx, "prefix");
    let token = text(ctx, "token");
    for frame in items(ctx, "frames") {
        let _ = write!(
            body,
            "<div class=\"frame\" id=\"frame-{}\">\n<h4>File <cite>\"{}\"</cite>, line <em>{}</em>, in <code>{}</code> <small>{}</small></h4>\n",
            text(frame, "id"),
            text(frame, "file"),
            text(frame, "line"),
            text(frame, "function"),
            text(frame, "module")
        );
        numbered_source(&mut body, items(frame, "lines"));

        let locals: Vec<Value> = items(frame, "locals")
            .iter()
            .map(|l| Value::Array(vec![l["name"].clone(), l["value"].clone()]))
            .collect();
        if !locals.is_empty() {
            pair_table(&mut body, "Locals", &locals);
        }

        let _ = write!(
            body,
            "<p><a href=\"{}/source?frm={}&amp;token={}\">View source</a></p>\n",
            prefix,
            text(frame, "id"),
            token
        );
        if flag(ctx, "evalex") {
            let _ = write!(
                body,
                "<form class=\"console\" action=\"{}/execute\" method=\"get\"><input type=\"hidden\" name=\"frm\" value=\"{}\"><input type=\"hidden\" name=\"token\" value=\"{}\"><code>&gt;&gt;&gt;</code> <input type=\"text\" name=\"cmd\"></form>\n",
                prefix,
                text(frame, "id"),
                token
            );
        }
        body.push_str("</div>\n");
    }

    let _ = write!(
        body,
        "<blockquote>{}</blockquote>\n<h3>Plaintext</h3>\n<textarea cols=\"100\" rows=\"12\" readonly>{}</textarea>\n</div>",
        text(ctx, "title"),
        text(ctx, "plaintext")
    );
    page(&raw(ctx, "title"), &body)
}

fn source(ctx: &Value) -> String {
    let mut out = format!(
        "<div class=\"source\" data-frame=\"{}\"><h4>{}</h4>",
        text(ctx, "id"),
        text(ctx, "file")
    );
    numbered_source(&mut out, items(ctx, "lines"));
    out.push_str("</div>");
    out
}

fn console(ctx: &Value) -> String {
    escape_html(&format!(">>> {}\n{}", raw(ctx, "command"), raw(ctx, "result")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Panel templates
// ─────────────────────────────────────────────────────────────────────────────

fn headers_panel(ctx: &Value) -> String {
    let mut out = String::new();
    pair_table(&mut out, "Request headers", items(ctx, "request_headers"));
    pair_table(&mut out, "Response headers", items(ctx, "response_headers"));
    out
}

fn request_vars_panel(ctx: &Value) -> String {
    let mut out = String::new();
    pair_table(&mut out, "GET", items(ctx, "get"));
    pair_table(&mut out, "POST", items(ctx, "post"));
    pair_table(&mut out, "Cookies", items(ctx, "cookies"));
    let _ = write!(out, "<h4>Request</h4><p>{}</p>", text(ctx, "url"));
    out
}

fn logging_panel(ctx: &Value) -> String {
    let records = items(ctx, "records");
    if records.is_empty() {
        return "<p>No records</p>".to_string();
    }
    let mut out = String::from(
        "<table><thead><tr><th>Level</th><th>Time</th><th>Target</th><th>Message</th><th>Location</th></tr></thead><tbody>",
    );
    for record in records {
        let level = text(record, "level");
        let _ = write!(
            out,
            "<tr class=\"level-{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            level,
            level,
            text(record, "timestamp"),
            text(record, "target"),
            text(record, "message"),
            text(record, "location")
        );
    }
    out.push_str("</tbody></table>");
    out
}

fn traceback_panel(ctx: &Value) -> String {
    if ctx.get("id").map_or(true, Value::is_null) {
        return "<p>No traceback</p>".to_string();
    }
    format!(
        "{}\n<p><a href=\"{}/exception?tb={}&amp;token={}\">Open the interactive traceback</a></p>",
        raw(ctx, "summary"),
        text(ctx, "prefix"),
        text(ctx, "id"),
        text(ctx, "token")
    )
}

fn routes_panel(ctx: &Value) -> String {
    let mut out = String::from(
        "<table><thead><tr><th>Name</th><th>Method</th><th>Pattern</th><th>Handler</th></tr></thead><tbody>",
    );
    for route in items(ctx, "routes") {
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            text(route, "name"),
            text(route, "method"),
            text(route, "pattern"),
            text(route, "handler")
        );
    }
    out.push_str("</tbody></table>");
    out
}

fn configuration_panel(ctx: &Value) -> String {
    format!("<pre class=\"config\">{}</pre>", text(ctx, "config"))
}

fn middlewares_panel(ctx: &Value) -> String {
    let mut out = String::from("<ol>");
    for name in items(ctx, "middlewares") {
        let _ = write!(out, "<li>{}</li>", escape_html(&value_text(name)));
    }
    out.push_str("</ol>");
    out
}

fn versions_panel(ctx: &Value) -> String {
    let platform = ctx.get("platform").cloned().unwrap_or(Value::Null);
    let mut out = format!(
        "<h4>Platform</h4><p>{} {} ({})</p><h4>debug-toolbar</h4><p>{}</p>",
        text(&platform, "os"),
        text(&platform, "arch"),
        text(&platform, "family"),
        text(ctx, "version")
    );
    let packages: Vec<Value> = items(ctx, "packages")
        .iter()
        .map(|p| Value::Array(vec![p["name"].clone(), p["version"].clone()]))
        .collect();
    pair_table(&mut out, "Packages", &packages);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_template_is_error() {
        let err = HtmlRenderer::new().render("nope", &json!({})).unwrap_err();
        assert!(matches!(err, RenderError::UnknownTemplate(name) if name == "nope"));
    }

    #[test]
    fn test_inject_links_to_toolbar() {
        let html = HtmlRenderer::new()
            .render("inject", &json!({"request_id": "3", "toolbar_url": "/_debug/3"}))
            .unwrap();
        assert!(html.contains("href=\"/_debug/3\""));
        assert!(!html.contains("</body>"));
    }

    #[test]
    fn test_context_strings_are_escaped() {
        let html = HtmlRenderer::new()
            .render(
                "panels/headers",
                &json!({"request_headers": [["x-evil", "<script>"]], "response_headers": []}),
            )
            .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_toolbar_lists_panels_and_history() {
        let ctx = json!({
            "prefix": "/_debug",
            "request": {"id": "1", "method": "GET", "path": "/", "status_code": 200},
            "panels": [{
                "dom_id": "pDebugHeadersPanel", "title": "Headers", "nav_title": "Headers",
                "nav_subtitle": "", "has_content": true, "content": "<table></table>"
            }],
            "global_panels": [],
            "history": [{"id": "1", "method": "GET", "path": "/", "status_code": 200}],
            "sse_url": "/_debug/sse?request_id=1",
        });
        let html = HtmlRenderer::new().render("toolbar", &ctx).unwrap();
        assert!(html.contains("id=\"pDebugHeadersPanel\""));
        assert!(html.contains("href=\"/_debug/1\""));
        assert!(html.contains("<table></table>"));
    }
}
