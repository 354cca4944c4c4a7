use axum::http::HeaderMap;
use serde_json::{json, Value};

use super::{Panel, PanelContext, ResponseView};

/// Request and response headers, sorted by name
#[derive(Debug, Default)]
pub struct HeadersPanel {
    request_headers: Vec<(String, String)>,
    response_headers: Vec<(String, String)>,
}

impl HeadersPanel {
    pub fn new(ctx: &PanelContext<'_>) -> Self {
        Self {
            request_headers: sorted_headers(&ctx.parts.headers),
            response_headers: Vec::new(),
        }
    }
}

fn sorted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    // Stable sort keeps repeated headers in arrival order
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

impl Panel for HeadersPanel {
    fn name(&self) -> &'static str {
        "Headers"
    }

    fn title(&self) -> String {
        "HTTP Headers".to_string()
    }

    fn nav_title(&self) -> String {
        "Headers".to_string()
    }

    fn template(&self) -> &'static str {
        "panels/headers"
    }

    fn process_response(&mut self, response: &ResponseView<'_>) {
        self.response_headers = sorted_headers(response.headers);
    }

    fn render_vars(&self) -> Value {
        json!({
            "request_headers": self.request_headers,
            "response_headers": self.response_headers,
        })
    }
}
