use serde_json::{json, Value};
use std::sync::Arc;

use super::{Panel, PanelContext, ResponseView};
use crate::capture::CapturedTraceback;

/// The traceback of a failed request, if any
#[derive(Debug)]
pub struct TracebackPanel {
    traceback: Option<Arc<CapturedTraceback>>,
    prefix: String,
    token: String,
    evalex: bool,
}

impl TracebackPanel {
    pub fn new(ctx: &PanelContext<'_>) -> Self {
        Self {
            traceback: None,
            prefix: ctx.prefix.to_string(),
            token: ctx.token.to_string(),
            evalex: ctx.evalex,
        }
    }
}

impl Panel for TracebackPanel {
    fn name(&self) -> &'static str {
        "Traceback"
    }

    fn has_content(&self) -> bool {
        self.traceback.is_some()
    }

    fn template(&self) -> &'static str {
        "panels/traceback"
    }

    fn process_response(&mut self, response: &ResponseView<'_>) {
        self.traceback = response.traceback.cloned();
    }

    fn render_vars(&self) -> Value {
        match &self.traceback {
            Some(tb) => tb.render_vars(self.evalex, &self.token, &self.prefix),
            None => json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Failure, FrameRegistry, TracebackCapture};
    use crate::ids::IdGenerator;
    use crate::panels::test_support::{context, parts};
    use axum::http::{HeaderMap, StatusCode};

    #[test]
    fn test_content_only_with_traceback() {
        let parts = parts("/", &[]);
        let mut panel = TracebackPanel::new(&context(&parts, &[]));
        assert!(!panel.has_content());

        let failure = Failure::from_panic_payload(&"boom");
        let tb = TracebackCapture::default().capture(&failure, &IdGenerator::new(), &FrameRegistry::new(2));
        panel.process_response(&ResponseView {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: &HeaderMap::new(),
            traceback: Some(&tb),
        });

        assert!(panel.has_content());
        let vars = panel.render_vars();
        assert_eq!(vars["title"], "panic: boom");
        assert_eq!(vars["token"], "secret");
        assert_eq!(vars["evalex"], true);
    }
}
