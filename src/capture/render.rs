// Traceback renderings
//
// Plaintext and the HTML summary are built directly; the full page and the
// frame source view go through the named `traceback` and `source` templates
// of the configured renderer.

use serde_json::{json, Value};
use std::fmt::Write as _;

use super::{CapturedFrame, CapturedTraceback};
use crate::render::{RenderError, Renderer};
use crate::util::escape_html;

impl CapturedTraceback {
    /// Python-style plaintext traceback, outermost frame first
    pub fn plaintext(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in &self.frames {
            let _ = writeln!(
                out,
                "  File \"{}\", line {}, in {}",
                frame.file, frame.line, frame.function
            );
            if let Some(text) = frame.window.current_text() {
                let _ = writeln!(out, "    {}", text.trim());
            }
        }
        out.push_str(&self.exception_line());
        for cause in &self.causes {
            let _ = write!(out, "\nCaused by: {}", cause);
        }
        out
    }

    /// Compact HTML listing of the frames and the failure line
    pub fn render_summary(&self) -> String {
        let mut out = String::from("<div class=\"traceback\">\n");
        out.push_str("<h3>Traceback <em>(most recent call last)</em>:</h3>\n<ul>\n");
        for frame in &self.frames {
            let _ = write!(
                out,
                "<li><div class=\"frame\" id=\"frame-{}\"><h4>File <cite class=\"filename\">\"{}\"</cite>, line <em class=\"line\">{}</em>, in <code class=\"function\">{}</code></h4>",
                frame.id,
                escape_html(&frame.file),
                frame.line,
                escape_html(&frame.function)
            );
            if let Some(text) = frame.window.current_text() {
                let _ = write!(out, "<pre class=\"line current\">{}</pre>", escape_html(text.trim()));
            }
            out.push_str("</div></li>\n");
        }
        let _ = write!(
            out,
            "</ul>\n<blockquote>{}</blockquote>\n</div>",
            escape_html(&self.exception_line())
        );
        out
    }

    /// Template context shared by the full page and the traceback panel
    pub fn render_vars(&self, evalex: bool, token: &str, prefix: &str) -> Value {
        json!({
            "id": self.id,
            "kind": self.kind,
            "title": self.exception_line(),
            "type_name": self.type_name,
            "message": self.message,
            "causes": self.causes,
            "summary": self.render_summary(),
            "plaintext": self.plaintext(),
            "frames": self.frames.iter().map(|f| f.render_vars()).collect::<Vec<_>>(),
            "timestamp": self.timestamp,
            "degraded": self.degraded,
            "evalex": evalex,
            "token": token,
            "prefix": prefix,
        })
    }

    /// Full standalone HTML page for this traceback
    pub fn render_full(
        &self,
        renderer: &dyn Renderer,
        evalex: bool,
        token: &str,
        prefix: &str,
    ) -> Result<String, RenderError> {
        renderer.render("traceback", &self.render_vars(evalex, token, prefix))
    }
}

impl CapturedFrame {
    pub fn render_vars(&self) -> Value {
        json!({
            "id": self.id,
            "function": self.function,
            "module": self.module,
            "file": self.file,
            "line": self.line,
            "lines": numbered_lines(self.window.numbered()),
            "locals": self
                .locals
                .iter()
                .map(|l| json!({"name": l.name, "value": l.display}))
                .collect::<Vec<_>>(),
        })
    }

    /// Whole source file with the current line marked
    ///
    /// Falls back to the context window when the file could not be read.
    pub fn render_source(&self, renderer: &dyn Renderer) -> Result<String, RenderError> {
        let lines = match self.source.as_deref() {
            Some(source) => numbered_lines(
                source
                    .lines()
                    .enumerate()
                    .map(|(i, text)| (i as u32 + 1, text, i as u32 + 1 == self.line)),
            ),
            None => numbered_lines(self.window.numbered()),
        };
        renderer.render(
            "source",
            &json!({
                "id": self.id,
                "file": self.file,
                "line": self.line,
                "lines": lines,
            }),
        )
    }
}

fn numbered_lines<'a>(lines: impl Iterator<Item = (u32, &'a str, bool)>) -> Vec<Value> {
    lines
        .map(|(number, text, current)| json!({"number": number, "text": text, "current": current}))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::{CaptureSettings, Failure, FailureKind, FailureSite, FrameRegistry, TracebackCapture};
    use crate::ids::IdGenerator;
    use crate::render::HtmlRenderer;

    fn traceback() -> std::sync::Arc<super::CapturedTraceback> {
        let failure = Failure {
            kind: FailureKind::Error,
            type_name: "MathError".into(),
            message: "a < b".into(),
            causes: vec!["inner cause".into()],
            site: Some(FailureSite {
                file: file!().into(),
                line: 1,
                column: 1,
            }),
            spans: Vec::new(),
        };
        TracebackCapture::new(CaptureSettings::default()).capture(
            &failure,
            &IdGenerator::new(),
            &FrameRegistry::new(4),
        )
    }

    #[test]
    fn test_plaintext_layout() {
        let text = traceback().plaintext();
        assert!(text.starts_with("Traceback (most recent call last):\n  File \""));
        assert!(text.contains("render.rs\", line 1, in <failure site>"));
        assert!(text.contains("MathError: a < b"));
        assert!(text.ends_with("Caused by: inner cause"));
    }

    #[test]
    fn test_summary_is_escaped() {
        let html = traceback().render_summary();
        assert!(html.contains("<blockquote>MathError: a &lt; b</blockquote>"));
        assert!(html.contains("&lt;failure site&gt;"));
    }

    #[test]
    fn test_full_and_source_render() {
        let tb = traceback();
        let renderer = HtmlRenderer::new();
        let page = tb.render_full(&renderer, true, "tok", "/_debug").unwrap();
        assert!(page.contains("MathError"));
        assert!(page.contains("tok"));

        let source = tb.frames[0].render_source(&renderer).unwrap();
        assert!(source.contains("Traceback renderings"));
    }
}
