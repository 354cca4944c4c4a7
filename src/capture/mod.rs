//! Failure capture - turns an unhandled handler failure into a traceback
//!
//! A failure is either a `HandlerError` returned by the handler or a panic
//! unwinding out of a poll. Both carry a [`Failure`]: the type name and
//! message, the failure site, and a snapshot of the entered span stack taken
//! at the moment of failure. [`TracebackCapture`] turns that into a
//! [`CapturedTraceback`] with source windows and locals, and registers every
//! frame so the console and source endpoints can reach it later.
//!
//! Capture never fails. Missing source gives an empty window; a capture step
//! that panics degrades to a one-frame placeholder.

mod console;
mod frames;
mod layer;
pub mod panic;
mod render;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

pub use console::{
    Console, ConsoleOutput, EvalError, MAX_COMMAND_LEN, MAX_NESTING, MAX_VALUE_BYTES,
};
pub use frames::{CapturedFrame, FrameRegistry, NotFound, SourceWindow};
pub use layer::{
    snapshot_span_stack, FrameLayer, Local, SpanSnapshot, DEFAULT_MAX_VALUE_LEN, DISPATCH_SPAN,
    UNREPRESENTABLE,
};

use crate::ids::{IdGenerator, TracebackId};

/// Function name used for a frame built from the failure location alone
pub const FAILURE_SITE: &str = "<failure site>";

/// What kind of unwinding produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// A `HandlerError` returned from the handler
    Error,
    /// A panic caught while polling the handler
    Panic,
}

/// Source location where a failure was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSite {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl From<&std::panic::Location<'_>> for FailureSite {
    fn from(loc: &std::panic::Location<'_>) -> Self {
        Self {
            file: loc.file().to_string(),
            line: loc.line(),
            column: loc.column(),
        }
    }
}

/// Everything known about a failure at the moment it happened
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: FailureKind,
    /// Short type name of the error (`panic` for panics)
    pub type_name: String,
    pub message: String,
    /// Messages of the error's `source()` chain
    pub causes: Vec<String>,
    pub site: Option<FailureSite>,
    /// Entered spans at failure time, outermost first
    pub spans: Vec<SpanSnapshot>,
}

impl Failure {
    /// Minimal record for a panic the hook did not see
    pub fn from_panic_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        Self {
            kind: FailureKind::Panic,
            type_name: "panic".to_string(),
            message: panic::payload_message(payload),
            causes: Vec::new(),
            site: None,
            spans: Vec::new(),
        }
    }
}

/// Last path segment of a type name, generics dropped
///
/// `demo::MathError` becomes `MathError`.
pub fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Tuning knobs for traceback capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Innermost span frames to drop
    pub skip_frames: usize,
    pub hide_system_frames: bool,
    /// Module prefixes considered runtime/system code
    pub system_prefixes: Vec<String>,
    /// Source lines shown either side of a frame's line
    pub context_lines: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            skip_frames: 0,
            hide_system_frames: true,
            system_prefixes: ["tokio", "hyper", "tower", "axum"]
                .into_iter()
                .map(String::from)
                .collect(),
            context_lines: 5,
        }
    }
}

/// A structured record of one unhandled failure
#[derive(Debug)]
pub struct CapturedTraceback {
    pub id: TracebackId,
    pub kind: FailureKind,
    pub type_name: String,
    pub message: String,
    pub causes: Vec<String>,
    /// Outermost first; the last frame is the failure site
    pub frames: Vec<Arc<CapturedFrame>>,
    pub timestamp: DateTime<Utc>,
    /// Set when capture itself failed and this is a placeholder
    pub degraded: bool,
}

impl CapturedTraceback {
    /// `Type: message`
    pub fn exception_line(&self) -> String {
        if self.message.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}: {}", self.type_name, self.message)
        }
    }
}

/// Builds tracebacks from failures
#[derive(Debug, Clone, Default)]
pub struct TracebackCapture {
    settings: CaptureSettings,
}

impl TracebackCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Capture `failure`, registering every resulting frame
    pub fn capture(
        &self,
        failure: &Failure,
        ids: &IdGenerator,
        registry: &FrameRegistry,
    ) -> Arc<CapturedTraceback> {
        let id = ids.traceback();

        let frames = match catch_unwind(AssertUnwindSafe(|| self.build_frames(failure, ids))) {
            Ok(frames) => frames,
            Err(payload) => {
                tracing::warn!(
                    traceback = %id,
                    error = %panic::payload_message(payload.as_ref()),
                    "Traceback capture failed; recording placeholder"
                );
                let traceback = Arc::new(CapturedTraceback {
                    id,
                    kind: failure.kind,
                    type_name: failure.type_name.clone(),
                    message: failure.message.clone(),
                    causes: failure.causes.clone(),
                    frames: vec![placeholder_frame(failure, ids)],
                    timestamp: Utc::now(),
                    degraded: true,
                });
                register_all(&traceback, registry);
                return traceback;
            }
        };

        let traceback = Arc::new(CapturedTraceback {
            id,
            kind: failure.kind,
            type_name: failure.type_name.clone(),
            message: failure.message.clone(),
            causes: failure.causes.clone(),
            frames,
            timestamp: Utc::now(),
            degraded: false,
        });
        register_all(&traceback, registry);
        traceback
    }

    fn build_frames(&self, failure: &Failure, ids: &IdGenerator) -> Vec<Arc<CapturedFrame>> {
        let settings = &self.settings;
        let mut spans: Vec<&SpanSnapshot> = failure.spans.iter().collect();
        spans.truncate(spans.len().saturating_sub(settings.skip_frames));
        if settings.hide_system_frames {
            spans.retain(|s| !is_system_module(&s.target, &settings.system_prefixes));
        }

        // Span frames carry (file, line) of the span callsite; the failure
        // site refines the innermost one when it lies inside it.
        let mut entries: Vec<FrameSource> = spans
            .into_iter()
            .map(|s| FrameSource {
                function: s.name.clone(),
                module: s.target.clone(),
                file: s.file.clone().unwrap_or_default(),
                line: s.line.unwrap_or(0),
                locals: s.locals.clone(),
            })
            .collect();

        match (&failure.site, entries.last_mut()) {
            (Some(site), Some(innermost)) if innermost.file == site.file && innermost.line <= site.line => {
                innermost.line = site.line;
            }
            (Some(site), _) => entries.push(FrameSource::site(site)),
            (None, None) => entries.push(FrameSource::unknown()),
            (None, Some(_)) => {}
        }

        let mut sources = SourceCache::default();
        entries
            .into_iter()
            .map(|entry| {
                let source = sources.get(&entry.file);
                let window = source
                    .as_deref()
                    .map(|text| SourceWindow::around(text, entry.line, settings.context_lines))
                    .unwrap_or_default();
                Arc::new(CapturedFrame::new(
                    ids.frame(),
                    entry.function,
                    entry.module,
                    entry.file,
                    entry.line,
                    entry.locals,
                    window,
                    source,
                ))
            })
            .collect()
    }
}

fn register_all(traceback: &CapturedTraceback, registry: &FrameRegistry) {
    for frame in &traceback.frames {
        registry.register(frame.clone());
    }
}

fn placeholder_frame(failure: &Failure, ids: &IdGenerator) -> Arc<CapturedFrame> {
    let entry = failure
        .site
        .as_ref()
        .map(FrameSource::site)
        .unwrap_or_else(FrameSource::unknown);
    Arc::new(CapturedFrame::new(
        ids.frame(),
        entry.function,
        entry.module,
        entry.file,
        entry.line,
        Vec::new(),
        SourceWindow::default(),
        None,
    ))
}

fn is_system_module(module: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| {
        module == p
            || module
                .strip_prefix(p.as_str())
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

struct FrameSource {
    function: String,
    module: String,
    file: String,
    line: u32,
    locals: Vec<Local>,
}

impl FrameSource {
    fn site(site: &FailureSite) -> Self {
        Self {
            function: FAILURE_SITE.to_string(),
            module: String::new(),
            file: site.file.clone(),
            line: site.line,
            locals: Vec::new(),
        }
    }

    fn unknown() -> Self {
        Self {
            function: FAILURE_SITE.to_string(),
            module: String::new(),
            file: "<unknown>".to_string(),
            line: 0,
            locals: Vec::new(),
        }
    }
}

/// Source files read during one capture
#[derive(Default)]
struct SourceCache {
    files: HashMap<String, Option<Arc<str>>>,
}

impl SourceCache {
    fn get(&mut self, file: &str) -> Option<Arc<str>> {
        if file.is_empty() || file.starts_with('<') {
            return None;
        }
        self.files
            .entry(file.to_string())
            .or_insert_with(|| read_source(file))
            .clone()
    }
}

/// Read a source file named by a callsite path
///
/// Callsite paths are relative to the directory the crate was built from,
/// so a path that does not resolve from the working directory is retried
/// under this crate's manifest directory.
fn read_source(file: &str) -> Option<Arc<str>> {
    let path = Path::new(file);
    std::fs::read_to_string(path)
        .or_else(|e| {
            if path.is_relative() {
                std::fs::read_to_string(Path::new(env!("CARGO_MANIFEST_DIR")).join(path))
            } else {
                Err(e)
            }
        })
        .map(Arc::from)
        .map_err(|e| tracing::debug!(file, error = %e, "Source unavailable for frame"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn span(name: &str, target: &str, line: u32) -> SpanSnapshot {
        SpanSnapshot {
            name: name.to_string(),
            target: target.to_string(),
            file: Some(file!().to_string()),
            line: Some(line),
            locals: vec![Local {
                name: "n".into(),
                display: "1".into(),
                value: Value::from(1),
            }],
        }
    }

    fn failure(spans: Vec<SpanSnapshot>, site_line: Option<u32>) -> Failure {
        Failure {
            kind: FailureKind::Error,
            type_name: "MathError".into(),
            message: "division by zero".into(),
            causes: Vec::new(),
            site: site_line.map(|line| FailureSite {
                file: file!().to_string(),
                line,
                column: 1,
            }),
            spans,
        }
    }

    fn capture(settings: CaptureSettings, failure: &Failure) -> (Arc<CapturedTraceback>, FrameRegistry) {
        let registry = FrameRegistry::new(16);
        let traceback = TracebackCapture::new(settings).capture(failure, &IdGenerator::new(), &registry);
        (traceback, registry)
    }

    #[test]
    fn test_site_merges_into_innermost_span() {
        let failure = failure(vec![span("outer", "app", 10), span("inner", "app", 20)], Some(25));
        let (tb, registry) = capture(CaptureSettings::default(), &failure);

        assert_eq!(tb.frames.len(), 2);
        assert_eq!(tb.frames[1].function, "inner");
        assert_eq!(tb.frames[1].line, 25);
        assert_eq!(tb.frames[1].locals[0].name, "n");
        assert!(!tb.frames[1].window.is_empty());
        assert_eq!(registry.len(), 2);
        assert!(!tb.degraded);
    }

    #[test]
    fn test_site_before_span_is_appended() {
        let failure = failure(vec![span("inner", "app", 20)], Some(5));
        let (tb, _) = capture(CaptureSettings::default(), &failure);

        assert_eq!(tb.frames.len(), 2);
        assert_eq!(tb.frames[1].function, FAILURE_SITE);
        assert_eq!(tb.frames[1].line, 5);
    }

    #[test]
    fn test_no_spans_still_gives_one_frame() {
        let (tb, _) = capture(CaptureSettings::default(), &failure(Vec::new(), Some(3)));
        assert_eq!(tb.frames.len(), 1);

        let (tb, _) = capture(CaptureSettings::default(), &failure(Vec::new(), None));
        assert_eq!(tb.frames.len(), 1);
        assert_eq!(tb.frames[0].file, "<unknown>");
    }

    #[test]
    fn test_skip_and_system_filtering() {
        let spans = vec![
            span("serve", "hyper::server", 1),
            span("handler", "app::routes", 2),
            span("instrumentation", "app::wrap", 3),
        ];
        let settings = CaptureSettings {
            skip_frames: 1,
            ..CaptureSettings::default()
        };
        let (tb, _) = capture(settings, &failure(spans, None));

        let names: Vec<_> = tb.frames.iter().map(|f| f.function.as_str()).collect();
        assert_eq!(names, vec!["handler"]);
    }

    #[test]
    fn test_system_prefix_requires_path_boundary() {
        let prefixes = vec!["tokio".to_string()];
        assert!(is_system_module("tokio", &prefixes));
        assert!(is_system_module("tokio::runtime::task", &prefixes));
        assert!(!is_system_module("tokio_util_app", &prefixes));
    }

    #[test]
    fn test_unreadable_source_gives_empty_window() {
        let mut failure = failure(Vec::new(), Some(3));
        if let Some(site) = failure.site.as_mut() {
            site.file = "does/not/exist.rs".into();
        }
        let (tb, _) = capture(CaptureSettings::default(), &failure);
        assert!(tb.frames[0].window.is_empty());
        assert!(tb.frames[0].source.is_none());
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("demo::MathError"), "MathError");
        assert_eq!(short_type_name("core::option::Option<u8>"), "Option");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
