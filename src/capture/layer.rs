//! Span field recording and span stack snapshots
//!
//! Captured frames come from the stack of entered tracing spans. Span fields
//! are recorded by [`FrameLayer`] into the span's extensions as they are set,
//! so the values are already formatted by the time a failure reads them.

use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

use crate::util::truncate_display;

/// Name of the span the engine wraps every dispatched handler in
pub const DISPATCH_SPAN: &str = "debug_toolbar.dispatch";

/// Placeholder for a field whose formatting panicked
pub const UNREPRESENTABLE: &str = "<unrepresentable>";

/// Default display limit for recorded values
pub const DEFAULT_MAX_VALUE_LEN: usize = 256;

/// One recorded span field
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    /// Truncated, display-safe rendering
    pub display: String,
    /// Typed value used by the console
    pub value: Value,
}

/// Fields recorded for one span, in recording order
#[derive(Debug, Clone, Default)]
pub struct SpanLocals(pub Vec<Local>);

impl SpanLocals {
    fn upsert(&mut self, local: Local) {
        match self.0.iter_mut().find(|l| l.name == local.name) {
            Some(existing) => *existing = local,
            None => self.0.push(local),
        }
    }
}

/// Point-in-time copy of one entered span
#[derive(Debug, Clone)]
pub struct SpanSnapshot {
    pub name: String,
    pub target: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub locals: Vec<Local>,
}

/// Tracing layer that stores span fields for later frame capture
#[derive(Debug, Clone, Copy)]
pub struct FrameLayer {
    max_value_len: usize,
}

impl FrameLayer {
    pub fn new(max_value_len: usize) -> Self {
        Self {
            max_value_len: max_value_len.max(1),
        }
    }
}

impl Default for FrameLayer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VALUE_LEN)
    }
}

impl<S> Layer<S> for FrameLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = LocalsVisitor::new(self.max_value_len);
        attrs.record(&mut visitor);

        // Values are formatted before the extensions lock is taken
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.locals);
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = LocalsVisitor::new(self.max_value_len);
        values.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            match extensions.get_mut::<SpanLocals>() {
                Some(existing) => {
                    for local in visitor.locals.0 {
                        existing.upsert(local);
                    }
                }
                None => extensions.insert(visitor.locals),
            }
        }
    }
}

struct LocalsVisitor {
    max_value_len: usize,
    locals: SpanLocals,
}

impl LocalsVisitor {
    fn new(max_value_len: usize) -> Self {
        Self {
            max_value_len,
            locals: SpanLocals::default(),
        }
    }

    fn push(&mut self, field: &Field, display: String, value: Value) {
        self.locals.upsert(Local {
            name: field.name().to_string(),
            display: truncate_display(&display, self.max_value_len),
            value,
        });
    }
}

impl Visit for LocalsVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string(), Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, format!("{:?}", value), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match catch_unwind(AssertUnwindSafe(|| format!("{:?}", value))) {
            Ok(text) => {
                let value = Value::from(text.as_str());
                self.push(field, text, value);
            }
            Err(_) => self.push(field, UNREPRESENTABLE.to_string(), Value::Null),
        }
    }
}

/// Copy the entered span stack, outermost first
///
/// The walk starts at the current span and stops at the dispatch boundary,
/// which is itself excluded. Without a boundary every entered span is used.
/// Returns an empty stack when the current subscriber has no span registry.
pub fn snapshot_span_stack() -> Vec<SpanSnapshot> {
    let current = tracing::Span::current();
    let stack = current.with_subscriber(|(id, dispatch)| {
        let registry = dispatch.downcast_ref::<Registry>()?;
        let span = registry.span(id)?;

        let mut frames = Vec::new();
        for span in span.scope() {
            let metadata = span.metadata();
            if metadata.name() == DISPATCH_SPAN {
                break;
            }
            let locals = span
                .extensions()
                .get::<SpanLocals>()
                .map(|l| l.0.clone())
                .unwrap_or_default();
            frames.push(SpanSnapshot {
                name: metadata.name().to_string(),
                target: metadata.target().to_string(),
                file: metadata.file().map(str::to_string),
                line: metadata.line(),
                locals,
            });
        }
        frames.reverse();
        Some(frames)
    });

    stack.flatten().unwrap_or_default()
}
