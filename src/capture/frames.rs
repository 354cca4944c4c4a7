//! Captured frames and the registry that keeps them reachable

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

use super::console::{Console, ConsoleOutput};
use super::layer::Local;
use crate::history::BoundedHistory;
use crate::ids::FrameId;

/// Lines of source around a frame's current line
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceWindow {
    /// 1-based number of the first line in `lines`
    pub first_line: u32,
    pub lines: Vec<String>,
    /// 1-based number of the frame's current line
    pub current_line: u32,
}

impl SourceWindow {
    /// Slice `context` lines either side of `line` out of `source`
    pub fn around(source: &str, line: u32, context: u32) -> Self {
        let all: Vec<&str> = source.lines().collect();
        if line == 0 || all.is_empty() {
            return Self::default();
        }
        let current = (line as usize).min(all.len());
        let start = current.saturating_sub(context as usize + 1);
        let end = (current + context as usize).min(all.len());

        Self {
            first_line: start as u32 + 1,
            lines: all[start..end].iter().map(|l| l.to_string()).collect(),
            current_line: line,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `(line number, text, is current)` triples
    pub fn numbered(&self) -> impl Iterator<Item = (u32, &str, bool)> + '_ {
        self.lines.iter().enumerate().map(move |(i, text)| {
            let number = self.first_line + i as u32;
            (number, text.as_str(), number == self.current_line)
        })
    }

    pub fn current_text(&self) -> Option<&str> {
        self.numbered().find(|(_, _, current)| *current).map(|(_, t, _)| t)
    }
}

/// One level of a captured stack
#[derive(Debug)]
pub struct CapturedFrame {
    pub id: FrameId,
    /// Span name, or `<failure site>` for a frame made from the failure location
    pub function: String,
    /// Tracing target (module path), empty when unknown
    pub module: String,
    pub file: String,
    pub line: u32,
    pub locals: Vec<Local>,
    pub window: SourceWindow,
    /// Whole source file, shared between frames of the same capture
    pub source: Option<Arc<str>>,
    console: Mutex<Console>,
}

impl CapturedFrame {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: FrameId,
        function: String,
        module: String,
        file: String,
        line: u32,
        locals: Vec<Local>,
        window: SourceWindow,
        source: Option<Arc<str>>,
    ) -> Self {
        let console = Console::new(locals.iter().map(|l| (l.name.clone(), l.value.clone())));
        Self {
            id,
            function,
            module,
            file,
            line,
            locals,
            window,
            source,
            console: Mutex::new(console),
        }
    }

    /// Evaluate `command` in this frame's console
    pub fn eval(&self, command: &str) -> ConsoleOutput {
        self.console
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .eval(command)
    }
}

/// Frame lookup failure: the id was never issued or has been evicted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotFound(pub FrameId);

/// Live frames from captured failures, bounded with FIFO eviction
#[derive(Debug)]
pub struct FrameRegistry {
    frames: BoundedHistory<FrameId, CapturedFrame>,
}

impl FrameRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: BoundedHistory::new(capacity),
        }
    }

    /// Make `frame` reachable by its id
    pub fn register(&self, frame: Arc<CapturedFrame>) -> FrameId {
        let id = frame.id;
        if let Some((evicted, _)) = self.frames.insert_arc(id, frame) {
            tracing::trace!(frame = %evicted, "Frame evicted from registry");
        }
        id
    }

    pub fn resolve(&self, id: FrameId) -> Result<Arc<CapturedFrame>, NotFound> {
        self.frames.get(&id).ok_or(NotFound(id))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn frame(id: u64) -> Arc<CapturedFrame> {
        Arc::new(CapturedFrame::new(
            FrameId::new(id),
            "handler".into(),
            "app::routes".into(),
            "src/routes.rs".into(),
            3,
            vec![Local {
                name: "count".into(),
                display: "2".into(),
                value: Value::from(2),
            }],
            SourceWindow::default(),
            None,
        ))
    }

    #[test]
    fn test_window_is_clamped_to_file() {
        let source = "one\ntwo\nthree\nfour\nfive";
        let window = SourceWindow::around(source, 2, 5);
        assert_eq!(window.first_line, 1);
        assert_eq!(window.lines.len(), 5);
        assert_eq!(window.current_text(), Some("two"));

        let window = SourceWindow::around(source, 4, 1);
        assert_eq!(window.first_line, 3);
        assert_eq!(window.lines, vec!["three", "four", "five"]);
    }

    #[test]
    fn test_window_for_missing_line_is_empty() {
        assert!(SourceWindow::around("", 3, 5).is_empty());
        assert!(SourceWindow::around("a\nb", 0, 5).is_empty());
    }

    #[test]
    fn test_resolve_after_eviction_is_not_found() {
        let registry = FrameRegistry::new(2);
        registry.register(frame(1));
        registry.register(frame(2));
        registry.register(frame(3));

        assert_eq!(registry.resolve(FrameId::new(1)).unwrap_err(), NotFound(FrameId::new(1)));
        assert_eq!(registry.resolve(FrameId::new(3)).unwrap().function, "handler");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_evicted_frame_stays_usable_by_holder() {
        let registry = FrameRegistry::new(1);
        registry.register(frame(1));
        let held = registry.resolve(FrameId::new(1)).unwrap();
        registry.register(frame(2));

        assert!(registry.resolve(FrameId::new(1)).is_err());
        assert_eq!(held.eval("count + 1").result, "3");
    }
}
