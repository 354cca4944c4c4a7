use serde_json::{json, Value};

use super::Panel;
use crate::intercept::HandlerHooks;
use crate::logging::{self, LogBuffer};

/// Log records emitted while the handler was being polled
#[derive(Debug, Default)]
pub struct LoggingPanel {
    buffer: LogBuffer,
}

impl LoggingPanel {
    pub fn new() -> Self {
        Self {
            buffer: LogBuffer::new(),
        }
    }
}

impl Panel for LoggingPanel {
    fn name(&self) -> &'static str {
        "Logging"
    }

    fn title(&self) -> String {
        "Log Messages".to_string()
    }

    fn nav_subtitle(&self) -> String {
        match self.buffer.len() {
            1 => "1 message".to_string(),
            n => format!("{n} messages"),
        }
    }

    fn template(&self) -> &'static str {
        "panels/logging"
    }

    fn wrap_handler(&self, hooks: &mut HandlerHooks) {
        let sink = self.buffer.clone();
        hooks.on_enter("logging", move || logging::attach(&sink));
        let sink = self.buffer.clone();
        hooks.on_exit("logging", move || logging::detach(&sink));
    }

    fn render_vars(&self) -> Value {
        json!({ "records": self.buffer.get_all() })
    }
}
