//! Presentation seam
//!
//! Everything user-visible goes through a [`Renderer`]: a named template plus
//! a JSON context in, a string out. [`HtmlRenderer`] is the built-in set of
//! templates; hosts can supply their own implementation.

mod html;

pub use html::HtmlRenderer;

/// Renderer failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("unknown template: {0}")]
    UnknownTemplate(String),
    #[error("template {template} failed: {reason}")]
    Failed { template: String, reason: String },
}

/// Turns a named template and its context into text
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, ctx: &serde_json::Value) -> Result<String, RenderError>;
}
