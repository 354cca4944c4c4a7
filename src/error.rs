//! Error types: handler failures and control endpoint rejections

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::capture::{short_type_name, snapshot_span_stack, Failure, FailureKind, FailureSite};

// ─────────────────────────────────────────────────────────────────────────────
// Handler failures
// ─────────────────────────────────────────────────────────────────────────────

/// An unhandled failure returned by an instrumented handler
///
/// Works like `anyhow::Error`: any `std::error::Error` converts with `?`.
/// The conversion records where it happened and the spans entered at that
/// moment, which is what the traceback is later built from. Deliberately does
/// not implement `std::error::Error` itself so the blanket conversion stays
/// coherent.
#[derive(Clone)]
pub struct HandlerError {
    inner: Arc<Inner>,
}

struct Inner {
    error: anyhow::Error,
    failure: Failure,
}

impl HandlerError {
    /// Wrap a typed error
    #[track_caller]
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let type_name = short_type_name(std::any::type_name::<E>());
        Self::build(anyhow::Error::new(error), type_name)
    }

    /// Failure from a plain message
    #[track_caller]
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::build(anyhow::Error::msg(message), "Error".to_string())
    }

    /// Adopt an `anyhow::Error` (a `From` impl would overlap the blanket one)
    #[track_caller]
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self::build(error, "Error".to_string())
    }

    #[track_caller]
    fn build(error: anyhow::Error, type_name: String) -> Self {
        let failure = Failure {
            kind: FailureKind::Error,
            type_name,
            message: error.to_string(),
            causes: error.chain().skip(1).map(|c| c.to_string()).collect(),
            site: Some(FailureSite::from(std::panic::Location::caller())),
            spans: snapshot_span_stack(),
        };
        Self {
            inner: Arc::new(Inner { error, failure }),
        }
    }

    /// What the traceback will be built from
    pub fn failure(&self) -> &Failure {
        &self.inner.failure
    }

    pub fn type_name(&self) -> &str {
        &self.inner.failure.type_name
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.error.downcast_ref::<E>()
    }

    /// The wrapped error
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.error.as_ref()
    }

    /// True when both values are clones of the same failure
    pub fn ptr_eq(&self, other: &HandlerError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    #[track_caller]
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name(), self.inner.error)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("type_name", &self.inner.failure.type_name)
            .field("error", &self.inner.error)
            .field("site", &self.inner.failure.site)
            .finish()
    }
}

/// A plain 500 carrying the error in its extensions
///
/// The toolbar middleware takes the error back out of the extensions, so a
/// handler returning `Result<_, HandlerError>` is seen as failed.
impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response();
        response.extensions_mut().insert(self);
        response
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Control endpoint errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why a control call was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unauthorized {
    #[error("host {0} is not allowed")]
    Host(String),
    #[error("missing security token")]
    MissingToken,
    #[error("invalid security token")]
    BadToken,
}

/// Errors returned by the toolbar's control endpoints
#[derive(Debug, thiserror::Error)]
pub enum ToolbarError {
    /// The referenced request, traceback or frame is gone (or never existed)
    #[error("{kind} {id} is not available (evicted or unknown)")]
    EvictedReference { kind: &'static str, id: String },

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] Unauthorized),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("render failed: {0}")]
    Render(#[from] crate::render::RenderError),
}

impl ToolbarError {
    pub fn status(&self) -> StatusCode {
        match self {
            ToolbarError::EvictedReference { .. } => StatusCode::BAD_REQUEST,
            ToolbarError::Unauthorized(Unauthorized::Host(_)) => StatusCode::FORBIDDEN,
            ToolbarError::Unauthorized(_) => StatusCode::BAD_REQUEST,
            ToolbarError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ToolbarError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ToolbarError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!("Toolbar error: {} - {}", status, message);
        } else {
            tracing::warn!("Toolbar request rejected: {} - {}", status, message);
        }

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("division by zero")]
    struct ZeroDivision;

    #[derive(Debug, thiserror::Error)]
    #[error("request failed")]
    struct Outer(#[source] ZeroDivision);

    fn fails() -> Result<(), HandlerError> {
        Err::<(), _>(ZeroDivision)?;
        Ok(())
    }

    #[test]
    fn test_question_mark_records_site_and_type() {
        let err = fails().unwrap_err();
        assert_eq!(err.type_name(), "ZeroDivision");
        assert_eq!(err.failure().message, "division by zero");
        assert!(err.downcast_ref::<ZeroDivision>().is_some());
        let site = err.failure().site.as_ref().unwrap();
        assert!(site.line > 0);
    }

    #[test]
    fn test_new_records_caller_location() {
        let line = line!() + 1;
        let err = HandlerError::new(ZeroDivision);
        let site = err.failure().site.as_ref().unwrap();
        assert!(site.file.ends_with("error.rs"));
        assert_eq!(site.line, line);
    }

    #[test]
    fn test_causes_follow_source_chain() {
        let err = HandlerError::new(Outer(ZeroDivision));
        assert_eq!(err.failure().causes, vec!["division by zero".to_string()]);
        assert_eq!(err.to_string(), "Outer: request failed");
    }

    #[test]
    fn test_into_response_carries_error() {
        let err = HandlerError::msg("boom");
        let response = err.clone().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let carried = response.extensions().get::<HandlerError>().unwrap();
        assert!(carried.ptr_eq(&err));
    }

    #[test]
    fn test_toolbar_error_statuses() {
        let host = ToolbarError::from(Unauthorized::Host("10.0.0.1".into()));
        assert_eq!(host.status(), StatusCode::FORBIDDEN);
        assert_eq!(ToolbarError::from(Unauthorized::BadToken).status(), StatusCode::BAD_REQUEST);
        let evicted = ToolbarError::EvictedReference {
            kind: "traceback",
            id: "9".into(),
        };
        assert_eq!(evicted.status(), StatusCode::BAD_REQUEST);
        assert_eq!(evicted.to_string(), "traceback 9 is not available (evicted or unknown)");
    }
}
