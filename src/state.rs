//! Per-request instrumentation state
//!
//! ```text
//! Created ─► Dispatching ─┬─► Completed ─┬─► Recorded
//!                         └─► Failed ────┘
//! ```
//!
//! A state is mutated by the dispatching task only; once recorded it is
//! shared read-only through the requests history.

use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::capture::CapturedTraceback;
use crate::events::RequestRecord;
use crate::ids::RequestId;
use crate::panels::{Panel, ResponseView};

/// Lifecycle position of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Created,
    Dispatching,
    Completed,
    Failed,
    Recorded,
}

pub struct RequestState {
    pub id: RequestId,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub scheme: String,
    pub timestamp: DateTime<Utc>,
    status_code: u16,
    phase: Phase,
    panels: Vec<Box<dyn Panel>>,
    traceback: Option<Arc<CapturedTraceback>>,
}

impl RequestState {
    pub fn new(id: RequestId, parts: &Parts, panels: Vec<Box<dyn Panel>>) -> Self {
        Self {
            id,
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            scheme: parts.uri.scheme_str().unwrap_or("http").to_string(),
            timestamp: Utc::now(),
            status_code: 0,
            phase: Phase::Created,
            panels,
            traceback: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn panels(&self) -> &[Box<dyn Panel>] {
        &self.panels
    }

    pub fn traceback(&self) -> Option<&Arc<CapturedTraceback>> {
        self.traceback.as_ref()
    }

    pub fn begin_dispatch(&mut self) {
        debug_assert_eq!(self.phase, Phase::Created);
        self.phase = Phase::Dispatching;
    }

    /// The handler produced a response
    pub fn complete(&mut self, status: u16) {
        self.status_code = status;
        self.phase = Phase::Completed;
    }

    /// The handler failed; `traceback` is set when capture is enabled
    pub fn fail(&mut self, traceback: Option<Arc<CapturedTraceback>>) {
        self.status_code = 500;
        self.traceback = traceback;
        self.phase = Phase::Failed;
    }

    /// Let every panel observe the final response, in panel order
    pub fn process_response(&mut self, response: &ResponseView<'_>) {
        for panel in self.panels.iter_mut() {
            panel.process_response(response);
        }
    }

    /// Freeze the state for the history
    pub fn into_recorded(mut self) -> Arc<Self> {
        self.phase = Phase::Recorded;
        Arc::new(self)
    }

    pub fn to_record(&self, active: bool) -> RequestRecord {
        RequestRecord {
            id: self.id,
            method: self.method.clone(),
            path: self.path.clone(),
            scheme: self.scheme.clone(),
            status_code: self.status_code,
            active,
        }
    }
}

impl std::fmt::Debug for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestState")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("status_code", &self.status_code)
            .field("phase", &self.phase)
            .field("panels", &self.panels.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("traceback", &self.traceback.as_ref().map(|tb| tb.id))
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::panels::test_support::{context, parts};
    use crate::panels::HeadersPanel;
    use axum::http::{HeaderMap, StatusCode};

    #[test]
    fn test_lifecycle_to_recorded() {
        let parts = parts("/items?page=2", &[]);
        let panels: Vec<Box<dyn Panel>> = vec![Box::new(HeadersPanel::new(&context(&parts, &[])))];
        let mut state = RequestState::new(RequestId::new(5), &parts, panels);
        assert_eq!(state.phase(), Phase::Created);
        assert_eq!(state.query.as_deref(), Some("page=2"));

        state.begin_dispatch();
        state.complete(201);
        state.process_response(&ResponseView {
            status: StatusCode::CREATED,
            headers: &HeaderMap::new(),
            traceback: None,
        });
        let state = state.into_recorded();

        assert_eq!(state.phase(), Phase::Recorded);
        let record = state.to_record(true);
        assert_eq!(record.status_code, 201);
        assert_eq!(record.path, "/items");
        assert_eq!(record.scheme, "http");
        assert!(record.active);
    }

    #[test]
    fn test_failure_sets_500() {
        let parts = parts("/", &[]);
        let mut state = RequestState::new(RequestId::new(1), &parts, Vec::new());
        state.begin_dispatch();
        state.fail(None);
        assert_eq!(state.status_code(), 500);
        assert_eq!(state.phase(), Phase::Failed);
        assert!(state.traceback().is_none());
    }
}
