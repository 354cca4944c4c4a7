// Event stream - incremental feed of newly recorded requests
//
// A toolbar page keeps an SSE connection to `{prefix}/sse`. Each poll sends
// the id of the newest request it has already seen (`Last-Event-Id`) and gets
// back only the requests recorded after it, newest first. Polling never
// blocks: an up-to-date client gets an empty body and reconnects.

use serde::Serialize;

use crate::history::BoundedHistory;
use crate::ids::RequestId;
use crate::state::RequestState;

/// Compact summary of one recorded request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub method: String,
    pub path: String,
    pub scheme: String,
    pub status_code: u16,
    /// Whether this is the request the stream was opened for
    pub active: bool,
}

/// Result of one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    /// Newest request in the batch, the next cursor
    pub newest: Option<RequestId>,
    /// Newest first
    pub records: Vec<RequestRecord>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Server-sent event text; empty when there is nothing new
    pub fn to_sse(&self) -> String {
        let Some(newest) = self.newest else {
            return String::new();
        };
        if self.records.is_empty() {
            return String::new();
        }
        let data = serde_json::to_string(&self.records).unwrap_or_else(|_| "[]".to_string());
        format!("id: {}\nevent: new_request\ndata: {}\n\n", newest, data)
    }
}

/// Requests recorded after `last_seen`, newest first
///
/// An absent, unparseable or evicted cursor yields every request in history.
/// `active` marks the request the client's toolbar is showing.
pub fn poll(
    history: &BoundedHistory<RequestId, RequestState>,
    last_seen: Option<&str>,
    active: Option<&str>,
) -> EventBatch {
    let cursor = last_seen.and_then(|s| s.parse::<RequestId>().ok());
    let active = active.and_then(|s| s.parse::<RequestId>().ok());

    let records: Vec<RequestRecord> = history
        .iter_newest_first()
        .take_while(|(id, _)| Some(*id) != cursor)
        .map(|(id, state)| state.to_record(Some(id) == active))
        .collect();

    EventBatch {
        newest: records.first().map(|r| r.id),
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::recorded_state;

    fn history(ids: &[u64]) -> BoundedHistory<RequestId, RequestState> {
        let history = BoundedHistory::new(10);
        for id in ids {
            history.insert(RequestId::new(*id), recorded_state(*id, "/page"));
        }
        history
    }

    fn ids(batch: &EventBatch) -> Vec<u64> {
        batch.records.iter().map(|r| r.id.get()).collect()
    }

    #[test]
    fn test_cursor_returns_only_newer() {
        let history = history(&[1, 2, 3]);
        let batch = poll(&history, Some("2"), None);
        assert_eq!(ids(&batch), vec![3]);
        assert_eq!(batch.newest, Some(RequestId::new(3)));
    }

    #[test]
    fn test_absent_or_unknown_cursor_returns_all() {
        let history = history(&[1, 2, 3]);
        assert_eq!(ids(&poll(&history, None, None)), vec![3, 2, 1]);
        assert_eq!(ids(&poll(&history, Some("99"), None)), vec![3, 2, 1]);
        assert_eq!(ids(&poll(&history, Some("garbage"), None)), vec![3, 2, 1]);
    }

    #[test]
    fn test_up_to_date_cursor_is_empty() {
        let history = history(&[1, 2, 3]);
        let batch = poll(&history, Some("3"), None);
        assert!(batch.is_empty());
        assert_eq!(batch.to_sse(), "");
    }

    #[test]
    fn test_active_flag_and_sse_format() {
        let history = history(&[1, 2]);
        let batch = poll(&history, Some("0"), Some("1"));
        assert!(!batch.records[0].active);
        assert!(batch.records[1].active);

        let sse = batch.to_sse();
        assert!(sse.starts_with("id: 2\nevent: new_request\ndata: [{\"id\":\"2\""));
        assert!(sse.ends_with("\n\n"));
    }

    #[test]
    fn test_empty_history() {
        let history = history(&[]);
        assert_eq!(poll(&history, None, None), EventBatch::default());
    }
}
