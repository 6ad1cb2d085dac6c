//! The wire shape of a sync event, used both on the live SSE channel and
//! in the on-disk spool for disconnected devices.
//!
//! The internal representation tags its variant (`"type"`) so the spool
//! can round-trip it through JSON; the SSE frame never includes that
//! tag, since the event name already carries it (see [`Event::name`]
//! and [`Event::to_sse_data`]).

use serde::{Deserialize, Serialize};

/// A single change a connected device needs to learn about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    FileUpdated { path: String, content: String },
    FileDeleted { path: String },
    FullSyncRequired { message: String },
}

impl Event {
    /// The SSE `event:` field this event is sent under.
    pub fn name(&self) -> &'static str {
        match self {
            Event::FileUpdated { .. } => "file_updated",
            Event::FileDeleted { .. } => "file_deleted",
            Event::FullSyncRequired { .. } => "full_sync_required",
        }
    }

    /// The JSON body for the SSE `data:` field, without the internal
    /// type tag. Field order matches the documented frame shape.
    pub fn to_sse_data(&self) -> String {
        fn quote(s: &str) -> String {
            serde_json::to_string(s).expect("string serialization never fails")
        }

        match self {
            Event::FileUpdated { path, content } => {
                format!("{{\"path\":{},\"content\":{}}}", quote(path), quote(content))
            }
            Event::FileDeleted { path } => format!("{{\"path\":{}}}", quote(path)),
            Event::FullSyncRequired { message } => format!("{{\"message\":{}}}", quote(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_matches_tag() {
        assert_eq!(Event::FileUpdated { path: "a".into(), content: "x".into() }.name(), "file_updated");
        assert_eq!(Event::FileDeleted { path: "a".into() }.name(), "file_deleted");
        assert_eq!(Event::FullSyncRequired { message: "m".into() }.name(), "full_sync_required");
    }

    #[test]
    fn sse_data_omits_type_tag() {
        let event = Event::FileUpdated { path: "notes/a.md".into(), content: "aGVsbG8=".into() };
        assert_eq!(event.to_sse_data(), r#"{"path":"notes/a.md","content":"aGVsbG8="}"#);
    }

    #[test]
    fn spool_roundtrip_preserves_variant() {
        let event = Event::FullSyncRequired { message: "11 missed updates".into() };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
