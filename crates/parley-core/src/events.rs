// Output events streamed to the caller
//
// OutputEvent is the only vocabulary the transport layer sees: content
// fragments while the turn runs, then exactly one terminal Done or Error.

use serde::{Deserialize, Serialize};

/// Events produced by one call to `Agent::process_message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// A fragment of assistant text (more may follow)
    Content { chunk: String },

    /// Terminal: the turn completed
    Done,

    /// Terminal: the turn failed; conversation history remains a valid prefix
    Error { message: String },
}

impl OutputEvent {
    /// Create a content event
    pub fn content(chunk: impl Into<String>) -> Self {
        OutputEvent::Content {
            chunk: chunk.into(),
        }
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        OutputEvent::Error {
            message: message.into(),
        }
    }

    /// True for Done and Error
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutputEvent::Content { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!OutputEvent::content("hi").is_terminal());
        assert!(OutputEvent::Done.is_terminal());
        assert!(OutputEvent::error("boom").is_terminal());
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&OutputEvent::content("he")).unwrap();
        assert_eq!(json, r#"{"type":"content","chunk":"he"}"#);
        let json = serde_json::to_string(&OutputEvent::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
    }
}
