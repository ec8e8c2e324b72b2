use serde_json::Value;

use crate::types::{AgentEvent, UntypedEvent};

/// Decodes one line of agent output.
///
/// Blank lines yield nothing. Anything else yields exactly one event:
/// a typed protocol event, an [`UntypedEvent`] for JSON objects outside the
/// protocol, or a `RawLine` carrying the input verbatim.
pub fn decode_line(line: &str) -> Option<AgentEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => return Some(raw_line(line)),
    };

    let Value::Object(object) = value else {
        return Some(raw_line(line));
    };

    match serde_json::from_value::<AgentEvent>(Value::Object(object.clone())) {
        // Iteration boundaries come from the runner only.
        Ok(AgentEvent::Iteration { .. }) => {
            Some(AgentEvent::Untyped(UntypedEvent::from_object(&object)))
        }
        Ok(event) => Some(event),
        Err(err) => {
            tracing::trace!(error = %err, "line is not a protocol event");
            Some(AgentEvent::Untyped(UntypedEvent::from_object(&object)))
        }
    }
}

/// Decodes a whole captured output, one event per non-blank line.
pub fn decode_output(output: &str) -> Vec<AgentEvent> {
    output.lines().filter_map(decode_line).collect()
}

fn raw_line(line: &str) -> AgentEvent {
    AgentEvent::RawLine {
        line: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_lines_decode_to_nothing() {
        assert_eq!(decode_line(""), None);
        assert_eq!(decode_line("   \t"), None);
    }

    #[test]
    fn test_plain_text_is_kept_verbatim() {
        assert_eq!(
            decode_line("not json at all"),
            Some(AgentEvent::RawLine {
                line: "not json at all".to_string()
            })
        );
    }

    #[test]
    fn test_json_scalars_and_arrays_degrade_to_raw_lines() {
        for line in ["42", "\"text\"", "[1,2]", "{\"type\":"] {
            assert!(matches!(
                decode_line(line),
                Some(AgentEvent::RawLine { .. })
            ));
        }
    }

    #[test]
    fn test_session_line_decodes_to_session_event() {
        let event =
            decode_line(r#"{"type":"session","id":"abc123def456","timestamp":"t","cwd":"/x"}"#);
        assert_eq!(
            event,
            Some(AgentEvent::Session {
                id: "abc123def456".to_string(),
                timestamp: "t".to_string(),
                cwd: "/x".to_string(),
                version: None,
            })
        );
    }

    #[test]
    fn test_unknown_type_falls_back_to_untyped() {
        let event = decode_line(r#"{"type":"assistant","message":"hi"}"#);
        match event {
            Some(AgentEvent::Untyped(untyped)) => {
                assert_eq!(untyped.kind, "assistant");
                assert_eq!(untyped.content.as_deref(), Some("hi"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_known_type_with_malformed_payload_is_untyped() {
        let event = decode_line(r#"{"type":"iteration","iteration":"three"}"#);
        assert!(matches!(event, Some(AgentEvent::Untyped(_))));
    }

    #[test]
    fn test_agent_cannot_inject_iteration_boundary() {
        let event = decode_line(r#"{"type":"iteration","iteration":99}"#);
        match event {
            Some(AgentEvent::Untyped(untyped)) => {
                assert_eq!(untyped.kind, "iteration");
                assert_eq!(untyped.raw["iteration"], 99);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_output_skips_blank_lines() {
        let events = decode_output("{\"type\":\"turn_start\"}\n\nplain\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], AgentEvent::TurnStart);
    }
}
