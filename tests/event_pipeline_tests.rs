use ralfinho::agent::{decode_line, decode_output};
use ralfinho::state::{
    merge_display_event, Block, BlockBuilder, DisplayEvent, DisplayKind, EventConverter,
    ToolStatus,
};
use ralfinho::types::AgentEvent;

const TRANSCRIPT: &str = r#"{"type":"session","version":3,"id":"0f3c9a7e-1111-2222-3333-444455556666","timestamp":"2026-01-02T10:00:00Z","cwd":"/work"}
{"type":"agent_start"}
{"type":"turn_start"}
{"type":"message_start","message":{"role":"user","content":[{"type":"text","text":"fix the build"}]}}
{"type":"message_end","message":{"role":"user"}}
{"type":"message_start","message":{"role":"assistant","model":"sonnet"}}
{"type":"message_update","assistantMessageEvent":{"type":"thinking_start"}}
{"type":"message_update","assistantMessageEvent":{"type":"thinking_delta","delta":"look at the errors"}}
{"type":"message_update","assistantMessageEvent":{"type":"thinking_end","content":"look at the errors"}}
{"type":"message_update","assistantMessageEvent":{"type":"text_delta","delta":"Running "}}
{"type":"message_update","assistantMessageEvent":{"type":"text_delta","delta":"the tests."}}
{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"Running the tests."}]}}
{"type":"tool_execution_start","toolCallId":"call_1","toolName":"bash","args":{"command":"cargo test"}}
{"type":"tool_execution_update","toolCallId":"call_1","toolName":"bash","partialResult":{"content":[]}}
{"type":"tool_execution_end","toolCallId":"call_1","toolName":"bash","result":{"content":[{"type":"text","text":"test result: ok"}]},"isError":false}
warning: unused variable

{"type":"turn_end","message":{"role":"assistant"}}
{"type":"agent_end","messages":[]}
"#;

fn display_stream(events: &[AgentEvent]) -> Vec<DisplayEvent> {
    let mut converter = EventConverter::new();
    let mut shown = Vec::new();
    for event in events {
        for display in converter.convert(event) {
            merge_display_event(&mut shown, display);
        }
    }
    shown
}

#[test]
fn test_every_non_blank_line_becomes_one_event() {
    let events = decode_output(TRANSCRIPT);
    let non_blank = TRANSCRIPT.lines().filter(|line| !line.trim().is_empty()).count();
    assert_eq!(events.len(), non_blank);
    assert!(events.iter().any(|event| matches!(
        event,
        AgentEvent::RawLine { line } if line == "warning: unused variable"
    )));
}

#[test]
fn test_transcript_renders_as_merged_display_stream() {
    let mut events = vec![AgentEvent::Iteration { iteration: 1 }];
    events.extend(decode_output(TRANSCRIPT));
    let shown = display_stream(&events);

    let kinds: Vec<DisplayKind> = shown.iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DisplayKind::Iteration,
            DisplayKind::Session,
            DisplayKind::UserMessage,
            DisplayKind::AssistantText,
            DisplayKind::Thinking,
            DisplayKind::AssistantText,
            DisplayKind::ToolStart,
            DisplayKind::ToolEnd,
            DisplayKind::Raw,
            DisplayKind::TurnEnd,
            DisplayKind::AgentEnd,
        ]
    );

    let text = &shown[5];
    assert_eq!(text.detail, "Running the tests.");
    assert!(text.summary.contains("18 chars"));
    assert!(shown.iter().all(|event| event.iteration == 1));
    assert_eq!(shown[2].detail, "fix the build");
}

#[test]
fn test_tool_call_becomes_finished_block() {
    let mut events = vec![AgentEvent::Iteration { iteration: 2 }];
    events.extend(decode_output(TRANSCRIPT));
    let mut blocks = BlockBuilder::new();
    for display in display_stream(&events) {
        blocks.apply(&display);
    }

    let tool = blocks
        .blocks()
        .iter()
        .find_map(|block| match block {
            Block::ToolCall(tool) => Some(tool),
            _ => None,
        })
        .expect("tool block");
    assert_eq!(tool.name, "bash");
    assert_eq!(tool.args, "$ cargo test");
    assert_eq!(tool.result, "test result: ok");
    assert_eq!(tool.status, ToolStatus::Done);
    assert!(blocks.active_tool_index().is_none());
    assert!(matches!(blocks.blocks()[0], Block::Iteration { iteration: 2 }));
}

#[test]
fn test_persisted_events_replay_to_the_same_display_stream() {
    let mut events = vec![AgentEvent::Iteration { iteration: 1 }];
    events.extend(decode_output(TRANSCRIPT));

    let reloaded: Vec<AgentEvent> = events
        .iter()
        .map(|event| serde_json::to_string(event).unwrap())
        .map(|line| serde_json::from_str(&line).unwrap())
        .collect();

    let live: Vec<(DisplayKind, String)> = display_stream(&events)
        .into_iter()
        .map(|event| (event.kind, event.summary))
        .collect();
    let replayed: Vec<(DisplayKind, String)> = display_stream(&reloaded)
        .into_iter()
        .map(|event| (event.kind, event.summary))
        .collect();
    assert_eq!(live, replayed);
}

#[test]
fn test_foreign_json_is_kept_as_untyped_event() {
    let event = decode_line(r#"{"event":"progress","role":"system","text":"50%","tool":{"name":"indexer"}}"#)
        .expect("event");
    let AgentEvent::Untyped(untyped) = &event else {
        panic!("expected untyped event, got {event:?}");
    };
    assert_eq!(untyped.kind, "progress");
    assert_eq!(untyped.role.as_deref(), Some("system"));
    assert_eq!(untyped.content.as_deref(), Some("50%"));
    assert_eq!(untyped.tool.as_deref(), Some("indexer"));

    let shown = display_stream(&[event]);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].kind, DisplayKind::Raw);
    assert!(shown[0].summary.contains("progress [system] ⚙ indexer: 50%"));
}

#[test]
fn test_failed_tool_is_marked_as_error() {
    let lines = [
        r#"{"type":"tool_execution_start","toolCallId":"c9","toolName":"read","args":{"path":"missing.rs"}}"#,
        r#"{"type":"tool_execution_end","toolCallId":"c9","toolName":"read","result":"no such file","isError":true}"#,
    ];
    let events: Vec<AgentEvent> = lines.iter().filter_map(|line| decode_line(line)).collect();
    let shown = display_stream(&events);
    assert!(shown[1].is_tool_error());
    assert_eq!(shown[1].summary, "✗ read error");

    let mut blocks = BlockBuilder::new();
    for display in &shown {
        blocks.apply(display);
    }
    let Block::ToolCall(tool) = &blocks.blocks()[0] else {
        panic!("expected a tool block");
    };
    assert_eq!(tool.status, ToolStatus::Error);
    assert_eq!(tool.args, "missing.rs");
    assert_eq!(tool.result, "no such file");
}
