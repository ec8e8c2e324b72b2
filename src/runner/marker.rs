/// Sentinel an agent prints once the whole task is done.
pub const COMPLETION_MARKER: &str = "<promise>COMPLETE</promise>";

/// Lines containing this (case-insensitively) are instructions that quote
/// the marker, not a completion signal.
const INSTRUCTION_HINT: &str = "reply with:";

/// Reports whether `output` contains a genuine completion marker.
///
/// Detection is line based. A line that mentions the marker as part of an
/// instruction, recognised by the `reply with:` wording, is skipped; agents
/// that echo their prompt back would otherwise end the run immediately.
/// Prompts that quote the marker with different wording are not recognised
/// as instructions.
pub fn has_completion_marker(output: &str) -> bool {
    output
        .lines()
        .filter(|line| !line.to_lowercase().contains(INSTRUCTION_HINT))
        .any(|line| line.contains(COMPLETION_MARKER))
}
