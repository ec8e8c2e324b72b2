pub mod block;
pub mod display;
pub mod tool_args;

pub use block::{Block, BlockBuilder, ToolCallBlock, ToolStatus};
pub use display::{merge_display_event, DisplayEvent, DisplayKind, EventConverter, ToolInfo};
pub use tool_args::{format_tool_args, tool_result_text};
