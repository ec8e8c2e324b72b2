pub mod protocol;

pub use protocol::{
    AgentEvent, AssistantDelta, ContentBlock, MessageEnvelope, UntypedEvent,
};
