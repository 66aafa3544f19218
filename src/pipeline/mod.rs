//! 流水线部件：动作行解析、提示词、流式转发、过程事件

pub mod events;
pub mod planner;
pub mod prompts;
pub mod relay;

pub use events::PipelineEvent;
pub use planner::{parse_action_line, parse_actions, ActionSplitter, ACTION_PREFIX};
pub use prompts::{analysis_prompt, response_prompt};
pub use relay::StreamRelay;
