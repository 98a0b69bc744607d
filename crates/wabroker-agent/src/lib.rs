//! Agent interface and registry, Tool Execution Layer, and usage/limit
//! enforcement (spec §4.5–§4.7). Authoring agent prompts and tool-calling
//! internals is out of scope — this crate only defines the seam the
//! dispatcher calls through and the tenant-scoped effects tools may have.

pub mod agent;
pub mod echo;
pub mod error;
pub mod registry;
pub mod tools;
pub mod types;
pub mod usage;

pub use agent::{Agent, AgentEventStream};
pub use echo::EchoAgent;
pub use error::{AgentError, Result};
pub use registry::AgentRegistry;
pub use tools::{
    SendImageArgs, SendLocationArgs, SendTemplateArgs, SubmitActionArgs, ToolExecutor,
};
pub use types::{AgentEvent, TurnContext};
pub use usage::{UsageDecision, UsageGuard};
