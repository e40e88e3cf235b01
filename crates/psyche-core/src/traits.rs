use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{AgentCapability, AgentMessage, AgentResponse, Payload};

/// Agent: an independently failable unit of work.
///
/// Implementations may be shared across concurrent executions, so any state
/// kept on the instance must be safe for concurrent use.
pub trait Agent: Send + Sync + 'static {
    /// Identifier echoed in every response.
    fn agent_id(&self) -> &str;

    /// One-time setup. Must be idempotent.
    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Cheap precondition check run before `process`.
    fn validate_input(&self, payload: &Payload) -> Result<()> {
        let _ = payload;
        Ok(())
    }

    /// Handle one message.
    ///
    /// Ordinary application failures should be returned as
    /// `AgentResponse::failure`; an `Err` is converted the same way by the caller.
    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>>;

    /// Static capability descriptors for introspection.
    fn capabilities(&self) -> Vec<AgentCapability>;
}

/// Session store: opaque key/value persistence for multi-turn flows.
pub trait SessionStore: Send + Sync + 'static {
    /// Load the state stored for a session, if any.
    fn get(&self, session_id: &str) -> BoxFuture<'_, Result<Option<serde_json::Value>>>;

    /// Replace the state stored for a session.
    fn put(&self, session_id: &str, state: serde_json::Value) -> BoxFuture<'_, Result<()>>;
}
