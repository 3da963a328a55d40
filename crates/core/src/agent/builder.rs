use std::sync::Arc;

use serde_json::Value;
use weather_agent_model::ModelProvider;

use super::{Agent, TranscriptSource};
use crate::model_client::ModelClient;
use crate::tool::{Approval, Tool, ToolObject, ToolObjectImpl};

/// [`Agent`] builder.
pub struct AgentBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) tools: Vec<Arc<dyn ToolObject>>,
    pub(crate) system_prompt: Option<String>,
    pub(crate) output_schema: Option<Value>,
    pub(crate) on_idle: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_transcript:
        Option<Arc<dyn Fn(&str, TranscriptSource) + Send + Sync>>,
    pub(crate) on_final_output: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub(crate) on_error: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub(crate) on_tool_call_request:
        Option<Box<dyn Fn(Approval) + Send + Sync>>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            tools: vec![],
            system_prompt: None,
            output_schema: None,
            on_idle: None,
            on_transcript: None,
            on_final_output: None,
            on_error: None,
            on_tool_call_request: None,
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Constrains the final assistant message to the given JSON schema.
    ///
    /// Whether the schema is enforced depends on the model provider.
    #[inline]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(ToolObjectImpl(tool)));
        self
    }

    /// Attaches a callback to be invoked when the agent is idle.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Attaches a callback to be invoked with the final assistant
    /// message of each turn.
    #[inline]
    pub fn on_final_output(
        mut self,
        on_final_output: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_final_output = Some(Box::new(on_final_output));
        self
    }

    /// Attaches a callback to be invoked when a model request fails.
    #[inline]
    pub fn on_error(
        mut self,
        on_error: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Attaches a callback to be invoked when a tool call requests
    /// approval. Without a callback, all requests are auto-approved.
    #[inline]
    pub fn on_tool_call_request(
        mut self,
        on_tool_call_request: impl Fn(Approval) + Send + Sync + 'static,
    ) -> Self {
        self.on_tool_call_request = Some(Box::new(on_tool_call_request));
        self
    }

    /// Builds the agent.
    #[inline]
    pub fn build(self) -> Agent {
        Agent::spawn_from_builder(self)
    }
}
