use weather_agent_core::tool::Approval as ToolApproval;
use weather_agent_core::{Agent, AgentBuilder, TranscriptSource};
use weather_agent_model::ModelProvider;

use crate::report::WeatherReport;
use crate::tools::*;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    on_email_request: Option<Box<dyn Fn(ToolApproval) + Send + Sync>>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder = AgentBuilder::with_model_provider(provider);
        Self {
            agent_builder,
            on_email_request: None,
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Attaches a callback to be invoked when the agent is idle.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_idle(on_idle);
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_transcript(on_transcript);
        self
    }

    /// Attaches a callback to be invoked with the final assistant message
    /// of each turn.
    #[inline]
    pub fn on_final_output(
        mut self,
        on_final_output: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder =
            self.agent_builder.on_final_output(on_final_output);
        self
    }

    /// Attaches a callback to be invoked when a model request fails.
    #[inline]
    pub fn on_error(
        mut self,
        on_error: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_error(on_error);
        self
    }

    /// Attaches a callback to be invoked when the agent wants to send an
    /// email. Without a callback, emails are sent without confirmation.
    #[inline]
    pub fn on_email_request(
        mut self,
        on_email_request: impl Fn(ToolApproval) + Send + Sync + 'static,
    ) -> Self {
        self.on_email_request = Some(Box::new(on_email_request));
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        let Self {
            mut agent_builder,
            on_email_request,
        } = self;

        agent_builder = agent_builder
            .with_tool(WeatherTool::new())
            .with_tool(SendEmailTool::new())
            .with_output_schema(WeatherReport::output_schema());

        // Weather lookups are read-only, only email requests are routed
        // to the confirmation callback.
        if let Some(on_email_request) = on_email_request {
            agent_builder = agent_builder.on_tool_call_request(move |approval| {
                if approval.tool_name() == SendEmailTool::NAME {
                    on_email_request(approval);
                } else {
                    approval.approve();
                }
            });
        }

        Session {
            agent: agent_builder.build(),
        }
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session holds a fully configured agent that you can use directly, and it
/// is basically a wrapper around [`Agent`].
pub struct Session {
    agent: Agent,
}

impl Session {
    /// Sends a message to the session.
    #[inline]
    pub fn send_message(&self, message: &str) {
        self.agent.enqueue_user_input(message);
    }
}
