//! A local fake model for testing purpose.

mod preset;

use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use weather_agent_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    OpaqueMessage,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[derive(Debug)]
pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    opaque_id: String,
    sleep: Option<Pin<Box<Sleep>>>,
    delay: Option<Duration>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // All fields are `Unpin`, so no projection is needed.
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
        }

        let Some(event) = this.events.pop_front() else {
            return Poll::Ready(Ok(None));
        };
        if let Some(delay) = this.delay
            && !this.events.is_empty()
        {
            this.sleep = Some(Box::pin(sleep(delay)));
        }
        Poll::Ready(Ok(Some(event)))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        Some(OpaqueMessage::new(
            self.opaque_id.clone(),
            self.opaque_id.clone(),
        ))
    }
}

#[derive(Clone)]
enum ConversationStep {
    /// A caller-supplied message: a user input or a tool call result.
    Input,
    AssistantResponse(PresetResponse),
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script,
/// which is how the model should respond to a request. Steps are selected
/// by the number of non-system history messages in the request, so every
/// user input and tool result needs a matching input step. If the script
/// has no step for a request, an error is returned.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    attempts: Arc<Mutex<HashMap<usize, u64>>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Appends an assistant response step to the script.
    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    /// Appends an input step (a user message or a tool result).
    #[inline]
    pub fn add_input_step(&mut self) {
        self.conversation_script.push(ConversationStep::Input);
    }

    /// Delays every response event by `duration`.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    fn make_response(
        &self,
        req: &ModelRequest,
    ) -> Result<TestModelResponse, Error> {
        // The system prompt is not part of the scripted exchange.
        let step_idx = req
            .messages
            .iter()
            .filter(|msg| !matches!(msg, ModelMessage::System(_)))
            .count();
        let Some(step) = self.conversation_script.get(step_idx) else {
            return Err(Error {
                message: "no script step for this request",
                kind: ErrorKind::Other,
            });
        };

        let preset = match step {
            ConversationStep::Input => {
                return Err(Error {
                    message: "not an assistant response step",
                    kind: ErrorKind::Moderated,
                });
            }
            ConversationStep::AssistantResponse(preset) => preset,
        };

        if let Some(failures) = preset.failures {
            let mut attempts = self.attempts.lock().unwrap();
            let attempt = attempts.entry(step_idx).or_insert(0);
            *attempt += 1;
            if failures == 0 || *attempt <= failures {
                return Err(Error {
                    message: "scripted failure",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
        }

        let has_tool_call = preset
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        let mut events: VecDeque<_> = preset
            .events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::ToolCall(req) => {
                    ModelResponseEvent::ToolCall(req.clone())
                }
            })
            .collect();
        events.push_back(ModelResponseEvent::Completed(if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }));

        Ok(TestModelResponse {
            events,
            opaque_id: format!("msg:{step_idx}"),
            sleep: self.delay.map(|delay| Box::pin(sleep(delay))),
            delay: self.delay,
        })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.make_response(req))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;
    use weather_agent_model::{
        ModelMessage, ModelRequest, ModelTool, OpaqueMessage, ToolCallRequest,
    };

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, OpaqueMessage) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(_) => break,
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
        (msg, tool_call, resp.make_opaque_message().unwrap())
    }

    fn weather_tool() -> ModelTool {
        ModelTool {
            name: "get_weather".to_owned(),
            description: "Returns the current weather for a city".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "Name of the city"
                    }
                }
            }),
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_input_step();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_input_step();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Let me check.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "tool:1".to_owned(),
                name: "get_weather".to_owned(),
                arguments: json!({ "city": "Berlin" }),
            }),
        ]));

        let mut req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![weather_tool()],
            output_schema: None,
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _, opaque_msg) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");

        req.messages.push(ModelMessage::Opaque(opaque_msg));
        req.messages
            .push(ModelMessage::User("How is Berlin?".to_owned()));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, _) = collect_response(resp).await;
        assert_eq!(msg, "Let me check.");
        let tool_call = tool_call.unwrap();
        assert_eq!(tool_call.name, "get_weather");
        assert_eq!(tool_call.arguments, json!({ "city": "Berlin" }));
    }

    #[tokio::test]
    async fn test_system_prompt_is_skipped() {
        let mut provider = TestModelProvider::default();
        provider.add_input_step();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hi there.".to_owned()),
        ]));

        let req = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a weather agent.".to_owned()),
                ModelMessage::User("Hi".to_owned()),
            ],
            tools: vec![],
            output_schema: None,
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _, _) = collect_response(resp).await;
        assert_eq!(msg, "Hi there.");
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_input_step();
        provider.add_assistant_response_step(
            PresetResponse::with_events([PresetEvent::MessageDelta(
                "Finally!".to_owned(),
            )])
            .with_failures(2),
        );

        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
            output_schema: None,
        };
        for _ in 0..2 {
            let err = provider.send_request(&req).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, _, _) = collect_response(resp).await;
        assert_eq!(msg, "Finally!");
    }

    #[tokio::test]
    async fn test_missing_step() {
        let provider = TestModelProvider::default();
        let req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
            output_schema: None,
        };
        let err = provider.send_request(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
