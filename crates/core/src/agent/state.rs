use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::mem;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use weather_agent_model::{
    ModelFinishReason, ModelMessage, ModelProviderError, ModelRequest,
    ToolCallRequest, ToolCallResult,
};

use super::{AgentBuilder, TranscriptSource};
use crate::conversation::{Conversation, Item as ConversationItem};
use crate::model_client::{ModelClient, ModelClientResponse};
use crate::tool::{Executor as ToolExecutor, ToolResult};

#[derive(Clone, Copy, Default, PartialEq, Eq)]
enum AgentStage {
    #[default]
    Idle,
    ModelThinking,
    RunningTools,
}

type WeakSender = mpsc::WeakUnboundedSender<AgentMessage>;

pub(super) enum AgentMessage {
    UserInput(String),
    ModelRequestFinished {
        model_client: ModelClient,
        response: Result<ModelClientResponse, Box<dyn ModelProviderError>>,
    },
    ToolFinished {
        id: String,
        result: ToolResult,
    },
}

impl Debug for AgentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentMessage::UserInput(input) => {
                f.debug_tuple("UserInput").field(input).finish()
            }
            AgentMessage::ModelRequestFinished { response, .. } => f
                .debug_struct("ModelRequestFinished")
                .field("response", response)
                .finish_non_exhaustive(),
            AgentMessage::ToolFinished { id, result } => f
                .debug_struct("ToolFinished")
                .field("id", id)
                .field("result", result)
                .finish(),
        }
    }
}

pub(super) struct AgentState {
    model_client: Option<ModelClient>,
    tool_executor: ToolExecutor,
    conversation: Conversation,
    output_schema: Option<Value>,
    current_stage: AgentStage,
    pending_inputs: VecDeque<String>,
    // Tool results are collected here in request order until the last
    // one lands.
    pending_tool_results: Vec<(String, Option<ToolResult>)>,

    on_idle: Option<Box<dyn Fn() + Send + Sync>>,
    on_transcript: Option<Arc<dyn Fn(&str, TranscriptSource) + Send + Sync>>,
    on_final_output: Option<Box<dyn Fn(&str) + Send + Sync>>,
    on_error: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl AgentState {
    pub(super) fn from_builder(builder: AgentBuilder) -> Self {
        let AgentBuilder {
            model_client,
            tools,
            system_prompt,
            output_schema,
            on_idle,
            on_transcript,
            on_final_output,
            on_error,
            on_tool_call_request,
        } = builder;

        let mut conversation = Conversation::default();
        if let Some(prompt) = system_prompt {
            conversation.items.push(ConversationItem {
                msg: ModelMessage::System(prompt.clone()),
                transcript: prompt,
            });
        }

        Self {
            model_client: Some(model_client),
            tool_executor: ToolExecutor::new(tools, on_tool_call_request),
            conversation,
            output_schema,
            current_stage: Default::default(),
            pending_inputs: Default::default(),
            pending_tool_results: Default::default(),
            on_idle,
            on_transcript,
            on_final_output,
            on_error,
        }
    }

    pub(super) fn handle(&mut self, msg: AgentMessage, tx: &WeakSender) {
        match msg {
            AgentMessage::UserInput(input) => {
                self.enqueue_user_input(input, tx);
            }
            AgentMessage::ModelRequestFinished {
                model_client,
                response,
            } => {
                self.model_request_finished(model_client, response, tx);
            }
            AgentMessage::ToolFinished { id, result } => {
                self.tool_finished(id, result, tx);
            }
        }
    }

    #[inline]
    fn enqueue_user_input(&mut self, input: String, tx: &WeakSender) {
        if self.current_stage != AgentStage::Idle {
            // If we are not in idle stage, just enqueue the input and
            // do nothing else.
            self.pending_inputs.push_back(input);
            return;
        }
        self.process_input_checked(input, tx);
    }

    fn process_next_input(&mut self, tx: &WeakSender) {
        if self.current_stage != AgentStage::Idle {
            // Cannot process the next input now. It will be picked up
            // when the current turn ends.
            return;
        }
        let input = self.pending_inputs.pop_front();
        if let Some(input) = input {
            self.process_input_checked(input, tx);
        } else {
            // Nothing to process, so we can invoke the idle callback.
            if let Some(on_idle) = &self.on_idle {
                on_idle();
            }
        }
    }

    /// Process the input string, assuming the stage is checked.
    fn process_input_checked(&mut self, input: String, tx: &WeakSender) {
        self.conversation.items.push(ConversationItem {
            msg: ModelMessage::User(input.clone()),
            transcript: input,
        });
        self.request_model_turn(tx);
    }

    /// Sends the current conversation to the model.
    fn request_model_turn(&mut self, tx: &WeakSender) {
        self.current_stage = AgentStage::ModelThinking;

        let request = self.build_model_request();
        let model_client = self
            .model_client
            .take()
            .expect("model client is already in use");
        let on_transcript = self.on_transcript.clone();
        spawn_task(tx, async move {
            let response = model_client
                .send_request(request, move |delta| {
                    if let Some(on_transcript) = &on_transcript {
                        on_transcript(&delta, TranscriptSource::Assistant);
                    }
                })
                .await;
            AgentMessage::ModelRequestFinished {
                model_client,
                response,
            }
        });
    }

    fn model_request_finished(
        &mut self,
        model_client: ModelClient,
        response: Result<ModelClientResponse, Box<dyn ModelProviderError>>,
        tx: &WeakSender,
    ) {
        self.model_client = Some(model_client);

        let resp = match response {
            Ok(resp) => resp,
            Err(err) => {
                error!("model request failed: {err}");
                if let Some(on_error) = &self.on_error {
                    on_error(&format!("{err}"));
                }
                self.current_stage = AgentStage::Idle;
                self.process_next_input(tx);
                return;
            }
        };

        // Insert the message to the conversation.
        let transcript = resp.transcript;
        let msg = if let Some(opaque_msg) = resp.opaque_msg {
            ModelMessage::Opaque(opaque_msg)
        } else {
            // Downgrade to a text-only message.
            ModelMessage::Assistant(transcript.clone())
        };
        self.conversation.items.push(ConversationItem {
            msg,
            transcript: transcript.clone(),
        });

        let wants_tools = resp.finish_reason
            == Some(ModelFinishReason::ToolCalls)
            && !resp.tool_calls.is_empty();
        if wants_tools {
            self.run_tools(resp.tool_calls, tx);
        } else {
            if let Some(on_final_output) = &self.on_final_output {
                on_final_output(&transcript);
            }
            self.current_stage = AgentStage::Idle;
            self.process_next_input(tx);
        }
    }

    fn run_tools(&mut self, requests: Vec<ToolCallRequest>, tx: &WeakSender) {
        self.current_stage = AgentStage::RunningTools;
        self.pending_tool_results = requests
            .iter()
            .map(|request| (request.id.clone(), None))
            .collect();
        self.tool_executor.handle_requests(requests, |id, future| {
            spawn_task(tx, async move {
                let result = future.await;
                AgentMessage::ToolFinished { id, result }
            });
        });
    }

    fn tool_finished(
        &mut self,
        id: String,
        result: ToolResult,
        tx: &WeakSender,
    ) {
        if let Some(on_transcript) = &self.on_transcript {
            on_transcript(&tool_result_content(&result), TranscriptSource::Tool);
        }

        // The model may reuse a call id, so claim the first unfilled
        // slot with a matching id instead of always hitting the first.
        let Some(slot) = self
            .pending_tool_results
            .iter_mut()
            .find(|(slot_id, result)| *slot_id == id && result.is_none())
        else {
            warn!("unexpected tool result: {id}");
            return;
        };
        slot.1 = Some(result);

        if self
            .pending_tool_results
            .iter()
            .any(|(_, result)| result.is_none())
        {
            // Some tools are still running.
            return;
        }

        for (id, result) in mem::take(&mut self.pending_tool_results) {
            let content = tool_result_content(
                &result.expect("checked that all results landed"),
            );
            self.conversation.items.push(ConversationItem {
                msg: ModelMessage::Tool(ToolCallResult {
                    id,
                    content: content.clone(),
                }),
                transcript: content,
            });
        }
        self.request_model_turn(tx);
    }

    fn build_model_request(&self) -> ModelRequest {
        ModelRequest {
            messages: self
                .conversation
                .items
                .iter()
                .map(|item| item.msg.clone())
                .collect(),
            tools: self.tool_executor.definitions(),
            output_schema: self.output_schema.clone(),
        }
    }
}

/// The model is told about failed tool calls through the result
/// content; a failure never aborts the turn.
fn tool_result_content(result: &ToolResult) -> String {
    match result {
        Ok(content) => content.clone(),
        Err(err) => format!("Error: {}", err.reason()),
    }
}

fn spawn_task<F>(tx: &WeakSender, fut: F)
where
    F: Future<Output = AgentMessage> + Send + 'static,
{
    let Some(tx) = tx.upgrade() else {
        // All handles are gone, there is no one to deliver results to.
        debug!("agent is shutting down, skipping task");
        return;
    };
    tokio::spawn(async move {
        let msg = fut.await;
        tx.send(msg).ok();
    });
}
