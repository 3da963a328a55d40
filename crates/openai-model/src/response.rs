use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};

use serde_json::Value;
use tokio::sync::mpsc;
use weather_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    OpaqueMessage, ToolCallRequest,
};

use crate::Error;
use crate::proto::{ChatCompletionChunk, Message, ToolCall};
use crate::sse::Sse;

type SharedFullMessage = Arc<Mutex<Option<(String, Message)>>>;

/// A streaming response from the chat-completions endpoint.
///
/// The SSE stream is drained by a background task that forwards decoded
/// events over a channel; polling this type just receives from that
/// channel. The fully assembled assistant message is parked aside so
/// that [`ModelResponse::make_opaque_message`] can recover it after the
/// stream completes.
pub struct OpenAIResponse {
    events_rx: mpsc::UnboundedReceiver<Result<ModelResponseEvent, Error>>,
    full_msg: SharedFullMessage,
    failed: bool,
}

impl OpenAIResponse {
    pub(crate) fn spawn_reader(sse: Sse) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let full_msg: SharedFullMessage = Default::default();
        tokio::spawn(read_stream(sse, events_tx, Arc::clone(&full_msg)));
        Self {
            events_rx,
            full_msg,
            failed: false,
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.failed {
            return Poll::Ready(Ok(None));
        }
        match ready!(this.events_rx.poll_recv(cx)) {
            Some(Ok(event)) => Poll::Ready(Ok(Some(event))),
            Some(Err(err)) => {
                this.failed = true;
                Poll::Ready(Err(err))
            }
            None => Poll::Ready(Ok(None)),
        }
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        self.full_msg
            .lock()
            .unwrap()
            .as_ref()
            .map(|(id, msg)| OpaqueMessage::new(id, msg.clone()))
    }
}

async fn read_stream(
    mut sse: Sse,
    events_tx: mpsc::UnboundedSender<Result<ModelResponseEvent, Error>>,
    full_msg: SharedFullMessage,
) {
    let mut assembly = Assembly::default();
    loop {
        let payload = match sse.next_event().await {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(err) => {
                events_tx
                    .send(Err(Error::new(
                        format!("stream error: {err:?}"),
                        ErrorKind::Other,
                    )))
                    .ok();
                return;
            }
        };
        trace!("got sse payload: {payload}");
        if payload == "[DONE]" {
            break;
        }

        let chunk =
            match serde_json::from_str::<ChatCompletionChunk>(&payload) {
                Ok(chunk) => chunk,
                Err(err) => {
                    events_tx
                        .send(Err(Error::new(
                            format!("{err}"),
                            ErrorKind::Other,
                        )))
                        .ok();
                    return;
                }
            };

        let delta = match assembly.merge_chunk(chunk) {
            Ok(delta) => delta,
            Err(err) => {
                events_tx.send(Err(err)).ok();
                return;
            }
        };
        if let Some(delta) = delta
            && events_tx
                .send(Ok(ModelResponseEvent::MessageDelta(delta)))
                .is_err()
        {
            // The response has been dropped, stop streaming.
            return;
        }
    }

    // Tool calls arrive fragmented across chunks, so they are only
    // reported once the stream has ended and they are fully assembled.
    for request in assembly.tool_call_requests() {
        if events_tx
            .send(Ok(ModelResponseEvent::ToolCall(request)))
            .is_err()
        {
            return;
        }
    }
    if let Some(finish_reason) = assembly.finish_reason {
        events_tx
            .send(Ok(ModelResponseEvent::Completed(finish_reason)))
            .ok();
    }

    // Park the full message before the channel closes, so it is always
    // available once polling observes the end of the stream.
    *full_msg.lock().unwrap() = assembly.into_full_message();
}

#[derive(Default)]
struct Assembly {
    id: Option<String>,
    content: String,
    reasoning_content: Option<String>,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<ModelFinishReason>,
}

impl Assembly {
    /// Merges one chunk into the assembly, returning the content delta
    /// it carried, if any.
    fn merge_chunk(
        &mut self,
        mut chunk: ChatCompletionChunk,
    ) -> Result<Option<String>, Error> {
        if self.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        }

        // The usage chunk at the tail of the stream has no choices.
        let Some(choice) = chunk.choices.pop() else {
            return Ok(None);
        };

        if let Some(finish_reason) = choice.finish_reason {
            self.finish_reason = Some(if finish_reason == "tool_calls" {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            });
        }

        if let Some(reasoning_content) = choice.delta.reasoning_content {
            self.reasoning_content
                .get_or_insert_default()
                .push_str(&reasoning_content);
        }
        for fragment in choice.delta.tool_calls.into_iter().flatten() {
            self.merge_tool_call_fragment(fragment);
        }

        if let Some(content) = choice.delta.content {
            self.content.push_str(&content);
            return Ok(Some(content));
        }
        Ok(None)
    }

    fn merge_tool_call_fragment(&mut self, fragment: ToolCall) {
        let Some(partial) = self
            .tool_calls
            .iter_mut()
            .find(|call| call.index == fragment.index)
        else {
            self.tool_calls.push(fragment);
            return;
        };

        if let Some(id) = fragment.id {
            partial.id.get_or_insert_default().push_str(&id);
        }
        if let Some(ty) = fragment.r#type {
            partial.r#type.get_or_insert_default().push_str(&ty);
        }
        if let Some(function) = fragment.function {
            match &mut partial.function {
                Some(partial_func) => {
                    if let Some(name) = function.name {
                        partial_func
                            .name
                            .get_or_insert_default()
                            .push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial_func
                            .arguments
                            .get_or_insert_default()
                            .push_str(&arguments);
                    }
                }
                None => partial.function = Some(function),
            }
        }
    }

    fn tool_call_requests(&self) -> Vec<ToolCallRequest> {
        self.tool_calls
            .iter()
            .map(|call| {
                let id = call.id.clone().unwrap_or_default();
                let name = call
                    .function
                    .as_ref()
                    .and_then(|f| f.name.clone())
                    .unwrap_or_default();
                let arguments = call
                    .function
                    .as_ref()
                    .and_then(|f| f.arguments.as_deref())
                    .and_then(|args| serde_json::from_str::<Value>(args).ok())
                    .unwrap_or_default();
                ToolCallRequest {
                    id,
                    name,
                    arguments,
                }
            })
            .collect()
    }

    fn into_full_message(self) -> Option<(String, Message)> {
        Some((
            self.id?,
            Message::Assistant {
                content: Some(self.content),
                tool_calls: if self.tool_calls.is_empty() {
                    None
                } else {
                    Some(self.tool_calls)
                },
                reasoning_content: self.reasoning_content,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::sse::ByteStream;

    fn data(payload: &serde_json::Value) -> Bytes {
        Bytes::from(format!("data: {payload}\n\n"))
    }

    #[tokio::test]
    async fn test_text_only_stream() {
        let stream = ByteStream::from_preset(vec![
            data(&json!({
                "id": "c1",
                "choices": [{ "delta": { "content": "It is " }, "finish_reason": null }]
            })),
            data(&json!({
                "id": "c1",
                "choices": [{ "delta": { "content": "sunny." }, "finish_reason": null }]
            })),
            data(&json!({
                "id": "c1",
                "choices": [{ "delta": {}, "finish_reason": "stop" }]
            })),
            Bytes::from_static(b"data: [DONE]\n\n"),
        ]);
        let mut resp = pin!(OpenAIResponse::spawn_reader(Sse::new(stream)));

        let mut transcript = String::new();
        let mut finish_reason = None;
        loop {
            let Some(event) = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
            else {
                break;
            };
            match event {
                ModelResponseEvent::MessageDelta(delta) => {
                    transcript.push_str(&delta);
                }
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason);
                }
                event => unreachable!("unexpected event: {event:?}"),
            }
        }
        assert_eq!(transcript, "It is sunny.");
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));

        let full_msg = resp.make_opaque_message().unwrap();
        let full_msg: &Message = full_msg.to_raw().unwrap();
        assert!(matches!(full_msg, Message::Assistant { .. }));
    }

    #[tokio::test]
    async fn test_fragmented_tool_call() {
        let stream = ByteStream::from_preset(vec![
            data(&json!({
                "id": "c1",
                "choices": [{
                    "delta": {
                        "tool_calls": [{
                            "index": 0,
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "get_weather", "arguments": "{\"ci" }
                        }]
                    },
                    "finish_reason": null
                }]
            })),
            data(&json!({
                "id": "c1",
                "choices": [{
                    "delta": {
                        "tool_calls": [{
                            "index": 0,
                            "function": { "arguments": "ty\":\"thar\"}" }
                        }]
                    },
                    "finish_reason": null
                }]
            })),
            data(&json!({
                "id": "c1",
                "choices": [{ "delta": {}, "finish_reason": "tool_calls" }]
            })),
            Bytes::from_static(b"data: [DONE]\n\n"),
        ]);
        let mut resp = pin!(OpenAIResponse::spawn_reader(Sse::new(stream)));

        let mut tool_calls = vec![];
        let mut finish_reason = None;
        loop {
            let Some(event) = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
            else {
                break;
            };
            match event {
                ModelResponseEvent::ToolCall(request) => {
                    tool_calls.push(request);
                }
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason);
                }
                event => unreachable!("unexpected event: {event:?}"),
            }
        }

        assert_eq!(finish_reason, Some(ModelFinishReason::ToolCalls));
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0].id, "call_1");
        assert_eq!(tool_calls[0].name, "get_weather");
        assert_eq!(tool_calls[0].arguments, json!({ "city": "thar" }));
    }

    #[tokio::test]
    async fn test_chunk_id_mismatch() {
        let stream = ByteStream::from_preset(vec![
            data(&json!({
                "id": "c1",
                "choices": [{ "delta": { "content": "a" }, "finish_reason": null }]
            })),
            data(&json!({
                "id": "c2",
                "choices": [{ "delta": { "content": "b" }, "finish_reason": null }]
            })),
        ]);
        let mut resp = pin!(OpenAIResponse::spawn_reader(Sse::new(stream)));

        let mut saw_error = false;
        loop {
            match poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    saw_error = true;
                    break;
                }
            }
        }
        assert!(saw_error);
    }
}
