use std::collections::HashMap;
use std::future::ready;
use std::pin::Pin;
use std::sync::Arc;

use weather_agent_model::{ModelTool, ToolCallRequest};

use crate::tool::{Approval, Error, ToolObject, ToolResult};

/// An executor that manages the toolset and handles tool call requests
/// from the model.
pub struct Executor {
    tools: HashMap<String, Arc<dyn ToolObject>>,
    on_request: Option<Box<dyn Fn(Approval) + Send + Sync>>,
}

impl Executor {
    pub fn new(
        tools: Vec<Arc<dyn ToolObject>>,
        on_request: Option<Box<dyn Fn(Approval) + Send + Sync>>,
    ) -> Self {
        let mut tool_map = HashMap::with_capacity(tools.len());
        for tool in tools {
            let name = tool.name().to_owned();
            tool_map.insert(name, tool);
        }
        Self {
            tools: tool_map,
            on_request,
        }
    }

    #[inline]
    pub fn definitions(&self) -> Vec<ModelTool> {
        self.tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect()
    }

    /// Spawns an execution future for every request via `spawner`.
    ///
    /// A request for a tool that is not registered still produces a
    /// future; it resolves to an error result so the model learns about
    /// the failed call instead of the call silently vanishing.
    pub fn handle_requests<S>(&self, requests: Vec<ToolCallRequest>, spawner: S)
    where
        S: FnMut(String, Pin<Box<dyn Future<Output = ToolResult> + Send>>),
    {
        let mut spawner = spawner;

        let span = debug_span!("tool executor");
        let _enter = span.enter();
        for req in requests {
            let id = req.id;
            let Some(tool) = self.tools.get(&req.name) else {
                warn!("tool not found: {}", req.name);
                let err = Error::invalid_input()
                    .with_reason(format!("no such tool: {}", req.name));
                spawner(id, Box::pin(ready(ToolResult::Err(err))));
                continue;
            };
            let arguments = req.arguments;
            trace!("spawning a tool ({id}) with args: {arguments:?}");
            spawner(
                id,
                Arc::clone(tool).execute(arguments, &self.on_request),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use serde_json::{Value, json};

    use super::*;
    use crate::tool::{Tool, ToolObjectImpl};

    static EMPTY_SCHEMA: &Value = &Value::Null;

    struct TestTool;

    impl Tool for TestTool {
        type Input = serde_json::Value;

        fn name(&self) -> &str {
            "test_tool"
        }

        fn description(&self) -> &str {
            "A test tool"
        }

        fn parameter_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn make_approval(&self, _input: &Self::Input) -> Approval {
            Approval::new("", "")
        }

        fn execute(
            &self,
            _input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok("success".to_owned()))
        }
    }

    fn test_executor() -> Executor {
        Executor::new(vec![Arc::new(ToolObjectImpl(TestTool))], None)
    }

    #[tokio::test]
    async fn test_handle_requests() {
        let executor = test_executor();

        let requests = vec![ToolCallRequest {
            id: "tool:1".to_owned(),
            name: "test_tool".to_owned(),
            arguments: json!({}),
        }];

        let mut spawned = vec![];
        executor.handle_requests(requests, |id, future| {
            spawned.push((id, future));
        });

        assert_eq!(spawned.len(), 1);
        let (id, future) = spawned.pop().unwrap();
        assert_eq!(id, "tool:1");
        assert_eq!(future.await.unwrap(), "success");
    }

    #[tokio::test]
    async fn test_unknown_tool_produces_an_error_result() {
        let executor = test_executor();

        let requests = vec![ToolCallRequest {
            id: "tool:1".to_owned(),
            name: "read_tool".to_owned(),
            arguments: json!({}),
        }];

        let mut spawned = vec![];
        executor.handle_requests(requests, |id, future| {
            spawned.push((id, future));
        });

        assert_eq!(spawned.len(), 1);
        let (_, future) = spawned.pop().unwrap();
        let err = future.await.unwrap_err();
        assert_eq!(err.kind(), crate::tool::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_definitions() {
        let executor = test_executor();
        let definitions = executor.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "test_tool");
    }
}
