use std::env;

use reqwest::Client;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weather_agent_core::tool::{
    Approval as ToolApproval, Error as ToolError, Tool, ToolResult,
};

#[derive(Deserialize, JsonSchema)]
pub struct SendEmailToolParameters {
    #[schemars(description = "Recipient email address.")]
    to_email: String,
    #[schemars(description = "Subject line of the email.")]
    subject: String,
    #[schemars(description = "Plain text body of the email.")]
    body: String,
}

#[derive(Serialize)]
struct EmailRequest<'a> {
    to_email: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// A tool for sending emails through an HTTP email service.
///
/// The service endpoint and credential come from the `EMAIL_API_URL` and
/// `EMAIL_API_KEY` environment variables. The tool can be registered
/// without them, calls will then fail at execution time, so the agent
/// still works for weather-only queries.
pub struct SendEmailTool {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    parameter_schema: Value,
}

impl SendEmailTool {
    /// The name the model uses to call this tool.
    pub const NAME: &'static str = "send_email";

    /// Creates a new send email tool configured from the environment.
    #[inline]
    pub fn new() -> Self {
        Self::with_endpoint(
            env::var("EMAIL_API_URL").ok(),
            env::var("EMAIL_API_KEY").ok(),
        )
    }

    /// Creates a new send email tool with an explicit endpoint and
    /// credential.
    #[inline]
    pub fn with_endpoint(
        endpoint: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        SendEmailTool {
            client: Client::new(),
            endpoint,
            api_key,
            parameter_schema: schema_for!(SendEmailToolParameters).to_value(),
        }
    }
}

impl Default for SendEmailTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for SendEmailTool {
    type Input = SendEmailToolParameters;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        r#"
Sends an email to the specified recipient.
Use this only when the user explicitly asks for an email."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn make_approval(&self, input: &Self::Input) -> ToolApproval {
        ToolApproval::new(
            format!("To: {}\nSubject: {}", input.to_email, input.subject),
            "Agent wants to send an email",
        )
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: SendEmailToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let api_key = self.api_key.clone();
        async move {
            let Some(endpoint) = endpoint else {
                return Err(ToolError::execution_error()
                    .with_reason("EMAIL_API_URL is not set"));
            };
            let Some(api_key) = api_key else {
                return Err(ToolError::execution_error()
                    .with_reason("EMAIL_API_KEY is not set"));
            };
            send_email(&client, &endpoint, &api_key, &input).await
        }
    }
}

async fn send_email(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    input: &SendEmailToolParameters,
) -> ToolResult {
    debug!("sending an email to: {}", input.to_email);
    let resp = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&EmailRequest {
            to_email: &input.to_email,
            subject: &input.subject,
            body: &input.body,
        })
        .send()
        .await
        .map_err(|err| {
            ToolError::execution_error().with_reason(format!("{err}"))
        })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ToolError::execution_error()
            .with_reason(format!("email service returned {status}")));
    }
    Ok(format!("Email sent to {}", input.to_email))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weather_agent_core::tool::ErrorKind as ToolErrorKind;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_input() -> SendEmailToolParameters {
        SendEmailToolParameters {
            to_email: "someone@example.com".to_owned(),
            subject: "Weather report".to_owned(),
            body: "It is sunny.".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_sends_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(json!({
                "to_email": "someone@example.com",
                "subject": "Weather report",
                "body": "It is sunny.",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let tool = SendEmailTool::with_endpoint(
            Some(format!("{}/send", server.uri())),
            Some("test-key".to_owned()),
        );
        let result = tool.execute(test_input()).await;
        assert_eq!(result.unwrap(), "Email sent to someone@example.com");
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let tool = SendEmailTool::with_endpoint(
            Some("http://localhost:1/send".to_owned()),
            None,
        );
        let err = tool.execute(test_input()).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::ExecutionError);
        assert!(err.reason().contains("EMAIL_API_KEY"));
    }

    #[tokio::test]
    async fn test_service_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let tool = SendEmailTool::with_endpoint(
            Some(server.uri()),
            Some("bad-key".to_owned()),
        );
        let err = tool.execute(test_input()).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::ExecutionError);
    }
}
